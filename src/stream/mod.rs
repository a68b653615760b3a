//! Stream adapters: chunk <-> byte stream
//!
//! - `input`: Chunk-to-Stream, dipakai `PushDeserializer`
//! - `output`: Stream-to-Chunk, dipakai `PullSerializer`

mod input;
mod output;

pub use input::{
    ChunkInputStream, ChunkSource, DelegatingSource, Pushed, QueueSource, SliceInput,
    ZeroCopyInput,
};
pub use output::{
    ChunkOutputStream, ChunkSink, CollectingSink, Pulled, QueueSink, VecOutput, ZeroCopyOutput,
};
