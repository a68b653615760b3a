//! chunkstream - Bounded Streaming (De)Serialization Pipeline
//!
//! Arsitektur:
//! - `PullSerializer`: message -> chunk berukuran tetap, diambil lewat `pull`
//! - `PushDeserializer`: chunk yang di-`push` -> message, parse di worker
//! - Bounded Chunk Queue: memory terbatas berapapun ukuran message
//! - Release callback: buffer caller aman dipakai ulang begitu callback jalan
//!
//! Keduanya bisa dirangkai: hasil `pull` valid sebagai argumen `push`.
//!
//! ```no_run
//! use std::sync::Arc;
//! use chunkstream::{PullSerializer, PushDeserializer, Trajectory};
//!
//! let trajectory = Arc::new(Trajectory::generate("sample", 1_000));
//! let mut serializer = PullSerializer::new(4096, 4);
//! let mut deserializer = PushDeserializer::new(4096, 4);
//!
//! serializer.start(trajectory.clone());
//! let completion = deserializer.start_deferred(Trajectory::default());
//! loop {
//!     let chunk = serializer.pull();
//!     let done = chunk.is_empty();
//!     deserializer.push_owned(chunk.to_vec());
//!     if done {
//!         break;
//!     }
//! }
//! deserializer.finish();
//! assert_eq!(completion.wait().as_ref(), Some(&*trajectory));
//! ```

pub mod base;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod protocol;
pub mod stream;

pub use base::{Chunk, Completion, MmapStorage, OnRelease, QueuedChunk};
pub use config::PipelineConfig;
pub use error::{ConfigError, WireError};
pub use pipeline::{PullSerializer, PushDeserializer, State};
pub use protocol::{Message, Trajectory};
