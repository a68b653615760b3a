//! Pipeline: PushDeserializer dan PullSerializer
//!
//! Masing-masing instance punya satu Bounded Chunk Queue dan satu worker
//! thread. `push`/`pull` hanya block ketika queue penuh/kosong.

mod pull_serializer;
mod push_deserializer;
mod worker;

pub use pull_serializer::PullSerializer;
pub use push_deserializer::PushDeserializer;
pub use worker::State;
