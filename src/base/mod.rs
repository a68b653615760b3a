//! Base module: chunk, bounded queue, dan storage
//!
//! Prinsip desain:
//! - Zero-Copy: chunk hanya view ke byte milik caller
//! - Lock-Free data path: SPSC ring buffer, lock hanya untuk tidur
//! - No-Allocation: semua buffer pre-allocated saat init

mod chunk;
pub mod completion;
mod mmap_storage;
pub mod queue;
mod ring_buffer;

pub use chunk::{Chunk, OnRelease, QueuedChunk};
pub use completion::{completion, Completion, Resolver};
pub use mmap_storage::MmapStorage;
pub use queue::{bounded, Consumer, Disconnected, Producer};
