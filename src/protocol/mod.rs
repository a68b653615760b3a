//! Protocol Layer: framing dan batas message
//!
//! Prinsip desain:
//! - Incremental: encode/decode langsung dari/ke span stream
//! - Fixed-size header + checksum trailer: korupsi selalu terdeteksi
//! - Schema message milik implementor `Message`

mod encoder;
mod message;
mod trajectory;

pub use encoder::{
    from_slice, read_message, to_vec, varint_len, write_message, Decoder, Encoder, MAX_PREALLOC,
};
pub use message::{
    checksum, Checksum, FrameHeader, Message, HEADER_SIZE, MAGIC, TRAILER_SIZE, VERSION,
};
pub use trajectory::{Sample, Trajectory, SAMPLE_SIZE};
