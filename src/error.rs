//! Error types
//!
//! Error di sini bersifat lokal. Kegagalan parse di worker pipeline tetap
//! fatal: `WireError` hanya membawa alasan sampai ke panic.

use thiserror::Error;

/// Kegagalan encode/decode frame
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WireError {
    #[error("bad magic {found:#010x}")]
    BadMagic { found: u32 },

    #[error("unsupported version {0}")]
    UnsupportedVersion(u8),

    #[error("reserved flags set: {0:#04x}")]
    ReservedFlags(u8),

    #[error("stream ended after {consumed} bytes, {needed} more needed")]
    Truncated { consumed: u64, needed: u64 },

    #[error("read of {requested} bytes crosses the end of the payload ({remaining} left)")]
    PayloadOverrun { requested: u64, remaining: u64 },

    #[error("{0} payload bytes left unread")]
    TrailingPayload(u64),

    #[error("unexpected bytes after the frame trailer")]
    TrailingBytes,

    #[error("checksum mismatch: expected {expected:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { expected: u32, computed: u32 },

    #[error("encoded {written} payload bytes but declared {declared}")]
    LengthMismatch { declared: u64, written: u64 },

    #[error("varint longer than 10 bytes")]
    VarintOverflow,

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("output closed")]
    Closed,
}

/// Konfigurasi pipeline tidak valid
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("chunk_size must be positive")]
    ZeroChunkSize,

    #[error("number_of_chunks must be positive")]
    ZeroNumberOfChunks,

    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
}
