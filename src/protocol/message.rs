//! Frame Format untuk message yang di-stream
//!
//! Layout:
//! ┌─────────────────────────────────────────────────────┐
//! │ FrameHeader (14 bytes, little-endian)               │
//! │   magic u32 | version u8 | flags u8 | payload_len u64│
//! ├─────────────────────────────────────────────────────┤
//! │ Payload (payload_len bytes, di-encode oleh Message) │
//! ├─────────────────────────────────────────────────────┤
//! │ Trailer: checksum u32 (Adler-32 atas payload)       │
//! └─────────────────────────────────────────────────────┘
//!
//! Setelah trailer stream harus habis (sentinel). Byte korup di posisi
//! manapun membuat parse gagal secara deterministik.

use super::encoder::{Decoder, Encoder};
use crate::error::WireError;

pub const MAGIC: u32 = 0x534B4843; // "CHKS"
pub const VERSION: u8 = 1;
pub const HEADER_SIZE: usize = 14;
pub const TRAILER_SIZE: usize = 4;

/// Message yang bisa di-serialize/parse secara incremental.
///
/// Schema dan layout field sepenuhnya urusan implementor; pipeline hanya
/// melihat byte lewat `Encoder`/`Decoder`.
pub trait Message {
    /// Panjang payload hasil `encode`, dalam bytes.
    fn encoded_len(&self) -> u64;

    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<(), WireError>;

    /// Parse payload ke `self`, yang diharapkan masih kosong.
    fn decode(&mut self, decoder: &mut Decoder<'_>) -> Result<(), WireError>;
}

/// Header frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub magic: u32,
    pub version: u8,
    pub flags: u8,
    pub payload_len: u64,
}

impl FrameHeader {
    #[inline(always)]
    pub fn new(payload_len: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            flags: 0,
            payload_len,
        }
    }

    #[inline(always)]
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.magic.to_le_bytes());
        buf[4] = self.version;
        buf[5] = self.flags;
        buf[6..14].copy_from_slice(&self.payload_len.to_le_bytes());
        buf
    }

    #[inline(always)]
    pub fn from_bytes(buf: &[u8; HEADER_SIZE]) -> Self {
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&buf[0..4]);
        let mut payload_len = [0u8; 8];
        payload_len.copy_from_slice(&buf[6..14]);
        Self {
            magic: u32::from_le_bytes(magic),
            version: buf[4],
            flags: buf[5],
            payload_len: u64::from_le_bytes(payload_len),
        }
    }

    /// Validasi header
    pub fn validate(&self) -> Result<(), WireError> {
        if self.magic != MAGIC {
            return Err(WireError::BadMagic { found: self.magic });
        }
        if self.version != VERSION {
            return Err(WireError::UnsupportedVersion(self.version));
        }
        if self.flags != 0 {
            return Err(WireError::ReservedFlags(self.flags));
        }
        Ok(())
    }

    /// Total frame size (header + payload + trailer)
    #[inline(always)]
    pub fn total_size(&self) -> u64 {
        (HEADER_SIZE + TRAILER_SIZE) as u64 + self.payload_len
    }
}

const MOD_ADLER: u32 = 65521;
// Jumlah byte maksimum sebelum `b` bisa overflow u32
const NMAX: usize = 5552;

/// Adler-32 incremental, diupdate per span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum {
    a: u32,
    b: u32,
}

impl Checksum {
    #[inline(always)]
    pub const fn new() -> Self {
        Self { a: 1, b: 0 }
    }

    #[inline]
    pub fn update(&mut self, data: &[u8]) {
        for block in data.chunks(NMAX) {
            for &byte in block {
                self.a += byte as u32;
                self.b += self.a;
            }
            self.a %= MOD_ADLER;
            self.b %= MOD_ADLER;
        }
    }

    #[inline(always)]
    pub const fn value(&self) -> u32 {
        (self.b << 16) | self.a
    }
}

impl Default for Checksum {
    fn default() -> Self {
        Self::new()
    }
}

/// Checksum satu buffer utuh
#[inline]
pub fn checksum(data: &[u8]) -> u32 {
    let mut checksum = Checksum::new();
    checksum.update(data);
    checksum.value()
}
