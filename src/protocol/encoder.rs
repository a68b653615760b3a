//! Incremental Encoder/Decoder di atas zero-copy stream
//!
//! Encode langsung ke span milik `ZeroCopyOutput` dan decode langsung dari
//! span milik `ZeroCopyInput`. Tidak ada buffer perantara untuk payload.

use super::message::{Checksum, FrameHeader, Message, HEADER_SIZE, TRAILER_SIZE};
use crate::error::WireError;
use crate::stream::{SliceInput, VecOutput, ZeroCopyInput, ZeroCopyOutput};

const MAX_VARINT_LEN: usize = 10;

/// Batas alokasi di depan untuk panjang yang dibaca dari payload
pub const MAX_PREALLOC: u64 = 64 * 1024;

/// Tulis semua `bytes` ke output, span demi span.
fn write_raw(output: &mut dyn ZeroCopyOutput, mut bytes: &[u8]) -> Result<(), WireError> {
    while !bytes.is_empty() {
        let span = output.next().ok_or(WireError::Closed)?;
        let n = span.len().min(bytes.len());
        span[..n].copy_from_slice(&bytes[..n]);
        let unused = span.len() - n;
        bytes = &bytes[n..];
        if unused > 0 {
            output.back_up(unused);
        }
    }
    Ok(())
}

/// Isi `buf` penuh dari input, span demi span.
fn read_raw(input: &mut dyn ZeroCopyInput, buf: &mut [u8]) -> Result<(), WireError> {
    let mut filled = 0;
    while filled < buf.len() {
        let needed = buf.len() - filled;
        let Some(span) = input.next() else {
            return Err(WireError::Truncated {
                consumed: input.byte_count(),
                needed: needed as u64,
            });
        };
        let n = span.len().min(needed);
        buf[filled..filled + n].copy_from_slice(&span[..n]);
        let unused = span.len() - n;
        filled += n;
        if unused > 0 {
            input.back_up(unused);
        }
    }
    Ok(())
}

/// Panjang encoding varint untuk `value`
#[inline(always)]
pub const fn varint_len(value: u64) -> u64 {
    let bits = 64 - (value | 1).leading_zeros() as u64;
    (bits + 6) / 7
}

/// Encoder payload. Checksum dihitung sambil menulis.
pub struct Encoder<'a> {
    output: &'a mut dyn ZeroCopyOutput,
    checksum: Checksum,
    written: u64,
}

impl<'a> Encoder<'a> {
    pub fn new(output: &'a mut dyn ZeroCopyOutput) -> Self {
        Self {
            output,
            checksum: Checksum::new(),
            written: 0,
        }
    }

    #[inline]
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), WireError> {
        write_raw(self.output, bytes)?;
        self.checksum.update(bytes);
        self.written += bytes.len() as u64;
        Ok(())
    }

    #[inline(always)]
    pub fn write_u8(&mut self, value: u8) -> Result<(), WireError> {
        self.write_bytes(&[value])
    }

    #[inline(always)]
    pub fn write_u32(&mut self, value: u32) -> Result<(), WireError> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline(always)]
    pub fn write_u64(&mut self, value: u64) -> Result<(), WireError> {
        self.write_bytes(&value.to_le_bytes())
    }

    #[inline(always)]
    pub fn write_f64(&mut self, value: f64) -> Result<(), WireError> {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_varint(&mut self, mut value: u64) -> Result<(), WireError> {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let mut len = 0;
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;
            if value == 0 {
                buf[len] = byte;
                len += 1;
                break;
            }
            buf[len] = byte | 0x80;
            len += 1;
        }
        self.write_bytes(&buf[..len])
    }

    /// String dengan prefix panjang varint
    pub fn write_str(&mut self, value: &str) -> Result<(), WireError> {
        self.write_varint(value.len() as u64)?;
        self.write_bytes(value.as_bytes())
    }

    /// Payload bytes yang sudah ditulis
    #[inline]
    pub fn written(&self) -> u64 {
        self.written
    }
}

/// Decoder payload. Semua read dibatasi oleh sisa payload.
pub struct Decoder<'a> {
    input: &'a mut dyn ZeroCopyInput,
    checksum: Checksum,
    remaining: u64,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a mut dyn ZeroCopyInput, payload_len: u64) -> Self {
        Self {
            input,
            checksum: Checksum::new(),
            remaining: payload_len,
        }
    }

    #[inline(always)]
    fn reserve(&mut self, len: u64) -> Result<(), WireError> {
        if len > self.remaining {
            return Err(WireError::PayloadOverrun {
                requested: len,
                remaining: self.remaining,
            });
        }
        self.remaining -= len;
        Ok(())
    }

    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), WireError> {
        self.reserve(buf.len() as u64)?;
        read_raw(self.input, buf)?;
        self.checksum.update(buf);
        Ok(())
    }

    #[inline(always)]
    pub fn read_u8(&mut self) -> Result<u8, WireError> {
        let mut buf = [0u8; 1];
        self.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    #[inline(always)]
    pub fn read_u32(&mut self) -> Result<u32, WireError> {
        let mut buf = [0u8; 4];
        self.read_exact(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    #[inline(always)]
    pub fn read_u64(&mut self) -> Result<u64, WireError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    #[inline(always)]
    pub fn read_f64(&mut self) -> Result<f64, WireError> {
        let mut buf = [0u8; 8];
        self.read_exact(&mut buf)?;
        Ok(f64::from_le_bytes(buf))
    }

    pub fn read_varint(&mut self) -> Result<u64, WireError> {
        let mut value = 0u64;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.read_u8()?;
            value |= ((byte & 0x7F) as u64) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarintOverflow)
    }

    /// `len` bytes ke `Vec` baru.
    ///
    /// `len` berasal dari payload yang belum tentu benar, jadi `Vec` tumbuh
    /// mengikuti byte yang benar-benar datang, bukan dialokasi di depan.
    pub fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>, WireError> {
        self.reserve(len)?;
        let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC) as usize);
        let mut left = len;
        while left > 0 {
            let Some(span) = self.input.next() else {
                return Err(WireError::Truncated {
                    consumed: self.input.byte_count(),
                    needed: left,
                });
            };
            let n = (span.len() as u64).min(left) as usize;
            buf.extend_from_slice(&span[..n]);
            let unused = span.len() - n;
            left -= n as u64;
            if unused > 0 {
                self.input.back_up(unused);
            }
        }
        self.checksum.update(&buf);
        Ok(buf)
    }

    /// String dengan prefix panjang varint
    pub fn read_string(&mut self) -> Result<String, WireError> {
        let len = self.read_varint()?;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes).map_err(|e| WireError::Malformed(e.to_string()))
    }

    /// Lewati `len` bytes payload. Byte tetap dibaca supaya masuk checksum.
    pub fn skip(&mut self, len: u64) -> Result<(), WireError> {
        self.reserve(len)?;
        let mut left = len;
        while left > 0 {
            let Some(span) = self.input.next() else {
                return Err(WireError::Truncated {
                    consumed: self.input.byte_count(),
                    needed: left,
                });
            };
            let n = (span.len() as u64).min(left) as usize;
            self.checksum.update(&span[..n]);
            let unused = span.len() - n;
            left -= n as u64;
            if unused > 0 {
                self.input.back_up(unused);
            }
        }
        Ok(())
    }

    /// Sisa payload yang belum dibaca
    #[inline]
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    #[inline]
    pub fn is_at_end(&self) -> bool {
        self.remaining == 0
    }
}

/// Serialize `message` sebagai satu frame. Returns total bytes frame.
pub fn write_message<M>(message: &M, output: &mut dyn ZeroCopyOutput) -> Result<u64, WireError>
where
    M: Message + ?Sized,
{
    let header = FrameHeader::new(message.encoded_len());
    write_raw(output, &header.to_bytes())?;

    let mut encoder = Encoder::new(output);
    message.encode(&mut encoder)?;
    if encoder.written != header.payload_len {
        return Err(WireError::LengthMismatch {
            declared: header.payload_len,
            written: encoder.written,
        });
    }
    let checksum = encoder.checksum.value();

    write_raw(output, &checksum.to_le_bytes())?;
    Ok(header.total_size())
}

/// Parse satu frame ke `message`, lalu pastikan stream habis.
///
/// Untuk input chunked, ini ikut menunggu sentinel.
pub fn read_message<M>(message: &mut M, input: &mut dyn ZeroCopyInput) -> Result<(), WireError>
where
    M: Message + ?Sized,
{
    let mut header_bytes = [0u8; HEADER_SIZE];
    read_raw(input, &mut header_bytes)?;
    let header = FrameHeader::from_bytes(&header_bytes);
    header.validate()?;

    let mut decoder = Decoder::new(input, header.payload_len);
    message.decode(&mut decoder)?;
    if decoder.remaining > 0 {
        return Err(WireError::TrailingPayload(decoder.remaining));
    }
    let computed = decoder.checksum.value();

    let mut trailer = [0u8; TRAILER_SIZE];
    read_raw(input, &mut trailer)?;
    let expected = u32::from_le_bytes(trailer);
    if expected != computed {
        return Err(WireError::ChecksumMismatch { expected, computed });
    }

    if input.next().is_some() {
        return Err(WireError::TrailingBytes);
    }
    Ok(())
}

/// Serialize ke `Vec<u8>`
pub fn to_vec<M>(message: &M) -> Result<Vec<u8>, WireError>
where
    M: Message + ?Sized,
{
    let capacity = FrameHeader::new(message.encoded_len()).total_size() as usize;
    let mut output = VecOutput::with_capacity(capacity);
    write_message(message, &mut output)?;
    Ok(output.into_vec())
}

/// Parse dari buffer utuh
pub fn from_slice<M>(bytes: &[u8]) -> Result<M, WireError>
where
    M: Message + Default,
{
    let mut message = M::default();
    read_message(&mut message, &mut SliceInput::new(bytes))?;
    Ok(message)
}
