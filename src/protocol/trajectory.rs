//! Trajectory: message contoh yang cukup besar untuk dipotong banyak chunk
//!
//! Payload:
//! `name: str | count: varint | count x Sample (7 x f64 LE)`

use super::encoder::{varint_len, Decoder, Encoder, MAX_PREALLOC};
use super::message::Message;
use crate::error::WireError;

pub const SAMPLE_SIZE: u64 = 7 * 8;

/// Satu titik timeline: waktu, posisi, kecepatan
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Sample {
    pub time: f64,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
}

impl Sample {
    fn is_finite(&self) -> bool {
        self.time.is_finite()
            && self.position.iter().all(|x| x.is_finite())
            && self.velocity.iter().all(|v| v.is_finite())
    }
}

/// Timeline diskret dengan waktu naik tegas
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Trajectory {
    pub name: String,
    pub timeline: Vec<Sample>,
}

impl Trajectory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            timeline: Vec::new(),
        }
    }

    /// Trajectory deterministik dengan `len` sample
    pub fn generate(name: impl Into<String>, len: usize) -> Self {
        let mut trajectory = Self::new(name);
        trajectory.timeline.reserve(len);
        for i in 0..len {
            let i = i as f64;
            trajectory.timeline.push(Sample {
                time: 3.0 * i,
                position: [i, 2.0 * i, -i],
                velocity: [1.0, 2.0, -1.0 + i * 0.5],
            });
        }
        trajectory
    }

    pub fn push(&mut self, sample: Sample) {
        self.timeline.push(sample);
    }

    pub fn len(&self) -> usize {
        self.timeline.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timeline.is_empty()
    }
}

impl Message for Trajectory {
    fn encoded_len(&self) -> u64 {
        let name_len = self.name.len() as u64;
        let count = self.timeline.len() as u64;
        varint_len(name_len) + name_len + varint_len(count) + count * SAMPLE_SIZE
    }

    fn encode(&self, encoder: &mut Encoder<'_>) -> Result<(), WireError> {
        encoder.write_str(&self.name)?;
        encoder.write_varint(self.timeline.len() as u64)?;
        for sample in &self.timeline {
            encoder.write_f64(sample.time)?;
            for x in sample.position {
                encoder.write_f64(x)?;
            }
            for v in sample.velocity {
                encoder.write_f64(v)?;
            }
        }
        Ok(())
    }

    fn decode(&mut self, decoder: &mut Decoder<'_>) -> Result<(), WireError> {
        self.name = decoder.read_string()?;

        let count = decoder.read_varint()?;
        if count.checked_mul(SAMPLE_SIZE) != Some(decoder.remaining()) {
            return Err(WireError::Malformed(format!(
                "timeline of {count} samples does not fit {} payload bytes",
                decoder.remaining()
            )));
        }

        self.timeline.clear();
        // `count` cocok dengan payload_len, tapi payload_len sendiri bisa rusak
        self.timeline.reserve(count.min(MAX_PREALLOC / SAMPLE_SIZE) as usize);
        let mut previous = f64::NEG_INFINITY;
        for index in 0..count {
            let mut sample = Sample {
                time: decoder.read_f64()?,
                ..Sample::default()
            };
            for x in &mut sample.position {
                *x = decoder.read_f64()?;
            }
            for v in &mut sample.velocity {
                *v = decoder.read_f64()?;
            }
            if !sample.is_finite() {
                return Err(WireError::Malformed(format!(
                    "sample {index} has non-finite components"
                )));
            }
            if sample.time <= previous {
                return Err(WireError::Malformed(format!(
                    "sample {index} at t={} does not follow t={previous}",
                    sample.time
                )));
            }
            previous = sample.time;
            self.timeline.push(sample);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{from_slice, to_vec, FrameHeader, HEADER_SIZE};

    #[test]
    fn test_roundtrip_in_memory() {
        let trajectory = Trajectory::generate("sample", 100);
        let bytes = to_vec(&trajectory).unwrap();
        let decoded: Trajectory = from_slice(&bytes).unwrap();
        assert_eq!(decoded, trajectory);
    }

    #[test]
    fn test_empty_trajectory() {
        let bytes = to_vec(&Trajectory::default()).unwrap();
        assert_eq!(from_slice::<Trajectory>(&bytes).unwrap(), Trajectory::default());
    }

    #[test]
    fn test_rejects_time_going_backwards() {
        let mut trajectory = Trajectory::new("bad");
        trajectory.push(Sample {
            time: 2.0,
            ..Sample::default()
        });
        trajectory.push(Sample {
            time: 1.0,
            ..Sample::default()
        });
        let bytes = to_vec(&trajectory).unwrap();
        assert!(matches!(
            from_slice::<Trajectory>(&bytes),
            Err(WireError::Malformed(_))
        ));
    }

    /// Frame dengan magic valid tapi `count` raksasa yang cocok dengan
    /// payload_len, tanpa satu sample pun di belakangnya.
    fn oversized_frame() -> Vec<u8> {
        let count: u64 = 1 << 44;
        let mut frame = FrameHeader::new(1 + varint_len(count) + count * SAMPLE_SIZE)
            .to_bytes()
            .to_vec();
        frame.push(0); // name ""
        frame.extend_from_slice(&[0x80, 0x80, 0x80, 0x80, 0x80, 0x80, 0x04]);
        frame
    }

    #[test]
    fn test_oversized_count_fails_without_allocating() {
        let err = from_slice::<Trajectory>(&oversized_frame()).unwrap_err();
        assert!(matches!(err, WireError::Truncated { .. }), "{err}");
    }

    #[test]
    fn test_stomped_byte_is_detected() {
        let bytes = to_vec(&Trajectory::generate("sample", 10)).unwrap();
        for position in [0, HEADER_SIZE, HEADER_SIZE + 40, bytes.len() - 1] {
            let mut stomped = bytes.clone();
            stomped[position] ^= 0xCD;
            assert!(
                from_slice::<Trajectory>(&stomped).is_err(),
                "stomp at {position} went unnoticed"
            );
        }
    }
}
