//! Pipeline configuration

use crate::error::ConfigError;

pub const ENV_CHUNK_SIZE: &str = "CHUNKSTREAM_CHUNK_SIZE";
pub const ENV_NUMBER_OF_CHUNKS: &str = "CHUNKSTREAM_NUMBER_OF_CHUNKS";

/// Ukuran chunk dan kapasitas queue, tetap selama umur instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    /// Maksimum bytes per chunk (pull side) dan granularitas potong (push side)
    pub chunk_size: usize,
    /// Kapasitas Bounded Chunk Queue
    pub number_of_chunks: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 64 * 1024,
            number_of_chunks: 8,
        }
    }
}

impl PipelineConfig {
    pub fn new(chunk_size: usize, number_of_chunks: usize) -> Result<Self, ConfigError> {
        let config = Self {
            chunk_size,
            number_of_chunks,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if self.number_of_chunks == 0 {
            return Err(ConfigError::ZeroNumberOfChunks);
        }
        Ok(())
    }

    /// Default yang di-override oleh environment variable jika ada
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(value) = lookup(ENV_CHUNK_SIZE) {
            config.chunk_size = parse_positive(ENV_CHUNK_SIZE, &value)?;
        }
        if let Some(value) = lookup(ENV_NUMBER_OF_CHUNKS) {
            config.number_of_chunks = parse_positive(ENV_NUMBER_OF_CHUNKS, &value)?;
        }
        config.validate()?;
        Ok(config)
    }
}

fn parse_positive(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        })
}
