use crate::protocol::constants::*;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Chunk size for incoming chunks
    pub chunk_size_in: usize,

    /// Chunk size for outgoing chunks
    pub chunk_size_out: usize,

    /// Bytes requested per read from the transport
    pub read_buffer_size: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        ChunkConfig {
            chunk_size_in: DEFAULT_CHUNK_SIZE,
            chunk_size_out: DEFAULT_CHUNK_SIZE,
            read_buffer_size: 4096,
        }
    }
}

impl ChunkConfig {
    /// Create config builder
    pub fn builder() -> ChunkConfigBuilder {
        ChunkConfigBuilder::new()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        for (name, size) in [("chunk_size_in", self.chunk_size_in), ("chunk_size_out", self.chunk_size_out)] {
            if size == 0 {
                return Err(Error::config(format!("{} must be at least 1", name)));
            }
            if size > MAX_CHUNK_SIZE {
                return Err(Error::config(format!("{} must not exceed {}", name, MAX_CHUNK_SIZE)));
            }
        }

        if self.read_buffer_size == 0 {
            return Err(Error::config("read_buffer_size must be at least 1"));
        }

        Ok(())
    }
}

/// Check a chunk size announced for either direction
pub(crate) fn check_chunk_size(size: usize) -> Result<()> {
    if size == 0 || size > MAX_CHUNK_SIZE {
        return Err(Error::InvalidChunkSize(size));
    }
    Ok(())
}

/// Builder for ChunkConfig
pub struct ChunkConfigBuilder {
    config: ChunkConfig,
}

impl ChunkConfigBuilder {
    /// Create new builder
    pub fn new() -> Self {
        ChunkConfigBuilder {
            config: ChunkConfig::default(),
        }
    }

    /// Set incoming chunk size
    pub fn chunk_size_in(mut self, size: usize) -> Self {
        self.config.chunk_size_in = size;
        self
    }

    /// Set outgoing chunk size
    pub fn chunk_size_out(mut self, size: usize) -> Self {
        self.config.chunk_size_out = size;
        self
    }

    /// Set both chunk sizes
    pub fn chunk_size(self, size: usize) -> Self {
        self.chunk_size_in(size).chunk_size_out(size)
    }

    /// Set read buffer size
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.config.read_buffer_size = size;
        self
    }

    /// Build configuration
    pub fn build(self) -> Result<ChunkConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

impl Default for ChunkConfigBuilder {
    fn default() -> Self {
        ChunkConfigBuilder::new()
    }
}
