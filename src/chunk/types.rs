use std::fmt;
use crate::{Error, Result};

/// Chunk header format, carried in the top two bits of the basic header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkType {
    /// Type 0: absolute timestamp, length, type id, message stream id
    Full = 0,

    /// Type 1: timestamp delta, length, type id
    DeltaMeta = 1,

    /// Type 2: timestamp delta only
    Delta = 2,

    /// Type 3: no message header
    Continuation = 3,
}

impl ChunkType {
    /// Raw 2-bit value
    pub const fn bits(self) -> u8 {
        self as u8
    }

    /// Message header bytes following the basic header, without the
    /// extended timestamp
    pub const fn header_size(self) -> usize {
        match self {
            ChunkType::Full => 11,
            ChunkType::DeltaMeta => 7,
            ChunkType::Delta => 3,
            ChunkType::Continuation => 0,
        }
    }

    /// Whether the message header starts with a 3-byte timestamp field
    pub const fn has_timestamp_field(self) -> bool {
        !matches!(self, ChunkType::Continuation)
    }

    /// Extract the type from the first byte of a basic header
    pub const fn from_basic_header_byte(byte: u8) -> Self {
        match byte >> 6 {
            0 => ChunkType::Full,
            1 => ChunkType::DeltaMeta,
            2 => ChunkType::Delta,
            _ => ChunkType::Continuation,
        }
    }
}

impl TryFrom<u8> for ChunkType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(ChunkType::Full),
            1 => Ok(ChunkType::DeltaMeta),
            2 => Ok(ChunkType::Delta),
            3 => Ok(ChunkType::Continuation),
            n => Err(Error::UnknownChunkType(n)),
        }
    }
}

impl fmt::Display for ChunkType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "type {}", self.bits())
    }
}
