use std::io::Error as IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Malformed header: {0}")]
    MalformedHeader(String),

    #[error("Unknown chunk type: {0}")]
    UnknownChunkType(u8),

    #[error("Missing continuation context for chunk stream {0}")]
    MissingContinuationContext(u32),

    #[error("Length overrun: message length is {length}, payload would reach {attempted}")]
    LengthOverrun { length: usize, attempted: usize },

    #[error("Incomplete message: length is {length}, only {available} payload bytes present")]
    IncompleteMessage { length: usize, available: usize },

    #[error("Chunk stream ID too large: {0}")]
    StreamIdTooLarge(u32),

    #[error("Reserved chunk stream ID: {0}")]
    ReservedStreamId(u32),

    #[error("Message too long: {0} bytes")]
    MessageTooLong(usize),

    #[error("Header mismatch: {0}")]
    HeaderMismatch(String),

    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl Error {
    /// Create an IO error from message
    pub fn io(msg: impl Into<String>) -> Self {
        Error::Io(IoError::new(std::io::ErrorKind::UnexpectedEof, msg.into()))
    }

    /// Create a malformed header error
    pub fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedHeader(msg.into())
    }

    /// Create a header mismatch error
    pub fn header_mismatch(msg: impl Into<String>) -> Self {
        Error::HeaderMismatch(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Configuration(msg.into())
    }

    /// Whether the error comes from bytes received off the wire, as opposed
    /// to a bad request from the local caller
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Error::MalformedHeader(_)
                | Error::UnknownChunkType(_)
                | Error::MissingContinuationContext(_)
        )
    }
}

/// Result type alias for the library
pub type Result<T> = std::result::Result<T, Error>;
