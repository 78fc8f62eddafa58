use crate::chunk::stream::ChunkStreamContext;
use crate::chunk::types::ChunkType;
use crate::protocol::constants::*;
use crate::{ByteBuffer, Error, Message, Result};

/// Message header as carried on the wire. Each variant holds only the fields
/// its chunk type transmits; delta variants carry the timestamp difference to
/// the previous message on the same chunk stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageHeader {
    Full {
        timestamp: u32,
        length: u32,
        type_id: u8,
        message_stream_id: u32,
    },
    DeltaMeta {
        delta: u32,
        length: u32,
        type_id: u8,
    },
    Delta {
        delta: u32,
    },
    Continuation,
}

/// Whether a timestamp or delta must be escaped into the extended field
pub fn needs_extended_timestamp(value: u32) -> bool {
    value >= EXTENDED_TIMESTAMP
}

fn read_extended(buffer: &mut ByteBuffer, field: u32) -> Result<u32> {
    if field == EXTENDED_TIMESTAMP {
        buffer.read_u32_be()
    } else {
        Ok(field)
    }
}

impl MessageHeader {
    /// Build the header of `chunk_type` describing `message`, with deltas
    /// measured from `prior_timestamp`
    pub fn for_message(chunk_type: ChunkType, message: &Message, prior_timestamp: u32) -> Result<Self> {
        if message.length() > MAX_MESSAGE_LENGTH {
            return Err(Error::MessageTooLong(message.length()));
        }

        let length = message.length() as u32;
        let delta = message.timestamp.wrapping_sub(prior_timestamp);

        Ok(match chunk_type {
            ChunkType::Full => MessageHeader::Full {
                timestamp: message.timestamp,
                length,
                type_id: message.type_id,
                message_stream_id: message.message_stream_id,
            },
            ChunkType::DeltaMeta => MessageHeader::DeltaMeta {
                delta,
                length,
                type_id: message.type_id,
            },
            ChunkType::Delta => MessageHeader::Delta { delta },
            ChunkType::Continuation => MessageHeader::Continuation,
        })
    }

    pub fn chunk_type(&self) -> ChunkType {
        match self {
            MessageHeader::Full { .. } => ChunkType::Full,
            MessageHeader::DeltaMeta { .. } => ChunkType::DeltaMeta,
            MessageHeader::Delta { .. } => ChunkType::Delta,
            MessageHeader::Continuation => ChunkType::Continuation,
        }
    }

    /// Value of the leading 3-byte field before escaping
    fn timestamp_field(&self) -> Option<u32> {
        match *self {
            MessageHeader::Full { timestamp, .. } => Some(timestamp),
            MessageHeader::DeltaMeta { delta, .. } | MessageHeader::Delta { delta } => Some(delta),
            MessageHeader::Continuation => None,
        }
    }

    pub fn has_extended_timestamp(&self) -> bool {
        self.timestamp_field().is_some_and(needs_extended_timestamp)
    }

    /// Bytes this header occupies after the basic header
    pub fn encoded_size(&self) -> usize {
        let extended = if self.has_extended_timestamp() {
            EXTENDED_TIMESTAMP_SIZE
        } else {
            0
        };
        self.chunk_type().header_size() + extended
    }

    pub fn write(&self, buffer: &mut ByteBuffer) -> Result<()> {
        let Some(value) = self.timestamp_field() else {
            return Ok(());
        };

        let extended = needs_extended_timestamp(value);
        buffer.write_u24_be(if extended { EXTENDED_TIMESTAMP } else { value })?;

        match *self {
            MessageHeader::Full { length, type_id, message_stream_id, .. } => {
                buffer.write_u24_be(length)?;
                buffer.write_u8(type_id);
                buffer.write_u32_le(message_stream_id)?;
            }
            MessageHeader::DeltaMeta { length, type_id, .. } => {
                buffer.write_u24_be(length)?;
                buffer.write_u8(type_id);
            }
            _ => {}
        }

        if extended {
            buffer.write_u32_be(value)?;
        }

        Ok(())
    }

    /// Parse the message header of `chunk_type` from the start of `bytes`,
    /// returning it with the number of bytes consumed
    pub fn read(chunk_type: ChunkType, bytes: &[u8]) -> Result<(Self, usize)> {
        let fixed = chunk_type.header_size();
        if bytes.len() < fixed {
            return Err(Error::malformed(format!(
                "{} message header needs {} bytes, have {}",
                chunk_type,
                fixed,
                bytes.len()
            )));
        }

        let end = bytes.len().min(fixed + EXTENDED_TIMESTAMP_SIZE);
        let mut buffer = ByteBuffer::from_slice(&bytes[..end]);

        let header = match chunk_type {
            ChunkType::Full => {
                let field = buffer.read_u24_be()?;
                let length = buffer.read_u24_be()?;
                let type_id = buffer.read_u8()?;
                let message_stream_id = buffer.read_u32_le()?;
                MessageHeader::Full {
                    timestamp: read_extended(&mut buffer, field)?,
                    length,
                    type_id,
                    message_stream_id,
                }
            }
            ChunkType::DeltaMeta => {
                let field = buffer.read_u24_be()?;
                let length = buffer.read_u24_be()?;
                let type_id = buffer.read_u8()?;
                MessageHeader::DeltaMeta {
                    delta: read_extended(&mut buffer, field)?,
                    length,
                    type_id,
                }
            }
            ChunkType::Delta => {
                let field = buffer.read_u24_be()?;
                MessageHeader::Delta {
                    delta: read_extended(&mut buffer, field)?,
                }
            }
            ChunkType::Continuation => MessageHeader::Continuation,
        };

        Ok((header, buffer.position()))
    }
}

/// Encode the message header of `chunk_type` for `message`
pub fn encode_message_header(
    chunk_type: ChunkType,
    message: &Message,
    prior_absolute_timestamp: u32,
) -> Result<Vec<u8>> {
    let header = MessageHeader::for_message(chunk_type, message, prior_absolute_timestamp)?;
    let mut buffer = ByteBuffer::with_capacity(header.encoded_size());
    header.write(&mut buffer)?;
    Ok(buffer.into_vec())
}

/// Decode a message header and resolve it against the chunk stream's
/// previous context. Returns the message skeleton, the context to record for
/// the chunk stream, and the number of header bytes consumed.
pub fn decode_message_header(
    chunk_type: ChunkType,
    chunk_stream_id: u32,
    bytes: &[u8],
    context: Option<&ChunkStreamContext>,
) -> Result<(Message, ChunkStreamContext, usize)> {
    if chunk_type != ChunkType::Full && context.is_none() {
        return Err(Error::MissingContinuationContext(chunk_stream_id));
    }

    let (header, consumed) = MessageHeader::read(chunk_type, bytes)?;
    let next = ChunkStreamContext::advance(context, &header, chunk_stream_id)?;

    Ok((next.message_skeleton(), next, consumed))
}
