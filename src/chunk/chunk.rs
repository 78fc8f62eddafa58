use crate::chunk::basic_header::{basic_header_size, basic_header_size_from_byte, decode_basic_header, write_basic_header};
use crate::chunk::header::{decode_message_header, MessageHeader};
use crate::chunk::reader::append;
use crate::chunk::stream::ContextTable;
use crate::chunk::types::ChunkType;
use crate::protocol::constants::*;
use crate::{ByteBuffer, Error, Message, Result};

/// One wire chunk: basic header, message header and the message it belongs
/// to. The encoded header is cached at construction.
#[derive(Debug, Clone)]
pub struct Chunk {
    chunk_type: ChunkType,
    chunk_stream_id: u32,
    extended_timestamp: bool,
    message: Message,
    header: Vec<u8>,
    fragmented: bool,
}

impl Chunk {
    /// Build an outgoing chunk for `message`, deltas measured from
    /// `prior_timestamp`
    pub fn new(
        chunk_type: ChunkType,
        chunk_stream_id: u32,
        message: Message,
        prior_timestamp: u32,
    ) -> Result<Self> {
        let message_header = MessageHeader::for_message(chunk_type, &message, prior_timestamp)?;
        Chunk::from_header(message_header, chunk_stream_id, message)
    }

    pub(crate) fn from_header(
        message_header: MessageHeader,
        chunk_stream_id: u32,
        message: Message,
    ) -> Result<Self> {
        let chunk_type = message_header.chunk_type();
        check_chunk_start(chunk_type, chunk_stream_id)?;
        let mut buffer = ByteBuffer::with_capacity(
            basic_header_size(chunk_stream_id) + message_header.encoded_size(),
        );
        write_basic_header(&mut buffer, chunk_type, chunk_stream_id)?;
        message_header.write(&mut buffer)?;

        Ok(Chunk {
            chunk_type,
            chunk_stream_id,
            extended_timestamp: message_header.has_extended_timestamp(),
            message,
            header: buffer.into_vec(),
            fragmented: false,
        })
    }

    /// Parse a chunk from the front of `bytes`.
    ///
    /// The message header is resolved against `contexts`, which is updated
    /// for the chunk stream on success. Payload bytes are taken up to the end
    /// of this wire chunk, the end of the message, or the end of `bytes`,
    /// whichever comes first. Returns the chunk and the bytes consumed.
    pub fn parse(
        bytes: &[u8],
        contexts: &mut ContextTable,
        max_chunk_size: usize,
    ) -> Result<(Chunk, usize)> {
        reject_zero_leading_byte(bytes)?;
        let (chunk_type, chunk_stream_id, basic_size) = decode_basic_header(bytes)?;
        let prior = contexts.get(chunk_stream_id);
        let (mut message, context, message_header_size) =
            decode_message_header(chunk_type, chunk_stream_id, &bytes[basic_size..], prior)?;

        let header_size = basic_size + message_header_size;
        let (consumed, fragmented) = append(&mut message, &bytes[header_size..], max_chunk_size)?;
        contexts.insert(chunk_stream_id, context);

        let chunk = Chunk {
            chunk_type,
            chunk_stream_id,
            extended_timestamp: message_header_size > chunk_type.header_size(),
            message,
            header: bytes[..header_size].to_vec(),
            fragmented,
        };

        Ok((chunk, header_size + consumed))
    }

    pub fn chunk_type(&self) -> ChunkType {
        self.chunk_type
    }

    pub fn chunk_stream_id(&self) -> u32 {
        self.chunk_stream_id
    }

    pub fn has_extended_timestamp(&self) -> bool {
        self.extended_timestamp
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    /// Cached basic header plus message header
    pub fn header_bytes(&self) -> &[u8] {
        &self.header
    }

    /// Basic header, type-dependent message header and extended timestamp
    pub fn required_header_size(&self) -> usize {
        let extended = if self.extended_timestamp {
            EXTENDED_TIMESTAMP_SIZE
        } else {
            0
        };
        basic_header_size(self.chunk_stream_id) + self.chunk_type.header_size() + extended
    }

    /// Whether the message has received its full payload
    pub fn is_ready(&self) -> bool {
        self.message.is_complete()
    }

    /// Whether the last payload append stopped at a chunk size boundary,
    /// meaning a type 3 header comes before more payload
    pub fn is_fragmented(&self) -> bool {
        self.fragmented
    }

    /// Append payload bytes received after this chunk's header, see
    /// [`append`]
    pub fn append(&mut self, bytes: &[u8], max_chunk_size: usize) -> Result<usize> {
        let (consumed, fragmented) = append(&mut self.message, bytes, max_chunk_size)?;
        self.fragmented = fragmented;
        Ok(consumed)
    }

    /// Header followed by the whole payload, without chunk size splitting
    pub fn serialize(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(self.header.len() + self.message.payload().len());
        bytes.extend_from_slice(&self.header);
        bytes.extend_from_slice(self.message.payload());
        bytes
    }
}

/// A chunk never starts with a zero byte
pub(crate) fn reject_zero_leading_byte(bytes: &[u8]) -> Result<()> {
    if bytes.first() == Some(&0) {
        return Err(Error::malformed("chunk starts with a zero byte"));
    }
    Ok(())
}

/// Refuse the one header pair whose first byte is zero: a type 0 header on
/// chunk stream 64
pub(crate) fn check_chunk_start(chunk_type: ChunkType, chunk_stream_id: u32) -> Result<()> {
    if chunk_type == ChunkType::Full && chunk_stream_id == MAX_ONE_BYTE_CHUNK_STREAM_ID + 1 {
        return Err(Error::ReservedStreamId(chunk_stream_id));
    }
    Ok(())
}

/// Length of the complete chunk header at the front of `data`, or `None`
/// when more bytes are needed to tell
pub fn peek_header_length(data: &[u8]) -> Option<usize> {
    let &first_byte = data.first()?;
    let basic_size = basic_header_size_from_byte(first_byte);
    let chunk_type = ChunkType::from_basic_header_byte(first_byte);
    let mut length = basic_size + chunk_type.header_size();

    if chunk_type.has_timestamp_field() {
        let field = data.get(basic_size..basic_size + 3)?;
        if field == [0xFF, 0xFF, 0xFF] {
            length += EXTENDED_TIMESTAMP_SIZE;
        }
    }

    (data.len() >= length).then_some(length)
}

/// Serialize a single chunk carrying the whole of `message`
pub fn serialize_chunk(
    message: &Message,
    chunk_type: ChunkType,
    chunk_stream_id: u32,
    prior_timestamp: u32,
) -> Result<Vec<u8>> {
    let chunk = Chunk::new(chunk_type, chunk_stream_id, message.clone(), prior_timestamp)?;
    Ok(chunk.serialize())
}

/// Parse a chunk, see [`Chunk::parse`]
pub fn decode_next_chunk(
    buffer: &[u8],
    contexts: &mut ContextTable,
    max_chunk_size: usize,
) -> Result<(Chunk, usize)> {
    if buffer.is_empty() {
        return Err(Error::malformed("empty chunk"));
    }
    Chunk::parse(buffer, contexts, max_chunk_size)
}
