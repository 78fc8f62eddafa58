use log::{debug, trace};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use crate::chunk::basic_header::{basic_header_size, encode_basic_header, write_basic_header};
use crate::chunk::chunk::{check_chunk_start, Chunk};
use crate::chunk::header::MessageHeader;
use crate::chunk::stream::{ChunkStreamContext, ContextTable};
use crate::chunk::types::ChunkType;
use crate::config::{check_chunk_size, ChunkConfig};
use crate::{ByteBuffer, Error, Message, Result, DEFAULT_CHUNK_SIZE};

/// Cut a header and payload into wire pieces of at most `max_chunk_size`
/// payload bytes. Every piece after the first starts with a type 3 basic
/// header.
fn fragment(
    header: &[u8],
    chunk_stream_id: u32,
    payload: &[u8],
    max_chunk_size: usize,
) -> Result<Vec<Vec<u8>>> {
    if max_chunk_size == 0 {
        return Err(Error::InvalidChunkSize(0));
    }

    let (first, rest) = payload.split_at(payload.len().min(max_chunk_size));
    let mut pieces = Vec::with_capacity(1 + rest.len().div_ceil(max_chunk_size));

    let mut piece = Vec::with_capacity(header.len() + first.len());
    piece.extend_from_slice(header);
    piece.extend_from_slice(first);
    pieces.push(piece);

    if rest.is_empty() {
        return Ok(pieces);
    }

    let continuation = encode_basic_header(ChunkType::Continuation, chunk_stream_id)?;
    for slice in rest.chunks(max_chunk_size) {
        let mut piece = Vec::with_capacity(continuation.len() + slice.len());
        piece.extend_from_slice(&continuation);
        piece.extend_from_slice(slice);
        pieces.push(piece);
    }

    Ok(pieces)
}

/// Split an outgoing chunk into wire pieces
pub fn split(chunk: &Chunk, max_chunk_size: usize) -> Result<Vec<Vec<u8>>> {
    fragment(
        chunk.header_bytes(),
        chunk.chunk_stream_id(),
        chunk.message().payload(),
        max_chunk_size,
    )
}

/// Reject header types that would make the peer reconstruct different
/// fields than `message` carries
fn check_compatible(
    chunk_type: ChunkType,
    message: &Message,
    prior: Option<&ChunkStreamContext>,
    chunk_stream_id: u32,
) -> Result<()> {
    let Some(prior) = prior else {
        if chunk_type == ChunkType::Full {
            return Ok(());
        }
        return Err(Error::MissingContinuationContext(chunk_stream_id));
    };

    if chunk_type == ChunkType::Full {
        return Ok(());
    }

    if prior.message_stream_id != message.message_stream_id {
        return Err(Error::header_mismatch(format!(
            "{} cannot change message stream id {} -> {}",
            chunk_type, prior.message_stream_id, message.message_stream_id
        )));
    }

    if chunk_type == ChunkType::DeltaMeta {
        return Ok(());
    }

    if prior.length as usize != message.length() || prior.type_id != message.type_id {
        return Err(Error::header_mismatch(format!(
            "{} cannot change length {} -> {} or type id {} -> {}",
            chunk_type,
            prior.length,
            message.length(),
            prior.type_id,
            message.type_id
        )));
    }

    if chunk_type == ChunkType::Continuation
        && message.timestamp != prior.timestamp.wrapping_add(prior.timestamp_delta)
    {
        return Err(Error::header_mismatch(format!(
            "{} implies timestamp {}, message has {}",
            chunk_type,
            prior.timestamp.wrapping_add(prior.timestamp_delta),
            message.timestamp
        )));
    }

    Ok(())
}

fn prepare(
    message: &Message,
    chunk_type: ChunkType,
    chunk_stream_id: u32,
    prior: Option<&ChunkStreamContext>,
) -> Result<(MessageHeader, Vec<u8>)> {
    if !message.is_complete() {
        return Err(Error::IncompleteMessage {
            length: message.length(),
            available: message.payload().len(),
        });
    }
    check_chunk_start(chunk_type, chunk_stream_id)?;
    check_compatible(chunk_type, message, prior, chunk_stream_id)?;

    let header = MessageHeader::for_message(chunk_type, message, prior.map_or(0, |c| c.timestamp))?;
    let mut buffer = ByteBuffer::with_capacity(basic_header_size(chunk_stream_id) + header.encoded_size());
    write_basic_header(&mut buffer, chunk_type, chunk_stream_id)?;
    header.write(&mut buffer)?;

    Ok((header, buffer.into_vec()))
}

/// Split a complete message into wire pieces, the first carrying a
/// `chunk_type` header resolved against `prior`
pub fn split_message(
    message: &Message,
    chunk_type: ChunkType,
    chunk_stream_id: u32,
    max_chunk_size: usize,
    prior: Option<&ChunkStreamContext>,
) -> Result<Vec<Vec<u8>>> {
    let (_, header) = prepare(message, chunk_type, chunk_stream_id, prior)?;
    fragment(&header, chunk_stream_id, message.payload(), max_chunk_size)
}

/// Encode a message on a chunk stream and record the new context in
/// `contexts`
pub fn encode_message(
    message: &Message,
    preferred_chunk_type: ChunkType,
    chunk_stream_id: u32,
    max_chunk_size: usize,
    contexts: &mut ContextTable,
) -> Result<Vec<Vec<u8>>> {
    let prior = contexts.get(chunk_stream_id).copied();
    let (header, header_bytes) = prepare(message, preferred_chunk_type, chunk_stream_id, prior.as_ref())?;
    let pieces = fragment(&header_bytes, chunk_stream_id, message.payload(), max_chunk_size)?;

    let next = ChunkStreamContext::advance(prior.as_ref(), &header, chunk_stream_id)?;
    contexts.insert(chunk_stream_id, next);

    Ok(pieces)
}

/// Outgoing side of a connection: turns messages into chunk bytes, choosing
/// the most compact header each chunk stream allows.
pub struct ChunkEncoder {
    /// Contexts of what the peer has seen per chunk stream
    contexts: ContextTable,

    /// Current chunk size for writing
    chunk_size: usize,
}

impl ChunkEncoder {
    pub fn new() -> Self {
        ChunkEncoder {
            contexts: ContextTable::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(chunk_size: usize) -> Result<Self> {
        let mut encoder = ChunkEncoder::new();
        encoder.set_chunk_size(chunk_size)?;
        Ok(encoder)
    }

    /// Set outgoing chunk size
    pub fn set_chunk_size(&mut self, size: usize) -> Result<()> {
        check_chunk_size(size)?;
        debug!("Outgoing chunk size {} -> {}", self.chunk_size, size);
        self.chunk_size = size;
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// Pick the smallest header the peer can resolve for `message`
    pub fn select_chunk_type(&self, message: &Message, chunk_stream_id: u32) -> ChunkType {
        let Some(prev) = self.contexts.get(chunk_stream_id) else {
            return ChunkType::Full;
        };

        if prev.message_stream_id != message.message_stream_id || message.timestamp < prev.timestamp {
            return ChunkType::Full;
        }

        if prev.length as usize != message.length() || prev.type_id != message.type_id {
            return ChunkType::DeltaMeta;
        }

        if message.timestamp - prev.timestamp == prev.timestamp_delta {
            return ChunkType::Continuation;
        }

        ChunkType::Delta
    }

    /// Encode with an automatically chosen header type
    pub fn encode(&mut self, message: &Message, chunk_stream_id: u32) -> Result<Vec<Vec<u8>>> {
        let chunk_type = self.select_chunk_type(message, chunk_stream_id);
        self.encode_with(message, chunk_type, chunk_stream_id)
    }

    /// Encode with a caller-chosen header type
    pub fn encode_with(
        &mut self,
        message: &Message,
        chunk_type: ChunkType,
        chunk_stream_id: u32,
    ) -> Result<Vec<Vec<u8>>> {
        trace!(
            "Encoding {} bytes on chunk stream {} with {} header",
            message.length(),
            chunk_stream_id,
            chunk_type
        );
        encode_message(message, chunk_type, chunk_stream_id, self.chunk_size, &mut self.contexts)
    }
}

impl Default for ChunkEncoder {
    fn default() -> Self {
        ChunkEncoder::new()
    }
}

/// Writes messages to an async byte stream
pub struct ChunkWriter {
    encoder: ChunkEncoder,
}

impl ChunkWriter {
    /// Create new chunk writer
    pub fn new() -> Self {
        ChunkWriter {
            encoder: ChunkEncoder::new(),
        }
    }

    pub fn with_config(config: &ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(ChunkWriter {
            encoder: ChunkEncoder::with_chunk_size(config.chunk_size_out)?,
        })
    }

    /// Set outgoing chunk size
    pub fn set_chunk_size(&mut self, size: usize) -> Result<()> {
        self.encoder.set_chunk_size(size)
    }

    pub fn encoder(&self) -> &ChunkEncoder {
        &self.encoder
    }

    /// Write message as chunks
    pub async fn write_message<W: AsyncWrite + Unpin>(
        &mut self,
        message: &Message,
        chunk_stream_id: u32,
        writer: &mut W,
    ) -> Result<()> {
        let pieces = self.encoder.encode(message, chunk_stream_id)?;

        for piece in &pieces {
            writer.write_all(piece).await?;
        }
        writer.flush().await?;

        Ok(())
    }
}

impl Default for ChunkWriter {
    fn default() -> Self {
        ChunkWriter::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::*;

    fn video(timestamp: u32, len: usize) -> Message {
        Message::video(timestamp, 1, (0..len).map(|i| i as u8).collect())
    }

    #[test]
    fn test_small_message_single_piece() {
        let message = video(0, 100);
        let pieces = split_message(&message, ChunkType::Full, CHUNK_STREAM_VIDEO, 128, None).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(pieces[0].len(), 12 + 100);
    }

    #[test]
    fn test_two_chunk_sizes_make_two_pieces() {
        let message = video(0, 256);
        let pieces = split_message(&message, ChunkType::Full, CHUNK_STREAM_VIDEO, 128, None).unwrap();

        assert_eq!(pieces.len(), 2);
        assert_eq!(pieces[0].len(), 12 + 128);
        assert_eq!(pieces[1].len(), 1 + 128);
        assert_eq!(pieces[1][0], 0xC6);
        assert_eq!(&pieces[1][1..], &message.payload()[128..]);
    }

    #[test]
    fn test_exact_multiple_has_no_empty_tail() {
        for len in [128, 384] {
            let message = video(0, len);
            let pieces = split_message(&message, ChunkType::Full, CHUNK_STREAM_VIDEO, 128, None).unwrap();
            assert_eq!(pieces.len(), len / 128);

            let expected = if len > 128 { 1 + 128 } else { 12 + 128 };
            assert_eq!(pieces.last().map(Vec::len), Some(expected));
        }
    }

    #[test]
    fn test_uneven_tail() {
        let message = video(0, 300);
        let pieces = split_message(&message, ChunkType::Full, 320, 128, None).unwrap();

        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[1][..3], [0xC1, 0x01, 0x00]);
        assert_eq!(pieces[2].len(), 3 + 44);
    }

    #[test]
    fn test_split_chunk() {
        let chunk = Chunk::new(ChunkType::Full, 3, video(5, 10), 0).unwrap();
        let pieces = split(&chunk, 4).unwrap();

        assert_eq!(pieces.len(), 3);
        assert_eq!(pieces[0].len(), chunk.required_header_size() + 4);
        assert_eq!(pieces[1], vec![0xC3, 4, 5, 6, 7]);
        assert_eq!(pieces[2], vec![0xC3, 8, 9]);
        assert!(matches!(split(&chunk, 0), Err(Error::InvalidChunkSize(0))));
    }

    #[test]
    fn test_incomplete_message_rejected() {
        let message = Message::skeleton(MSG_TYPE_VIDEO, 0, 1, 10);
        let err = split_message(&message, ChunkType::Full, 3, 128, None).unwrap_err();
        assert!(matches!(err, Error::IncompleteMessage { length: 10, available: 0 }));
    }

    #[test]
    fn test_encode_message_needs_context_for_compressed_headers() {
        let mut contexts = ContextTable::new();
        let err = encode_message(&video(0, 1), ChunkType::Delta, 3, 128, &mut contexts).unwrap_err();
        assert!(matches!(err, Error::MissingContinuationContext(3)));
        assert!(contexts.is_empty());
    }

    #[test]
    fn test_encode_message_records_context() {
        let mut contexts = ContextTable::new();
        encode_message(&video(100, 4), ChunkType::Full, 6, 128, &mut contexts).unwrap();
        let pieces = encode_message(&video(130, 4), ChunkType::Delta, 6, 128, &mut contexts).unwrap();

        assert_eq!(pieces, vec![vec![0x86, 0x00, 0x00, 0x1E, 0, 1, 2, 3]]);
        let context = contexts.get(6).unwrap();
        assert_eq!(context.timestamp, 130);
        assert_eq!(context.timestamp_delta, 30);
    }

    #[test]
    fn test_forced_header_must_match_context() {
        let mut contexts = ContextTable::new();
        encode_message(&video(0, 4), ChunkType::Full, 6, 128, &mut contexts).unwrap();

        let err = encode_message(&video(10, 5), ChunkType::Delta, 6, 128, &mut contexts).unwrap_err();
        assert!(matches!(err, Error::HeaderMismatch(_)));

        let other_stream = Message::video(10, 2, vec![0; 4]);
        let err = encode_message(&other_stream, ChunkType::DeltaMeta, 6, 128, &mut contexts).unwrap_err();
        assert!(matches!(err, Error::HeaderMismatch(_)));

        let err = encode_message(&video(10, 4), ChunkType::Continuation, 6, 128, &mut contexts).unwrap_err();
        assert!(matches!(err, Error::HeaderMismatch(_)));
    }

    #[test]
    fn test_encoder_header_selection() {
        let mut encoder = ChunkEncoder::new();
        let csid = CHUNK_STREAM_VIDEO;

        assert_eq!(encoder.select_chunk_type(&video(0, 10), csid), ChunkType::Full);
        encoder.encode(&video(0, 10), csid).unwrap();

        assert_eq!(encoder.select_chunk_type(&video(40, 20), csid), ChunkType::DeltaMeta);
        encoder.encode(&video(40, 20), csid).unwrap();

        assert_eq!(encoder.select_chunk_type(&video(80, 20), csid), ChunkType::Continuation);
        assert_eq!(encoder.select_chunk_type(&video(90, 20), csid), ChunkType::Delta);
        assert_eq!(encoder.select_chunk_type(&video(30, 20), csid), ChunkType::Full);
        assert_eq!(
            encoder.select_chunk_type(&Message::video(80, 2, vec![0; 20]), csid),
            ChunkType::Full
        );

        let pieces = encoder.encode(&video(80, 20), csid).unwrap();
        assert_eq!(pieces[0][0], 0xC6);
        assert_eq!(pieces[0].len(), 1 + 20);
    }

    #[test]
    fn test_encoder_chunk_size() {
        let mut encoder = ChunkEncoder::new();
        assert!(matches!(encoder.set_chunk_size(0), Err(Error::InvalidChunkSize(0))));

        encoder.set_chunk_size(4096).unwrap();
        let pieces = encoder.encode(&video(0, 4000), 3).unwrap();
        assert_eq!(pieces.len(), 1);
        assert_eq!(encoder.chunk_size(), 4096);
    }

    #[test]
    fn test_constructors_validate_chunk_size() {
        assert!(matches!(ChunkEncoder::with_chunk_size(0), Err(Error::InvalidChunkSize(0))));
        assert!(matches!(
            ChunkEncoder::with_chunk_size(MAX_CHUNK_SIZE + 1),
            Err(Error::InvalidChunkSize(_))
        ));

        let config = ChunkConfig {
            chunk_size_out: 0,
            ..ChunkConfig::default()
        };
        assert!(matches!(ChunkWriter::with_config(&config), Err(Error::Configuration(_))));
        assert_eq!(ChunkWriter::new().encoder().chunk_size(), DEFAULT_CHUNK_SIZE);
    }

    #[test]
    fn test_full_header_on_chunk_stream_64_refused() {
        let message = video(0, 300);
        let err = split_message(&message, ChunkType::Full, 64, 128, None).unwrap_err();
        assert!(matches!(err, Error::ReservedStreamId(64)));

        let mut encoder = ChunkEncoder::new();
        assert!(matches!(encoder.encode(&message, 64), Err(Error::ReservedStreamId(64))));
        assert!(encoder.contexts().is_empty());

        // Neighbouring ids keep the two-byte form
        let pieces = split_message(&message, ChunkType::Full, 65, 128, None).unwrap();
        assert_eq!(pieces[1][..2], [0xC0, 0x01]);
    }
}
