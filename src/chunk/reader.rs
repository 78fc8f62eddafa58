use std::collections::{HashMap, VecDeque};
use log::{debug, trace, warn};
use tokio::io::{AsyncRead, AsyncReadExt};
use crate::chunk::basic_header::decode_basic_header;
use crate::chunk::chunk::{peek_header_length, reject_zero_leading_byte, Chunk};
use crate::chunk::stream::ContextTable;
use crate::chunk::types::ChunkType;
use crate::config::{check_chunk_size, ChunkConfig};
use crate::{Error, Message, Result, DEFAULT_CHUNK_SIZE};

/// Append the bytes of `incoming` that belong to the current wire chunk of
/// `message`.
///
/// Consumes at most what is left of the message, what is left of the current
/// chunk, and what `incoming` holds. Returns the number of bytes consumed and
/// whether the chunk size limit was what stopped it, in which case a type 3
/// header precedes the next payload byte.
pub fn append(message: &mut Message, incoming: &[u8], max_chunk_size: usize) -> Result<(usize, bool)> {
    if max_chunk_size == 0 {
        return Err(Error::InvalidChunkSize(0));
    }

    let remaining_for_message = message.remaining();
    let remaining_in_chunk = max_chunk_size - (message.payload().len() % max_chunk_size);
    let consumed = incoming.len().min(remaining_for_message).min(remaining_in_chunk);

    message.extend_payload(&incoming[..consumed])?;

    let boundary = consumed == remaining_in_chunk && remaining_in_chunk < remaining_for_message;
    Ok((consumed, boundary))
}

/// Feed payload bytes that follow a type 3 header into a message in progress
pub fn feed_continuation(
    message: &mut Message,
    buffer: &[u8],
    max_chunk_size: usize,
) -> Result<(usize, bool)> {
    append(message, buffer, max_chunk_size)
}

/// Incoming side of a connection: turns a byte stream into complete messages.
///
/// Bytes may arrive split at any position. Chunk streams may interleave;
/// one message per chunk stream can be in progress at a time.
pub struct ChunkDecoder {
    /// Continuation contexts for incoming chunk streams
    contexts: ContextTable,

    /// Partial messages by chunk stream ID
    in_progress: HashMap<u32, Message>,

    /// Chunk stream whose payload is being received
    current: Option<u32>,

    /// Bytes not yet forming a complete header
    pending: Vec<u8>,

    /// Current chunk size for reading
    chunk_size: usize,

    /// Error held back until the messages completed before it are returned
    failed: Option<Error>,
}

impl ChunkDecoder {
    pub fn new() -> Self {
        ChunkDecoder {
            contexts: ContextTable::new(),
            in_progress: HashMap::new(),
            current: None,
            pending: Vec::new(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            failed: None,
        }
    }

    pub fn with_chunk_size(chunk_size: usize) -> Result<Self> {
        let mut decoder = ChunkDecoder::new();
        decoder.set_chunk_size(chunk_size)?;
        Ok(decoder)
    }

    /// Set incoming chunk size
    pub fn set_chunk_size(&mut self, size: usize) -> Result<()> {
        check_chunk_size(size)?;
        debug!("Incoming chunk size {} -> {}", self.chunk_size, size);
        self.chunk_size = size;
        Ok(())
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn contexts(&self) -> &ContextTable {
        &self.contexts
    }

    /// Whether the decoder sits between messages with no buffered input
    /// and no error left to report
    pub fn is_idle(&self) -> bool {
        self.pending.is_empty() && self.in_progress.is_empty() && self.failed.is_none()
    }

    /// Take the error held back by the last `push`, if any
    pub fn take_error(&mut self) -> Option<Error> {
        self.failed.take()
    }

    /// Drop the partial message on a chunk stream
    pub fn abort(&mut self, chunk_stream_id: u32) -> Option<Message> {
        if self.current == Some(chunk_stream_id) {
            self.current = None;
        }
        let dropped = self.in_progress.remove(&chunk_stream_id);
        if let Some(message) = &dropped {
            debug!(
                "Aborted message on chunk stream {} after {}/{} bytes",
                chunk_stream_id,
                message.payload().len(),
                message.length()
            );
        }
        dropped
    }

    /// Feed received bytes, returning every message they complete.
    ///
    /// On a decoding error the buffered input that caused it is dropped. If
    /// messages were completed earlier in the same call they are returned
    /// and the error is reported by the next `push`, which keeps its bytes
    /// for the call after.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Message>> {
        if let Some(e) = self.failed.take() {
            self.pending.extend_from_slice(bytes);
            return Err(e);
        }

        let mut data = std::mem::take(&mut self.pending);
        data.extend_from_slice(bytes);

        let mut completed = Vec::new();
        let mut offset = 0;
        loop {
            match self.step(&data[offset..]) {
                Ok(Some((consumed, message))) => {
                    offset += consumed;
                    completed.extend(message);
                }
                Ok(None) => break,
                Err(e) => {
                    warn!("Dropping {} buffered bytes after error: {}", data.len() - offset, e);
                    self.current = None;
                    if completed.is_empty() {
                        return Err(e);
                    }
                    self.failed = Some(e);
                    return Ok(completed);
                }
            }
        }

        self.pending = data.split_off(offset);
        Ok(completed)
    }

    /// Decode one step from `data`: either a header with the payload that
    /// follows it, or payload for the chunk in flight. `None` means more
    /// input is needed.
    fn step(&mut self, data: &[u8]) -> Result<Option<(usize, Option<Message>)>> {
        if let Some(chunk_stream_id) = self.current {
            if data.is_empty() {
                return Ok(None);
            }
            let message = self
                .in_progress
                .get_mut(&chunk_stream_id)
                .ok_or(Error::MissingContinuationContext(chunk_stream_id))?;
            let (consumed, boundary) = append(message, data, self.chunk_size)?;
            let done = self.settle(chunk_stream_id, boundary);
            return Ok(Some((consumed, done)));
        }

        reject_zero_leading_byte(data)?;
        let Some(header_length) = peek_header_length(data) else {
            return Ok(None);
        };

        let (chunk_type, chunk_stream_id, basic_size) = decode_basic_header(data)?;
        trace!("Chunk {} on chunk stream {}", chunk_type, chunk_stream_id);

        if self.in_progress.contains_key(&chunk_stream_id) {
            if chunk_type == ChunkType::Continuation {
                self.current = Some(chunk_stream_id);
                return Ok(Some((basic_size, None)));
            }
            if let Some(partial) = self.in_progress.remove(&chunk_stream_id) {
                warn!(
                    "Discarding partial message on chunk stream {} ({}/{} bytes), new {} header",
                    chunk_stream_id,
                    partial.payload().len(),
                    partial.length(),
                    chunk_type
                );
            }
        }

        let (chunk, consumed) = Chunk::parse(data, &mut self.contexts, self.chunk_size)?;
        debug_assert!(consumed >= header_length);

        let boundary = chunk.is_fragmented();
        let message = chunk.into_message();
        trace!(
            "New message on chunk stream {}: type {}, timestamp {}, length {}",
            chunk_stream_id,
            message.type_id,
            message.timestamp,
            message.length()
        );
        self.in_progress.insert(chunk_stream_id, message);
        self.current = Some(chunk_stream_id);

        let done = self.settle(chunk_stream_id, boundary);
        Ok(Some((consumed, done)))
    }

    /// Update bookkeeping after payload was appended on a chunk stream,
    /// handing back the message if it is now complete
    fn settle(&mut self, chunk_stream_id: u32, boundary: bool) -> Option<Message> {
        let complete = self
            .in_progress
            .get(&chunk_stream_id)
            .is_some_and(Message::is_complete);

        if complete {
            self.current = None;
            let message = self.in_progress.remove(&chunk_stream_id)?;
            debug!(
                "Message complete on chunk stream {}: type {}, {} bytes",
                chunk_stream_id,
                message.type_id,
                message.length()
            );
            return Some(message);
        }

        if boundary {
            self.current = None;
        }
        None
    }
}

impl Default for ChunkDecoder {
    fn default() -> Self {
        ChunkDecoder::new()
    }
}

/// Reads messages off an async byte stream
pub struct ChunkReader {
    decoder: ChunkDecoder,

    /// Messages decoded but not yet returned
    ready: VecDeque<Message>,

    /// Buffer for reading
    read_buffer: Vec<u8>,
}

impl ChunkReader {
    /// Create new chunk reader
    pub fn new() -> Self {
        ChunkReader {
            decoder: ChunkDecoder::new(),
            ready: VecDeque::new(),
            read_buffer: vec![0u8; ChunkConfig::default().read_buffer_size],
        }
    }

    pub fn with_config(config: &ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(ChunkReader {
            decoder: ChunkDecoder::with_chunk_size(config.chunk_size_in)?,
            ready: VecDeque::new(),
            read_buffer: vec![0u8; config.read_buffer_size],
        })
    }

    /// Set incoming chunk size
    pub fn set_chunk_size(&mut self, size: usize) -> Result<()> {
        self.decoder.set_chunk_size(size)
    }

    pub fn decoder(&self) -> &ChunkDecoder {
        &self.decoder
    }

    /// Read the next complete message. Returns `None` when the stream ends
    /// cleanly between messages.
    pub async fn read_message<R: AsyncRead + Unpin>(&mut self, reader: &mut R) -> Result<Option<Message>> {
        loop {
            if let Some(message) = self.ready.pop_front() {
                return Ok(Some(message));
            }
            if let Some(e) = self.decoder.take_error() {
                return Err(e);
            }

            let n = reader.read(&mut self.read_buffer).await?;
            if n == 0 {
                if self.decoder.is_idle() {
                    return Ok(None);
                }
                return Err(Error::io("stream closed in the middle of a message"));
            }

            let messages = self.decoder.push(&self.read_buffer[..n])?;
            self.ready.extend(messages);
        }
    }
}

impl Default for ChunkReader {
    fn default() -> Self {
        ChunkReader::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::writer::split_message;
    use crate::protocol::constants::*;

    fn skeleton(length: usize) -> Message {
        Message::skeleton(MSG_TYPE_VIDEO, 0, 1, length)
    }

    #[test]
    fn test_append_bound_by_chunk_size() {
        let mut message = skeleton(300);
        let (consumed, boundary) = append(&mut message, &[0u8; 200], 128).unwrap();
        assert_eq!(consumed, 128);
        assert!(boundary);
    }

    #[test]
    fn test_append_bound_by_message_length() {
        let mut message = skeleton(50);
        let (consumed, boundary) = append(&mut message, &[0u8; 200], 128).unwrap();
        assert_eq!(consumed, 50);
        assert!(!boundary);
        assert!(message.is_complete());
    }

    #[test]
    fn test_append_bound_by_input() {
        let mut message = skeleton(300);
        let (consumed, boundary) = append(&mut message, &[0u8; 100], 128).unwrap();
        assert_eq!(consumed, 100);
        assert!(!boundary);

        // Rest of the same wire chunk
        let (consumed, boundary) = append(&mut message, &[0u8; 100], 128).unwrap();
        assert_eq!(consumed, 28);
        assert!(boundary);
    }

    #[test]
    fn test_append_message_ends_on_chunk_edge() {
        let mut message = skeleton(256);
        append(&mut message, &[0u8; 128], 128).unwrap();

        let (consumed, boundary) = append(&mut message, &[0u8; 128], 128).unwrap();
        assert_eq!(consumed, 128);
        assert!(!boundary);
        assert!(message.is_complete());

        let (consumed, boundary) = append(&mut message, &[1, 2, 3], 128).unwrap();
        assert_eq!(consumed, 0);
        assert!(!boundary);
        assert_eq!(message.payload().len(), 256);
    }

    #[test]
    fn test_append_zero_chunk_size() {
        let mut message = skeleton(10);
        assert!(matches!(
            feed_continuation(&mut message, &[1], 0),
            Err(Error::InvalidChunkSize(0))
        ));
    }

    #[test]
    fn test_decoder_single_message() {
        let message = Message::video(40, 1, (0..=255).collect());
        let wire: Vec<u8> = split_message(&message, ChunkType::Full, CHUNK_STREAM_VIDEO, 128, None)
            .unwrap()
            .concat();

        let mut decoder = ChunkDecoder::new();
        let messages = decoder.push(&wire).unwrap();
        assert_eq!(messages, vec![message]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_decoder_byte_at_a_time() {
        let message = Message::video(0x1234567, 3, (0..300).map(|i| i as u8).collect());
        let wire: Vec<u8> = split_message(&message, ChunkType::Full, 400, 64, None)
            .unwrap()
            .concat();

        let mut decoder = ChunkDecoder::with_chunk_size(64).unwrap();
        let mut received = Vec::new();
        for byte in &wire {
            received.extend(decoder.push(std::slice::from_ref(byte)).unwrap());
        }

        assert_eq!(received, vec![message]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_decoder_interleaved_streams() {
        let audio = Message::audio(10, 1, vec![0xAF; 200]);
        let video = Message::video(20, 1, vec![0x17; 200]);
        let audio_chunks = split_message(&audio, ChunkType::Full, CHUNK_STREAM_AUDIO, 128, None).unwrap();
        let video_chunks = split_message(&video, ChunkType::Full, CHUNK_STREAM_VIDEO, 128, None).unwrap();

        let wire = [
            audio_chunks[0].as_slice(),
            video_chunks[0].as_slice(),
            video_chunks[1].as_slice(),
            audio_chunks[1].as_slice(),
        ]
        .concat();

        let mut decoder = ChunkDecoder::new();
        let messages = decoder.push(&wire).unwrap();
        assert_eq!(messages, vec![video, audio]);
    }

    #[test]
    fn test_decoder_discards_interrupted_message() {
        let first = Message::audio(10, 1, vec![1; 200]);
        let second = Message::audio(20, 1, vec![2; 5]);
        let first_chunks = split_message(&first, ChunkType::Full, CHUNK_STREAM_AUDIO, 128, None).unwrap();
        let second_chunks = split_message(&second, ChunkType::Full, CHUNK_STREAM_AUDIO, 128, None).unwrap();

        let mut decoder = ChunkDecoder::new();
        assert!(decoder.push(&first_chunks[0]).unwrap().is_empty());
        assert!(!decoder.is_idle());

        let messages = decoder.push(&second_chunks[0]).unwrap();
        assert_eq!(messages, vec![second]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_decoder_abort() {
        let message = Message::audio(10, 1, vec![1; 200]);
        let chunks = split_message(&message, ChunkType::Full, CHUNK_STREAM_AUDIO, 128, None).unwrap();

        let mut decoder = ChunkDecoder::new();
        decoder.push(&chunks[0]).unwrap();

        let partial = decoder.abort(CHUNK_STREAM_AUDIO).unwrap();
        assert_eq!(partial.payload().len(), 128);
        assert!(decoder.is_idle());
        assert!(decoder.abort(CHUNK_STREAM_AUDIO).is_none());
    }

    #[test]
    fn test_decoder_type3_opens_new_message() {
        // Full header at 100, then a bare type 3 header repeating it
        let mut wire = vec![0x04, 0x00, 0x00, 0x64, 0x00, 0x00, 0x01, 0x08, 0x01, 0x00, 0x00, 0x00, 0xAA];
        wire.extend_from_slice(&[0xC4, 0xBB]);

        let mut decoder = ChunkDecoder::new();
        let messages = decoder.push(&wire).unwrap();

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].timestamp, 100);
        assert_eq!(messages[1].timestamp, 200);
        assert_eq!(messages[1].payload(), &[0xBB]);
        assert_eq!(messages[1].message_stream_id, 1);
    }

    #[test]
    fn test_decoder_cold_continuation() {
        let mut decoder = ChunkDecoder::new();
        let err = decoder.push(&[0xC5, 0x00]).unwrap_err();
        assert!(matches!(err, Error::MissingContinuationContext(5)));

        // The offending bytes are gone
        assert!(decoder.push(&[]).unwrap().is_empty());
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_decoder_keeps_messages_completed_before_error() {
        let audio = Message::audio(10, 1, vec![0xAF, 0x01]);
        let mut wire = split_message(&audio, ChunkType::Full, CHUNK_STREAM_AUDIO, 128, None)
            .unwrap()
            .concat();
        // Type 2 header on a chunk stream never seen
        wire.extend_from_slice(&[0x89, 0x00, 0x00, 0x0A]);

        let mut decoder = ChunkDecoder::new();
        assert_eq!(decoder.push(&wire).unwrap(), vec![audio.clone()]);
        assert!(!decoder.is_idle());

        // Bytes pushed alongside the held error are kept
        let next = Message::audio(20, 1, vec![0xAF, 0x02]);
        let next_wire = split_message(&next, ChunkType::Full, CHUNK_STREAM_AUDIO, 128, None)
            .unwrap()
            .concat();
        let err = decoder.push(&next_wire).unwrap_err();
        assert!(matches!(err, Error::MissingContinuationContext(9)));

        assert_eq!(decoder.push(&[]).unwrap(), vec![next]);
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_decoder_rejects_zero_leading_byte() {
        let mut decoder = ChunkDecoder::new();
        let err = decoder.push(&[0x00]).unwrap_err();
        assert!(matches!(err, Error::MalformedHeader(_)));
        assert!(decoder.is_idle());
    }

    #[test]
    fn test_chunk_size_validated() {
        assert!(matches!(
            ChunkDecoder::with_chunk_size(0),
            Err(Error::InvalidChunkSize(0))
        ));
        assert!(matches!(
            ChunkDecoder::with_chunk_size(MAX_CHUNK_SIZE + 1),
            Err(Error::InvalidChunkSize(_))
        ));

        let config = ChunkConfig {
            chunk_size_in: 0,
            ..ChunkConfig::default()
        };
        assert!(matches!(ChunkReader::with_config(&config), Err(Error::Configuration(_))));

        let mut decoder = ChunkDecoder::with_chunk_size(4096).unwrap();
        assert!(decoder.set_chunk_size(0).is_err());
        assert_eq!(decoder.chunk_size(), 4096);
    }
}
