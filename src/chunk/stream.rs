use std::collections::HashMap;
use crate::chunk::header::MessageHeader;
use crate::{Error, Message, Result};

/// Last known header state of one chunk stream, used to resolve the fields
/// that type 1, 2 and 3 headers leave out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ChunkStreamContext {
    /// Absolute timestamp of the latest message
    pub timestamp: u32,

    /// Delta that a type 3 header starting a new message repeats
    pub timestamp_delta: u32,

    /// Message length
    pub length: u32,

    /// Message type id
    pub type_id: u8,

    /// Message stream id
    pub message_stream_id: u32,
}

fn require(prior: Option<&ChunkStreamContext>, chunk_stream_id: u32) -> Result<&ChunkStreamContext> {
    prior.ok_or(Error::MissingContinuationContext(chunk_stream_id))
}

impl ChunkStreamContext {
    /// Context after `header` is applied on top of `prior`.
    ///
    /// A type 0 header records its absolute timestamp as the delta, so a
    /// following type 3 header that opens a new message advances by it.
    pub fn advance(
        prior: Option<&ChunkStreamContext>,
        header: &MessageHeader,
        chunk_stream_id: u32,
    ) -> Result<Self> {
        let next = match *header {
            MessageHeader::Full { timestamp, length, type_id, message_stream_id } => {
                ChunkStreamContext {
                    timestamp,
                    timestamp_delta: timestamp,
                    length,
                    type_id,
                    message_stream_id,
                }
            }
            MessageHeader::DeltaMeta { delta, length, type_id } => {
                let prior = require(prior, chunk_stream_id)?;
                ChunkStreamContext {
                    timestamp: prior.timestamp.wrapping_add(delta),
                    timestamp_delta: delta,
                    length,
                    type_id,
                    message_stream_id: prior.message_stream_id,
                }
            }
            MessageHeader::Delta { delta } => {
                let prior = require(prior, chunk_stream_id)?;
                ChunkStreamContext {
                    timestamp: prior.timestamp.wrapping_add(delta),
                    timestamp_delta: delta,
                    ..*prior
                }
            }
            MessageHeader::Continuation => {
                let prior = require(prior, chunk_stream_id)?;
                ChunkStreamContext {
                    timestamp: prior.timestamp.wrapping_add(prior.timestamp_delta),
                    ..*prior
                }
            }
        };

        Ok(next)
    }

    /// Empty message described by this context
    pub fn message_skeleton(&self) -> Message {
        Message::skeleton(
            self.type_id,
            self.timestamp,
            self.message_stream_id,
            self.length as usize,
        )
    }
}

/// Continuation contexts by chunk stream ID. Owned by the caller, one table
/// per direction of a connection.
#[derive(Debug, Clone, Default)]
pub struct ContextTable {
    streams: HashMap<u32, ChunkStreamContext>,
}

impl ContextTable {
    pub fn new() -> Self {
        ContextTable::default()
    }

    pub fn get(&self, chunk_stream_id: u32) -> Option<&ChunkStreamContext> {
        self.streams.get(&chunk_stream_id)
    }

    /// Record the context for a chunk stream, returning the previous one
    pub fn insert(&mut self, chunk_stream_id: u32, context: ChunkStreamContext) -> Option<ChunkStreamContext> {
        self.streams.insert(chunk_stream_id, context)
    }

    pub fn remove(&mut self, chunk_stream_id: u32) -> Option<ChunkStreamContext> {
        self.streams.remove(&chunk_stream_id)
    }

    pub fn contains(&self, chunk_stream_id: u32) -> bool {
        self.streams.contains_key(&chunk_stream_id)
    }

    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    pub fn clear(&mut self) {
        self.streams.clear();
    }
}
