use crate::protocol::constants::*;
use crate::{Error, Result};

/// One logical RTMP message: a media frame, a command, a control event.
///
/// `length` is fixed when the message is created and the payload may never
/// grow past it. A message received off the wire starts as a skeleton with an
/// empty payload and is complete once `payload.len() == length`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub type_id: u8,
    pub timestamp: u32,
    pub message_stream_id: u32,
    length: usize,
    payload: Vec<u8>,
}

impl Message {
    /// Create a complete message around `payload`
    pub fn new(type_id: u8, timestamp: u32, message_stream_id: u32, payload: Vec<u8>) -> Self {
        Message {
            type_id,
            timestamp,
            message_stream_id,
            length: payload.len(),
            payload,
        }
    }

    /// Create an empty message that expects `length` payload bytes
    pub fn skeleton(type_id: u8, timestamp: u32, message_stream_id: u32, length: usize) -> Self {
        Message {
            type_id,
            timestamp,
            message_stream_id,
            length,
            payload: Vec::with_capacity(length),
        }
    }

    /// Create audio message
    pub fn audio(timestamp: u32, message_stream_id: u32, payload: Vec<u8>) -> Self {
        Message::new(MSG_TYPE_AUDIO, timestamp, message_stream_id, payload)
    }

    /// Create video message
    pub fn video(timestamp: u32, message_stream_id: u32, payload: Vec<u8>) -> Self {
        Message::new(MSG_TYPE_VIDEO, timestamp, message_stream_id, payload)
    }

    /// Create AMF0 command message
    pub fn command(timestamp: u32, message_stream_id: u32, payload: Vec<u8>) -> Self {
        Message::new(MSG_TYPE_COMMAND_AMF0, timestamp, message_stream_id, payload)
    }

    /// Declared payload length
    pub fn length(&self) -> usize {
        self.length
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }

    /// Payload bytes still missing
    pub fn remaining(&self) -> usize {
        self.length - self.payload.len()
    }

    /// Check whether every payload byte has arrived
    pub fn is_complete(&self) -> bool {
        self.payload.len() == self.length
    }

    /// Append payload bytes, refusing to grow past the declared length
    pub fn extend_payload(&mut self, data: &[u8]) -> Result<()> {
        let attempted = self.payload.len() + data.len();
        if attempted > self.length {
            return Err(Error::LengthOverrun {
                length: self.length,
                attempted,
            });
        }
        self.payload.extend_from_slice(data);
        Ok(())
    }

    /// Check if this is an audio message
    pub fn is_audio(&self) -> bool {
        self.type_id == MSG_TYPE_AUDIO
    }

    /// Check if this is a video message
    pub fn is_video(&self) -> bool {
        self.type_id == MSG_TYPE_VIDEO
    }

    /// Check if this is a command message
    pub fn is_command(&self) -> bool {
        self.type_id == MSG_TYPE_COMMAND_AMF0 || self.type_id == MSG_TYPE_COMMAND_AMF3
    }

    /// Check if this is a data message
    pub fn is_data(&self) -> bool {
        self.type_id == MSG_TYPE_DATA_AMF0 || self.type_id == MSG_TYPE_DATA_AMF3
    }

    /// Check if this is a protocol control message
    pub fn is_control(&self) -> bool {
        matches!(
            self.type_id,
            MSG_TYPE_SET_CHUNK_SIZE
                | MSG_TYPE_ABORT
                | MSG_TYPE_ACK
                | MSG_TYPE_WINDOW_ACK
                | MSG_TYPE_SET_PEER_BW
        )
    }

    /// Check if this is a shared object message
    pub fn is_shared_object(&self) -> bool {
        self.type_id == MSG_TYPE_SHARED_OBJECT_AMF0 || self.type_id == MSG_TYPE_SHARED_OBJECT_AMF3
    }

    /// Check if this is an aggregate message
    pub fn is_aggregate(&self) -> bool {
        self.type_id == MSG_TYPE_AGGREGATE
    }

    /// Chunk stream conventionally used for this kind of message
    pub fn default_chunk_stream_id(&self) -> u32 {
        if self.is_control() || self.type_id == MSG_TYPE_USER_CONTROL {
            CHUNK_STREAM_PROTOCOL
        } else if self.is_audio() {
            CHUNK_STREAM_AUDIO
        } else if self.is_video() {
            CHUNK_STREAM_VIDEO
        } else if self.is_data() || self.is_shared_object() || self.is_aggregate() {
            CHUNK_STREAM_DATA
        } else {
            CHUNK_STREAM_COMMAND
        }
    }
}
