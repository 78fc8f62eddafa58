// Message types
pub const MSG_TYPE_SET_CHUNK_SIZE: u8 = 1;
pub const MSG_TYPE_ABORT: u8 = 2;
pub const MSG_TYPE_ACK: u8 = 3;
pub const MSG_TYPE_USER_CONTROL: u8 = 4;
pub const MSG_TYPE_WINDOW_ACK: u8 = 5;
pub const MSG_TYPE_SET_PEER_BW: u8 = 6;
pub const MSG_TYPE_AUDIO: u8 = 8;
pub const MSG_TYPE_VIDEO: u8 = 9;
pub const MSG_TYPE_DATA_AMF3: u8 = 15;
pub const MSG_TYPE_SHARED_OBJECT_AMF3: u8 = 16;
pub const MSG_TYPE_COMMAND_AMF3: u8 = 17;
pub const MSG_TYPE_DATA_AMF0: u8 = 18;
pub const MSG_TYPE_SHARED_OBJECT_AMF0: u8 = 19;
pub const MSG_TYPE_COMMAND_AMF0: u8 = 20;
pub const MSG_TYPE_AGGREGATE: u8 = 22;

// Chunk stream IDs
pub const CHUNK_STREAM_PROTOCOL: u32 = 2;
pub const CHUNK_STREAM_COMMAND: u32 = 3;
pub const CHUNK_STREAM_AUDIO: u32 = 4;
pub const CHUNK_STREAM_VIDEO: u32 = 6;
pub const CHUNK_STREAM_DATA: u32 = 8;

// Chunk stream ID ranges per basic header form
pub const MIN_CHUNK_STREAM_ID: u32 = 2;
pub const MAX_ONE_BYTE_CHUNK_STREAM_ID: u32 = 63;
pub const MAX_TWO_BYTE_CHUNK_STREAM_ID: u32 = 319;
pub const MAX_CHUNK_STREAM_ID: u32 = 65535 + 64;

// Header field limits
pub const EXTENDED_TIMESTAMP: u32 = 0xFFFFFF;
pub const EXTENDED_TIMESTAMP_SIZE: usize = 4;
pub const MAX_MESSAGE_LENGTH: usize = 0xFFFFFF;

// Default values
pub const DEFAULT_CHUNK_SIZE: usize = 128;
pub const MAX_CHUNK_SIZE: usize = 0xFFFFFF;
