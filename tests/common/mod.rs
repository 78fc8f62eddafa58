// Common test utilities and helper functions
//
// Shared by the integration and property tests

use rtmp_chunk::{ChunkConfig, Message, MSG_TYPE_AUDIO, MSG_TYPE_VIDEO};

/// Route log output through the test harness
pub fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Create a test video message with specified timestamp
pub fn create_test_video_message(timestamp: u32, is_keyframe: bool) -> Message {
    let mut payload = Vec::new();
    if is_keyframe {
        // Keyframe: 0x17 (AVC keyframe)
        payload.push(0x17);
    } else {
        // Inter-frame: 0x27 (AVC inter-frame)
        payload.push(0x27);
    }

    // AVC NALU
    payload.extend_from_slice(&[0x01, 0x00, 0x00, 0x00]);

    Message::new(MSG_TYPE_VIDEO, timestamp, 1, payload)
}

/// Create a test audio message with specified timestamp
pub fn create_test_audio_message(timestamp: u32) -> Message {
    // AAC audio: 0xAF (AAC, 44.1kHz, 16-bit, stereo), raw packet
    Message::new(MSG_TYPE_AUDIO, timestamp, 1, vec![0xAF, 0x01, 0x21, 0x10])
}

/// Create a video message spanning many chunks
pub fn create_large_video_message(timestamp: u32, len: usize) -> Message {
    let payload = (0..len).map(|i| (i % 251) as u8).collect();
    Message::new(MSG_TYPE_VIDEO, timestamp, 1, payload)
}

/// Compare two messages field by field
pub fn assert_message_equal(a: &Message, b: &Message) {
    assert_eq!(a.timestamp, b.timestamp, "Timestamps don't match");
    assert_eq!(a.type_id, b.type_id, "Message types don't match");
    assert_eq!(a.message_stream_id, b.message_stream_id, "Stream IDs don't match");
    assert_eq!(a.length(), b.length(), "Lengths don't match");
    assert_eq!(a.payload(), b.payload(), "Payloads don't match");
}

/// Create a test configuration with the same chunk size both ways
pub fn test_config(chunk_size: usize) -> ChunkConfig {
    ChunkConfig::builder()
        .chunk_size(chunk_size)
        .read_buffer_size(512)
        .build()
        .expect("Failed to create test config")
}
