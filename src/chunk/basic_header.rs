use crate::chunk::types::ChunkType;
use crate::protocol::constants::*;
use crate::{ByteBuffer, Error, Result};

/// Basic header length for a chunk stream ID
pub fn basic_header_size(chunk_stream_id: u32) -> usize {
    if chunk_stream_id <= MAX_ONE_BYTE_CHUNK_STREAM_ID {
        1
    } else if chunk_stream_id <= MAX_TWO_BYTE_CHUNK_STREAM_ID {
        2
    } else {
        3
    }
}

/// Basic header length announced by the first header byte
pub fn basic_header_size_from_byte(first_byte: u8) -> usize {
    match first_byte & 0x3F {
        0 => 2,
        1 => 3,
        _ => 1,
    }
}

fn check_chunk_stream_id(chunk_stream_id: u32) -> Result<()> {
    if chunk_stream_id < MIN_CHUNK_STREAM_ID {
        return Err(Error::ReservedStreamId(chunk_stream_id));
    }
    if chunk_stream_id > MAX_CHUNK_STREAM_ID {
        return Err(Error::StreamIdTooLarge(chunk_stream_id));
    }
    Ok(())
}

/// Append the basic header for `(chunk_type, chunk_stream_id)`
pub fn write_basic_header(
    buffer: &mut ByteBuffer,
    chunk_type: ChunkType,
    chunk_stream_id: u32,
) -> Result<()> {
    check_chunk_stream_id(chunk_stream_id)?;
    let fmt = chunk_type.bits() << 6;

    match basic_header_size(chunk_stream_id) {
        1 => buffer.write_u8(fmt | chunk_stream_id as u8),
        2 => {
            buffer.write_u8(fmt);
            buffer.write_u8((chunk_stream_id - 64) as u8);
        }
        _ => {
            buffer.write_u8(fmt | 1);
            buffer.write_u16_be((chunk_stream_id - 64) as u16)?;
        }
    }

    Ok(())
}

/// Encode basic header into 1-3 bytes
pub fn encode_basic_header(chunk_type: ChunkType, chunk_stream_id: u32) -> Result<Vec<u8>> {
    let mut buffer = ByteBuffer::with_capacity(3);
    write_basic_header(&mut buffer, chunk_type, chunk_stream_id)?;
    Ok(buffer.into_vec())
}

/// Decode a basic header, returning the chunk type, chunk stream ID and
/// the number of bytes consumed
pub fn decode_basic_header(bytes: &[u8]) -> Result<(ChunkType, u32, usize)> {
    let Some(&first_byte) = bytes.first() else {
        return Err(Error::malformed("empty basic header"));
    };

    let size = basic_header_size_from_byte(first_byte);
    if bytes.len() < size {
        return Err(Error::malformed(format!(
            "basic header needs {} bytes, have {}",
            size,
            bytes.len()
        )));
    }

    let chunk_type = ChunkType::from_basic_header_byte(first_byte);
    let chunk_stream_id = match size {
        1 => (first_byte & 0x3F) as u32,
        2 => bytes[1] as u32 + 64,
        _ => u16::from_be_bytes([bytes[1], bytes[2]]) as u32 + 64,
    };

    Ok((chunk_type, chunk_stream_id, size))
}
