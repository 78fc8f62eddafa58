use std::io::Cursor;
use byteorder::{BigEndian, LittleEndian, ReadBytesExt, WriteBytesExt};
use crate::{Error, Result};

/// Growable byte buffer with a read cursor, used to assemble and pick apart
/// chunk headers field by field.
pub struct ByteBuffer {
    buffer: Vec<u8>,
    cursor: usize,
}

impl ByteBuffer {
    /// Create a new ByteBuffer from bytes
    pub fn new(data: Vec<u8>) -> Self {
        ByteBuffer {
            buffer: data,
            cursor: 0,
        }
    }

    /// Create a ByteBuffer holding a copy of `data`
    pub fn from_slice(data: &[u8]) -> Self {
        ByteBuffer::new(data.to_vec())
    }

    /// Create an empty ByteBuffer with capacity
    pub fn with_capacity(capacity: usize) -> Self {
        ByteBuffer {
            buffer: Vec::with_capacity(capacity),
            cursor: 0,
        }
    }

    /// Get current cursor position
    pub fn position(&self) -> usize {
        self.cursor
    }

    /// Get remaining bytes from current position
    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.cursor)
    }

    /// Check if buffer has at least n bytes remaining
    pub fn has_remaining(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    fn ensure(&self, n: usize) -> Result<()> {
        if !self.has_remaining(n) {
            return Err(Error::malformed(format!(
                "need {} more bytes at offset {}, have {}",
                n,
                self.cursor,
                self.remaining()
            )));
        }
        Ok(())
    }

    fn reader(&self) -> Cursor<&[u8]> {
        Cursor::new(&self.buffer[self.cursor..])
    }

    /// Write bytes to buffer
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Read u8
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let value = self.buffer[self.cursor];
        self.cursor += 1;
        Ok(value)
    }

    /// Write u8
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Read u16 (big endian)
    pub fn read_u16_be(&mut self) -> Result<u16> {
        self.ensure(2)?;
        let value = self.reader().read_u16::<BigEndian>()?;
        self.cursor += 2;
        Ok(value)
    }

    /// Write u16 (big endian)
    pub fn write_u16_be(&mut self, value: u16) -> Result<()> {
        self.buffer.write_u16::<BigEndian>(value)?;
        Ok(())
    }

    /// Read u24 (big endian)
    pub fn read_u24_be(&mut self) -> Result<u32> {
        self.ensure(3)?;
        let value = self.reader().read_u24::<BigEndian>()?;
        self.cursor += 3;
        Ok(value)
    }

    /// Write u24 (big endian). Values above 0xFFFFFF are rejected.
    pub fn write_u24_be(&mut self, value: u32) -> Result<()> {
        if value > 0xFFFFFF {
            return Err(Error::MessageTooLong(value as usize));
        }
        self.buffer.write_u24::<BigEndian>(value)?;
        Ok(())
    }

    /// Read u32 (big endian)
    pub fn read_u32_be(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let value = self.reader().read_u32::<BigEndian>()?;
        self.cursor += 4;
        Ok(value)
    }

    /// Write u32 (big endian)
    pub fn write_u32_be(&mut self, value: u32) -> Result<()> {
        self.buffer.write_u32::<BigEndian>(value)?;
        Ok(())
    }

    /// Read u32 (little endian) - message stream id only
    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.ensure(4)?;
        let value = self.reader().read_u32::<LittleEndian>()?;
        self.cursor += 4;
        Ok(value)
    }

    /// Write u32 (little endian) - message stream id only
    pub fn write_u32_le(&mut self, value: u32) -> Result<()> {
        self.buffer.write_u32::<LittleEndian>(value)?;
        Ok(())
    }

    /// Consume the buffer, returning its bytes
    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    /// Get slice of underlying buffer
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Get length of buffer
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
