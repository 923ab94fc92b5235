//! Byte-level frame primitives for the hot-path protocol
//!
//! Snapshot, correction, and input packets are hand-packed: their layouts
//! are bit-exact and version-locked, so they never go through a generic
//! serializer. All integers are little-endian. Short reads return `None`
//! so decoders can reject truncated packets without partially applying.

use crate::game::constants::net::MAX_PACKET_SIZE;

/// Errors that can occur while framing packets
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("Packet too large: {0} bytes (max {1})")]
    PacketTooLarge(usize, usize),
    #[error("Truncated packet at offset {0}")]
    Truncated(usize),
    #[error("Protocol version mismatch: ours {ours:#x}, theirs {theirs:#x}")]
    VersionMismatch { ours: u32, theirs: u32 },
    #[error("Malformed packet: {0}")]
    Malformed(&'static str),
}

/// Builder for hand-packed packets
pub struct FrameBuilder {
    buffer: Vec<u8>,
}

impl FrameBuilder {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(256),
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn write_u8(mut self, value: u8) -> Self {
        self.buffer.push(value);
        self
    }

    pub fn write_i8(mut self, value: i8) -> Self {
        self.buffer.push(value as u8);
        self
    }

    pub fn write_u16(mut self, value: u16) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_i16(mut self, value: i16) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    pub fn write_u32(mut self, value: u32) -> Self {
        self.buffer.extend_from_slice(&value.to_le_bytes());
        self
    }

    /// Finish, enforcing the MTU-safe packet cap
    pub fn build(self) -> Result<Vec<u8>, WireError> {
        if self.buffer.len() > MAX_PACKET_SIZE {
            return Err(WireError::PacketTooLarge(self.buffer.len(), MAX_PACKET_SIZE));
        }
        Ok(self.buffer)
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Cursor-style reader over a received packet
pub struct FrameReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> FrameReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn read(&mut self, n: usize) -> Option<&'a [u8]> {
        if self.position + n > self.data.len() {
            return None;
        }
        let slice = &self.data[self.position..self.position + n];
        self.position += n;
        Some(slice)
    }

    pub fn read_u8(&mut self) -> Option<u8> {
        self.read(1).map(|b| b[0])
    }

    pub fn read_i8(&mut self) -> Option<i8> {
        self.read(1).map(|b| b[0] as i8)
    }

    pub fn read_u16(&mut self) -> Option<u16> {
        self.read(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> Option<i16> {
        self.read(2).map(|b| i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Option<u32> {
        self.read(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn has_remaining(&self) -> bool {
        self.position < self.data.len()
    }

    /// Typed truncation error carrying the failure offset
    pub fn truncated(&self) -> WireError {
        WireError::Truncated(self.position)
    }
}
