//! Data and padding frame layout.
//!
//! Wire format (all fields little-endian):
//! ```text
//! ┌──────────────┬─────────┬───────┬───────────┐
//! │ Frame Length │ Version │ Flags │ Type      │  0..8
//! │ (4B, i32)    │ (1B)    │ (1B)  │ (2B)      │
//! ├──────────────┴─────────┴───────┴───────────┤
//! │ Term Offset (4B)     │ Session Id (4B)     │  8..16
//! ├──────────────────────┼─────────────────────┤
//! │ Stream Id (4B)       │ Term Id (4B)        │  16..24
//! ├──────────────────────┴─────────────────────┤
//! │ Reserved Value (8B)                        │  24..32
//! ├────────────────────────────────────────────┤
//! │ Payload (frame length - 32 bytes)          │
//! └────────────────────────────────────────────┘
//! ```
//!
//! The frame length is written last with a release store. Until then it is
//! zero or negative and readers treat the frame as not yet published.

use bytes::{BufMut, Bytes, BytesMut};

use crate::atomic_buffer::AtomicBuffer;

pub const FRAME_LENGTH_FIELD_OFFSET: usize = 0;
pub const VERSION_FIELD_OFFSET: usize = 4;
pub const FLAGS_FIELD_OFFSET: usize = 5;
pub const TYPE_FIELD_OFFSET: usize = 6;
pub const TERM_OFFSET_FIELD_OFFSET: usize = 8;
pub const SESSION_ID_FIELD_OFFSET: usize = 12;
pub const STREAM_ID_FIELD_OFFSET: usize = 16;
pub const TERM_ID_FIELD_OFFSET: usize = 20;
pub const RESERVED_VALUE_FIELD_OFFSET: usize = 24;

/// Length of the data/padding frame header.
pub const DATA_HEADER_LENGTH: i32 = 32;

pub const CURRENT_VERSION: u8 = 0;

pub const HDR_TYPE_PAD: u16 = 0x00;
pub const HDR_TYPE_DATA: u16 = 0x01;

pub const BEGIN_FRAG_FLAG: u8 = 0x80;
pub const END_FRAG_FLAG: u8 = 0x40;
pub const UNFRAGMENTED: u8 = BEGIN_FRAG_FLAG | END_FRAG_FLAG;

/// Classification of the type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameType {
    Padding,
    Data,
    Other(u16),
}

impl From<u16> for FrameType {
    fn from(raw: u16) -> Self {
        match raw {
            HDR_TYPE_PAD => FrameType::Padding,
            HDR_TYPE_DATA => FrameType::Data,
            other => FrameType::Other(other),
        }
    }
}

/// Acquire-load the frame length at `term_offset`.
pub fn frame_length_volatile(buffer: &AtomicBuffer, term_offset: usize) -> i32 {
    buffer.get_i32_volatile(term_offset + FRAME_LENGTH_FIELD_OFFSET)
}

/// Publish a frame by release-storing its length.
pub fn frame_length_ordered(buffer: &AtomicBuffer, term_offset: usize, frame_length: i32) {
    buffer.put_i32_ordered(term_offset + FRAME_LENGTH_FIELD_OFFSET, frame_length);
}

pub fn frame_type(buffer: &AtomicBuffer, term_offset: usize) -> FrameType {
    FrameType::from(buffer.get_u16(term_offset + TYPE_FIELD_OFFSET))
}

pub fn is_padding_frame(buffer: &AtomicBuffer, term_offset: usize) -> bool {
    buffer.get_u16(term_offset + TYPE_FIELD_OFFSET) == HDR_TYPE_PAD
}

/// The default data header a producer stamps on every frame it appends.
///
/// Per-frame fields (length, term offset, term id) are filled in at write time.
#[derive(Debug, Clone)]
pub struct HeaderTemplate {
    bytes: Bytes,
}

impl HeaderTemplate {
    /// Build an unfragmented data header for a session and stream.
    pub fn new(session_id: i32, stream_id: i32) -> Self {
        let mut dst = BytesMut::with_capacity(DATA_HEADER_LENGTH as usize);
        dst.put_i32_le(0);
        dst.put_u8(CURRENT_VERSION);
        dst.put_u8(UNFRAGMENTED);
        dst.put_u16_le(HDR_TYPE_DATA);
        dst.put_i32_le(0);
        dst.put_i32_le(session_id);
        dst.put_i32_le(stream_id);
        dst.put_i32_le(0);
        dst.put_i64_le(0);
        Self {
            bytes: dst.freeze(),
        }
    }

    /// Encoded template bytes (always `DATA_HEADER_LENGTH` long).
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn session_id(&self) -> i32 {
        i32::from_le_bytes([self.bytes[12], self.bytes[13], self.bytes[14], self.bytes[15]])
    }

    pub fn stream_id(&self) -> i32 {
        i32::from_le_bytes([self.bytes[16], self.bytes[17], self.bytes[18], self.bytes[19]])
    }

    /// Write the header at `term_offset` in its unpublished state.
    ///
    /// The length field holds `-frame_length` until the caller publishes the
    /// frame with [`frame_length_ordered`].
    pub fn write(&self, buffer: &AtomicBuffer, term_offset: usize, frame_length: i32, term_id: i32) {
        buffer.put_i32_ordered(term_offset + FRAME_LENGTH_FIELD_OFFSET, -frame_length);
        buffer.put_bytes(term_offset + VERSION_FIELD_OFFSET, &self.bytes[VERSION_FIELD_OFFSET..]);
        buffer.put_i32(term_offset + TERM_OFFSET_FIELD_OFFSET, term_offset as i32);
        buffer.put_i32(term_offset + TERM_ID_FIELD_OFFSET, term_id);
    }
}
