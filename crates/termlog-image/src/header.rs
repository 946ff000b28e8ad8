use serde::Serialize;
use termlog_buffer::frame::{
    FLAGS_FIELD_OFFSET, FRAME_LENGTH_FIELD_OFFSET, RESERVED_VALUE_FIELD_OFFSET,
    SESSION_ID_FIELD_OFFSET, STREAM_ID_FIELD_OFFSET, TERM_ID_FIELD_OFFSET,
    TERM_OFFSET_FIELD_OFFSET, TYPE_FIELD_OFFSET, VERSION_FIELD_OFFSET,
};
use termlog_buffer::{compute_term_begin_position, AtomicBuffer, FrameType, FRAME_ALIGNMENT};

/// Read-only view of the header of the frame being delivered.
///
/// Only valid for the duration of the handler call it is passed to; the
/// underlying term is reused once the producer rotates past it.
#[derive(Debug, Clone, Copy)]
pub struct Header<'a> {
    buffer: &'a AtomicBuffer,
    offset: usize,
    initial_term_id: i32,
    position_bits_to_shift: u32,
}

impl<'a> Header<'a> {
    pub(crate) fn new(
        buffer: &'a AtomicBuffer,
        offset: usize,
        initial_term_id: i32,
        position_bits_to_shift: u32,
    ) -> Self {
        Self {
            buffer,
            offset,
            initial_term_id,
            position_bits_to_shift,
        }
    }

    pub fn frame_length(&self) -> i32 {
        self.buffer.get_i32(self.offset + FRAME_LENGTH_FIELD_OFFSET)
    }

    pub fn version(&self) -> u8 {
        self.buffer.get_u8(self.offset + VERSION_FIELD_OFFSET)
    }

    pub fn flags(&self) -> u8 {
        self.buffer.get_u8(self.offset + FLAGS_FIELD_OFFSET)
    }

    pub fn frame_type(&self) -> FrameType {
        FrameType::from(self.buffer.get_u16(self.offset + TYPE_FIELD_OFFSET))
    }

    pub fn term_offset(&self) -> i32 {
        self.buffer.get_i32(self.offset + TERM_OFFSET_FIELD_OFFSET)
    }

    pub fn session_id(&self) -> i32 {
        self.buffer.get_i32(self.offset + SESSION_ID_FIELD_OFFSET)
    }

    pub fn stream_id(&self) -> i32 {
        self.buffer.get_i32(self.offset + STREAM_ID_FIELD_OFFSET)
    }

    pub fn term_id(&self) -> i32 {
        self.buffer.get_i32(self.offset + TERM_ID_FIELD_OFFSET)
    }

    pub fn reserved_value(&self) -> i64 {
        self.buffer.get_i64(self.offset + RESERVED_VALUE_FIELD_OFFSET)
    }

    pub fn initial_term_id(&self) -> i32 {
        self.initial_term_id
    }

    pub fn position_bits_to_shift(&self) -> u32 {
        self.position_bits_to_shift
    }

    /// Stream position just past the end of this frame.
    ///
    /// Taken from where the frame was found rather than its term offset
    /// field, so a corrupt field cannot skew or overflow it.
    pub fn position(&self) -> i64 {
        let alignment = i64::from(FRAME_ALIGNMENT);
        let frame_end =
            (self.offset as i64 + i64::from(self.frame_length()) + alignment - 1) & !(alignment - 1);
        compute_term_begin_position(
            self.term_id(),
            self.position_bits_to_shift,
            self.initial_term_id,
        ) + frame_end
    }

    /// Copy every field out of the term so it can outlive the handler call.
    pub fn values(&self) -> HeaderValues {
        HeaderValues {
            frame_length: self.frame_length(),
            version: self.version(),
            flags: self.flags(),
            frame_type: self.buffer.get_u16(self.offset + TYPE_FIELD_OFFSET),
            term_offset: self.term_offset(),
            session_id: self.session_id(),
            stream_id: self.stream_id(),
            term_id: self.term_id(),
            reserved_value: self.reserved_value(),
            initial_term_id: self.initial_term_id,
            position_bits_to_shift: self.position_bits_to_shift,
        }
    }
}

/// Owned snapshot of a frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeaderValues {
    pub frame_length: i32,
    pub version: u8,
    pub flags: u8,
    pub frame_type: u16,
    pub term_offset: i32,
    pub session_id: i32,
    pub stream_id: i32,
    pub term_id: i32,
    pub reserved_value: i64,
    pub initial_term_id: i32,
    pub position_bits_to_shift: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use termlog_buffer::frame::{HDR_TYPE_DATA, UNFRAGMENTED};
    use termlog_buffer::{HeaderTemplate, LogBuffer, LogBufferConfig, TermAppender};

    fn log() -> LogBuffer {
        LogBuffer::new(&LogBufferConfig {
            initial_term_id: 1234,
            ..LogBufferConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn reads_fields_written_by_appender() {
        let log = log();
        let appender = TermAppender::new(&log, 0).unwrap();
        let template = HeaderTemplate::new(110, 101);
        appender.append_unfragmented(&template, b"first").unwrap();
        appender
            .append_unfragmented_with_reserved_value(&template, &[0u8; 120], 99)
            .unwrap();

        let header = Header::new(log.term_buffer(0), 64, 1234, log.position_bits_to_shift());

        assert_eq!(header.frame_length(), 152);
        assert_eq!(header.version(), 0);
        assert_eq!(header.flags(), UNFRAGMENTED);
        assert_eq!(header.frame_type(), FrameType::Data);
        assert_eq!(header.term_offset(), 64);
        assert_eq!(header.session_id(), 110);
        assert_eq!(header.stream_id(), 101);
        assert_eq!(header.term_id(), 1234);
        assert_eq!(header.reserved_value(), 99);
        assert_eq!(header.position(), 64 + 160);
    }

    #[test]
    fn position_in_later_term() {
        let log = log();
        let term_length = i64::from(log.term_length());
        log.set_raw_tail_ordered(1, termlog_buffer::log_buffer::pack_tail(1235, 0));
        let appender = TermAppender::new(&log, 1).unwrap();
        appender
            .append_unfragmented(&HeaderTemplate::new(1, 2), b"x")
            .unwrap();

        let header = Header::new(log.term_buffer(1), 0, 1234, log.position_bits_to_shift());

        assert_eq!(header.term_id(), 1235);
        assert_eq!(header.position(), term_length + 64);
    }

    #[test]
    fn position_ignores_corrupt_term_offset_field() {
        let log = log();
        let appender = TermAppender::new(&log, 0).unwrap();
        let template = HeaderTemplate::new(110, 101);
        appender.append_unfragmented(&template, b"first").unwrap();
        appender.append_unfragmented(&template, &[0u8; 120]).unwrap();
        log.term_buffer(0)
            .put_i32(64 + TERM_OFFSET_FIELD_OFFSET, i32::MAX);

        let header = Header::new(log.term_buffer(0), 64, 1234, log.position_bits_to_shift());

        assert_eq!(header.term_offset(), i32::MAX);
        assert_eq!(header.position(), 64 + 160);
    }

    #[test]
    fn values_snapshot_serializes() {
        let log = log();
        let appender = TermAppender::new(&log, 0).unwrap();
        appender
            .append_unfragmented(&HeaderTemplate::new(110, 101), b"payload")
            .unwrap();

        let values = Header::new(log.term_buffer(0), 0, 1234, 16).values();
        assert_eq!(values.frame_type, HDR_TYPE_DATA);
        assert_eq!(values.frame_length, 39);

        let json = serde_json::to_value(values).unwrap();
        assert_eq!(json["session_id"], 110);
        assert_eq!(json["stream_id"], 101);
        assert_eq!(json["term_id"], 1234);
    }
}
