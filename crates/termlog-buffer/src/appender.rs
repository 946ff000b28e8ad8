use tracing::trace;

use crate::atomic_buffer::AtomicBuffer;
use crate::descriptor::{align, FRAME_ALIGNMENT};
use crate::error::{BufferError, Result};
use crate::frame::{
    frame_length_ordered, HeaderTemplate, DATA_HEADER_LENGTH, HDR_TYPE_PAD,
    RESERVED_VALUE_FIELD_OFFSET, TYPE_FIELD_OFFSET,
};
use crate::log_buffer::{raw_tail_term_id, LogBuffer};

/// Result of an append that did not fail outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// The frame was published; the term tail now ends at `resulting_offset`.
    Appended { resulting_offset: i32 },
    /// The frame did not fit. Any remaining space in the term was filled with
    /// a padding frame and the producer should rotate past `term_id`.
    Tripped { term_id: i32 },
}

/// Appends frames to one partition of a log buffer.
///
/// Space is claimed by atomically adding the aligned frame length to the
/// partition's raw tail, so several appenders may share a partition. Each
/// frame is written with a negative length and published by a final release
/// store of the positive length.
pub struct TermAppender<'a> {
    log: &'a LogBuffer,
    partition_index: usize,
    tail_counter_offset: usize,
}

impl<'a> TermAppender<'a> {
    /// Create an appender for ring slot `partition_index`.
    pub fn new(log: &'a LogBuffer, partition_index: usize) -> Result<Self> {
        if partition_index >= log.partition_count() {
            return Err(BufferError::InvalidPartitionIndex {
                index: partition_index,
                count: log.partition_count(),
            });
        }
        Ok(Self {
            log,
            partition_index,
            tail_counter_offset: log.tail_counter_offset(partition_index),
        })
    }

    pub fn partition_index(&self) -> usize {
        self.partition_index
    }

    /// Current raw tail of this partition.
    pub fn raw_tail_volatile(&self) -> i64 {
        self.log.raw_tail_volatile(self.partition_index)
    }

    /// Append `payload` as a single unfragmented data frame.
    pub fn append_unfragmented(
        &self,
        header: &HeaderTemplate,
        payload: &[u8],
    ) -> Result<AppendOutcome> {
        self.append_unfragmented_with_reserved_value(header, payload, 0)
    }

    /// Append `payload` as a single data frame carrying `reserved_value`.
    pub fn append_unfragmented_with_reserved_value(
        &self,
        header: &HeaderTemplate,
        payload: &[u8],
        reserved_value: i64,
    ) -> Result<AppendOutcome> {
        let max = self.log.max_payload_length();
        if payload.len() > max {
            return Err(BufferError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let frame_length = payload.len() as i32 + DATA_HEADER_LENGTH;
        let (term_offset, term_id) = match self.claim(header, frame_length) {
            Claim::Space {
                term_offset,
                term_id,
            } => (term_offset, term_id),
            Claim::Tripped { term_id } => return Ok(AppendOutcome::Tripped { term_id }),
        };

        let term = self.term_buffer();
        header.write(term, term_offset, frame_length, term_id);
        term.put_bytes(term_offset + DATA_HEADER_LENGTH as usize, payload);
        term.put_i64(term_offset + RESERVED_VALUE_FIELD_OFFSET, reserved_value);
        frame_length_ordered(term, term_offset, frame_length);

        Ok(AppendOutcome::Appended {
            resulting_offset: term_offset as i32 + align(frame_length, FRAME_ALIGNMENT),
        })
    }

    /// Append a padding frame of `length` bytes (header included).
    pub fn append_padding(&self, header: &HeaderTemplate, length: i32) -> Result<AppendOutcome> {
        if length < DATA_HEADER_LENGTH {
            return Err(BufferError::InvalidPaddingLength { length });
        }

        let (term_offset, term_id) = match self.claim(header, length) {
            Claim::Space {
                term_offset,
                term_id,
            } => (term_offset, term_id),
            Claim::Tripped { term_id } => return Ok(AppendOutcome::Tripped { term_id }),
        };

        write_padding(self.term_buffer(), header, term_offset, length, term_id);
        Ok(AppendOutcome::Appended {
            resulting_offset: term_offset as i32 + align(length, FRAME_ALIGNMENT),
        })
    }

    /// Reserve space for a frame. When the term is exhausted, pads whatever
    /// space the claim straddled and reports the trip.
    fn claim(&self, header: &HeaderTemplate, frame_length: i32) -> Claim {
        let aligned_length = align(frame_length, FRAME_ALIGNMENT);
        let raw_tail = self
            .log
            .metadata()
            .get_and_add_i64(self.tail_counter_offset, i64::from(aligned_length));
        let term_id = raw_tail_term_id(raw_tail);
        let term_offset = raw_tail & 0xFFFF_FFFF;
        let term_length = i64::from(self.log.term_length());

        if term_offset + i64::from(aligned_length) > term_length {
            if term_offset < term_length {
                let padding_length = (term_length - term_offset) as i32;
                write_padding(
                    self.term_buffer(),
                    header,
                    term_offset as usize,
                    padding_length,
                    term_id,
                );
                trace!(term_id, term_offset, padding_length, "padded end of term");
            }
            return Claim::Tripped { term_id };
        }

        Claim::Space {
            term_offset: term_offset as usize,
            term_id,
        }
    }

    fn term_buffer(&self) -> &AtomicBuffer {
        self.log.term_buffer(self.partition_index)
    }
}

enum Claim {
    Space { term_offset: usize, term_id: i32 },
    Tripped { term_id: i32 },
}

fn write_padding(
    term: &AtomicBuffer,
    header: &HeaderTemplate,
    term_offset: usize,
    length: i32,
    term_id: i32,
) {
    header.write(term, term_offset, length, term_id);
    term.put_u16(term_offset + TYPE_FIELD_OFFSET, HDR_TYPE_PAD);
    frame_length_ordered(term, term_offset, length);
}
