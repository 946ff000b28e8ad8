use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::atomic_buffer::AtomicBuffer;
use crate::descriptor::{
    check_partition_count, check_term_length, index_by_term_count, position_bits_to_shift,
    DEFAULT_PARTITION_COUNT, TERM_MIN_LENGTH,
};
use crate::error::{BufferError, Result};
use crate::frame::DATA_HEADER_LENGTH;

/// Upper bound on a single message regardless of term length: 16 MiB.
pub const MAX_MESSAGE_LENGTH: i32 = 16 * 1024 * 1024;

const METADATA_ALIGNMENT: usize = 64;

/// Geometry of a log buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LogBufferConfig {
    /// Bytes per term. Power of two between 64 KiB and 1 GiB. Default: 64 KiB.
    pub term_length: i32,
    /// Number of term buffers in the ring. Power of two >= 2. Default: 4.
    pub partition_count: usize,
    /// Term id of the first term in the stream. Default: 0.
    pub initial_term_id: i32,
}

impl Default for LogBufferConfig {
    fn default() -> Self {
        Self {
            term_length: TERM_MIN_LENGTH,
            partition_count: DEFAULT_PARTITION_COUNT,
            initial_term_id: 0,
        }
    }
}

impl LogBufferConfig {
    /// Check the geometry without allocating.
    pub fn validate(&self) -> Result<()> {
        check_term_length(self.term_length)?;
        check_partition_count(self.partition_count)
    }

    /// Parse and validate a JSON config object. Missing fields take defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

/// A ring of term buffers plus the metadata block describing them.
///
/// Metadata layout for `n` partitions:
/// ```text
/// 0          tail counter per partition, (term_id << 32) | tail_offset, 8B each
/// 8n         active term count (i32)
/// 8n + 8     end of stream position (i64)
/// 8n + 16    initial term id (i32)
/// 8n + 20    term length (i32)
/// ```
///
/// The producer owns the tails, the active term count and the end of stream
/// position; readers only load them.
pub struct LogBuffer {
    term_buffers: Vec<AtomicBuffer>,
    metadata: AtomicBuffer,
    term_length: i32,
    partition_count: usize,
    initial_term_id: i32,
    position_bits_to_shift: u32,
}

impl LogBuffer {
    /// Allocate a zeroed log buffer with the given geometry.
    pub fn new(config: &LogBufferConfig) -> Result<Self> {
        config.validate()?;

        let partition_count = config.partition_count;
        let term_buffers = (0..partition_count)
            .map(|_| AtomicBuffer::allocate(config.term_length as usize))
            .collect();
        let metadata = AtomicBuffer::allocate(metadata_length(partition_count));

        let log = Self {
            term_buffers,
            metadata,
            term_length: config.term_length,
            partition_count,
            initial_term_id: config.initial_term_id,
            position_bits_to_shift: position_bits_to_shift(config.term_length),
        };
        log.initialise_metadata();

        debug!(
            term_length = config.term_length,
            partition_count,
            initial_term_id = config.initial_term_id,
            "allocated log buffer"
        );
        Ok(log)
    }

    fn initialise_metadata(&self) {
        let count = self.partition_count as i32;
        self.set_raw_tail_ordered(0, pack_tail(self.initial_term_id, 0));
        for index in 1..self.partition_count {
            let expected_term_id = self
                .initial_term_id
                .wrapping_add(index as i32)
                .wrapping_sub(count);
            self.set_raw_tail_ordered(index, pack_tail(expected_term_id, 0));
        }
        self.metadata.put_i32(self.initial_term_id_offset(), self.initial_term_id);
        self.metadata.put_i32(self.term_length_offset(), self.term_length);
        self.metadata.put_i64_ordered(self.end_of_stream_offset(), i64::MAX);
        self.metadata.put_i32_ordered(self.active_term_count_offset(), 0);
    }

    pub fn term_length(&self) -> i32 {
        self.term_length
    }

    pub fn partition_count(&self) -> usize {
        self.partition_count
    }

    pub fn initial_term_id(&self) -> i32 {
        self.initial_term_id
    }

    pub fn position_bits_to_shift(&self) -> u32 {
        self.position_bits_to_shift
    }

    /// Largest payload a single unfragmented frame may carry.
    pub fn max_payload_length(&self) -> usize {
        let max_frame = (self.term_length / 8).min(MAX_MESSAGE_LENGTH);
        (max_frame - DATA_HEADER_LENGTH) as usize
    }

    /// Term buffer in ring slot `index`.
    ///
    /// Panics if `index >= partition_count`; indices derived from positions are
    /// masked into range.
    pub fn term_buffer(&self, index: usize) -> &AtomicBuffer {
        &self.term_buffers[index]
    }

    pub fn term_buffers(&self) -> &[AtomicBuffer] {
        &self.term_buffers
    }

    pub fn metadata(&self) -> &AtomicBuffer {
        &self.metadata
    }

    /// Acquire-load the raw tail of partition `index`.
    pub fn raw_tail_volatile(&self, index: usize) -> i64 {
        self.metadata.get_i64_volatile(self.tail_counter_offset(index))
    }

    /// Release-store the raw tail of partition `index`.
    pub fn set_raw_tail_ordered(&self, index: usize, raw_tail: i64) {
        self.metadata
            .put_i64_ordered(self.tail_counter_offset(index), raw_tail);
    }

    /// Metadata offset of the tail counter for partition `index`.
    pub fn tail_counter_offset(&self, index: usize) -> usize {
        assert!(
            index < self.partition_count,
            "partition index {index} out of range (count {})",
            self.partition_count
        );
        index * 8
    }

    pub fn active_term_count(&self) -> i32 {
        self.metadata
            .get_i32_volatile(self.active_term_count_offset())
    }

    /// Ring slot the producer is currently appending to.
    pub fn active_partition_index(&self) -> usize {
        index_by_term_count(i64::from(self.active_term_count()), self.partition_count)
    }

    /// Position at which the producer declared the stream finished.
    ///
    /// `i64::MAX` while the stream is open.
    pub fn end_of_stream_position(&self) -> i64 {
        self.metadata.get_i64_volatile(self.end_of_stream_offset())
    }

    pub fn set_end_of_stream_position(&self, position: i64) {
        self.metadata
            .put_i64_ordered(self.end_of_stream_offset(), position);
        debug!(position, "end of stream position set");
    }

    /// Move the producer on to the term after `current_term_id`.
    ///
    /// Primes the next partition's tail with `current_term_id + 1` if it still
    /// holds the term that last used that slot, then advances the active term
    /// count. Returns false when another producer already rotated.
    pub fn rotate_log(&self, current_term_count: i32, current_term_id: i32) -> bool {
        let next_term_id = current_term_id.wrapping_add(1);
        let next_term_count = current_term_count.wrapping_add(1);
        let next_index = index_by_term_count(i64::from(next_term_count), self.partition_count);
        let expected_term_id = next_term_id.wrapping_sub(self.partition_count as i32);
        let tail_offset = self.tail_counter_offset(next_index);

        loop {
            let raw_tail = self.metadata.get_i64_volatile(tail_offset);
            if raw_tail_term_id(raw_tail) != expected_term_id {
                break;
            }
            if self
                .metadata
                .compare_and_set_i64(tail_offset, raw_tail, pack_tail(next_term_id, 0))
            {
                break;
            }
        }

        let rotated = self.metadata.compare_and_set_i32(
            self.active_term_count_offset(),
            current_term_count,
            next_term_count,
        );
        if rotated {
            debug!(term_id = next_term_id, term_count = next_term_count, "rotated log");
        }
        rotated
    }

    /// Zero the term buffer in ring slot `index` so it can be reused.
    ///
    /// # Safety
    ///
    /// No reader may be inside the term: every image's position must be past
    /// its end, so no handler still borrows one of its frames.
    pub unsafe fn clean_term(&self, index: usize) -> Result<()> {
        if index >= self.partition_count {
            return Err(BufferError::InvalidPartitionIndex {
                index,
                count: self.partition_count,
            });
        }
        let buffer = &self.term_buffers[index];
        buffer.set_memory(0, buffer.capacity(), 0);
        Ok(())
    }

    fn active_term_count_offset(&self) -> usize {
        self.partition_count * 8
    }

    fn end_of_stream_offset(&self) -> usize {
        self.partition_count * 8 + 8
    }

    fn initial_term_id_offset(&self) -> usize {
        self.partition_count * 8 + 16
    }

    fn term_length_offset(&self) -> usize {
        self.partition_count * 8 + 20
    }
}

impl std::fmt::Debug for LogBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBuffer")
            .field("term_length", &self.term_length)
            .field("partition_count", &self.partition_count)
            .field("initial_term_id", &self.initial_term_id)
            .finish()
    }
}

fn metadata_length(partition_count: usize) -> usize {
    let raw = partition_count * 8 + 24;
    raw.div_ceil(METADATA_ALIGNMENT) * METADATA_ALIGNMENT
}

/// Pack a term id and tail offset into a raw tail value.
pub fn pack_tail(term_id: i32, tail_offset: i32) -> i64 {
    (i64::from(term_id) << 32) | (i64::from(tail_offset) & 0xFFFF_FFFF)
}

/// Term id half of a raw tail.
pub fn raw_tail_term_id(raw_tail: i64) -> i32 {
    (raw_tail >> 32) as i32
}

/// Tail offset half of a raw tail, capped at the term length.
///
/// The producer adds to the tail before checking for room, so the raw offset
/// may run past the end of the term.
pub fn raw_tail_term_offset(raw_tail: i64, term_length: i32) -> i32 {
    (raw_tail & 0xFFFF_FFFF).min(i64::from(term_length)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> LogBufferConfig {
        LogBufferConfig {
            initial_term_id: 1234,
            ..LogBufferConfig::default()
        }
    }

    #[test]
    fn default_config_is_valid() {
        let config = LogBufferConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.term_length, TERM_MIN_LENGTH);
        assert_eq!(config.partition_count, DEFAULT_PARTITION_COUNT);
    }

    #[test]
    fn config_from_json_fills_defaults() {
        let config = LogBufferConfig::from_json_str(r#"{"term_length": 131072}"#).unwrap();
        assert_eq!(config.term_length, 131072);
        assert_eq!(config.partition_count, DEFAULT_PARTITION_COUNT);
        assert_eq!(config.initial_term_id, 0);
    }

    #[test]
    fn config_from_json_rejects_bad_geometry() {
        let err = LogBufferConfig::from_json_str(r#"{"partition_count": 3}"#).unwrap_err();
        assert!(matches!(err, BufferError::InvalidPartitionCount { count: 3 }));

        let err = LogBufferConfig::from_json_str(r#"{"term_length": "big"}"#).unwrap_err();
        assert!(matches!(err, BufferError::Config(_)));

        let err = LogBufferConfig::from_json_str(r#"{"mtu": 1408}"#).unwrap_err();
        assert!(matches!(err, BufferError::Config(_)));
    }

    #[test]
    fn new_rejects_invalid_term_length() {
        let config = LogBufferConfig {
            term_length: 1000,
            ..LogBufferConfig::default()
        };
        assert!(matches!(
            LogBuffer::new(&config),
            Err(BufferError::InvalidTermLength { length: 1000, .. })
        ));
    }

    #[test]
    fn metadata_is_initialised() {
        let log = LogBuffer::new(&config()).unwrap();

        assert_eq!(log.term_buffers().len(), 4);
        assert!(log
            .term_buffers()
            .iter()
            .all(|term| term.capacity() == TERM_MIN_LENGTH as usize));
        assert_eq!(log.position_bits_to_shift(), 16);
        assert_eq!(log.active_term_count(), 0);
        assert_eq!(log.active_partition_index(), 0);
        assert_eq!(log.end_of_stream_position(), i64::MAX);

        assert_eq!(raw_tail_term_id(log.raw_tail_volatile(0)), 1234);
        assert_eq!(raw_tail_term_id(log.raw_tail_volatile(1)), 1234 + 1 - 4);
        assert_eq!(raw_tail_term_id(log.raw_tail_volatile(3)), 1234 + 3 - 4);
        assert_eq!(log.metadata().get_i32(4 * 8 + 16), 1234);
        assert_eq!(log.metadata().get_i32(4 * 8 + 20), TERM_MIN_LENGTH);
    }

    #[test]
    fn max_payload_length_scales_with_term() {
        let log = LogBuffer::new(&config()).unwrap();
        assert_eq!(log.max_payload_length(), (TERM_MIN_LENGTH / 8 - 32) as usize);
    }

    #[test]
    fn raw_tail_packing() {
        let raw = pack_tail(-5, 96);
        assert_eq!(raw_tail_term_id(raw), -5);
        assert_eq!(raw_tail_term_offset(raw, TERM_MIN_LENGTH), 96);

        let overrun = pack_tail(7, TERM_MIN_LENGTH + 64);
        assert_eq!(raw_tail_term_offset(overrun, TERM_MIN_LENGTH), TERM_MIN_LENGTH);
    }

    #[test]
    fn rotate_primes_next_partition() {
        let log = LogBuffer::new(&config()).unwrap();

        assert!(log.rotate_log(0, 1234));
        assert_eq!(log.active_term_count(), 1);
        assert_eq!(log.active_partition_index(), 1);
        assert_eq!(log.raw_tail_volatile(1), pack_tail(1235, 0));

        // A second rotation from the same term count is a no-op.
        assert!(!log.rotate_log(0, 1234));
        assert_eq!(log.active_term_count(), 1);
    }

    #[test]
    fn end_of_stream_position_round_trips() {
        let log = LogBuffer::new(&config()).unwrap();
        log.set_end_of_stream_position(4096);
        assert_eq!(log.end_of_stream_position(), 4096);
    }

    #[test]
    fn clean_term_zeroes_buffer() {
        let log = LogBuffer::new(&config()).unwrap();
        log.term_buffer(2).put_i64(64, -1);
        // SAFETY: no reader exists.
        unsafe { log.clean_term(2) }.unwrap();
        assert_eq!(log.term_buffer(2).get_i64(64), 0);

        assert!(matches!(
            unsafe { log.clean_term(4) },
            Err(BufferError::InvalidPartitionIndex { index: 4, count: 4 })
        ));
    }
}
