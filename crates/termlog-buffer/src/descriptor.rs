//! Log geometry and the position codec.
//!
//! A stream position is a flat `i64` that packs the number of terms since the
//! initial term into the high bits and the offset inside the term into the
//! low `log2(term_length)` bits:
//!
//! ```text
//! position = ((term_id - initial_term_id) << bits_to_shift) | term_offset
//! ```

use crate::error::{BufferError, Result};

/// Smallest supported term length: 64 KiB.
pub const TERM_MIN_LENGTH: i32 = 64 * 1024;

/// Largest supported term length: 1 GiB.
pub const TERM_MAX_LENGTH: i32 = 1024 * 1024 * 1024;

/// Number of term buffers in the ring unless configured otherwise.
pub const DEFAULT_PARTITION_COUNT: usize = 4;

/// Every frame starts on a multiple of this many bytes.
pub const FRAME_ALIGNMENT: i32 = 32;

/// Round `value` up to the next multiple of `alignment` (a power of two).
pub const fn align(value: i32, alignment: i32) -> i32 {
    (value + (alignment - 1)) & !(alignment - 1)
}

/// Number of low bits a position reserves for the term offset.
pub fn position_bits_to_shift(term_length: i32) -> u32 {
    term_length.trailing_zeros()
}

/// Term id for a position.
///
/// The shift is done on the full 64-bit value so positions above `2^31` decode
/// to the right term.
pub fn compute_term_id_from_position(position: i64, bits_to_shift: u32, initial_term_id: i32) -> i32 {
    ((position >> bits_to_shift) as i32).wrapping_add(initial_term_id)
}

/// Offset within its term for a position.
pub fn compute_term_offset_from_position(position: i64, bits_to_shift: u32) -> i32 {
    let mask = (1i64 << bits_to_shift) - 1;
    (position & mask) as i32
}

/// Position for `(term_id, term_offset)`.
///
/// Callers must pass `0 <= term_offset < term_length` and
/// `term_id >= initial_term_id`.
pub fn compute_position(
    term_id: i32,
    term_offset: i32,
    bits_to_shift: u32,
    initial_term_id: i32,
) -> i64 {
    let term_count = i64::from(term_id.wrapping_sub(initial_term_id));
    (term_count << bits_to_shift) + i64::from(term_offset)
}

/// Position at which `active_term_id` begins.
pub fn compute_term_begin_position(
    active_term_id: i32,
    bits_to_shift: u32,
    initial_term_id: i32,
) -> i64 {
    compute_position(active_term_id, 0, bits_to_shift, initial_term_id)
}

/// Ring slot holding the term that contains `position`.
pub fn index_by_position(position: i64, bits_to_shift: u32, partition_count: usize) -> usize {
    ((position >> bits_to_shift) as usize) & (partition_count - 1)
}

/// Ring slot holding `active_term_id`.
pub fn index_by_term(initial_term_id: i32, active_term_id: i32, partition_count: usize) -> usize {
    (active_term_id.wrapping_sub(initial_term_id) as u32 as usize) & (partition_count - 1)
}

/// Ring slot for the `term_count`-th term since the initial one.
pub fn index_by_term_count(term_count: i64, partition_count: usize) -> usize {
    (term_count as usize) & (partition_count - 1)
}

/// Check that `term_length` is a power of two inside the supported range.
pub fn check_term_length(term_length: i32) -> Result<()> {
    if !(TERM_MIN_LENGTH..=TERM_MAX_LENGTH).contains(&term_length)
        || (term_length & (term_length - 1)) != 0
    {
        return Err(BufferError::InvalidTermLength {
            length: term_length,
            min: TERM_MIN_LENGTH,
            max: TERM_MAX_LENGTH,
        });
    }
    Ok(())
}

/// Check that the ring size is a power of two of at least 2.
pub fn check_partition_count(partition_count: usize) -> Result<()> {
    if partition_count < 2 || !partition_count.is_power_of_two() {
        return Err(BufferError::InvalidPartitionCount {
            count: partition_count,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const INITIAL_TERM_ID: i32 = 1234;

    #[test]
    fn align_rounds_up_to_frame_boundary() {
        assert_eq!(align(0, FRAME_ALIGNMENT), 0);
        assert_eq!(align(1, FRAME_ALIGNMENT), 32);
        assert_eq!(align(32, FRAME_ALIGNMENT), 32);
        assert_eq!(align(152, FRAME_ALIGNMENT), 160);
    }

    #[test]
    fn bits_to_shift_matches_term_length() {
        assert_eq!(position_bits_to_shift(TERM_MIN_LENGTH), 16);
        assert_eq!(position_bits_to_shift(TERM_MAX_LENGTH), 30);
    }

    #[test]
    fn position_round_trips_across_terms() {
        for term_length in [TERM_MIN_LENGTH, 1024 * 1024, TERM_MAX_LENGTH] {
            let bits = position_bits_to_shift(term_length);
            for term_count in [0, 1, 2, 7, 1000, 1 << 20] {
                let term_id = INITIAL_TERM_ID + term_count;
                for offset in [0, FRAME_ALIGNMENT, term_length / 2, term_length - FRAME_ALIGNMENT] {
                    let position = compute_position(term_id, offset, bits, INITIAL_TERM_ID);
                    assert_eq!(
                        compute_term_id_from_position(position, bits, INITIAL_TERM_ID),
                        term_id
                    );
                    assert_eq!(compute_term_offset_from_position(position, bits), offset);
                }
            }
        }
    }

    #[test]
    fn decodes_positions_above_i32_max() {
        let bits = position_bits_to_shift(TERM_MIN_LENGTH);
        let position = i64::from(i32::MAX) + 1000;

        let term_id = compute_term_id_from_position(position, bits, INITIAL_TERM_ID);
        let offset = compute_term_offset_from_position(position, bits);

        assert_eq!(term_id, INITIAL_TERM_ID + (position >> 16) as i32);
        assert_eq!(i64::from(offset), position & 0xFFFF);
        assert_eq!(compute_position(term_id, offset, bits, INITIAL_TERM_ID), position);
    }

    #[test]
    fn handles_term_id_wraparound() {
        let bits = position_bits_to_shift(TERM_MIN_LENGTH);
        let initial = i32::MAX - 1;
        let term_id = initial.wrapping_add(3);

        let position = compute_position(term_id, 64, bits, initial);
        assert_eq!(position, (3i64 << 16) + 64);
        assert_eq!(compute_term_id_from_position(position, bits, initial), term_id);
    }

    #[test]
    fn index_selection_wraps_the_ring() {
        let bits = position_bits_to_shift(TERM_MIN_LENGTH);
        let term_length = i64::from(TERM_MIN_LENGTH);

        assert_eq!(index_by_position(0, bits, 4), 0);
        assert_eq!(index_by_position(term_length, bits, 4), 1);
        assert_eq!(index_by_position(4 * term_length + 96, bits, 4), 0);
        assert_eq!(index_by_position(5 * term_length, bits, 2), 1);

        assert_eq!(index_by_term(INITIAL_TERM_ID, INITIAL_TERM_ID + 6, 4), 2);
        assert_eq!(index_by_term_count(6, 4), 2);
    }

    #[test]
    fn term_begin_position() {
        let bits = position_bits_to_shift(TERM_MIN_LENGTH);
        assert_eq!(
            compute_term_begin_position(INITIAL_TERM_ID + 2, bits, INITIAL_TERM_ID),
            2 * i64::from(TERM_MIN_LENGTH)
        );
    }

    #[test]
    fn term_length_validation() {
        assert!(check_term_length(TERM_MIN_LENGTH).is_ok());
        assert!(check_term_length(TERM_MAX_LENGTH).is_ok());
        assert!(check_term_length(TERM_MIN_LENGTH / 2).is_err());
        assert!(check_term_length(TERM_MIN_LENGTH + 32).is_err());
        assert!(matches!(
            check_term_length(-TERM_MIN_LENGTH),
            Err(BufferError::InvalidTermLength { .. })
        ));
    }

    #[test]
    fn partition_count_validation() {
        assert!(check_partition_count(2).is_ok());
        assert!(check_partition_count(4).is_ok());
        assert!(check_partition_count(1).is_err());
        assert!(check_partition_count(3).is_err());
        assert!(matches!(
            check_partition_count(0),
            Err(BufferError::InvalidPartitionCount { count: 0 })
        ));
    }
}
