//! Shared log buffer layout for termlog.
//!
//! This is the lowest layer of termlog. A log buffer is a ring of fixed-size
//! term buffers plus a metadata block; a single producer appends frames and
//! any number of readers walk them. Everything here is synchronous and
//! lock-free:
//! - [`AtomicBuffer`]: aligned byte region with acquire/release accessors
//! - [`descriptor`]: position codec and log geometry checks
//! - [`frame`]: the data/padding frame header layout
//! - [`LogBuffer`]: term ring plus tails, active term count and end of stream
//! - [`TermAppender`]: producer-side unfragmented append with end-of-term padding

pub mod appender;
pub mod atomic_buffer;
pub mod descriptor;
pub mod error;
pub mod frame;
pub mod log_buffer;

pub use appender::{AppendOutcome, TermAppender};
pub use atomic_buffer::AtomicBuffer;
pub use descriptor::{
    align, compute_position, compute_term_begin_position, compute_term_id_from_position,
    compute_term_offset_from_position, index_by_position, index_by_term, index_by_term_count,
    position_bits_to_shift, DEFAULT_PARTITION_COUNT, FRAME_ALIGNMENT, TERM_MAX_LENGTH,
    TERM_MIN_LENGTH,
};
pub use error::{BufferError, Result};
pub use frame::{FrameType, HeaderTemplate, DATA_HEADER_LENGTH};
pub use log_buffer::{LogBuffer, LogBufferConfig};
