//! Frame walking shared by every polling policy.

use termlog_buffer::frame::{frame_length_volatile, is_padding_frame};
use termlog_buffer::{AtomicBuffer, DATA_HEADER_LENGTH, FRAME_ALIGNMENT};
use tracing::warn;

use crate::error::ImageError;
use crate::header::Header;

/// A policy's verdict on the data frame it was just handed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    /// Consume the frame and keep scanning.
    Next,
    /// Consume the frame and stop.
    Stop,
    /// Leave the frame unconsumed and stop.
    Rewind,
}

#[derive(Debug)]
pub(crate) struct ScanOutcome {
    /// Offset of the first byte not consumed.
    pub(crate) offset: i32,
    pub(crate) fragments_read: usize,
    /// Set when the scan stopped on a corrupt frame.
    pub(crate) fault: Option<ImageError>,
}

/// Walks the frames of one term.
pub(crate) struct TermScanner<'a> {
    term: &'a AtomicBuffer,
    term_length: i32,
    initial_term_id: i32,
    position_bits_to_shift: u32,
}

impl<'a> TermScanner<'a> {
    pub(crate) fn new(
        term: &'a AtomicBuffer,
        term_length: i32,
        initial_term_id: i32,
        position_bits_to_shift: u32,
    ) -> Self {
        Self {
            term,
            term_length,
            initial_term_id,
            position_bits_to_shift,
        }
    }

    /// Scan from `offset` towards `limit`, handing data frames to `deliver`.
    ///
    /// Stops at the first unpublished frame, once `fragment_limit` data frames
    /// were consumed, at the first frame that would end past `limit`, or when
    /// `deliver` says so. Padding is consumed silently and does not count
    /// toward the fragment limit. `deliver` receives the payload, the header
    /// and the offset just past the frame.
    pub(crate) fn scan<F>(
        &self,
        mut offset: i32,
        limit: i32,
        fragment_limit: usize,
        mut deliver: F,
    ) -> ScanOutcome
    where
        F: FnMut(&[u8], &Header<'_>, i32) -> Step,
    {
        let mut fragments_read = 0;
        let mut fault = None;
        let term_length = i64::from(self.term_length);

        while fragments_read < fragment_limit && offset < limit {
            let frame_offset = offset as usize;
            let frame_length = frame_length_volatile(self.term, frame_offset);
            if frame_length <= 0 {
                break;
            }

            let frame_end = i64::from(offset) + aligned_length(frame_length);

            if is_padding_frame(self.term, frame_offset) {
                let next = if frame_end > term_length {
                    warn!(
                        term_offset = offset,
                        frame_length, "padding frame overruns term; capping at term end"
                    );
                    term_length
                } else {
                    frame_end
                };
                if next > i64::from(limit) {
                    break;
                }
                offset = next as i32;
                continue;
            }

            if frame_length < DATA_HEADER_LENGTH {
                fault = Some(ImageError::MalformedFrame {
                    term_offset: offset,
                    frame_length,
                });
                break;
            }
            if frame_end > term_length {
                fault = Some(ImageError::FrameOverrun {
                    term_offset: offset,
                    frame_length,
                    term_length: self.term_length,
                });
                break;
            }
            if frame_end > i64::from(limit) {
                break;
            }

            let next = frame_end as i32;
            let header = Header::new(
                self.term,
                frame_offset,
                self.initial_term_id,
                self.position_bits_to_shift,
            );
            // SAFETY: the positive frame length was acquire-loaded, so the
            // producer has finished this frame. The appender only writes past
            // the claimed tail, and a term is rewritten only once cleaned for
            // reuse, which requires every reader to be past its end. The
            // slice does not outlive the `deliver` call.
            let payload = unsafe {
                self.term.slice(
                    frame_offset + DATA_HEADER_LENGTH as usize,
                    (frame_length - DATA_HEADER_LENGTH) as usize,
                )
            };

            match deliver(payload, &header, next) {
                Step::Next => {
                    fragments_read += 1;
                    offset = next;
                }
                Step::Stop => {
                    fragments_read += 1;
                    offset = next;
                    break;
                }
                Step::Rewind => break,
            }
        }

        ScanOutcome {
            offset,
            fragments_read,
            fault,
        }
    }
}

fn aligned_length(frame_length: i32) -> i64 {
    let alignment = i64::from(FRAME_ALIGNMENT);
    (i64::from(frame_length) + alignment - 1) & !(alignment - 1)
}
