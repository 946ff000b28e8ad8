use std::sync::Arc;

use serde::{Deserialize, Serialize};
use termlog_buffer::{
    compute_term_offset_from_position, index_by_position, LogBuffer, FRAME_ALIGNMENT,
};
use tracing::{debug, trace, warn};

use crate::action::ControlledAction;
use crate::error::{ImageError, Result};
use crate::header::Header;
use crate::position::SubscriberPosition;
use crate::scanner::{Step, TermScanner};

/// Identity of the publication an image is bound to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Correlation id of the subscription-to-publication binding.
    pub correlation_id: i64,
    /// Session id of the publication being read.
    pub session_id: i32,
    /// Where the publication's frames come from, for diagnostics.
    pub source_identity: String,
}

/// Reader of one publication's log buffer.
///
/// The image shares the log buffer with its producer and owns the subscriber
/// position counter. Polling takes `&mut self`: one image is driven by one
/// thread at a time, while the counter can be observed from anywhere through
/// a clone of its [`SubscriberPosition`].
///
/// The published position never runs ahead of the handler: once the counter
/// reads `p`, every data frame before `p` has been delivered and its handler
/// call has returned.
pub struct Image {
    log_buffer: Option<Arc<LogBuffer>>,
    subscriber_position: SubscriberPosition,
    config: ImageConfig,
    join_position: i64,
    term_length: i32,
    term_length_mask: i64,
    position_bits_to_shift: u32,
    initial_term_id: i32,
    end_of_stream_at_close: bool,
}

impl Image {
    /// Create an image with a default identity.
    pub fn new(log_buffer: Arc<LogBuffer>, subscriber_position: SubscriberPosition) -> Self {
        Self::with_config(log_buffer, subscriber_position, ImageConfig::default())
    }

    /// Create an image for the publication described by `config`.
    ///
    /// The subscriber position's current value becomes the join position.
    pub fn with_config(
        log_buffer: Arc<LogBuffer>,
        subscriber_position: SubscriberPosition,
        config: ImageConfig,
    ) -> Self {
        let term_length = log_buffer.term_length();
        let join_position = subscriber_position.get();

        debug!(
            correlation_id = config.correlation_id,
            session_id = config.session_id,
            source_identity = %config.source_identity,
            join_position,
            "image created"
        );

        Self {
            term_length,
            term_length_mask: i64::from(term_length) - 1,
            position_bits_to_shift: log_buffer.position_bits_to_shift(),
            initial_term_id: log_buffer.initial_term_id(),
            log_buffer: Some(log_buffer),
            subscriber_position,
            config,
            join_position,
            end_of_stream_at_close: false,
        }
    }

    pub fn correlation_id(&self) -> i64 {
        self.config.correlation_id
    }

    pub fn session_id(&self) -> i32 {
        self.config.session_id
    }

    pub fn source_identity(&self) -> &str {
        &self.config.source_identity
    }

    pub fn subscriber_position_id(&self) -> i32 {
        self.subscriber_position.id()
    }

    /// Position the image started reading from.
    pub fn join_position(&self) -> i64 {
        self.join_position
    }

    pub fn term_buffer_length(&self) -> i32 {
        self.term_length
    }

    pub fn position_bits_to_shift(&self) -> u32 {
        self.position_bits_to_shift
    }

    pub fn initial_term_id(&self) -> i32 {
        self.initial_term_id
    }

    /// Current subscriber position.
    pub fn position(&self) -> i64 {
        self.subscriber_position.get()
    }

    /// Move the subscriber position without delivering anything.
    ///
    /// The new position must not be behind the current one, must not be past
    /// the end of the current term and must sit on a frame boundary.
    pub fn set_position(&mut self, new_position: i64) -> Result<()> {
        if self.is_closed() {
            return Err(ImageError::Closed);
        }

        let current_position = self.subscriber_position.get();
        let term_begin = current_position - (current_position & self.term_length_mask);
        let limit_position = term_begin + i64::from(self.term_length);

        if new_position < current_position || new_position > limit_position {
            debug!(
                new_position,
                current_position, limit_position, "rejected set_position outside current term"
            );
            return Err(ImageError::PositionOutOfRange {
                position: new_position,
                min: current_position,
                max: limit_position,
            });
        }
        check_alignment(new_position)?;

        self.subscriber_position.set_ordered(new_position);
        Ok(())
    }

    /// True once the position has reached the producer's end of stream.
    pub fn is_end_of_stream(&self) -> bool {
        match &self.log_buffer {
            Some(log) => self.position() >= log.end_of_stream_position(),
            None => self.end_of_stream_at_close,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.log_buffer.is_none()
    }

    /// Release the log buffer. Later polls fail with [`ImageError::Closed`].
    pub fn close(&mut self) {
        if let Some(log) = self.log_buffer.take() {
            let position = self.position();
            self.end_of_stream_at_close = position >= log.end_of_stream_position();
            debug!(
                correlation_id = self.config.correlation_id,
                position, "image closed"
            );
        }
    }

    /// Deliver up to `fragment_limit` available fragments to `handler`.
    ///
    /// Every delivered fragment is committed before the next one is handed
    /// over. Returns the number of fragments delivered.
    pub fn poll<F>(&mut self, mut handler: F, fragment_limit: usize) -> Result<usize>
    where
        F: FnMut(&[u8], &Header<'_>),
    {
        self.drive(None, fragment_limit, |buffer, header| {
            handler(buffer, header);
            ControlledAction::Commit
        })
    }

    /// Deliver up to `fragment_limit` fragments, letting `handler` decide
    /// after each one whether to continue, commit, break or abort.
    pub fn controlled_poll<F>(&mut self, handler: F, fragment_limit: usize) -> Result<usize>
    where
        F: FnMut(&[u8], &Header<'_>) -> ControlledAction,
    {
        self.drive(None, fragment_limit, handler)
    }

    /// Like [`Image::poll`], but never consumes past `max_position`.
    ///
    /// Only fragments that end at or before `max_position` are delivered. The
    /// bound is applied within the current term; a `max_position` in a later
    /// term caps the scan at the current term's end.
    pub fn bounded_poll<F>(
        &mut self,
        mut handler: F,
        max_position: i64,
        fragment_limit: usize,
    ) -> Result<usize>
    where
        F: FnMut(&[u8], &Header<'_>),
    {
        self.drive(Some(max_position), fragment_limit, |buffer, header| {
            handler(buffer, header);
            ControlledAction::Commit
        })
    }

    /// Like [`Image::controlled_poll`], but never consumes past `max_position`.
    pub fn bounded_controlled_poll<F>(
        &mut self,
        handler: F,
        max_position: i64,
        fragment_limit: usize,
    ) -> Result<usize>
    where
        F: FnMut(&[u8], &Header<'_>) -> ControlledAction,
    {
        self.drive(Some(max_position), fragment_limit, handler)
    }

    fn drive<F>(
        &self,
        max_position: Option<i64>,
        fragment_limit: usize,
        mut on_fragment: F,
    ) -> Result<usize>
    where
        F: FnMut(&[u8], &Header<'_>) -> ControlledAction,
    {
        let log = self.log_buffer.as_deref().ok_or(ImageError::Closed)?;

        let initial_position = self.subscriber_position.get();
        check_alignment(initial_position)?;
        let initial_offset =
            compute_term_offset_from_position(initial_position, self.position_bits_to_shift);
        let limit_offset = self.limit_offset(initial_position, initial_offset, max_position);
        if fragment_limit == 0 || limit_offset <= initial_offset {
            return Ok(0);
        }

        let index = index_by_position(
            initial_position,
            self.position_bits_to_shift,
            log.partition_count(),
        );
        let scanner = TermScanner::new(
            log.term_buffer(index),
            self.term_length,
            self.initial_term_id,
            self.position_bits_to_shift,
        );

        let position = &self.subscriber_position;
        let mut committed_position = initial_position;
        let mut committed_offset = initial_offset;

        let outcome = scanner.scan(
            initial_offset,
            limit_offset,
            fragment_limit,
            |buffer, header, frame_end| match on_fragment(buffer, header) {
                ControlledAction::Abort => Step::Rewind,
                ControlledAction::Break => Step::Stop,
                ControlledAction::Commit => {
                    committed_position += i64::from(frame_end - committed_offset);
                    committed_offset = frame_end;
                    position.set_ordered(committed_position);
                    Step::Next
                }
                ControlledAction::Continue => Step::Next,
            },
        );

        let resulting_position = committed_position + i64::from(outcome.offset - committed_offset);
        if resulting_position > committed_position {
            position.set_ordered(resulting_position);
        }

        trace!(
            initial_position,
            resulting_position,
            fragments_read = outcome.fragments_read,
            "polled image"
        );

        match outcome.fault {
            Some(err) => {
                warn!(
                    correlation_id = self.config.correlation_id,
                    position = resulting_position,
                    error = %err,
                    "corrupt frame in log buffer"
                );
                Err(err)
            }
            None => Ok(outcome.fragments_read),
        }
    }

    /// Offset within the current term at which a scan must stop.
    fn limit_offset(&self, position: i64, term_offset: i32, max_position: Option<i64>) -> i32 {
        let term_length = i64::from(self.term_length);
        match max_position {
            None => self.term_length,
            Some(max_position) => max_position
                .saturating_sub(position)
                .saturating_add(i64::from(term_offset))
                .clamp(0, term_length) as i32,
        }
    }
}

/// Frames start on `FRAME_ALIGNMENT` boundaries, so positions must too.
fn check_alignment(position: i64) -> Result<()> {
    if position & i64::from(FRAME_ALIGNMENT - 1) != 0 {
        return Err(ImageError::UnalignedPosition {
            position,
            alignment: FRAME_ALIGNMENT,
        });
    }
    Ok(())
}

impl std::fmt::Debug for Image {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Image")
            .field("correlation_id", &self.config.correlation_id)
            .field("session_id", &self.config.session_id)
            .field("position", &self.position())
            .field("closed", &self.is_closed())
            .finish()
    }
}
