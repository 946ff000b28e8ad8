//! Lock-free term log buffers with a polling image reader.
//!
//! A producer appends framed messages to a ring of term buffers; an image
//! reads them back in order and publishes how far it got through a
//! subscriber position counter.
//!
//! # Crate Structure
//!
//! - [`buffer`]: log buffer layout, position codec and the term appender
//! - [`image`]: the image reader and its polling policies
//! - [`config`]: JSON configuration for a whole setup
//! - [`logging`]: `tracing` subscriber setup (behind the `logging` feature)

/// Re-export log buffer types.
pub mod buffer {
    pub use termlog_buffer::*;
}

/// Re-export image types.
pub mod image {
    pub use termlog_image::*;
}

pub mod config;
pub mod logging;

pub use config::{ConfigError, TermlogConfig};
pub use logging::{LogFormat, LogLevel, LoggingConfig};
