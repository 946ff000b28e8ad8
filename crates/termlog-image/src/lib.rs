//! Message reception over a termlog log buffer.
//!
//! An [`Image`] walks the frames a producer appends to a log buffer and hands
//! each data frame's payload to a handler, keeping a [`SubscriberPosition`]
//! counter in step with what was delivered. Four polling policies share one
//! scanner:
//! - [`Image::poll`]: deliver everything available
//! - [`Image::controlled_poll`]: the handler steers via [`ControlledAction`]
//! - [`Image::bounded_poll`] / [`Image::bounded_controlled_poll`]: as above,
//!   capped by a maximum position

pub mod action;
pub mod error;
pub mod header;
pub mod image;
pub mod position;
mod scanner;

pub use action::ControlledAction;
pub use error::{ImageError, Result};
pub use header::{Header, HeaderValues};
pub use image::{Image, ImageConfig};
pub use position::SubscriberPosition;
