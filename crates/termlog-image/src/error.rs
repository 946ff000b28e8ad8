/// Errors that can occur while reading from an image.
#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    /// The image was closed and no longer references a log buffer.
    #[error("image is closed")]
    Closed,

    /// A requested position lies outside the range the image may move to.
    #[error("position {position} out of range [{min}, {max}]")]
    PositionOutOfRange { position: i64, min: i64, max: i64 },

    /// A requested position is not on a frame boundary.
    #[error("position {position} is not aligned to {alignment} bytes")]
    UnalignedPosition { position: i64, alignment: i32 },

    /// A published data frame is shorter than its own header.
    #[error("malformed frame at term offset {term_offset} (length {frame_length})")]
    MalformedFrame { term_offset: i32, frame_length: i32 },

    /// A published data frame extends past the end of its term.
    #[error("frame at term offset {term_offset} (length {frame_length}) overruns term of {term_length} bytes")]
    FrameOverrun {
        term_offset: i32,
        frame_length: i32,
        term_length: i32,
    },
}

pub type Result<T> = std::result::Result<T, ImageError>;
