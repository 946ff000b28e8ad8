/// Errors that can occur while building or appending to a log buffer.
#[derive(Debug, thiserror::Error)]
pub enum BufferError {
    /// Term length is not a power of two inside the supported range.
    #[error("invalid term length {length} (power of two between {min} and {max} required)")]
    InvalidTermLength { length: i32, min: i32, max: i32 },

    /// Partition count is not a power of two of at least 2.
    #[error("invalid partition count {count} (power of two >= 2 required)")]
    InvalidPartitionCount { count: usize },

    /// A partition index outside the ring was requested.
    #[error("partition index {index} out of range (count {count})")]
    InvalidPartitionIndex { index: usize, count: usize },

    /// The payload exceeds the maximum message length for the term length.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// Padding must cover at least one frame header.
    #[error("invalid padding length {length}")]
    InvalidPaddingLength { length: i32 },

    /// Configuration could not be parsed.
    #[error("invalid log buffer configuration: {0}")]
    Config(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BufferError>;
