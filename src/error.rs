//! Error types for pixel buffer operations

use thiserror::Error;

/// Main error type for pixel buffer operations
#[derive(Error, Debug)]
pub enum PixelsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A logical coordinate or hypercube lies outside the buffer geometry.
    #[error("Out of bounds: {0}")]
    OutOfBounds(String),

    /// A caller supplied destination buffer has the wrong length.
    #[error("Buffer size incorrect: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// A caller supplied source buffer does not match the size being written.
    #[error("Buffer overflow: expected {expected} bytes, got {actual}")]
    BufferOverflow { expected: u64, actual: u64 },

    #[error("Region of {size} bytes is not a multiple of the row size {row_size}")]
    UnalignedRegion { size: u64, row_size: u64 },

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Pixel buffer is closed: {0}")]
    Closed(String),

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("Decompression error: {0}")]
    Decompression(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// An invariant of this crate was violated; never caused by caller input.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Specialized Result type for pixel buffer operations
pub type Result<T> = std::result::Result<T, PixelsError>;

impl PixelsError {
    pub(crate) fn unsupported(operation: &str, backend: &str) -> Self {
        PixelsError::UnsupportedOperation(format!("{} is not supported by {}", operation, backend))
    }
}

impl From<serde_json::Error> for PixelsError {
    fn from(err: serde_json::Error) -> Self {
        PixelsError::Serialization(err.to_string())
    }
}

impl From<ndarray::ShapeError> for PixelsError {
    fn from(err: ndarray::ShapeError) -> Self {
        PixelsError::Internal(format!("selection shape: {}", err))
    }
}
