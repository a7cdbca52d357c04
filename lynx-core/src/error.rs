//! Error types for Lynx operations.

use thiserror::Error;

/// Result type alias using Lynx's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during Lynx operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input: k=0, empty query, invalid configuration.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Vector dimension mismatch between index and input.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    /// Vector with the given ID was not found.
    #[error("vector not found: {0}")]
    VectorNotFound(u64),

    /// Operation not valid in the current state: duplicate ID, IVF
    /// operation before centroids exist, write-log overflow.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// IO error during save/load.
    #[error("io error: {0}")]
    IoError(String),

    /// Persisted data failed validation: bad magic, version, or shape.
    #[error("index corrupted: {0}")]
    IndexCorrupted(String),

    /// Request not applicable to the chosen index type.
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DimensionMismatch {
            expected: 128,
            got: 64,
        };
        assert_eq!(err.to_string(), "dimension mismatch: expected 128, got 64");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert!(matches!(err, Error::IoError(_)));
    }
}
