//! Error taxonomy for the tag store
//!
//! Error codes:
//! - TAGSTORE_INDEX_OUT_OF_RANGE: byte store bound violation
//! - TAGSTORE_INVALID_RANGE: start/end pair that describes a negative length
//! - TAGSTORE_STORAGE_FAILURE: I/O failure, under-delivering stream, strict-mode corruption
//! - TAGSTORE_INVALID_ARGUMENT: rejected argument or configuration
//!
//! A missing tag is never an error; lookups return `Option::None`.

use std::io;

use thiserror::Error;

/// Errors raised by the byte store, the codec and the tag store.
///
/// Cache layers never introduce a variant of their own.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("index {index} out of range for store of size {size}")]
    IndexOutOfRange { index: u64, size: u64 },

    #[error("invalid range: start {start} is past end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("storage failure: {message}")]
    StorageFailure {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl StoreError {
    /// Storage failure without an underlying I/O error.
    pub fn storage(message: impl Into<String>) -> Self {
        StoreError::StorageFailure {
            message: message.into(),
            source: None,
        }
    }

    /// Storage failure caused by an I/O error.
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        StoreError::StorageFailure {
            message: message.into(),
            source: Some(source),
        }
    }

    /// Storage failure describing a malformed chunk at a byte offset.
    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        StoreError::StorageFailure {
            message: format!("{} (byte_offset: {})", reason.into(), offset),
            source: None,
        }
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        StoreError::InvalidArgument(message.into())
    }

    /// Returns the stable string code for this error
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::IndexOutOfRange { .. } => "TAGSTORE_INDEX_OUT_OF_RANGE",
            StoreError::InvalidRange { .. } => "TAGSTORE_INVALID_RANGE",
            StoreError::StorageFailure { .. } => "TAGSTORE_STORAGE_FAILURE",
            StoreError::InvalidArgument(_) => "TAGSTORE_INVALID_ARGUMENT",
        }
    }

    /// Storage failures leave the backing resource in an unknown state.
    /// Everything else is a rejected call that changed nothing.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::StorageFailure { .. })
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError::io("I/O error", e)
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreError::IndexOutOfRange { index: 3, size: 2 }.code(),
            "TAGSTORE_INDEX_OUT_OF_RANGE"
        );
        assert_eq!(
            StoreError::InvalidRange { start: 4, end: 1 }.code(),
            "TAGSTORE_INVALID_RANGE"
        );
        assert_eq!(StoreError::storage("x").code(), "TAGSTORE_STORAGE_FAILURE");
        assert_eq!(
            StoreError::invalid_argument("x").code(),
            "TAGSTORE_INVALID_ARGUMENT"
        );
    }

    #[test]
    fn test_only_storage_failure_is_fatal() {
        assert!(StoreError::storage("disk gone").is_fatal());
        assert!(!StoreError::IndexOutOfRange { index: 1, size: 0 }.is_fatal());
        assert!(!StoreError::invalid_argument("bad").is_fatal());
    }

    #[test]
    fn test_io_source_is_preserved() {
        let err: StoreError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert!(err.source().is_some());
        assert!(err.to_string().contains("storage failure"));
    }

    #[test]
    fn test_corruption_display_contains_offset() {
        let err = StoreError::corruption_at_offset(1024, "length indicator past end");
        let display = err.to_string();
        assert!(display.contains("length indicator past end"));
        assert!(display.contains("byte_offset: 1024"));
    }
}
