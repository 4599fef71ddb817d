//! Error types for update storage, codecs and verification

use iotkit_crypto::CryptoError;
use thiserror::Error;

/// Errors raised while decoding fixed binary layouts
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Input ended before a field could be read
    #[error("Truncated input: needed {needed} bytes, {available} available")]
    Truncated {
        /// Bytes required by the next field
        needed: usize,
        /// Bytes left in the input
        available: usize,
    },

    /// Input continued past the end of the record
    #[error("Unexpected {extra} trailing bytes")]
    TrailingBytes {
        /// Number of unread bytes
        extra: usize,
    },

    /// A field held a value outside its domain
    #[error("Invalid value {value} for field {field}")]
    InvalidField {
        /// Field name
        field: &'static str,
        /// Offending value
        value: u64,
    },

    /// A declared element count disagreed with the bytes present
    #[error("Declared {declared} records but {actual} bytes follow")]
    CountMismatch {
        /// Count carried in the record
        declared: usize,
        /// Remaining byte length
        actual: usize,
    },

    /// More records than the count field can represent
    #[error("Too many records: {0}")]
    TooManyRecords(usize),
}

/// Errors returned by update interfaces and the verification pipeline
#[derive(Error, Debug)]
pub enum UpdateError {
    /// Requested file, descriptor or footer does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Storage backend cannot hold the file
    #[error("Storage full: {required} bytes required, {capacity} available")]
    StorageFull {
        /// Bytes the file needs
        required: u64,
        /// Bytes the backend can hold
        capacity: u64,
    },

    /// Offset outside the file or not contiguous with written data
    #[error("Invalid offset {offset} for file of {length} bytes")]
    InvalidOffset {
        /// Requested offset
        offset: u32,
        /// Relevant length bound
        length: u32,
    },

    /// Structurally invalid input
    #[error("Invalid: {0}")]
    Invalid(String),

    /// Staged artifact failed verification
    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    /// Staged content does not hash to the digest the footer signs
    #[error("Content does not match the signed digest")]
    ContentMismatch,

    /// Staged artifact could not be activated
    #[error("Install failed: {0}")]
    InstallFailed(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Binary layout error
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Key handling error
    #[error("Crypto error: {0}")]
    Crypto(#[from] CryptoError),
}

impl UpdateError {
    /// Whether the error came from the storage backend rather than the input
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            UpdateError::StorageFull { .. } | UpdateError::Io(_) | UpdateError::NotFound(_)
        )
    }
}

/// Result type for update operations
pub type UpdateResult<T> = std::result::Result<T, UpdateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_error_display() {
        let err = CodecError::Truncated {
            needed: 40,
            available: 12,
        };
        assert!(err.to_string().contains("40"));
        assert!(err.to_string().contains("12"));
    }

    #[test]
    fn test_codec_error_converts() {
        let err: UpdateError = CodecError::TrailingBytes { extra: 3 }.into();
        assert!(matches!(err, UpdateError::Codec(_)));
        assert!(!err.is_storage_error());
    }

    #[test]
    fn test_storage_classification() {
        let err = UpdateError::StorageFull {
            required: 4096,
            capacity: 1024,
        };
        assert!(err.is_storage_error());
        assert!(!UpdateError::InstallFailed("hook".to_string()).is_storage_error());
    }
}
