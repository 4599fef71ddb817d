//! Error types for the FLDT protocol engine

use iotkit_update::{CodecError, FileTypeId, MacAddr, UpdateError};
use thiserror::Error;

/// Failure classes reported by the protocol engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Unsupported file type or malformed message; answered, never fatal to the responder
    Protocol,
    /// Delivery failure; retried within the bounded window
    Transport,
    /// Downloaded artifact rejected
    Verification,
    /// Update interface read or write failure; fatal to one session only
    Storage,
    /// Invalid configuration or registration
    Configuration,
}

/// FLDT protocol errors
#[derive(Error, Debug)]
pub enum FldtError {
    /// Message could not be decoded
    #[error("Malformed message: {0}")]
    Malformed(#[from] CodecError),

    /// No binding for the file type and none could be created
    #[error("Unsupported file type: {0}")]
    Unsupported(FileTypeId),

    /// Binding cannot change while a peer is downloading
    #[error("Transfer of {file_type} to {peer} in flight")]
    TransferInFlight {
        /// File type being transferred
        file_type: FileTypeId,
        /// Downloading peer
        peer: MacAddr,
    },

    /// A download session for the file type is running
    #[error("Session for {0} is active")]
    SessionActive(FileTypeId),

    /// Transport could not deliver a frame
    #[error("Transport error: {0}")]
    Transport(String),

    /// Storage or verification failure from the update interface
    #[error("Update error: {0}")]
    Update(#[from] UpdateError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FldtError {
    fn from(e: serde_json::Error) -> Self {
        FldtError::Serialization(e.to_string())
    }
}

impl FldtError {
    /// Failure class of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            FldtError::Malformed(_) | FldtError::Unsupported(_) => ErrorCategory::Protocol,
            FldtError::Transport(_) => ErrorCategory::Transport,
            FldtError::Update(UpdateError::VerificationFailed(_) | UpdateError::ContentMismatch) => {
                ErrorCategory::Verification
            }
            FldtError::Update(_) | FldtError::Io(_) => ErrorCategory::Storage,
            FldtError::TransferInFlight { .. }
            | FldtError::SessionActive(_)
            | FldtError::Config(_)
            | FldtError::Serialization(_) => ErrorCategory::Configuration,
        }
    }

    /// Whether retrying the same operation may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transport | ErrorCategory::Protocol
        ) || matches!(
            self,
            FldtError::TransferInFlight { .. } | FldtError::SessionActive(_)
        )
    }
}

/// Result type for FLDT operations
pub type FldtResult<T> = std::result::Result<T, FldtError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories() {
        assert_eq!(
            FldtError::Unsupported(FileTypeId::User(3)).category(),
            ErrorCategory::Protocol
        );
        assert_eq!(
            FldtError::Update(UpdateError::VerificationFailed("bad".into())).category(),
            ErrorCategory::Verification
        );
        assert_eq!(
            FldtError::Update(UpdateError::ContentMismatch).category(),
            ErrorCategory::Verification
        );
        assert_eq!(
            FldtError::Update(UpdateError::StorageFull {
                required: 2,
                capacity: 1
            })
            .category(),
            ErrorCategory::Storage
        );
    }

    #[test]
    fn test_recoverability() {
        assert!(FldtError::Transport("link down".into()).is_recoverable());
        assert!(
            FldtError::TransferInFlight {
                file_type: FileTypeId::Firmware,
                peer: MacAddr::BROADCAST,
            }
            .is_recoverable()
        );
        assert!(!FldtError::Config("retry_limit".into()).is_recoverable());
    }

    #[test]
    fn test_display_names_file_type() {
        let err = FldtError::SessionActive(FileTypeId::TrustList);
        assert_eq!(err.to_string(), "Session for trust-list is active");
    }
}
