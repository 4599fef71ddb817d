//! Error types for fldtctl

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("Package error: {0}")]
    Package(String),

    #[error("Verification failed: {0}")]
    VerificationFailed(String),

    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl CliError {
    /// Process exit status for this error
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::InvalidInput(_) | CliError::JsonError(_) => 2,
            CliError::KeyFile(_) | CliError::Package(_) => 3,
            CliError::VerificationFailed(_) => 4,
            CliError::TransferFailed(_) => 5,
            CliError::IoError(_) => 1,
        }
    }
}
