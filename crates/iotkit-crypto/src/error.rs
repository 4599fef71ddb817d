//! Crypto error type

use crate::KeyId;
use thiserror::Error;

/// Failures from key handling and the trust store
#[derive(Error, Debug)]
pub enum CryptoError {
    /// Bytes are not a usable Ed25519 public key
    #[error("Malformed public key: {0}")]
    MalformedKey(String),

    /// Text encoding of a key or signature could not be decoded
    #[error("Bad {encoding} encoding: {message}")]
    Encoding {
        /// `base64` or `hex`
        encoding: &'static str,
        /// Decoder message
        message: String,
    },

    /// Decoded material has the wrong size
    #[error("{what} must be {expected} bytes, got {actual}")]
    WrongLength {
        /// Kind of material
        what: &'static str,
        /// Required length
        expected: usize,
        /// Length found
        actual: usize,
    },

    /// Trust store file could not be read or written
    #[error("Trust store I/O: {0}")]
    Io(#[from] std::io::Error),

    /// Trust store file is not valid JSON
    #[error("Trust store format: {0}")]
    Format(#[from] serde_json::Error),

    /// No entry for the identifier
    #[error("No trust entry for key {0}")]
    UnknownKey(KeyId),

    /// Entry was provisioned at the factory and is read-only
    #[error("Key {0} is a system key and cannot be changed")]
    SystemKey(KeyId),
}

/// Result alias for this crate
pub type CryptoResult<T> = std::result::Result<T, CryptoError>;
