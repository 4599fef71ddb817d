//! Cryptographic collaborator for iotkit file updates
//!
//! This crate provides the signing and verification primitives the update
//! pipeline consumes:
//! - Ed25519 key pair generation, signing and verification
//! - Compact 16-bit key identifiers carried inside footer signature records
//! - A trust store holding the accepted-key set
//!
//! # Architecture
//!
//! - [`keys`]: Ed25519 key pairs, public keys and signatures
//! - [`trust_store`]: Accepted keys, their trust levels and who owns them
//! - [`error`]: Error type
//!
//! The update pipeline never touches `ed25519_dalek` directly. It talks to the
//! [`SignatureVerifier`] and [`DataSigner`] traits, so a hardware secure
//! element can stand in for the software implementation.
//!
//! # Example
//!
//! ```
//! use iotkit_crypto::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let keypair = KeyPair::generate()?;
//! let signature = keypair.sign(b"descriptor bytes");
//!
//! let mut store = TrustStore::new_in_memory();
//! store.add_key(keypair.public_key.clone(), TrustLevel::Trusted, None)?;
//!
//! assert!(store.verify_signature(b"descriptor bytes", &signature, keypair.key_id()));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

pub mod error;
pub mod keys;
pub mod prelude;
pub mod trust_store;

pub use error::{CryptoError, CryptoResult};
pub use keys::{KeyPair, PublicKey, Signature};
pub use trust_store::{ImportResult, KeyOrigin, TrustEntry, TrustStore, TrustStoreStats};

/// Trust level for a key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrustLevel {
    /// Accepted for verifying update footers
    Trusted,
    /// Known but not accepted
    Unknown,
    /// Explicitly revoked
    Distrusted,
}

/// Compact key identifier carried in signature records.
///
/// Derived from the first two bytes of the SHA-256 fingerprint of the raw
/// public key, so both sides compute it without exchanging anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct KeyId(pub u16);

impl KeyId {
    /// Compute the identifier for raw Ed25519 public key bytes
    pub fn from_public_key(key_bytes: &[u8; 32]) -> Self {
        let digest = utils::sha256(key_bytes);
        let prefix = digest.first_chunk::<2>().copied().unwrap_or_default();
        KeyId(u16::from_be_bytes(prefix))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}", self.0)
    }
}

/// Verification half of the crypto collaborator
pub trait SignatureVerifier {
    /// Whether `key_id` belongs to the accepted-key set
    fn is_trusted(&self, key_id: KeyId) -> bool;

    /// Verify `signature` over `data` with the accepted key `key_id`.
    ///
    /// Returns `false` for unknown or distrusted keys.
    fn verify_signature(&self, data: &[u8], signature: &Signature, key_id: KeyId) -> bool;
}

/// Signing half of the crypto collaborator
pub trait DataSigner {
    /// Identifier of the key this signer uses
    fn key_id(&self) -> KeyId;

    /// Sign `data`
    fn sign(&self, data: &[u8]) -> Signature;
}

/// Trust store shared between the client verifier and a trust-list install hook
pub type SharedTrustStore = Rc<RefCell<TrustStore>>;

impl<V: SignatureVerifier + ?Sized> SignatureVerifier for Rc<RefCell<V>> {
    fn is_trusted(&self, key_id: KeyId) -> bool {
        self.borrow().is_trusted(key_id)
    }

    fn verify_signature(&self, data: &[u8], signature: &Signature, key_id: KeyId) -> bool {
        self.borrow().verify_signature(data, signature, key_id)
    }
}

pub(crate) mod utils {
    use sha2::{Digest, Sha256};

    pub(crate) fn sha256(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_id_is_stable() {
        let a = KeyId::from_public_key(&[7u8; 32]);
        let b = KeyId::from_public_key(&[7u8; 32]);
        assert_eq!(a, b);
        assert_ne!(a, KeyId::from_public_key(&[8u8; 32]));
    }

    #[test]
    fn test_key_id_display_is_hex() {
        assert_eq!(KeyId(0x0a1f).to_string(), "0a1f");
    }
}
