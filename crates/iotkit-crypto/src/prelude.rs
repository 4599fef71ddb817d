//! Common imports for signing and trust handling
//!
//! # Example
//!
//! ```
//! use iotkit_crypto::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let keypair = KeyPair::generate()?;
//! println!("key id {}", keypair.key_id());
//! # Ok(())
//! # }
//! ```

pub use crate::error::{CryptoError, CryptoResult};
pub use crate::keys::{KeyPair, PublicKey, Signature};
pub use crate::trust_store::{ImportResult, KeyOrigin, TrustEntry, TrustStore, TrustStoreStats};
pub use crate::{DataSigner, KeyId, SharedTrustStore, SignatureVerifier, TrustLevel};
