//! Ed25519 keys and signatures
//!
//! Keys travel as base64 (public) or hex (secret seed) text. Equality on
//! keys and signatures is constant time.

use crate::error::{CryptoError, CryptoResult};
use crate::{DataSigner, KeyId, utils};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use ed25519_dalek::{Signer, SigningKey, VerifyingKey};
use serde::{Deserialize, Serialize};
use std::fmt;
use subtle::ConstantTimeEq;

/// Raw Ed25519 public key size
pub const PUBLIC_KEY_LEN: usize = 32;

/// Raw Ed25519 signature size
pub const SIGNATURE_LEN: usize = 64;

/// Secret seed size
pub const SEED_LEN: usize = 32;

fn fixed<const N: usize>(bytes: Vec<u8>, what: &'static str) -> CryptoResult<[u8; N]> {
    <[u8; N]>::try_from(bytes).map_err(|rejected: Vec<u8>| CryptoError::WrongLength {
        what,
        expected: N,
        actual: rejected.len(),
    })
}

fn decode_base64(text: &str) -> CryptoResult<Vec<u8>> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| CryptoError::Encoding {
            encoding: "base64",
            message: e.to_string(),
        })
}

/// Public half of a signing key, with a label for humans
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublicKey {
    #[serde(with = "base64_bytes")]
    bytes: [u8; PUBLIC_KEY_LEN],
    /// Where the key came from (file name, trust list entry, ...)
    pub label: String,
}

impl PublicKey {
    /// Wrap raw key bytes
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_LEN], label: impl Into<String>) -> Self {
        Self {
            bytes,
            label: label.into(),
        }
    }

    /// Parse base64 text as written by [`PublicKey::to_base64`]
    pub fn from_base64(text: &str, label: impl Into<String>) -> CryptoResult<Self> {
        let bytes = fixed(decode_base64(text)?, "public key")?;
        let key = Self::from_bytes(bytes, label);
        key.verifying_key()?;
        Ok(key)
    }

    /// Raw key bytes
    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_LEN] {
        &self.bytes
    }

    /// Base64 text form
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.bytes)
    }

    /// Identifier carried in signature records
    pub fn key_id(&self) -> KeyId {
        KeyId::from_public_key(&self.bytes)
    }

    /// Hex SHA-256 of the raw key
    pub fn fingerprint(&self) -> String {
        hex::encode(utils::sha256(&self.bytes))
    }

    pub(crate) fn verifying_key(&self) -> CryptoResult<VerifyingKey> {
        VerifyingKey::from_bytes(&self.bytes).map_err(|e| CryptoError::MalformedKey(e.to_string()))
    }

    /// Check `signature` over `data`.
    ///
    /// Fails only when the key itself is unusable; a signature that does not
    /// match is `Ok(false)`.
    pub fn verify(&self, data: &[u8], signature: &Signature) -> CryptoResult<bool> {
        let key = self.verifying_key()?;
        let signature = ed25519_dalek::Signature::from_bytes(&signature.0);
        Ok(key.verify_strict(data, &signature).is_ok())
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes.ct_eq(&other.bytes).into()
    }
}

impl Eq for PublicKey {}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.key_id(), self.label)
    }
}

/// Detached Ed25519 signature
#[derive(Debug, Clone, Copy)]
pub struct Signature([u8; SIGNATURE_LEN]);

impl Signature {
    /// Wrap raw signature bytes
    pub fn from_bytes(bytes: [u8; SIGNATURE_LEN]) -> Self {
        Self(bytes)
    }

    /// Raw signature bytes
    pub fn as_bytes(&self) -> &[u8; SIGNATURE_LEN] {
        &self.0
    }

    /// Base64 text form
    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Parse base64 text
    pub fn from_base64(text: &str) -> CryptoResult<Self> {
        fixed(decode_base64(text)?, "signature").map(Self)
    }
}

impl PartialEq for Signature {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for Signature {}

/// Signing key plus its public half
pub struct KeyPair {
    signing_key: SigningKey,
    /// Public half
    pub public_key: PublicKey,
}

impl KeyPair {
    /// Fresh key from the OS random source
    pub fn generate() -> CryptoResult<Self> {
        let signing_key = SigningKey::generate(&mut rand::rngs::OsRng);
        let verifying = signing_key.verifying_key().to_bytes();
        let label = format!("generated-{}", KeyId::from_public_key(&verifying));
        Ok(Self::from_signing_key(signing_key, label))
    }

    /// Rebuild a key from its secret seed
    pub fn from_seed(seed: &[u8; SEED_LEN], label: impl Into<String>) -> Self {
        Self::from_signing_key(SigningKey::from_bytes(seed), label)
    }

    /// Parse a hex-encoded secret seed
    pub fn from_hex(text: &str, label: impl Into<String>) -> CryptoResult<Self> {
        let bytes = hex::decode(text.trim()).map_err(|e| CryptoError::Encoding {
            encoding: "hex",
            message: e.to_string(),
        })?;
        let seed = fixed::<SEED_LEN>(bytes, "secret seed")?;
        Ok(Self::from_seed(&seed, label))
    }

    fn from_signing_key(signing_key: SigningKey, label: impl Into<String>) -> Self {
        let public_key = PublicKey::from_bytes(signing_key.verifying_key().to_bytes(), label);
        Self {
            signing_key,
            public_key,
        }
    }

    /// Secret seed, for writing to a key file
    pub fn seed(&self) -> [u8; SEED_LEN] {
        self.signing_key.to_bytes()
    }

    /// Fingerprint of the public half
    pub fn fingerprint(&self) -> String {
        self.public_key.fingerprint()
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

impl DataSigner for KeyPair {
    fn key_id(&self) -> KeyId {
        self.public_key.key_id()
    }

    fn sign(&self, data: &[u8]) -> Signature {
        Signature(self.signing_key.sign(data).to_bytes())
    }
}

mod base64_bytes {
    use super::{PUBLIC_KEY_LEN, STANDARD};
    use base64::Engine as _;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub(super) fn serialize<S: Serializer>(
        bytes: &[u8; PUBLIC_KEY_LEN],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<[u8; PUBLIC_KEY_LEN], D::Error> {
        let text = String::deserialize(deserializer)?;
        let bytes = STANDARD.decode(text).map_err(D::Error::custom)?;
        <[u8; PUBLIC_KEY_LEN]>::try_from(bytes)
            .map_err(|rejected: Vec<u8>| D::Error::invalid_length(rejected.len(), &"32 key bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_checks_data() -> CryptoResult<()> {
        let keypair = KeyPair::generate()?;
        let signature = keypair.sign(b"descriptor");

        assert!(keypair.public_key.verify(b"descriptor", &signature)?);
        assert!(!keypair.public_key.verify(b"descriptor!", &signature)?);
        Ok(())
    }

    #[test]
    fn test_other_key_does_not_verify() -> CryptoResult<()> {
        let signer = KeyPair::generate()?;
        let other = KeyPair::generate()?;
        let signature = signer.sign(b"data");
        assert!(!other.public_key.verify(b"data", &signature)?);
        Ok(())
    }

    #[test]
    fn test_seed_restores_same_key() -> CryptoResult<()> {
        let original = KeyPair::generate()?;
        let restored = KeyPair::from_hex(&hex::encode(original.seed()), "restored")?;

        assert_eq!(original.public_key, restored.public_key);
        assert_eq!(original.key_id(), restored.key_id());
        assert_eq!(restored.public_key.label, "restored");
        Ok(())
    }

    #[test]
    fn test_public_key_text_form() -> CryptoResult<()> {
        let keypair = KeyPair::generate()?;
        let text = keypair.public_key.to_base64();
        let parsed = PublicKey::from_base64(&format!("{}\n", text), "signer.pub")?;
        assert_eq!(parsed, keypair.public_key);
        Ok(())
    }

    #[test]
    fn test_short_material_is_rejected() {
        let short = STANDARD.encode([0u8; 16]);
        assert!(matches!(
            PublicKey::from_base64(&short, "short"),
            Err(CryptoError::WrongLength {
                what: "public key",
                actual: 16,
                ..
            })
        ));
        assert!(matches!(
            Signature::from_base64(&short),
            Err(CryptoError::WrongLength {
                what: "signature",
                actual: 16,
                ..
            })
        ));
        assert!(matches!(
            KeyPair::from_hex("zz", "bad"),
            Err(CryptoError::Encoding {
                encoding: "hex",
                ..
            })
        ));
    }

    #[test]
    fn test_public_key_serializes_as_base64() -> Result<(), Box<dyn std::error::Error>> {
        let keypair = KeyPair::generate()?;
        let json = serde_json::to_value(&keypair.public_key)?;
        assert_eq!(
            json.get("bytes").and_then(|v| v.as_str()),
            Some(keypair.public_key.to_base64().as_str())
        );

        let back: PublicKey = serde_json::from_value(json)?;
        assert_eq!(back, keypair.public_key);
        Ok(())
    }
}
