//! Trust list file payload and its install hook
//!
//! A trust list is distributed like any other file. Its content is an entry
//! count (u16) followed by `{key id u16, key type u8, public key [32]}`
//! entries. Installing it replaces the user keys of a shared trust store.

use crate::codec::ByteReader;
use crate::descriptor::FirmwareDescriptor;
use crate::error::{CodecError, UpdateError, UpdateResult};
use crate::storage::InstallHook;
use iotkit_crypto::{KeyId, PublicKey, SharedTrustStore};
use tracing::info;

/// Key type tag for Ed25519 public keys
pub const KEY_TYPE_ED25519: u8 = 1;

/// One accepted key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrustListEntry {
    /// Identifier carried in signature records
    pub key_id: KeyId,
    /// Key type tag
    pub key_type: u8,
    /// Raw public key
    pub public_key: [u8; 32],
}

impl TrustListEntry {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize = 2 + 1 + 32;
}

/// Decoded trust list payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TrustList {
    entries: Vec<TrustListEntry>,
}

impl TrustList {
    /// Trust list accepting exactly `keys`
    pub fn from_public_keys<'a>(keys: impl IntoIterator<Item = &'a PublicKey>) -> Self {
        let entries = keys
            .into_iter()
            .map(|key| TrustListEntry {
                key_id: key.key_id(),
                key_type: KEY_TYPE_ED25519,
                public_key: *key.as_bytes(),
            })
            .collect();
        Self { entries }
    }

    /// Entries in order
    pub fn entries(&self) -> &[TrustListEntry] {
        &self.entries
    }

    /// Keys as trust store entries, named by their identifiers
    pub fn to_public_keys(&self) -> Vec<PublicKey> {
        self.entries
            .iter()
            .map(|entry| {
                PublicKey::from_bytes(entry.public_key, format!("trust-list-{}", entry.key_id))
            })
            .collect()
    }

    /// File content
    pub fn encode(&self) -> Result<Vec<u8>, CodecError> {
        let count = u16::try_from(self.entries.len())
            .ok()
            .ok_or(CodecError::TooManyRecords(self.entries.len()))?;
        let mut out = Vec::with_capacity(2 + self.entries.len() * TrustListEntry::ENCODED_LEN);
        out.extend_from_slice(&count.to_be_bytes());
        for entry in &self.entries {
            out.extend_from_slice(&entry.key_id.0.to_be_bytes());
            out.push(entry.key_type);
            out.extend_from_slice(&entry.public_key);
        }
        Ok(out)
    }

    /// Decode file content, rejecting unknown key types and mismatched identifiers
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let declared = usize::from(reader.u16()?);
        let actual = reader.remaining();
        if declared.checked_mul(TrustListEntry::ENCODED_LEN) != Some(actual) {
            return Err(CodecError::CountMismatch { declared, actual });
        }

        let mut entries = Vec::with_capacity(declared);
        for _ in 0..declared {
            let key_id = KeyId(reader.u16()?);
            let key_type = reader.u8()?;
            let public_key = reader.array::<32>()?;

            if key_type != KEY_TYPE_ED25519 {
                return Err(CodecError::InvalidField {
                    field: "trust_list.key_type",
                    value: u64::from(key_type),
                });
            }
            if KeyId::from_public_key(&public_key) != key_id {
                return Err(CodecError::InvalidField {
                    field: "trust_list.key_id",
                    value: u64::from(key_id.0),
                });
            }

            entries.push(TrustListEntry {
                key_id,
                key_type,
                public_key,
            });
        }
        reader.finish()?;

        Ok(Self { entries })
    }
}

/// Install hook that applies a trust list to a shared trust store
#[derive(Debug, Clone)]
pub struct TrustListInstaller {
    store: SharedTrustStore,
}

impl TrustListInstaller {
    /// Hook updating `store`
    pub fn new(store: SharedTrustStore) -> Self {
        Self { store }
    }
}

impl InstallHook for TrustListInstaller {
    fn install(&mut self, descriptor: &FirmwareDescriptor, content: &[u8]) -> UpdateResult<()> {
        let trust_list = TrustList::decode(content)
            .map_err(|e| UpdateError::InstallFailed(format!("Trust list rejected: {}", e)))?;

        let mut store = self
            .store
            .try_borrow_mut()
            .map_err(|e| UpdateError::InstallFailed(format!("Trust store busy: {}", e)))?;
        let result = store.replace_user_keys(trust_list.to_public_keys())?;
        store.persist()?;

        info!(
            "Installed trust list v{} with {} key(s)",
            descriptor.version, result.imported
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileVersion;
    use iotkit_crypto::{KeyPair, SignatureVerifier, TrustStore};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_encode_decode() -> Result<(), Box<dyn std::error::Error>> {
        let a = KeyPair::generate()?;
        let b = KeyPair::generate()?;
        let list = TrustList::from_public_keys([&a.public_key, &b.public_key]);

        let bytes = list.encode()?;
        assert_eq!(bytes.len(), 2 + 2 * TrustListEntry::ENCODED_LEN);
        assert_eq!(TrustList::decode(&bytes)?, list);
        Ok(())
    }

    #[test]
    fn test_mismatched_key_id_is_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let key = KeyPair::generate()?;
        let mut bytes = TrustList::from_public_keys([&key.public_key]).encode()?;
        if let Some(byte) = bytes.get_mut(2) {
            *byte ^= 0xff;
        }
        assert!(matches!(
            TrustList::decode(&bytes),
            Err(CodecError::InvalidField {
                field: "trust_list.key_id",
                ..
            })
        ));
        Ok(())
    }

    #[test]
    fn test_installer_replaces_user_keys() -> Result<(), Box<dyn std::error::Error>> {
        let old = KeyPair::generate()?;
        let new = KeyPair::generate()?;
        let store: SharedTrustStore = Rc::new(RefCell::new(TrustStore::new_in_memory()));
        store.borrow_mut().add_key(
            old.public_key.clone(),
            iotkit_crypto::TrustLevel::Trusted,
            None,
        )?;

        let content = TrustList::from_public_keys([&new.public_key]).encode()?;
        let descriptor = FirmwareDescriptor::new(
            [0; 16],
            [0; 4],
            FileVersion::new(2, 0, 0),
            u32::try_from(content.len())?,
        );
        TrustListInstaller::new(store.clone()).install(&descriptor, &content)?;

        assert!(store.is_trusted(new.public_key.key_id()));
        assert!(!store.is_trusted(old.public_key.key_id()));
        Ok(())
    }

    #[test]
    fn test_installer_rejects_garbage() {
        let store: SharedTrustStore = Rc::new(RefCell::new(TrustStore::new_in_memory()));
        let descriptor = FirmwareDescriptor::new([0; 16], [0; 4], FileVersion::new(1, 0, 0), 3);
        let result = TrustListInstaller::new(store).install(&descriptor, &[0, 5, 1]);
        assert!(matches!(result, Err(UpdateError::InstallFailed(_))));
    }
}
