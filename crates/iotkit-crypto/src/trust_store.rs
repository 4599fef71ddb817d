//! Accepted-key set
//!
//! Two kinds of entries live here. System keys are provisioned at the factory
//! and never change. User keys are whatever the last installed trust list
//! said, plus anything added by hand. A store can be backed by a JSON file
//! and is written back only on [`TrustStore::persist`].

use crate::error::{CryptoError, CryptoResult};
use crate::keys::{PublicKey, Signature};
use crate::{KeyId, SignatureVerifier, TrustLevel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Who owns an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyOrigin {
    /// Factory root, read-only
    System,
    /// Added by hand or by a trust list
    User,
}

/// One key and how far it is trusted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEntry {
    /// The key
    pub public_key: PublicKey,
    /// Trust decision
    pub level: TrustLevel,
    /// Owner
    pub origin: KeyOrigin,
    /// When the entry was written
    pub added_at: DateTime<Utc>,
    /// Free-form note
    pub note: Option<String>,
}

impl TrustEntry {
    fn new(
        public_key: PublicKey,
        level: TrustLevel,
        origin: KeyOrigin,
        note: Option<String>,
    ) -> Self {
        Self {
            public_key,
            level,
            origin,
            added_at: Utc::now(),
            note,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct StoreFile {
    keys: Vec<TrustEntry>,
}

/// Keys accepted for footer verification, indexed by [`KeyId`]
#[derive(Debug, Default)]
pub struct TrustStore {
    entries: BTreeMap<KeyId, TrustEntry>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl TrustStore {
    /// Store that lives only in memory
    pub fn new_in_memory() -> Self {
        Self::default()
    }

    /// Load the store at `path`; a missing file is an empty store
    pub fn open(path: impl Into<PathBuf>) -> CryptoResult<Self> {
        let path = path.into();
        let entries = if path.exists() {
            Self::read(&path)?
        } else {
            debug!("No trust store at {}, starting empty", path.display());
            BTreeMap::new()
        };
        Ok(Self {
            entries,
            path: Some(path),
            dirty: false,
        })
    }

    fn read(path: &Path) -> CryptoResult<BTreeMap<KeyId, TrustEntry>> {
        let file: StoreFile = serde_json::from_slice(&std::fs::read(path)?)?;
        let mut entries = BTreeMap::new();
        for entry in file.keys {
            entry.public_key.verifying_key()?;
            entries.insert(entry.public_key.key_id(), entry);
        }
        debug!("Loaded {} trust entries from {}", entries.len(), path.display());
        Ok(entries)
    }

    /// Write pending changes to the backing file, if there is one
    pub fn persist(&mut self) -> CryptoResult<()> {
        let Some(path) = self.path.as_ref().filter(|_| self.dirty) else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = StoreFile {
            keys: self.entries.values().cloned().collect(),
        };
        std::fs::write(path, serde_json::to_vec_pretty(&file)?)?;
        self.dirty = false;
        Ok(())
    }

    /// Whether there are changes not yet persisted
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn check_writable(&self, key_id: KeyId) -> CryptoResult<()> {
        match self.entries.get(&key_id) {
            Some(entry) if entry.origin == KeyOrigin::System => Err(CryptoError::SystemKey(key_id)),
            _ => Ok(()),
        }
    }

    /// Add or overwrite a user key
    pub fn add_key(
        &mut self,
        public_key: PublicKey,
        level: TrustLevel,
        note: Option<String>,
    ) -> CryptoResult<()> {
        public_key.verifying_key()?;
        let key_id = public_key.key_id();
        self.check_writable(key_id)?;
        self.entries.insert(
            key_id,
            TrustEntry::new(public_key, level, KeyOrigin::User, note),
        );
        self.dirty = true;
        Ok(())
    }

    /// Add a factory root.
    ///
    /// Re-adding the same system key is a no-op; any other collision fails.
    pub fn add_system_key(&mut self, public_key: PublicKey) -> CryptoResult<()> {
        public_key.verifying_key()?;
        let key_id = public_key.key_id();
        if let Some(existing) = self.entries.get(&key_id)
            && existing.origin == KeyOrigin::System
        {
            return if existing.public_key == public_key {
                Ok(())
            } else {
                Err(CryptoError::SystemKey(key_id))
            };
        }
        self.entries.insert(
            key_id,
            TrustEntry::new(public_key, TrustLevel::Trusted, KeyOrigin::System, None),
        );
        self.dirty = true;
        Ok(())
    }

    /// Drop a user key; returns whether it was present
    pub fn remove_key(&mut self, key_id: KeyId) -> CryptoResult<bool> {
        self.check_writable(key_id)?;
        let removed = self.entries.remove(&key_id).is_some();
        self.dirty |= removed;
        Ok(removed)
    }

    /// Change the trust decision on a user key
    pub fn set_level(
        &mut self,
        key_id: KeyId,
        level: TrustLevel,
        note: Option<String>,
    ) -> CryptoResult<()> {
        self.check_writable(key_id)?;
        let entry = self
            .entries
            .get_mut(&key_id)
            .ok_or(CryptoError::UnknownKey(key_id))?;
        entry.level = level;
        entry.note = note;
        self.dirty = true;
        Ok(())
    }

    /// Swap the user keys for `keys`, all trusted.
    ///
    /// Every key is validated before the store changes. A key whose
    /// identifier belongs to a system key is skipped.
    pub fn replace_user_keys(
        &mut self,
        keys: impl IntoIterator<Item = PublicKey>,
    ) -> CryptoResult<ImportResult> {
        let keys = keys.into_iter().collect::<Vec<_>>();
        for key in &keys {
            key.verifying_key()?;
        }

        self.entries.retain(|_, entry| entry.origin == KeyOrigin::System);
        let mut result = ImportResult::default();
        for key in keys {
            let key_id = key.key_id();
            if self.entries.contains_key(&key_id) {
                warn!("Trust list key {} shadows a system key, skipped", key_id);
                result.skipped += 1;
                continue;
            }
            let note = Some("trust list".to_string());
            self.entries.insert(
                key_id,
                TrustEntry::new(key, TrustLevel::Trusted, KeyOrigin::User, note),
            );
            result.imported += 1;
        }
        self.dirty = true;

        info!(
            "User keys replaced: {} imported, {} skipped",
            result.imported, result.skipped
        );
        Ok(result)
    }

    /// Entry for `key_id`
    pub fn entry(&self, key_id: KeyId) -> Option<&TrustEntry> {
        self.entries.get(&key_id)
    }

    /// Trust decision for `key_id`; unknown identifiers are [`TrustLevel::Unknown`]
    pub fn level(&self, key_id: KeyId) -> TrustLevel {
        self.entry(key_id)
            .map_or(TrustLevel::Unknown, |entry| entry.level)
    }

    /// Entries in identifier order
    pub fn entries(&self) -> impl Iterator<Item = &TrustEntry> {
        self.entries.values()
    }

    /// Whether there is an entry for `key_id`
    pub fn contains_key(&self, key_id: KeyId) -> bool {
        self.entries.contains_key(&key_id)
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store has no entries
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entry counts by level and origin
    pub fn stats(&self) -> TrustStoreStats {
        self.entries
            .values()
            .fold(TrustStoreStats::default(), |mut stats, entry| {
                match entry.level {
                    TrustLevel::Trusted => stats.trusted += 1,
                    TrustLevel::Unknown => stats.unknown += 1,
                    TrustLevel::Distrusted => stats.distrusted += 1,
                }
                if entry.origin == KeyOrigin::System {
                    stats.system += 1;
                }
                stats
            })
    }
}

impl SignatureVerifier for TrustStore {
    fn is_trusted(&self, key_id: KeyId) -> bool {
        self.level(key_id) == TrustLevel::Trusted
    }

    fn verify_signature(&self, data: &[u8], signature: &Signature, key_id: KeyId) -> bool {
        let Some(entry) = self.entry(key_id).filter(|e| e.level == TrustLevel::Trusted) else {
            return false;
        };
        entry
            .public_key
            .verify(data, signature)
            .unwrap_or_else(|e| {
                warn!("Key {} unusable for verification: {}", key_id, e);
                false
            })
    }
}

/// Entry counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TrustStoreStats {
    /// Trusted entries
    pub trusted: usize,
    /// Entries with no decision
    pub unknown: usize,
    /// Revoked entries
    pub distrusted: usize,
    /// Factory roots
    pub system: usize,
}

/// Outcome of [`TrustStore::replace_user_keys`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportResult {
    /// Keys now trusted
    pub imported: usize,
    /// Keys dropped for colliding with a system key
    pub skipped: usize,
}
