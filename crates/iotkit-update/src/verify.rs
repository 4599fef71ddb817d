//! Verification engine
//!
//! Decides whether a downloaded footer authorizes installing the file whose
//! header was received earlier in the same transfer. The decision is a pure
//! function of the expected descriptor, the footer, the accepted-key set and
//! the [`VerificationPolicy`]. Checks run in order and stop at the first
//! failure:
//!
//! 1. the footer's descriptor is byte-identical to the expected one
//! 2. the footer carries at least `min_signatures` signatures (and never zero)
//! 3. every signature uses a known format and an accepted key
//! 4. at least `required_valid_signatures` signatures verify over the
//!    canonical descriptor bytes followed by the footer's content digest
//!
//! The digest itself is compared against the downloaded content by the
//! storage backend before the staged file becomes active.

use crate::descriptor::FirmwareDescriptor;
use crate::error::{UpdateError, UpdateResult};
use crate::footer::FirmwareFooter;
use iotkit_crypto::{KeyId, SignatureVerifier};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, warn};

/// Signature thresholds applied by the verification engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationPolicy {
    /// Fewest signature records a footer may carry
    pub min_signatures: u8,
    /// Fewest records that must verify cryptographically
    pub required_valid_signatures: u8,
}

impl Default for VerificationPolicy {
    fn default() -> Self {
        Self {
            min_signatures: 1,
            required_valid_signatures: 1,
        }
    }
}

impl VerificationPolicy {
    /// Require every one of `count` signatures to verify
    pub fn all_of(count: u8) -> Self {
        Self {
            min_signatures: count,
            required_valid_signatures: count,
        }
    }

    /// Reject thresholds of zero
    pub fn validate(&self) -> UpdateResult<()> {
        if self.min_signatures == 0 {
            return Err(UpdateError::Invalid(
                "min_signatures must be at least 1".to_string(),
            ));
        }
        if self.required_valid_signatures == 0 {
            return Err(UpdateError::Invalid(
                "required_valid_signatures must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why a footer was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Footer descriptor differs from the received header
    DescriptorMismatch,
    /// Footer carries no signatures
    NoSignatures,
    /// Fewer signatures than the policy minimum
    TooFewSignatures {
        /// Signatures present
        present: usize,
        /// Policy minimum
        required: usize,
    },
    /// A record uses an unrecognized role, curve or hash
    UnknownFormat {
        /// Index of the record
        index: usize,
    },
    /// A record names a key outside the accepted set
    UnknownKey {
        /// Offending key identifier
        key_id: KeyId,
    },
    /// Not enough signatures verified
    InsufficientValidSignatures {
        /// Signatures that verified
        valid: usize,
        /// Policy threshold
        required: usize,
    },
    /// Downloaded content does not hash to the signed digest
    ContentMismatch,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectReason::DescriptorMismatch => {
                write!(f, "footer descriptor does not match the received header")
            }
            RejectReason::NoSignatures => write!(f, "footer carries no signatures"),
            RejectReason::TooFewSignatures { present, required } => {
                write!(f, "{} signature(s) present, {} required", present, required)
            }
            RejectReason::UnknownFormat { index } => {
                write!(f, "signature {} uses an unsupported format", index)
            }
            RejectReason::UnknownKey { key_id } => write!(f, "key {} is not trusted", key_id),
            RejectReason::InsufficientValidSignatures { valid, required } => {
                write!(f, "{} valid signature(s), {} required", valid, required)
            }
            RejectReason::ContentMismatch => {
                write!(f, "content does not match the signed digest")
            }
        }
    }
}

/// Verification result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Install may proceed
    Approved {
        /// Signatures that verified
        valid_signatures: usize,
    },
    /// Artifact must not be installed
    Rejected(RejectReason),
}

impl Verdict {
    /// Whether install may proceed
    pub fn is_approved(&self) -> bool {
        matches!(self, Verdict::Approved { .. })
    }
}

/// Check `footer` against the header received for the same transfer
pub fn verify_footer(
    expected: &FirmwareDescriptor,
    footer: &FirmwareFooter,
    verifier: &dyn SignatureVerifier,
    policy: &VerificationPolicy,
) -> Verdict {
    if footer.descriptor.encode() != expected.encode() {
        return Verdict::Rejected(RejectReason::DescriptorMismatch);
    }
    let signed_bytes = footer.signed_bytes();

    let signatures = footer.signatures();
    if signatures.is_empty() {
        return Verdict::Rejected(RejectReason::NoSignatures);
    }
    let min_signatures = usize::from(policy.min_signatures.max(1));
    if signatures.len() < min_signatures {
        return Verdict::Rejected(RejectReason::TooFewSignatures {
            present: signatures.len(),
            required: min_signatures,
        });
    }

    for (index, record) in signatures.iter().enumerate() {
        if !record.is_supported_format() {
            return Verdict::Rejected(RejectReason::UnknownFormat { index });
        }
        if !verifier.is_trusted(record.key_id) {
            return Verdict::Rejected(RejectReason::UnknownKey {
                key_id: record.key_id,
            });
        }
    }

    let valid = signatures
        .iter()
        .filter(|record| verifier.verify_signature(&signed_bytes, &record.signature, record.key_id))
        .count();
    let required = usize::from(policy.required_valid_signatures.max(1));
    if valid < required {
        return Verdict::Rejected(RejectReason::InsufficientValidSignatures { valid, required });
    }

    Verdict::Approved {
        valid_signatures: valid,
    }
}

/// Verification engine bound to an accepted-key set and a policy
pub struct VerificationEngine {
    verifier: Box<dyn SignatureVerifier>,
    policy: VerificationPolicy,
}

impl VerificationEngine {
    /// Engine using `verifier` for key lookups and signature checks
    pub fn new(verifier: impl SignatureVerifier + 'static, policy: VerificationPolicy) -> Self {
        Self {
            verifier: Box::new(verifier),
            policy,
        }
    }

    /// Active policy
    pub fn policy(&self) -> &VerificationPolicy {
        &self.policy
    }

    /// Check `footer` against `expected`, logging the outcome
    pub fn verify(&self, expected: &FirmwareDescriptor, footer: &FirmwareFooter) -> Verdict {
        let verdict = verify_footer(expected, footer, self.verifier.as_ref(), &self.policy);
        match verdict {
            Verdict::Approved { valid_signatures } => debug!(
                "Footer for v{} approved with {} valid signature(s)",
                expected.version, valid_signatures
            ),
            Verdict::Rejected(reason) => {
                warn!("Footer for v{} rejected: {}", expected.version, reason)
            }
        }
        verdict
    }
}

impl fmt::Debug for VerificationEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VerificationEngine")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::footer::{FooterBuilder, SignatureRecord, SignerRole};
    use crate::types::FileVersion;
    use iotkit_crypto::{KeyPair, Signature, TrustLevel, TrustStore};

    fn descriptor() -> FirmwareDescriptor {
        FirmwareDescriptor::new(
            FirmwareDescriptor::manufacturer_from_str("ACME0000"),
            [1, 0, 0, 0],
            FileVersion::new(1, 2, 0),
            2000,
        )
    }

    fn content() -> Vec<u8> {
        vec![0x42; 2000]
    }

    fn trusting(keys: &[&KeyPair]) -> Result<TrustStore, Box<dyn std::error::Error>> {
        let mut store = TrustStore::new_in_memory();
        for key in keys {
            store.add_key(key.public_key.clone(), TrustLevel::Trusted, None)?;
        }
        Ok(store)
    }

    #[test]
    fn test_single_trusted_signature_approves() -> Result<(), Box<dyn std::error::Error>> {
        let signer = KeyPair::generate()?;
        let store = trusting(&[&signer])?;
        let footer = FooterBuilder::new(descriptor(), &content())
            .sign_with(&signer, SignerRole::Firmware)?
            .build()?;

        let verdict = verify_footer(&descriptor(), &footer, &store, &VerificationPolicy::default());
        assert_eq!(verdict, Verdict::Approved { valid_signatures: 1 });
        Ok(())
    }

    #[test]
    fn test_descriptor_mismatch_checked_first() -> Result<(), Box<dyn std::error::Error>> {
        let signer = KeyPair::generate()?;
        let store = trusting(&[&signer])?;
        let mut other = descriptor();
        other.firmware_length = 2001;
        other.app_size = 2001;
        let footer = FooterBuilder::new(other, &content())
            .sign_with(&signer, SignerRole::Firmware)?
            .build()?;

        let verdict = verify_footer(&descriptor(), &footer, &store, &VerificationPolicy::default());
        assert_eq!(verdict, Verdict::Rejected(RejectReason::DescriptorMismatch));
        Ok(())
    }

    #[test]
    fn test_empty_footer_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let store = TrustStore::new_in_memory();
        let footer = FirmwareFooter::new(descriptor(), [0; 32], Vec::new())?;
        let verdict = verify_footer(&descriptor(), &footer, &store, &VerificationPolicy::default());
        assert_eq!(verdict, Verdict::Rejected(RejectReason::NoSignatures));
        Ok(())
    }

    #[test]
    fn test_untrusted_key_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let trusted = KeyPair::generate()?;
        let stranger = KeyPair::generate()?;
        let store = trusting(&[&trusted])?;
        let footer = FooterBuilder::new(descriptor(), &content())
            .sign_with(&trusted, SignerRole::Firmware)?
            .sign_with(&stranger, SignerRole::Firmware)?
            .build()?;

        let verdict = verify_footer(&descriptor(), &footer, &store, &VerificationPolicy::default());
        assert_eq!(
            verdict,
            Verdict::Rejected(RejectReason::UnknownKey {
                key_id: stranger.public_key.key_id()
            })
        );
        Ok(())
    }

    #[test]
    fn test_unknown_format_rejected() -> Result<(), Box<dyn std::error::Error>> {
        let signer = KeyPair::generate()?;
        let store = trusting(&[&signer])?;
        let mut footer = FooterBuilder::new(descriptor(), &content())
            .sign_with(&signer, SignerRole::Firmware)?
            .build()?;
        let mut record = SignatureRecord::ed25519(
            SignerRole::Firmware,
            signer.public_key.key_id(),
            Signature::from_bytes([0; 64]),
        );
        record.hash_type = 7;
        footer.push_signature(record)?;

        let verdict = verify_footer(&descriptor(), &footer, &store, &VerificationPolicy::default());
        assert_eq!(verdict, Verdict::Rejected(RejectReason::UnknownFormat { index: 1 }));
        Ok(())
    }

    #[test]
    fn test_threshold_policy() -> Result<(), Box<dyn std::error::Error>> {
        let first = KeyPair::generate()?;
        let second = KeyPair::generate()?;
        let store = trusting(&[&first, &second])?;

        let mut footer = FooterBuilder::new(descriptor(), &content())
            .sign_with(&first, SignerRole::Firmware)?
            .build()?;
        footer.push_signature(SignatureRecord::ed25519(
            SignerRole::Auth,
            second.public_key.key_id(),
            Signature::from_bytes([0; 64]),
        ))?;

        let any_one = VerificationPolicy::default();
        assert_eq!(
            verify_footer(&descriptor(), &footer, &store, &any_one),
            Verdict::Approved { valid_signatures: 1 }
        );

        let both = VerificationPolicy::all_of(2);
        assert_eq!(
            verify_footer(&descriptor(), &footer, &store, &both),
            Verdict::Rejected(RejectReason::InsufficientValidSignatures {
                valid: 1,
                required: 2
            })
        );

        let three = VerificationPolicy::all_of(3);
        assert_eq!(
            verify_footer(&descriptor(), &footer, &store, &three),
            Verdict::Rejected(RejectReason::TooFewSignatures {
                present: 2,
                required: 3
            })
        );
        Ok(())
    }

    #[test]
    fn test_policy_validation() {
        assert!(VerificationPolicy::default().validate().is_ok());
        assert!(
            VerificationPolicy {
                min_signatures: 1,
                required_valid_signatures: 0
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn test_swapped_content_digest_fails_signatures() -> Result<(), Box<dyn std::error::Error>> {
        let signer = KeyPair::generate()?;
        let store = trusting(&[&signer])?;
        let mut footer = FooterBuilder::new(descriptor(), &content())
            .sign_with(&signer, SignerRole::Firmware)?
            .build()?;
        footer.content_digest = crate::footer::content_digest(&[0x66; 2000]);

        let verdict = verify_footer(&descriptor(), &footer, &store, &VerificationPolicy::default());
        assert_eq!(
            verdict,
            Verdict::Rejected(RejectReason::InsufficientValidSignatures {
                valid: 0,
                required: 1
            })
        );
        Ok(())
    }

    #[test]
    fn test_descriptor_only_signature_is_not_enough() -> Result<(), Box<dyn std::error::Error>> {
        let signer = KeyPair::generate()?;
        let store = trusting(&[&signer])?;
        let mut footer = FirmwareFooter::new(
            descriptor(),
            crate::footer::content_digest(&content()),
            Vec::new(),
        )?;
        footer.push_signature(SignatureRecord::ed25519(
            SignerRole::Firmware,
            signer.public_key.key_id(),
            iotkit_crypto::DataSigner::sign(&signer, &descriptor().encode()),
        ))?;

        let verdict = verify_footer(&descriptor(), &footer, &store, &VerificationPolicy::default());
        assert!(!verdict.is_approved());
        Ok(())
    }
}
