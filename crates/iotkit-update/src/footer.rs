//! Signed footer appended after the file content
//!
//! Layout: signature count (u8), the 40-byte descriptor, the 32-byte SHA-256
//! of the content, then `count` 69-byte signature records with no padding
//! between them. Signatures cover the descriptor bytes followed by the
//! content digest.

use crate::codec::ByteReader;
use crate::descriptor::FirmwareDescriptor;
use crate::error::{CodecError, UpdateError, UpdateResult};
use iotkit_crypto::{DataSigner, KeyId, Signature};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// SHA-256 size
pub const CONTENT_DIGEST_LEN: usize = 32;

/// SHA-256 of file content
pub fn content_digest(content: &[u8]) -> [u8; CONTENT_DIGEST_LEN] {
    Sha256::digest(content).into()
}

/// Bytes a footer signature covers
pub fn signed_bytes(
    descriptor: &FirmwareDescriptor,
    digest: &[u8; CONTENT_DIGEST_LEN],
) -> Vec<u8> {
    let mut out = Vec::with_capacity(FirmwareDescriptor::ENCODED_LEN + CONTENT_DIGEST_LEN);
    descriptor.encode_into(&mut out);
    out.extend_from_slice(digest);
    out
}

/// Curve identifiers carried in signature records
pub mod ec_type {
    /// Ed25519
    pub const ED25519: u8 = 1;
}

/// Hash identifiers carried in signature records
pub mod hash_type {
    /// SHA-256
    pub const SHA256: u8 = 1;
}

/// Role of the key that produced a signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SignerRole {
    /// Recovery key
    Recovery = 0,
    /// Authentication key
    Auth = 1,
    /// Trust list signing key
    TrustList = 2,
    /// Firmware signing key
    Firmware = 3,
    /// Factory key
    Factory = 4,
}

impl SignerRole {
    /// Map a wire value to a role
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(SignerRole::Recovery),
            1 => Some(SignerRole::Auth),
            2 => Some(SignerRole::TrustList),
            3 => Some(SignerRole::Firmware),
            4 => Some(SignerRole::Factory),
            _ => None,
        }
    }
}

/// One signature over the descriptor and content digest.
///
/// Format fields stay raw so that a footer from a newer signer still decodes
/// and the verification step can reject it with a precise reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureRecord {
    /// Raw signer role
    pub signer_role: u8,
    /// Raw curve identifier
    pub ec_type: u8,
    /// Raw hash identifier
    pub hash_type: u8,
    /// Identifier of the signing key
    pub key_id: KeyId,
    /// Signature bytes
    pub signature: Signature,
}

impl SignatureRecord {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize = 1 + 1 + 1 + 2 + 64;

    /// Ed25519/SHA-256 record
    pub fn ed25519(role: SignerRole, key_id: KeyId, signature: Signature) -> Self {
        Self {
            signer_role: role as u8,
            ec_type: ec_type::ED25519,
            hash_type: hash_type::SHA256,
            key_id,
            signature,
        }
    }

    /// Signer role, if recognized
    pub fn role(&self) -> Option<SignerRole> {
        SignerRole::from_u8(self.signer_role)
    }

    /// Whether the record uses a format this build can verify
    pub fn is_supported_format(&self) -> bool {
        self.role().is_some()
            && self.ec_type == ec_type::ED25519
            && self.hash_type == hash_type::SHA256
    }

    /// Append the wire form to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.push(self.signer_role);
        out.push(self.ec_type);
        out.push(self.hash_type);
        out.extend_from_slice(&self.key_id.0.to_be_bytes());
        out.extend_from_slice(self.signature.as_bytes());
    }

    /// Decode from a reader
    pub fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            signer_role: reader.u8()?,
            ec_type: reader.u8()?,
            hash_type: reader.u8()?,
            key_id: KeyId(reader.u16()?),
            signature: Signature::from_bytes(reader.array::<64>()?),
        })
    }
}

/// Descriptor, content digest and the signatures that authorize installing them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareFooter {
    /// Descriptor the signatures cover
    pub descriptor: FirmwareDescriptor,
    /// SHA-256 of the content the signatures cover
    pub content_digest: [u8; CONTENT_DIGEST_LEN],
    signatures: Vec<SignatureRecord>,
}

impl FirmwareFooter {
    /// Fixed part of the encoding: count byte, descriptor and content digest
    pub const HEADER_LEN: usize = 1 + FirmwareDescriptor::ENCODED_LEN + CONTENT_DIGEST_LEN;

    /// Most signatures a footer can carry
    pub const MAX_SIGNATURES: usize = u8::MAX as usize;

    /// Footer with the given signatures
    pub fn new(
        descriptor: FirmwareDescriptor,
        content_digest: [u8; CONTENT_DIGEST_LEN],
        signatures: Vec<SignatureRecord>,
    ) -> Result<Self, CodecError> {
        if signatures.len() > Self::MAX_SIGNATURES {
            return Err(CodecError::TooManyRecords(signatures.len()));
        }
        Ok(Self {
            descriptor,
            content_digest,
            signatures,
        })
    }

    /// Bytes every signature in this footer must cover
    pub fn signed_bytes(&self) -> Vec<u8> {
        signed_bytes(&self.descriptor, &self.content_digest)
    }

    /// Whether `content` is the content this footer was signed for
    pub fn matches_content(&self, content: &[u8]) -> bool {
        content_digest(content) == self.content_digest
    }

    /// Append a signature
    pub fn push_signature(&mut self, record: SignatureRecord) -> Result<(), CodecError> {
        if self.signatures.len() >= Self::MAX_SIGNATURES {
            return Err(CodecError::TooManyRecords(self.signatures.len().saturating_add(1)));
        }
        self.signatures.push(record);
        Ok(())
    }

    /// Signature records in order
    pub fn signatures(&self) -> &[SignatureRecord] {
        &self.signatures
    }

    /// Value of the count field
    pub fn signature_count(&self) -> u8 {
        u8::try_from(self.signatures.len()).unwrap_or(u8::MAX)
    }

    /// Encoded size in bytes
    pub fn encoded_len(&self) -> usize {
        Self::HEADER_LEN + self.signatures.len() * SignatureRecord::ENCODED_LEN
    }

    /// Wire and on-flash form
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.encoded_len());
        out.push(self.signature_count());
        self.descriptor.encode_into(&mut out);
        out.extend_from_slice(&self.content_digest);
        for record in &self.signatures {
            record.encode_into(&mut out);
        }
        out
    }

    /// Decode exactly one footer.
    ///
    /// The declared count must account for every byte after the descriptor.
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let declared = usize::from(reader.u8()?);
        let descriptor = FirmwareDescriptor::decode_from(&mut reader)?;
        let content_digest = reader.array::<CONTENT_DIGEST_LEN>()?;

        let actual = reader.remaining();
        if declared.checked_mul(SignatureRecord::ENCODED_LEN) != Some(actual) {
            return Err(CodecError::CountMismatch { declared, actual });
        }

        let signatures = (0..declared)
            .map(|_| SignatureRecord::decode_from(&mut reader))
            .collect::<Result<Vec<_>, _>>()?;
        reader.finish()?;

        Ok(Self {
            descriptor,
            content_digest,
            signatures,
        })
    }
}

impl fmt::Display for FirmwareFooter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} with {} signature(s)",
            self.descriptor,
            self.signatures.len()
        )
    }
}

/// Signs a descriptor and its content with one or more keys
#[derive(Debug)]
pub struct FooterBuilder {
    descriptor: FirmwareDescriptor,
    content_digest: [u8; CONTENT_DIGEST_LEN],
    signed_bytes: Vec<u8>,
    signatures: Vec<SignatureRecord>,
}

impl FooterBuilder {
    /// Start a footer for `descriptor` describing `content`
    pub fn new(descriptor: FirmwareDescriptor, content: &[u8]) -> Self {
        let content_digest = content_digest(content);
        Self {
            signed_bytes: signed_bytes(&descriptor, &content_digest),
            descriptor,
            content_digest,
            signatures: Vec::new(),
        }
    }

    /// Add a signature from `signer` in `role`
    pub fn sign_with(mut self, signer: &dyn DataSigner, role: SignerRole) -> UpdateResult<Self> {
        if self.signatures.len() >= FirmwareFooter::MAX_SIGNATURES {
            return Err(UpdateError::Codec(CodecError::TooManyRecords(
                self.signatures.len().saturating_add(1),
            )));
        }
        let signature = signer.sign(&self.signed_bytes);
        self.signatures
            .push(SignatureRecord::ed25519(role, signer.key_id(), signature));
        Ok(self)
    }

    /// Finish the footer
    pub fn build(self) -> UpdateResult<FirmwareFooter> {
        Ok(FirmwareFooter::new(
            self.descriptor,
            self.content_digest,
            self.signatures,
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileVersion;
    use iotkit_crypto::KeyPair;

    fn descriptor() -> FirmwareDescriptor {
        FirmwareDescriptor::new(
            FirmwareDescriptor::manufacturer_from_str("ACME0000"),
            [1, 0, 0, 0],
            FileVersion::new(1, 2, 0),
            2000,
        )
    }

    #[test]
    fn test_record_length() {
        let record = SignatureRecord::ed25519(
            SignerRole::Firmware,
            KeyId(0x1234),
            Signature::from_bytes([7; 64]),
        );
        let mut out = Vec::new();
        record.encode_into(&mut out);
        assert_eq!(out.len(), SignatureRecord::ENCODED_LEN);
        assert_eq!(out.get(3..5), Some(&[0x12, 0x34][..]));
        assert_eq!(out.get(5..), Some(&[7u8; 64][..]));
    }

    #[test]
    fn test_signed_footer_round_trip() -> Result<(), Box<dyn std::error::Error>> {
        let first = KeyPair::generate()?;
        let second = KeyPair::generate()?;
        let footer = FooterBuilder::new(descriptor(), &[0; 2000])
            .sign_with(&first, SignerRole::Firmware)?
            .sign_with(&second, SignerRole::Auth)?
            .build()?;

        assert_eq!(footer.signature_count(), 2);
        let bytes = footer.encode();
        assert_eq!(bytes.len(), 1 + 40 + 32 + 2 * 69);
        assert_eq!(FirmwareFooter::decode(&bytes)?, footer);
        Ok(())
    }

    #[test]
    fn test_count_must_match_remaining_bytes() -> Result<(), Box<dyn std::error::Error>> {
        let signer = KeyPair::generate()?;
        let mut bytes = FooterBuilder::new(descriptor(), &[0; 2000])
            .sign_with(&signer, SignerRole::Firmware)?
            .build()?
            .encode();

        if let Some(count) = bytes.first_mut() {
            *count = 2;
        }
        assert_eq!(
            FirmwareFooter::decode(&bytes),
            Err(CodecError::CountMismatch {
                declared: 2,
                actual: 69
            })
        );

        if let Some(count) = bytes.first_mut() {
            *count = 1;
        }
        bytes.pop();
        assert!(matches!(
            FirmwareFooter::decode(&bytes),
            Err(CodecError::CountMismatch { declared: 1, .. })
        ));
        Ok(())
    }

    #[test]
    fn test_unknown_format_still_decodes() -> Result<(), CodecError> {
        let mut record = SignatureRecord::ed25519(
            SignerRole::Firmware,
            KeyId(1),
            Signature::from_bytes([0; 64]),
        );
        record.ec_type = 9;
        let footer = FirmwareFooter::new(descriptor(), [0; 32], vec![record])?;

        let decoded = FirmwareFooter::decode(&footer.encode())?;
        let first = decoded.signatures().first().copied();
        assert_eq!(first.map(|r| r.is_supported_format()), Some(false));
        Ok(())
    }

    #[test]
    fn test_zero_signatures_encode() -> Result<(), CodecError> {
        let footer = FirmwareFooter::new(descriptor(), [0; 32], Vec::new())?;
        assert_eq!(footer.encode().len(), FirmwareFooter::HEADER_LEN);
        assert_eq!(FirmwareFooter::decode(&footer.encode())?.signature_count(), 0);
        Ok(())
    }

    #[test]
    fn test_signatures_cover_content() -> Result<(), Box<dyn std::error::Error>> {
        let signer = KeyPair::generate()?;
        let content = vec![0x5a; 2000];
        let footer = FooterBuilder::new(descriptor(), &content)
            .sign_with(&signer, SignerRole::Firmware)?
            .build()?;

        assert!(footer.matches_content(&content));
        let mut tampered = content.clone();
        if let Some(byte) = tampered.last_mut() {
            *byte ^= 1;
        }
        assert!(!footer.matches_content(&tampered));

        let signed = footer.signed_bytes();
        assert_eq!(signed.get(..40), Some(descriptor().encode().as_slice()));
        assert_eq!(signed.get(40..), Some(&content_digest(&content)[..]));
        let first = footer.signatures().first().map(|r| r.signature);
        assert_eq!(first, Some(signer.sign(&signed)));
        Ok(())
    }
}
