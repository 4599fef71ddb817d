//! Update pipeline for iotkit devices and gateways
//!
//! This crate holds everything about a distributable file except moving it
//! over the network:
//! - File identifiers, versions and gateway file info
//! - The fixed 40-byte descriptor and the multi-signature footer
//! - The [`UpdateInterface`] storage contract with memory and filesystem backends
//! - The verification engine gating every install
//! - The trust list file type that updates the accepted-key set
//!
//! # Architecture
//!
//! - [`types`]: `FileTypeId`, `FileVersion`, `FileInfo`, `MacAddr`
//! - [`descriptor`]: Fixed-size file descriptor
//! - [`footer`]: Signature records, footer codec and signing
//! - [`interface`]: Storage contract per file type
//! - [`storage`]: Memory and filesystem backends
//! - [`verify`]: Verification policy and engine
//! - [`trust_list`]: Trust list payload and install hook
//! - [`error`]: Error types
//!
//! # Safety
//!
//! Only [`UpdateInterface::verify_and_install`] changes the active file, and
//! the backends refuse to activate a staged file that is incomplete, marked
//! invalid, described differently from its footer, or whose content does not
//! hash to the digest the footer's signatures cover.
//!
//! # Example
//!
//! ```
//! use iotkit_update::prelude::*;
//! use iotkit_crypto::prelude::*;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let signer = KeyPair::generate()?;
//! let mut trust = TrustStore::new_in_memory();
//! trust.add_key(signer.public_key.clone(), TrustLevel::Trusted, None)?;
//!
//! let descriptor = FirmwareDescriptor::new(
//!     FirmwareDescriptor::manufacturer_from_str("ACME0000"),
//!     [1, 0, 0, 0],
//!     FileVersion::new(1, 2, 0),
//!     4,
//! );
//! let footer = FooterBuilder::new(descriptor, &[1, 2, 3, 4])
//!     .sign_with(&signer, SignerRole::Firmware)?
//!     .build()?;
//!
//! let engine = VerificationEngine::new(trust, VerificationPolicy::default());
//! assert!(engine.verify(&descriptor, &footer).is_approved());
//!
//! let mut storage = MemoryStorage::new(FileTypeId::Firmware, 1024);
//! storage.save_descriptor(&descriptor)?;
//! storage.write_chunk(&descriptor, 0, &[1, 2, 3, 4])?;
//! storage.verify_and_install(&descriptor, &footer)?;
//! assert_eq!(storage.describe(), Some(FileVersion::new(1, 2, 0)));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod codec;
pub mod descriptor;
pub mod error;
pub mod footer;
pub mod interface;
pub mod prelude;
pub mod storage;
pub mod trust_list;
pub mod types;
pub mod verify;

pub use descriptor::FirmwareDescriptor;
pub use error::{CodecError, UpdateError, UpdateResult};
pub use footer::{FirmwareFooter, FooterBuilder, SignatureRecord, SignerRole};
pub use interface::UpdateInterface;
pub use storage::{FileStorage, InstallHook, MemoryStorage};
pub use trust_list::{TrustList, TrustListEntry, TrustListInstaller};
pub use types::{FileInfo, FileTypeId, FileVersion, MacAddr};
pub use verify::{RejectReason, VerificationEngine, VerificationPolicy, Verdict, verify_footer};
