//! Prelude for iotkit-update
//!
//! Re-exports the types needed to describe, store, sign and verify files.

pub use crate::descriptor::FirmwareDescriptor;
pub use crate::error::{CodecError, UpdateError, UpdateResult};
pub use crate::footer::{FirmwareFooter, FooterBuilder, SignatureRecord, SignerRole};
pub use crate::interface::UpdateInterface;
pub use crate::storage::{FileStorage, InstallHook, MemoryStorage};
pub use crate::trust_list::{TrustList, TrustListInstaller};
pub use crate::types::{FileInfo, FileTypeId, FileVersion, MacAddr};
pub use crate::verify::{RejectReason, VerificationEngine, VerificationPolicy, Verdict};
