//! Storage backends implementing [`UpdateInterface`](crate::UpdateInterface)
//!
//! - [`MemoryStorage`]: bounded in-memory files, used by gateways and tests
//! - [`FileStorage`]: one directory per file type with atomic activation

mod file;
mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::descriptor::FirmwareDescriptor;
use crate::error::{UpdateError, UpdateResult};
use crate::footer::{CONTENT_DIGEST_LEN, FirmwareFooter};
use std::ops::Range;

/// Side effect run when a staged file becomes active.
///
/// A failing hook aborts the install and leaves the previous file active.
pub trait InstallHook {
    /// Apply the newly verified `content`
    fn install(&mut self, descriptor: &FirmwareDescriptor, content: &[u8]) -> UpdateResult<()>;
}

impl<F> InstallHook for F
where
    F: FnMut(&FirmwareDescriptor, &[u8]) -> UpdateResult<()>,
{
    fn install(&mut self, descriptor: &FirmwareDescriptor, content: &[u8]) -> UpdateResult<()> {
        self(descriptor, content)
    }
}

/// Byte range served for a chunk request against the active file
fn read_range(
    active: Option<&FirmwareDescriptor>,
    requested: &FirmwareDescriptor,
    offset: u32,
    max_len: u16,
) -> UpdateResult<Range<usize>> {
    let active = active.ok_or_else(|| UpdateError::NotFound("No active file".to_string()))?;
    if !active.same_artifact(requested) {
        return Err(UpdateError::NotFound(format!(
            "Active file is v{}, requested v{}",
            active.version, requested.version
        )));
    }
    if offset >= active.firmware_length {
        return Err(UpdateError::InvalidOffset {
            offset,
            length: active.firmware_length,
        });
    }

    let len = active
        .firmware_length
        .saturating_sub(offset)
        .min(u32::from(max_len));
    let start = usize::try_from(offset).map_err(|e| UpdateError::Invalid(e.to_string()))?;
    let len = usize::try_from(len).map_err(|e| UpdateError::Invalid(e.to_string()))?;
    Ok(start..start.saturating_add(len))
}

/// Validate a staged write and return the end offset it reaches.
///
/// Writes must start at or before the contiguous high-water mark so the
/// staged file never has holes.
fn check_write(
    staged: Option<&FirmwareDescriptor>,
    requested: &FirmwareDescriptor,
    written: u32,
    offset: u32,
    len: usize,
) -> UpdateResult<u32> {
    let staged = staged.ok_or_else(|| UpdateError::NotFound("No staged transfer".to_string()))?;
    if !staged.same_artifact(requested) {
        return Err(UpdateError::Invalid(format!(
            "Staged transfer is v{}, chunk is for v{}",
            staged.version, requested.version
        )));
    }

    let end = u32::try_from(len)
        .ok()
        .and_then(|len| offset.checked_add(len))
        .filter(|end| *end <= staged.firmware_length)
        .ok_or(UpdateError::InvalidOffset {
            offset,
            length: staged.firmware_length,
        })?;
    if offset > written {
        return Err(UpdateError::InvalidOffset {
            offset,
            length: written,
        });
    }
    Ok(end)
}

/// Refuse to activate incomplete, flagged or mismatched staged state
fn check_install(
    staged: Option<&FirmwareDescriptor>,
    written: u32,
    invalid: bool,
    descriptor: &FirmwareDescriptor,
    footer: &FirmwareFooter,
) -> UpdateResult<()> {
    let staged = staged.ok_or_else(|| UpdateError::NotFound("No staged transfer".to_string()))?;
    if invalid {
        return Err(UpdateError::VerificationFailed(
            "Staged file was marked invalid".to_string(),
        ));
    }
    if !staged.same_artifact(descriptor) || !footer.descriptor.same_artifact(descriptor) {
        return Err(UpdateError::VerificationFailed(
            "Descriptor does not match staged file".to_string(),
        ));
    }
    if written != staged.firmware_length {
        return Err(UpdateError::VerificationFailed(format!(
            "Staged file incomplete: {} of {} bytes",
            written, staged.firmware_length
        )));
    }
    Ok(())
}

/// Compare staged content against the digest the footer signs
fn check_content(footer: &FirmwareFooter, digest: &[u8; CONTENT_DIGEST_LEN]) -> UpdateResult<()> {
    if footer.content_digest != *digest {
        return Err(UpdateError::ContentMismatch);
    }
    Ok(())
}
