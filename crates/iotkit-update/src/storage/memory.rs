//! In-memory update storage

use super::{InstallHook, check_content, check_install, check_write, read_range};
use crate::descriptor::FirmwareDescriptor;
use crate::error::{UpdateError, UpdateResult};
use crate::footer::{FirmwareFooter, content_digest};
use crate::interface::UpdateInterface;
use crate::types::{FileTypeId, FileVersion};
use std::fmt;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
struct StoredFile {
    descriptor: FirmwareDescriptor,
    content: Vec<u8>,
    written: u32,
    footer: Option<FirmwareFooter>,
    invalid: bool,
}

impl StoredFile {
    fn empty(descriptor: FirmwareDescriptor) -> Self {
        Self {
            descriptor,
            content: Vec::new(),
            written: 0,
            footer: None,
            invalid: false,
        }
    }
}

/// Bounded in-memory storage for one file type
pub struct MemoryStorage {
    file_type: FileTypeId,
    capacity: u64,
    active: Option<StoredFile>,
    staged: Option<StoredFile>,
    install_hook: Option<Box<dyn InstallHook>>,
}

impl MemoryStorage {
    /// Empty storage that can hold files up to `capacity` bytes
    pub fn new(file_type: FileTypeId, capacity: u64) -> Self {
        Self {
            file_type,
            capacity,
            active: None,
            staged: None,
            install_hook: None,
        }
    }

    /// Run `hook` whenever a staged file is activated
    pub fn with_install_hook(mut self, hook: impl InstallHook + 'static) -> Self {
        self.install_hook = Some(Box::new(hook));
        self
    }

    /// Replace the active file directly, as a gateway does when publishing
    pub fn publish(
        &mut self,
        descriptor: FirmwareDescriptor,
        content: Vec<u8>,
        footer: FirmwareFooter,
    ) -> UpdateResult<()> {
        descriptor.validate()?;
        self.check_capacity(&descriptor)?;
        let written = u32::try_from(content.len())
            .ok()
            .filter(|len| *len == descriptor.firmware_length)
            .ok_or_else(|| {
                UpdateError::Invalid(format!(
                    "Content is {} bytes, descriptor says {}",
                    content.len(),
                    descriptor.firmware_length
                ))
            })?;
        if !footer.descriptor.same_artifact(&descriptor) {
            return Err(UpdateError::Invalid(
                "Footer does not describe the published file".to_string(),
            ));
        }
        check_content(&footer, &content_digest(&content))?;

        info!("Publishing {} v{}", self.file_type, descriptor.version);
        self.active = Some(StoredFile {
            descriptor,
            content,
            written,
            footer: Some(footer),
            invalid: false,
        });
        Ok(())
    }

    /// Content of the active file
    pub fn active_content(&self) -> Option<&[u8]> {
        self.active.as_ref().map(|file| file.content.as_slice())
    }

    /// Content staged so far
    pub fn staged_content(&self) -> Option<&[u8]> {
        self.staged.as_ref().map(|file| file.content.as_slice())
    }

    /// Whether a staged file exists and was marked invalid
    pub fn is_staged_invalid(&self) -> bool {
        self.staged.as_ref().is_some_and(|file| file.invalid)
    }

    /// Capacity in bytes
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    fn check_capacity(&self, descriptor: &FirmwareDescriptor) -> UpdateResult<()> {
        let required = u64::from(descriptor.app_size.max(descriptor.firmware_length));
        if required > self.capacity {
            return Err(UpdateError::StorageFull {
                required,
                capacity: self.capacity,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStorage")
            .field("file_type", &self.file_type)
            .field("capacity", &self.capacity)
            .field("active", &self.active.as_ref().map(|file| file.descriptor))
            .field("staged", &self.staged.as_ref().map(|file| file.descriptor))
            .field("install_hook", &self.install_hook.is_some())
            .finish()
    }
}

impl UpdateInterface for MemoryStorage {
    fn file_type(&self) -> FileTypeId {
        self.file_type
    }

    fn describe(&self) -> Option<FileVersion> {
        self.active.as_ref().map(|file| file.descriptor.version)
    }

    fn load_descriptor(&self) -> UpdateResult<FirmwareDescriptor> {
        self.active
            .as_ref()
            .map(|file| file.descriptor)
            .ok_or_else(|| UpdateError::NotFound(format!("No active {} file", self.file_type)))
    }

    fn save_descriptor(&mut self, descriptor: &FirmwareDescriptor) -> UpdateResult<()> {
        descriptor.validate()?;
        self.check_capacity(descriptor)?;
        debug!("Staging {} v{}", self.file_type, descriptor.version);
        self.staged = Some(StoredFile::empty(*descriptor));
        Ok(())
    }

    fn read_chunk(
        &self,
        descriptor: &FirmwareDescriptor,
        offset: u32,
        max_len: u16,
    ) -> UpdateResult<Vec<u8>> {
        let active = self.active.as_ref();
        let range = read_range(active.map(|file| &file.descriptor), descriptor, offset, max_len)?;
        active
            .and_then(|file| file.content.get(range))
            .map(<[u8]>::to_vec)
            .ok_or_else(|| {
                UpdateError::NotFound("Active content is shorter than its descriptor".to_string())
            })
    }

    fn write_chunk(
        &mut self,
        descriptor: &FirmwareDescriptor,
        offset: u32,
        bytes: &[u8],
    ) -> UpdateResult<()> {
        let staged = self.staged.as_mut();
        let (descriptor_ref, written) = match &staged {
            Some(file) => (Some(&file.descriptor), file.written),
            None => (None, 0),
        };
        let end = check_write(descriptor_ref, descriptor, written, offset, bytes.len())?;
        let file = staged.ok_or_else(|| UpdateError::NotFound("No staged transfer".to_string()))?;

        let start = usize::try_from(offset).map_err(|e| UpdateError::Invalid(e.to_string()))?;
        let end_index = usize::try_from(end).map_err(|e| UpdateError::Invalid(e.to_string()))?;
        if file.content.len() < end_index {
            file.content.resize(end_index, 0);
        }
        let target = file
            .content
            .get_mut(start..end_index)
            .ok_or(UpdateError::InvalidOffset {
                offset,
                length: file.descriptor.firmware_length,
            })?;
        target.copy_from_slice(bytes);
        file.written = file.written.max(end);
        Ok(())
    }

    fn read_footer(&self) -> UpdateResult<FirmwareFooter> {
        self.active
            .as_ref()
            .and_then(|file| file.footer.clone())
            .ok_or_else(|| UpdateError::NotFound(format!("No {} footer", self.file_type)))
    }

    fn write_footer(&mut self, footer: &FirmwareFooter) -> UpdateResult<()> {
        let file = self
            .staged
            .as_mut()
            .ok_or_else(|| UpdateError::NotFound("No staged transfer".to_string()))?;
        file.footer = Some(footer.clone());
        Ok(())
    }

    fn verify_and_install(
        &mut self,
        descriptor: &FirmwareDescriptor,
        footer: &FirmwareFooter,
    ) -> UpdateResult<()> {
        let staged = self.staged.as_ref();
        check_install(
            staged.map(|file| &file.descriptor),
            staged.map_or(0, |file| file.written),
            staged.is_some_and(|file| file.invalid),
            descriptor,
            footer,
        )?;
        if let Some(file) = staged {
            check_content(footer, &content_digest(&file.content))?;
        }

        let mut file = self
            .staged
            .take()
            .ok_or_else(|| UpdateError::NotFound("No staged transfer".to_string()))?;

        if let Some(hook) = self.install_hook.as_mut()
            && let Err(e) = hook.install(descriptor, &file.content)
        {
            warn!("Install hook for {} failed: {}", self.file_type, e);
            self.staged = Some(file);
            return Err(if matches!(e, UpdateError::InstallFailed(_)) {
                e
            } else {
                UpdateError::InstallFailed(e.to_string())
            });
        }

        file.footer = Some(footer.clone());
        info!("Installed {} v{}", self.file_type, descriptor.version);
        self.active = Some(file);
        Ok(())
    }

    fn mark_invalid(&mut self, descriptor: &FirmwareDescriptor) -> UpdateResult<()> {
        match self.staged.as_mut() {
            Some(file) if file.descriptor.same_artifact(descriptor) => {
                warn!("Marking staged {} v{} invalid", self.file_type, descriptor.version);
                file.invalid = true;
                Ok(())
            }
            _ => Err(UpdateError::NotFound(format!(
                "No staged {} v{}",
                self.file_type, descriptor.version
            ))),
        }
    }

    fn discard(&mut self) -> UpdateResult<()> {
        if self.staged.take().is_some() {
            debug!("Discarded staged {}", self.file_type);
        }
        Ok(())
    }
}
