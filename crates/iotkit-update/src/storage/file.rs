//! Filesystem update storage
//!
//! Layout under `<root>/<file type>/`:
//!
//! - `active/`: installed file (`descriptor.bin`, `content.bin`, `footer.bin`)
//! - `staging/`: download in progress, plus an `INVALID` marker when rejected
//! - `retired/`: previous active file, present only while an install is running
//!
//! Installing renames `active/` to `retired/` and `staging/` to `active/`,
//! then runs the install hook. A failing hook moves both directories back.
//! `retired/` is removed only after the hook succeeds; opening the storage
//! after an interrupted install restores it.

use super::{InstallHook, check_content, check_install, check_write, read_range};
use crate::descriptor::FirmwareDescriptor;
use crate::error::{UpdateError, UpdateResult};
use crate::footer::{FirmwareFooter, content_digest};
use crate::interface::UpdateInterface;
use crate::types::{FileTypeId, FileVersion};
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const ACTIVE_DIR: &str = "active";
const STAGING_DIR: &str = "staging";
const RETIRED_DIR: &str = "retired";
const DESCRIPTOR_FILE: &str = "descriptor.bin";
const CONTENT_FILE: &str = "content.bin";
const FOOTER_FILE: &str = "footer.bin";
const INVALID_MARKER: &str = "INVALID";

#[derive(Debug, Clone, Copy)]
struct StagedState {
    descriptor: FirmwareDescriptor,
    written: u32,
    invalid: bool,
}

/// Directory-backed storage for one file type
pub struct FileStorage {
    file_type: FileTypeId,
    dir: PathBuf,
    active: Option<FirmwareDescriptor>,
    staged: Option<StagedState>,
    install_hook: Option<Box<dyn InstallHook>>,
}

impl FileStorage {
    /// Open storage for `file_type` under `root`, recovering an interrupted install
    pub fn open(root: impl AsRef<Path>, file_type: FileTypeId) -> UpdateResult<Self> {
        let dir = root.as_ref().join(file_type.storage_name());
        fs::create_dir_all(&dir)?;

        let active_dir = dir.join(ACTIVE_DIR);
        let retired_dir = dir.join(RETIRED_DIR);
        if retired_dir.exists() {
            if active_dir.exists() {
                fs::remove_dir_all(&retired_dir)?;
            } else {
                warn!("Restoring {} after interrupted install", file_type);
                fs::rename(&retired_dir, &active_dir)?;
            }
        }

        let active = read_descriptor(&active_dir)?;
        let staged = Self::load_staged(&dir.join(STAGING_DIR))?;

        debug!(
            "Opened {} storage at {} (active: {:?})",
            file_type,
            dir.display(),
            active.map(|d| d.version.to_string())
        );

        Ok(Self {
            file_type,
            dir,
            active,
            staged,
            install_hook: None,
        })
    }

    /// Run `hook` whenever a staged file is activated
    pub fn with_install_hook(mut self, hook: impl InstallHook + 'static) -> Self {
        self.install_hook = Some(Box::new(hook));
        self
    }

    /// Stage and activate a complete file in one step, as a gateway does when publishing
    pub fn publish(
        &mut self,
        descriptor: &FirmwareDescriptor,
        content: &[u8],
        footer: &FirmwareFooter,
    ) -> UpdateResult<()> {
        self.save_descriptor(descriptor)?;
        self.write_chunk(descriptor, 0, content)?;
        self.write_footer(footer)?;
        self.verify_and_install(descriptor, footer)
    }

    /// Storage directory for this file type
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Whether a staged file exists and was marked invalid
    pub fn is_staged_invalid(&self) -> bool {
        self.staged.is_some_and(|staged| staged.invalid)
    }

    /// Content of the active file
    pub fn active_content(&self) -> UpdateResult<Vec<u8>> {
        if self.active.is_none() {
            return Err(UpdateError::NotFound(format!("No active {} file", self.file_type)));
        }
        Ok(fs::read(self.dir.join(ACTIVE_DIR).join(CONTENT_FILE))?)
    }

    fn load_staged(staging_dir: &Path) -> UpdateResult<Option<StagedState>> {
        let Some(descriptor) = read_descriptor(staging_dir)? else {
            return Ok(None);
        };
        let written = match fs::metadata(staging_dir.join(CONTENT_FILE)) {
            Ok(meta) => u32::try_from(meta.len()).map_err(|e| UpdateError::Invalid(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => 0,
            Err(e) => return Err(e.into()),
        };
        Ok(Some(StagedState {
            descriptor,
            written,
            invalid: staging_dir.join(INVALID_MARKER).exists(),
        }))
    }

    fn staging_dir(&self) -> PathBuf {
        self.dir.join(STAGING_DIR)
    }

    /// Move `staging/` into place, keeping the previous file in `retired/`
    fn promote(&self) -> UpdateResult<()> {
        let active_dir = self.dir.join(ACTIVE_DIR);
        let retired_dir = self.dir.join(RETIRED_DIR);

        if retired_dir.exists() {
            fs::remove_dir_all(&retired_dir)?;
        }
        if active_dir.exists() {
            fs::rename(&active_dir, &retired_dir)?;
        }
        if let Err(e) = fs::rename(self.staging_dir(), &active_dir) {
            if retired_dir.exists() {
                fs::rename(&retired_dir, &active_dir)?;
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Undo [`FileStorage::promote`]: the new file returns to `staging/`
    fn demote(&self) -> UpdateResult<()> {
        let active_dir = self.dir.join(ACTIVE_DIR);
        let retired_dir = self.dir.join(RETIRED_DIR);

        fs::rename(&active_dir, self.staging_dir())?;
        if retired_dir.exists() {
            fs::rename(&retired_dir, &active_dir)?;
        }
        Ok(())
    }

    fn drop_retired(&self) {
        let retired_dir = self.dir.join(RETIRED_DIR);
        if retired_dir.exists()
            && let Err(e) = fs::remove_dir_all(&retired_dir)
        {
            warn!("Could not remove {}: {}", retired_dir.display(), e);
        }
    }
}

fn read_descriptor(dir: &Path) -> UpdateResult<Option<FirmwareDescriptor>> {
    match fs::read(dir.join(DESCRIPTOR_FILE)) {
        Ok(bytes) => Ok(Some(FirmwareDescriptor::decode(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl fmt::Debug for FileStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileStorage")
            .field("file_type", &self.file_type)
            .field("dir", &self.dir)
            .field("active", &self.active)
            .field("staged", &self.staged)
            .field("install_hook", &self.install_hook.is_some())
            .finish()
    }
}

impl UpdateInterface for FileStorage {
    fn file_type(&self) -> FileTypeId {
        self.file_type
    }

    fn describe(&self) -> Option<FileVersion> {
        self.active.map(|descriptor| descriptor.version)
    }

    fn load_descriptor(&self) -> UpdateResult<FirmwareDescriptor> {
        self.active
            .ok_or_else(|| UpdateError::NotFound(format!("No active {} file", self.file_type)))
    }

    fn save_descriptor(&mut self, descriptor: &FirmwareDescriptor) -> UpdateResult<()> {
        descriptor.validate()?;

        let staging_dir = self.staging_dir();
        if staging_dir.exists() {
            fs::remove_dir_all(&staging_dir)?;
        }
        fs::create_dir_all(&staging_dir)?;
        fs::write(staging_dir.join(DESCRIPTOR_FILE), descriptor.encode())?;
        File::create(staging_dir.join(CONTENT_FILE))?;

        debug!("Staging {} v{}", self.file_type, descriptor.version);
        self.staged = Some(StagedState {
            descriptor: *descriptor,
            written: 0,
            invalid: false,
        });
        Ok(())
    }

    fn read_chunk(
        &self,
        descriptor: &FirmwareDescriptor,
        offset: u32,
        max_len: u16,
    ) -> UpdateResult<Vec<u8>> {
        let range = read_range(self.active.as_ref(), descriptor, offset, max_len)?;

        let mut file = File::open(self.dir.join(ACTIVE_DIR).join(CONTENT_FILE))?;
        file.seek(SeekFrom::Start(u64::from(offset)))?;
        let mut buffer = vec![0u8; range.len()];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_chunk(
        &mut self,
        descriptor: &FirmwareDescriptor,
        offset: u32,
        bytes: &[u8],
    ) -> UpdateResult<()> {
        let end = check_write(
            self.staged.as_ref().map(|staged| &staged.descriptor),
            descriptor,
            self.staged.map_or(0, |staged| staged.written),
            offset,
            bytes.len(),
        )?;

        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.staging_dir().join(CONTENT_FILE))?;
        file.seek(SeekFrom::Start(u64::from(offset)))?;
        file.write_all(bytes)?;
        file.sync_data()?;

        if let Some(staged) = self.staged.as_mut() {
            staged.written = staged.written.max(end);
        }
        Ok(())
    }

    fn read_footer(&self) -> UpdateResult<FirmwareFooter> {
        if self.active.is_none() {
            return Err(UpdateError::NotFound(format!("No {} footer", self.file_type)));
        }
        match fs::read(self.dir.join(ACTIVE_DIR).join(FOOTER_FILE)) {
            Ok(bytes) => Ok(FirmwareFooter::decode(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(UpdateError::NotFound(format!("No {} footer", self.file_type)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_footer(&mut self, footer: &FirmwareFooter) -> UpdateResult<()> {
        if self.staged.is_none() {
            return Err(UpdateError::NotFound("No staged transfer".to_string()));
        }
        fs::write(self.staging_dir().join(FOOTER_FILE), footer.encode())?;
        Ok(())
    }

    fn verify_and_install(
        &mut self,
        descriptor: &FirmwareDescriptor,
        footer: &FirmwareFooter,
    ) -> UpdateResult<()> {
        check_install(
            self.staged.as_ref().map(|staged| &staged.descriptor),
            self.staged.map_or(0, |staged| staged.written),
            self.is_staged_invalid(),
            descriptor,
            footer,
        )?;

        let staging_dir = self.staging_dir();
        let content = fs::read(staging_dir.join(CONTENT_FILE))?;
        check_content(footer, &content_digest(&content))?;
        fs::write(staging_dir.join(FOOTER_FILE), footer.encode())?;

        self.promote()
            .map_err(|e| UpdateError::InstallFailed(format!("Activation failed: {}", e)))?;

        if let Some(hook) = self.install_hook.as_mut()
            && let Err(e) = hook.install(descriptor, &content)
        {
            warn!("Install hook for {} failed: {}", self.file_type, e);
            if let Err(restore) = self.demote() {
                warn!("Could not restore previous {}: {}", self.file_type, restore);
            }
            return Err(if matches!(e, UpdateError::InstallFailed(_)) {
                e
            } else {
                UpdateError::InstallFailed(e.to_string())
            });
        }

        self.drop_retired();
        self.active = Some(*descriptor);
        self.staged = None;
        info!("Installed {} v{}", self.file_type, descriptor.version);
        Ok(())
    }

    fn mark_invalid(&mut self, descriptor: &FirmwareDescriptor) -> UpdateResult<()> {
        match self.staged.as_mut() {
            Some(staged) if staged.descriptor.same_artifact(descriptor) => {
                fs::write(self.dir.join(STAGING_DIR).join(INVALID_MARKER), b"")?;
                staged.invalid = true;
                warn!("Marked staged {} v{} invalid", self.file_type, descriptor.version);
                Ok(())
            }
            _ => Err(UpdateError::NotFound(format!(
                "No staged {} v{}",
                self.file_type, descriptor.version
            ))),
        }
    }

    fn discard(&mut self) -> UpdateResult<()> {
        let staging_dir = self.staging_dir();
        if staging_dir.exists() {
            fs::remove_dir_all(&staging_dir)?;
            debug!("Discarded staged {}", self.file_type);
        }
        self.staged = None;
        Ok(())
    }
}
