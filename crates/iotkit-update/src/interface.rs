//! Update interface contract
//!
//! Each file type a device or gateway stores implements [`UpdateInterface`].
//! The interface carries no protocol state: the FLDT server reads the active
//! file through it and the FLDT client stages a download through it.
//!
//! Two files exist per type. The *active* file is installed and served. The
//! *staged* file is the download in progress; it only replaces the active one
//! through [`UpdateInterface::verify_and_install`].

use crate::descriptor::FirmwareDescriptor;
use crate::error::UpdateResult;
use crate::footer::FirmwareFooter;
use crate::types::{FileTypeId, FileVersion};

/// Storage capability for one file type
pub trait UpdateInterface {
    /// File type this binding handles
    fn file_type(&self) -> FileTypeId;

    /// Version of the active file, `None` when nothing is installed
    fn describe(&self) -> Option<FileVersion>;

    /// Descriptor of the active file
    fn load_descriptor(&self) -> UpdateResult<FirmwareDescriptor>;

    /// Begin staging `descriptor`, dropping any previous staged state
    fn save_descriptor(&mut self, descriptor: &FirmwareDescriptor) -> UpdateResult<()>;

    /// Read up to `max_len` bytes of the active file at `offset`.
    ///
    /// Fails with `NotFound` if the active file is not `descriptor` and with
    /// `InvalidOffset` if `offset` is not below the file length.
    fn read_chunk(
        &self,
        descriptor: &FirmwareDescriptor,
        offset: u32,
        max_len: u16,
    ) -> UpdateResult<Vec<u8>>;

    /// Write `bytes` at `offset` of the staged file.
    ///
    /// Rewriting an offset that was already written is not an error.
    fn write_chunk(
        &mut self,
        descriptor: &FirmwareDescriptor,
        offset: u32,
        bytes: &[u8],
    ) -> UpdateResult<()>;

    /// Footer of the active file
    fn read_footer(&self) -> UpdateResult<FirmwareFooter>;

    /// Attach a footer to the staged file
    fn write_footer(&mut self, footer: &FirmwareFooter) -> UpdateResult<()>;

    /// Promote the staged file to active.
    ///
    /// Callers invoke this only after the footer was approved. The backend
    /// still refuses incomplete or mismatched staged state.
    fn verify_and_install(
        &mut self,
        descriptor: &FirmwareDescriptor,
        footer: &FirmwareFooter,
    ) -> UpdateResult<()>;

    /// Keep the staged file but flag it so it is never activated
    fn mark_invalid(&mut self, descriptor: &FirmwareDescriptor) -> UpdateResult<()>;

    /// Delete staged state
    fn discard(&mut self) -> UpdateResult<()>;
}
