//! Per-file-type download session

use crate::message::{FldtMessage, MessageKind};
use iotkit_update::{FileTypeId, FileVersion, FirmwareDescriptor, MacAddr, RejectReason};
use std::fmt;
use std::time::{Duration, Instant};

/// Where a file type's download stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    /// No download in progress
    Idle,
    /// Waiting for the descriptor
    AwaitingHeader,
    /// Fetching content in offset order
    DownloadingChunks,
    /// Content complete, waiting for the footer
    AwaitingFooter,
    /// Footer received, checking signatures
    Verifying,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "IDLE",
            SessionState::AwaitingHeader => "AWAITING_HEADER",
            SessionState::DownloadingChunks => "DOWNLOADING_CHUNKS",
            SessionState::AwaitingFooter => "AWAITING_FOOTER",
            SessionState::Verifying => "VERIFYING",
        };
        f.write_str(name)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutcome {
    /// New version is active
    Installed(FileVersion),
    /// Footer rejected; the staged file is kept but marked invalid
    VerificationFailed {
        /// Rejected version
        version: FileVersion,
        /// First failed check
        reason: RejectReason,
    },
    /// Retries exhausted or the gateway refused the file type
    TransferFailed {
        /// Version being downloaded
        version: FileVersion,
    },
    /// Update interface failed while staging
    StorageFailed {
        /// Version being downloaded
        version: FileVersion,
        /// Storage error text
        message: String,
    },
    /// Footer approved but activation failed
    InstallFailed {
        /// Version being installed
        version: FileVersion,
        /// Storage error text
        message: String,
    },
    /// Aborted for a newer version or by the caller
    Cancelled {
        /// Version that was being downloaded
        version: FileVersion,
    },
}

impl TransferOutcome {
    /// Version the session was downloading
    pub fn version(&self) -> FileVersion {
        match self {
            TransferOutcome::Installed(version)
            | TransferOutcome::VerificationFailed { version, .. }
            | TransferOutcome::TransferFailed { version }
            | TransferOutcome::StorageFailed { version, .. }
            | TransferOutcome::InstallFailed { version, .. }
            | TransferOutcome::Cancelled { version } => *version,
        }
    }

    /// Whether the version was installed
    pub fn is_installed(&self) -> bool {
        matches!(self, TransferOutcome::Installed(_))
    }
}

impl fmt::Display for TransferOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferOutcome::Installed(version) => write!(f, "installed v{}", version),
            TransferOutcome::VerificationFailed { version, reason } => {
                write!(f, "v{} failed verification: {}", version, reason)
            }
            TransferOutcome::TransferFailed { version } => {
                write!(f, "transfer of v{} failed", version)
            }
            TransferOutcome::StorageFailed { version, message } => {
                write!(f, "storage failed for v{}: {}", version, message)
            }
            TransferOutcome::InstallFailed { version, message } => {
                write!(f, "install of v{} failed: {}", version, message)
            }
            TransferOutcome::Cancelled { version } => write!(f, "transfer of v{} cancelled", version),
        }
    }
}

/// In-flight download of one file type from one gateway.
///
/// Exactly one request is outstanding at a time. Responses are matched on
/// version and offset so late or duplicate answers are never applied.
#[derive(Debug, Clone)]
pub struct TransferSession {
    gateway: MacAddr,
    target: FileVersion,
    state: SessionState,
    descriptor: Option<FirmwareDescriptor>,
    next_offset: u32,
    requested_len: u16,
    attempts: u8,
    deadline: Instant,
}

impl TransferSession {
    pub(crate) fn new(gateway: MacAddr, target: FileVersion, now: Instant) -> Self {
        Self {
            gateway,
            target,
            state: SessionState::AwaitingHeader,
            descriptor: None,
            next_offset: 0,
            requested_len: 0,
            attempts: 0,
            deadline: now,
        }
    }

    /// Gateway serving the download
    pub fn gateway(&self) -> MacAddr {
        self.gateway
    }

    /// Version being downloaded
    pub fn target(&self) -> FileVersion {
        self.target
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Descriptor from the header, once received
    pub fn descriptor(&self) -> Option<&FirmwareDescriptor> {
        self.descriptor.as_ref()
    }

    /// First byte not yet received
    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }

    /// Sends of the outstanding request so far
    pub fn attempts(&self) -> u8 {
        self.attempts
    }

    /// Kind of the outstanding request
    pub fn pending_request(&self) -> Option<MessageKind> {
        match self.state {
            SessionState::AwaitingHeader => Some(MessageKind::GetHeader),
            SessionState::DownloadingChunks => Some(MessageKind::GetChunk),
            SessionState::AwaitingFooter => Some(MessageKind::GetFooter),
            SessionState::Idle | SessionState::Verifying => None,
        }
    }

    /// Build the outstanding request
    pub(crate) fn request(&mut self, file_type: FileTypeId, max_chunk_len: u16) -> Option<FldtMessage> {
        match self.state {
            SessionState::AwaitingHeader => Some(FldtMessage::GetHeader { file_type }),
            SessionState::DownloadingChunks => {
                let chunk_size = self.descriptor.map_or(max_chunk_len, |d| d.chunk_size);
                self.requested_len = max_chunk_len.min(chunk_size);
                Some(FldtMessage::GetChunk {
                    file_type,
                    version: self.target,
                    offset: self.next_offset,
                    max_len: self.requested_len,
                })
            }
            SessionState::AwaitingFooter => Some(FldtMessage::GetFooter {
                file_type,
                version: self.target,
            }),
            SessionState::Idle | SessionState::Verifying => None,
        }
    }

    /// Count a send and start its timeout
    pub(crate) fn arm(&mut self, now: Instant, timeout: Duration) {
        self.attempts = self.attempts.saturating_add(1);
        self.deadline = now.checked_add(timeout).unwrap_or(now);
    }

    pub(crate) fn is_due(&self, now: Instant) -> bool {
        self.pending_request().is_some() && now >= self.deadline
    }

    /// Take the descriptor and move on to the content
    pub(crate) fn accept_header(&mut self, descriptor: FirmwareDescriptor) {
        self.descriptor = Some(descriptor);
        self.next_offset = 0;
        self.attempts = 0;
        self.state = if descriptor.firmware_length == 0 {
            SessionState::AwaitingFooter
        } else {
            SessionState::DownloadingChunks
        };
    }

    /// Whether a chunk response answers the outstanding request
    pub(crate) fn expects_chunk(&self, version: FileVersion, offset: u32) -> bool {
        self.state == SessionState::DownloadingChunks
            && version == self.target
            && offset == self.next_offset
    }

    /// Whether `len` bytes are an acceptable answer to the outstanding chunk request
    pub(crate) fn chunk_fits(&self, len: usize) -> bool {
        let Some(descriptor) = self.descriptor else {
            return false;
        };
        let remaining = descriptor.firmware_length.saturating_sub(self.next_offset);
        len > 0
            && len <= usize::from(self.requested_len)
            && u32::try_from(len).is_ok_and(|len| len <= remaining)
    }

    /// Record `len` received bytes; returns true once the content is complete
    pub(crate) fn advance(&mut self, len: u32) -> bool {
        self.next_offset = self.next_offset.saturating_add(len);
        self.attempts = 0;
        let complete = self
            .descriptor
            .is_some_and(|d| self.next_offset >= d.firmware_length);
        if complete {
            self.state = SessionState::AwaitingFooter;
        }
        complete
    }

    pub(crate) fn begin_verifying(&mut self) {
        self.state = SessionState::Verifying;
    }
}
