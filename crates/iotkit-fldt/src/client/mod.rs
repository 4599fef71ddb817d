//! FLDT device client
//!
//! One download session per registered file type. Sessions advance only when
//! the driver feeds a frame through [`FldtClient::on_receive`] or a timer
//! through [`FldtClient::on_tick`]; nothing blocks.
//!
//! A new version is observed from an announcement or an `INFO` reply. The
//! session then fetches the header, the content in offset order and the
//! footer, checks the footer with the [`VerificationEngine`] and only on
//! approval hands the staged file to
//! [`UpdateInterface::verify_and_install`], which rejects content that does
//! not hash to the signed digest.

mod session;

pub use session::{SessionState, TransferOutcome, TransferSession};

use crate::config::ClientConfig;
use crate::error::{FldtError, FldtResult};
use crate::message::{ErrorCode, FldtMessage, MessageKind};
use crate::transport::Transport;
use iotkit_update::{
    FileInfo, FileTypeId, FileVersion, FirmwareDescriptor, FirmwareFooter, MacAddr, RejectReason,
    UpdateError, UpdateInterface, VerificationEngine, Verdict,
};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, error, info, warn};

struct ClientBinding {
    storage: Box<dyn UpdateInterface>,
    session: Option<TransferSession>,
    last_outcome: Option<TransferOutcome>,
    rejected_version: Option<FileVersion>,
    latest_info: Option<FileInfo>,
}

/// Client counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Frames handed to `on_receive`
    pub frames_received: u64,
    /// Frames sent
    pub frames_sent: u64,
    /// Frames that failed to decode
    pub malformed: u64,
    /// Responses dropped as late, duplicate or foreign
    pub stale_responses: u64,
    /// Requests resent after a timeout or failed attempt
    pub retries: u64,
    /// Timeouts observed
    pub timeouts: u64,
    /// Content bytes accepted
    pub bytes_received: u64,
    /// Sessions started
    pub sessions_started: u64,
    /// Sessions ending in an install
    pub installs: u64,
    /// Sessions ending in any other way
    pub failures: u64,
}

/// Device side of the protocol
pub struct FldtClient<T: Transport> {
    transport: T,
    config: ClientConfig,
    engine: VerificationEngine,
    bindings: HashMap<FileTypeId, ClientBinding>,
    stats: ClientStats,
}

impl<T: Transport> FldtClient<T> {
    /// Client sending through `transport` and verifying with `engine`
    pub fn new(transport: T, config: ClientConfig, engine: VerificationEngine) -> Self {
        Self {
            transport,
            config,
            engine,
            bindings: HashMap::new(),
            stats: ClientStats::default(),
        }
    }

    /// Add or replace the binding for `storage.file_type()`.
    ///
    /// Returns the replaced binding. Fails while a session for the type runs.
    pub fn register_file_type(
        &mut self,
        storage: Box<dyn UpdateInterface>,
    ) -> FldtResult<Option<Box<dyn UpdateInterface>>> {
        let file_type = storage.file_type();
        if self
            .bindings
            .get(&file_type)
            .is_some_and(|binding| binding.session.is_some())
        {
            return Err(FldtError::SessionActive(file_type));
        }

        info!(
            "Client registered {} (installed {})",
            file_type,
            storage
                .describe()
                .map_or_else(|| "none".to_string(), |v| v.to_string())
        );
        let previous = self.bindings.insert(
            file_type,
            ClientBinding {
                storage,
                session: None,
                last_outcome: None,
                rejected_version: None,
                latest_info: None,
            },
        );
        Ok(previous.map(|binding| binding.storage))
    }

    /// Remove the binding for `file_type`
    pub fn unregister_file_type(
        &mut self,
        file_type: FileTypeId,
    ) -> FldtResult<Option<Box<dyn UpdateInterface>>> {
        if self
            .bindings
            .get(&file_type)
            .is_some_and(|binding| binding.session.is_some())
        {
            return Err(FldtError::SessionActive(file_type));
        }
        Ok(self.bindings.remove(&file_type).map(|binding| binding.storage))
    }

    /// Session state for `file_type`, `Idle` when none runs
    pub fn state(&self, file_type: FileTypeId) -> SessionState {
        self.session(file_type)
            .map_or(SessionState::Idle, TransferSession::state)
    }

    /// Running session for `file_type`
    pub fn session(&self, file_type: FileTypeId) -> Option<&TransferSession> {
        self.bindings.get(&file_type)?.session.as_ref()
    }

    /// How the last session for `file_type` ended
    pub fn last_outcome(&self, file_type: FileTypeId) -> Option<&TransferOutcome> {
        self.bindings.get(&file_type)?.last_outcome.as_ref()
    }

    /// Installed version for `file_type`
    pub fn installed_version(&self, file_type: FileTypeId) -> Option<FileVersion> {
        self.bindings.get(&file_type)?.storage.describe()
    }

    /// Binding for `file_type`
    pub fn storage(&self, file_type: FileTypeId) -> Option<&dyn UpdateInterface> {
        self.bindings
            .get(&file_type)
            .map(|binding| binding.storage.as_ref())
    }

    /// Counters
    pub fn stats(&self) -> ClientStats {
        self.stats
    }

    /// Verification engine
    pub fn engine(&self) -> &VerificationEngine {
        &self.engine
    }

    /// Transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Poll a gateway, or every gateway when `gateway` is `None`.
    ///
    /// The `INFO` reply is handled like an announcement.
    pub fn request_info(&mut self, file_type: FileTypeId, gateway: Option<MacAddr>) -> FldtResult<()> {
        if !self.bindings.contains_key(&file_type) {
            return Err(FldtError::Unsupported(file_type));
        }
        send_poll(&mut self.transport, &mut self.stats, file_type, gateway)
    }

    /// Start a download of the newest version seen for `file_type`.
    ///
    /// Clears the block on a version that previously failed verification.
    /// Returns true if a session started; otherwise a poll was sent.
    pub fn request_update(&mut self, file_type: FileTypeId, now: Instant) -> FldtResult<bool> {
        let Self {
            transport,
            config,
            bindings,
            stats,
            ..
        } = self;
        let binding = bindings
            .get_mut(&file_type)
            .ok_or(FldtError::Unsupported(file_type))?;
        if binding.session.is_some() {
            return Err(FldtError::SessionActive(file_type));
        }
        binding.rejected_version = None;

        match binding.latest_info {
            Some(info) if is_newer(binding.storage.as_ref(), info.version) => {
                start_session(transport, config, stats, binding, info, now);
                Ok(true)
            }
            latest => {
                send_poll(transport, stats, file_type, latest.map(|info| info.gateway))?;
                Ok(false)
            }
        }
    }

    /// Abort the session for `file_type` and drop its staged state.
    ///
    /// Returns false if no session was running.
    pub fn cancel(&mut self, file_type: FileTypeId) -> bool {
        let Self { stats, bindings, .. } = self;
        match bindings.get_mut(&file_type) {
            Some(binding) => match binding.session.as_ref() {
                Some(session) => {
                    let version = session.target();
                    finish(binding, file_type, TransferOutcome::Cancelled { version }, stats);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Handle one inbound frame from `from`
    pub fn on_receive(&mut self, from: MacAddr, frame: &[u8], now: Instant) {
        self.stats.frames_received += 1;

        let message = match FldtMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Malformed frame from {}: {}", from, e);
                return;
            }
        };

        match message {
            FldtMessage::Announce(info) | FldtMessage::Info(info) => self.observe(info, now),
            FldtMessage::Header {
                file_type,
                descriptor,
            } => self.on_header(from, file_type, descriptor, now),
            FldtMessage::Chunk {
                file_type,
                version,
                offset,
                data,
            } => self.on_chunk(from, file_type, version, offset, &data, now),
            FldtMessage::Footer { file_type, footer } => self.on_footer(from, file_type, footer),
            FldtMessage::Error {
                file_type,
                request,
                code,
            } => self.on_error(from, file_type, request, code, now),
            other => debug!("Ignoring {:?} from {}", other.kind(), from),
        }
    }

    /// Retry or fail every session whose request timed out
    pub fn on_tick(&mut self, now: Instant) {
        let Self {
            transport,
            config,
            bindings,
            stats,
            ..
        } = self;
        for (file_type, binding) in bindings.iter_mut() {
            if binding.session.as_ref().is_some_and(|s| s.is_due(now)) {
                stats.timeouts += 1;
                debug!("Request for {} timed out", file_type);
                retry_or_fail(transport, config, stats, *file_type, binding, now);
            }
        }
    }

    fn observe(&mut self, info: FileInfo, now: Instant) {
        let Self {
            transport,
            config,
            bindings,
            stats,
            ..
        } = self;
        let Some(binding) = bindings.get_mut(&info.file_type) else {
            debug!("No binding for announced {}", info.file_type);
            return;
        };
        binding.latest_info = Some(info);

        if !is_newer(binding.storage.as_ref(), info.version) {
            return;
        }
        if binding.rejected_version == Some(info.version) {
            debug!(
                "Not downloading {} v{} again after failed verification",
                info.file_type, info.version
            );
            return;
        }

        if let Some(session) = binding.session.as_ref() {
            let running = session.target();
            if info.version <= running {
                return;
            }
            info!(
                "{} v{} announced during download of v{}, restarting",
                info.file_type, info.version, running
            );
            finish(
                binding,
                info.file_type,
                TransferOutcome::Cancelled { version: running },
                stats,
            );
        }

        start_session(transport, config, stats, binding, info, now);
    }

    fn on_header(
        &mut self,
        from: MacAddr,
        file_type: FileTypeId,
        descriptor: FirmwareDescriptor,
        now: Instant,
    ) {
        let Self {
            transport,
            config,
            bindings,
            stats,
            ..
        } = self;
        let Some(binding) = bindings.get_mut(&file_type) else {
            stats.stale_responses += 1;
            return;
        };
        let Some(session) = binding.session.as_mut() else {
            stats.stale_responses += 1;
            return;
        };
        if session.state() != SessionState::AwaitingHeader
            || session.gateway() != from
            || descriptor.version != session.target()
        {
            debug!("Dropping header for {} v{}", file_type, descriptor.version);
            stats.stale_responses += 1;
            return;
        }

        let version = session.target();
        if let Err(e) = binding.storage.save_descriptor(&descriptor) {
            error!("Cannot stage {} v{}: {}", file_type, version, e);
            let message = e.to_string();
            finish(
                binding,
                file_type,
                TransferOutcome::StorageFailed { version, message },
                stats,
            );
            return;
        }

        let Some(session) = binding.session.as_mut() else {
            return;
        };
        info!(
            "Downloading {} v{} ({} bytes)",
            file_type, version, descriptor.firmware_length
        );
        session.accept_header(descriptor);
        send_request(transport, config, stats, file_type, session, now);
    }

    fn on_chunk(
        &mut self,
        from: MacAddr,
        file_type: FileTypeId,
        version: FileVersion,
        offset: u32,
        data: &[u8],
        now: Instant,
    ) {
        let Self {
            transport,
            config,
            bindings,
            stats,
            ..
        } = self;
        let Some(binding) = bindings.get_mut(&file_type) else {
            stats.stale_responses += 1;
            return;
        };
        let Some(session) = binding.session.as_mut() else {
            stats.stale_responses += 1;
            return;
        };
        if session.gateway() != from || !session.expects_chunk(version, offset) {
            debug!("Dropping chunk for {} v{} at {}", file_type, version, offset);
            stats.stale_responses += 1;
            return;
        }
        let Some(descriptor) = session.descriptor().copied() else {
            return;
        };
        if !session.chunk_fits(data.len()) {
            warn!(
                "Chunk for {} at {} has unusable length {}",
                file_type,
                offset,
                data.len()
            );
            retry_or_fail(transport, config, stats, file_type, binding, now);
            return;
        }
        let Ok(len) = u32::try_from(data.len()) else {
            return;
        };

        if let Err(e) = binding.storage.write_chunk(&descriptor, offset, data) {
            error!("Cannot write {} at {}: {}", file_type, offset, e);
            let message = e.to_string();
            finish(
                binding,
                file_type,
                TransferOutcome::StorageFailed { version, message },
                stats,
            );
            return;
        }

        let Some(session) = binding.session.as_mut() else {
            return;
        };
        stats.bytes_received += u64::from(len);
        if session.advance(len) {
            debug!("Content of {} v{} complete", file_type, version);
        }
        send_request(transport, config, stats, file_type, session, now);
    }

    fn on_footer(&mut self, from: MacAddr, file_type: FileTypeId, footer: FirmwareFooter) {
        let Self {
            engine,
            bindings,
            stats,
            ..
        } = self;
        let Some(binding) = bindings.get_mut(&file_type) else {
            stats.stale_responses += 1;
            return;
        };
        let Some(session) = binding.session.as_mut() else {
            stats.stale_responses += 1;
            return;
        };
        if session.state() != SessionState::AwaitingFooter
            || session.gateway() != from
            || footer.descriptor.version != session.target()
        {
            debug!("Dropping footer for {} v{}", file_type, footer.descriptor.version);
            stats.stale_responses += 1;
            return;
        }
        let Some(descriptor) = session.descriptor().copied() else {
            return;
        };
        let version = session.target();
        session.begin_verifying();

        let outcome = match engine.verify(&descriptor, &footer) {
            Verdict::Rejected(reason) => TransferOutcome::VerificationFailed { version, reason },
            Verdict::Approved { .. } => install(binding.storage.as_mut(), &descriptor, &footer),
        };
        if matches!(outcome, TransferOutcome::VerificationFailed { .. }) {
            if let Err(e) = binding.storage.mark_invalid(&descriptor) {
                warn!("Cannot mark {} v{} invalid: {}", file_type, version, e);
            }
            binding.rejected_version = Some(version);
        }
        finish(binding, file_type, outcome, stats);
    }

    fn on_error(
        &mut self,
        from: MacAddr,
        file_type: FileTypeId,
        request: MessageKind,
        code: ErrorCode,
        now: Instant,
    ) {
        let Self {
            transport,
            config,
            bindings,
            stats,
            ..
        } = self;
        let Some(binding) = bindings.get_mut(&file_type) else {
            stats.stale_responses += 1;
            return;
        };
        let Some(session) = binding.session.as_ref() else {
            debug!("{} error for {} {:?} outside a session", code, file_type, request);
            return;
        };
        if session.gateway() != from || session.pending_request() != Some(request) {
            stats.stale_responses += 1;
            return;
        }

        warn!("Gateway answered {:?} for {} with {}", request, file_type, code);
        if code == ErrorCode::Unsupported {
            let version = session.target();
            finish(binding, file_type, TransferOutcome::TransferFailed { version }, stats);
        } else {
            retry_or_fail(transport, config, stats, file_type, binding, now);
        }
    }
}

impl<T: Transport> fmt::Debug for FldtClient<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut file_types: Vec<_> = self.bindings.keys().copied().collect();
        file_types.sort();
        f.debug_struct("FldtClient")
            .field("addr", &self.transport.local_addr())
            .field("file_types", &file_types)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

fn is_newer(storage: &dyn UpdateInterface, version: FileVersion) -> bool {
    storage
        .describe()
        .is_none_or(|installed| version > installed)
}

fn send_poll<T: Transport>(
    transport: &mut T,
    stats: &mut ClientStats,
    file_type: FileTypeId,
    gateway: Option<MacAddr>,
) -> FldtResult<()> {
    let dest = gateway.unwrap_or(MacAddr::BROADCAST);
    debug!("Polling {} for {}", dest, file_type);
    transport.send(dest, FldtMessage::GetInfo { file_type }.encode()?)?;
    stats.frames_sent += 1;
    Ok(())
}

fn install(
    storage: &mut dyn UpdateInterface,
    descriptor: &FirmwareDescriptor,
    footer: &FirmwareFooter,
) -> TransferOutcome {
    let version = descriptor.version;
    if let Err(e) = storage.write_footer(footer) {
        return TransferOutcome::StorageFailed {
            version,
            message: e.to_string(),
        };
    }
    match storage.verify_and_install(descriptor, footer) {
        Ok(()) => TransferOutcome::Installed(version),
        Err(UpdateError::ContentMismatch) => TransferOutcome::VerificationFailed {
            version,
            reason: RejectReason::ContentMismatch,
        },
        Err(e) => TransferOutcome::InstallFailed {
            version,
            message: e.to_string(),
        },
    }
}

fn start_session<T: Transport>(
    transport: &mut T,
    config: &ClientConfig,
    stats: &mut ClientStats,
    binding: &mut ClientBinding,
    info: FileInfo,
    now: Instant,
) {
    info!(
        "Starting download of {} v{} from {}",
        info.file_type, info.version, info.gateway
    );
    stats.sessions_started += 1;
    let session = binding
        .session
        .insert(TransferSession::new(info.gateway, info.version, now));
    send_request(transport, config, stats, info.file_type, session, now);
}

/// Send the outstanding request and arm its timeout.
///
/// Send failures are left to the timeout.
fn send_request<T: Transport>(
    transport: &mut T,
    config: &ClientConfig,
    stats: &mut ClientStats,
    file_type: FileTypeId,
    session: &mut TransferSession,
    now: Instant,
) {
    let Some(message) = session.request(file_type, config.max_chunk_len) else {
        return;
    };
    session.arm(now, config.request_timeout());
    let sent = message
        .encode()
        .map_err(FldtError::from)
        .and_then(|frame| transport.send(session.gateway(), frame));
    match sent {
        Ok(()) => stats.frames_sent += 1,
        Err(e) => warn!("Sending {:?} for {} failed: {}", message.kind(), file_type, e),
    }
}

fn retry_or_fail<T: Transport>(
    transport: &mut T,
    config: &ClientConfig,
    stats: &mut ClientStats,
    file_type: FileTypeId,
    binding: &mut ClientBinding,
    now: Instant,
) {
    let Some(session) = binding.session.as_mut() else {
        return;
    };
    if session.attempts() >= config.retry_limit {
        let version = session.target();
        warn!(
            "Giving up on {} v{} after {} attempts in {}",
            file_type,
            version,
            session.attempts(),
            session.state()
        );
        finish(binding, file_type, TransferOutcome::TransferFailed { version }, stats);
        return;
    }
    stats.retries += 1;
    send_request(transport, config, stats, file_type, session, now);
}

/// End the session and record its outcome
fn finish(
    binding: &mut ClientBinding,
    file_type: FileTypeId,
    outcome: TransferOutcome,
    stats: &mut ClientStats,
) {
    binding.session = None;
    match &outcome {
        TransferOutcome::Installed(version) => {
            stats.installs += 1;
            info!("Installed {} v{}", file_type, version);
        }
        TransferOutcome::VerificationFailed { .. } => {
            stats.failures += 1;
            warn!("{}: {}", file_type, outcome);
        }
        TransferOutcome::TransferFailed { .. }
        | TransferOutcome::StorageFailed { .. }
        | TransferOutcome::InstallFailed { .. }
        | TransferOutcome::Cancelled { .. } => {
            stats.failures += 1;
            warn!("{}: {}", file_type, outcome);
            if let Err(e) = binding.storage.discard() {
                warn!("Cannot discard staged {}: {}", file_type, e);
            }
        }
    }
    binding.last_outcome = Some(outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MemoryTransport;
    use iotkit_crypto::{KeyPair, TrustLevel, TrustStore};
    use iotkit_update::{CodecError, FooterBuilder, MemoryStorage, SignerRole, VerificationPolicy};
    use std::time::Duration;

    const GATEWAY: MacAddr = MacAddr([2, 0, 0, 0, 0, 1]);
    const DEVICE: MacAddr = MacAddr([2, 0, 0, 0, 0, 2]);

    fn client() -> Result<(FldtClient<MemoryTransport>, KeyPair), Box<dyn std::error::Error>> {
        let signer = KeyPair::generate()?;
        let mut trust = TrustStore::new_in_memory();
        trust.add_key(signer.public_key.clone(), TrustLevel::Trusted, None)?;
        let engine = VerificationEngine::new(trust, VerificationPolicy::default());
        let mut client = FldtClient::new(
            MemoryTransport::new(DEVICE),
            ClientConfig::default(),
            engine,
        );
        client.register_file_type(Box::new(MemoryStorage::new(FileTypeId::Firmware, 1 << 16)))?;
        Ok((client, signer))
    }

    fn announce(version: FileVersion) -> Result<Vec<u8>, CodecError> {
        FldtMessage::Announce(FileInfo {
            file_type: FileTypeId::Firmware,
            version,
            gateway: GATEWAY,
        })
        .encode()
    }

    fn sent(client: &mut FldtClient<MemoryTransport>) -> Result<Vec<FldtMessage>, Box<dyn std::error::Error>> {
        client
            .transport_mut()
            .drain()
            .into_iter()
            .map(|envelope| FldtMessage::decode(&envelope.frame).map_err(Into::into))
            .collect()
    }

    #[test]
    fn test_announce_starts_session() -> Result<(), Box<dyn std::error::Error>> {
        let (mut client, _) = client()?;
        client.on_receive(GATEWAY, &announce(FileVersion::new(1, 0, 0))?, Instant::now());

        assert_eq!(client.state(FileTypeId::Firmware), SessionState::AwaitingHeader);
        assert_eq!(
            sent(&mut client)?,
            vec![FldtMessage::GetHeader {
                file_type: FileTypeId::Firmware
            }]
        );
        Ok(())
    }

    #[test]
    fn test_newer_announce_restarts() -> Result<(), Box<dyn std::error::Error>> {
        let (mut client, _) = client()?;
        let now = Instant::now();
        client.on_receive(GATEWAY, &announce(FileVersion::new(1, 0, 0))?, now);
        client.on_receive(GATEWAY, &announce(FileVersion::new(1, 1, 0))?, now);

        assert_eq!(
            client.last_outcome(FileTypeId::Firmware),
            Some(&TransferOutcome::Cancelled {
                version: FileVersion::new(1, 0, 0)
            })
        );
        assert_eq!(
            client.session(FileTypeId::Firmware).map(TransferSession::target),
            Some(FileVersion::new(1, 1, 0))
        );
        assert_eq!(client.stats().sessions_started, 2);
        Ok(())
    }

    #[test]
    fn test_rejected_version_needs_explicit_update() -> Result<(), Box<dyn std::error::Error>> {
        let (mut client, _) = client()?;
        let other = KeyPair::generate()?;
        let now = Instant::now();
        let version = FileVersion::new(1, 0, 0);
        let descriptor = FirmwareDescriptor::new([0; 16], [1, 0, 0, 0], version, 4);
        let footer = FooterBuilder::new(descriptor, &[1, 2, 3, 4])
            .sign_with(&other, SignerRole::Firmware)?
            .build()?;

        client.on_receive(GATEWAY, &announce(version)?, now);
        let header = FldtMessage::Header {
            file_type: FileTypeId::Firmware,
            descriptor,
        };
        client.on_receive(GATEWAY, &header.encode()?, now);
        let chunk = FldtMessage::Chunk {
            file_type: FileTypeId::Firmware,
            version,
            offset: 0,
            data: vec![1, 2, 3, 4],
        };
        client.on_receive(GATEWAY, &chunk.encode()?, now);
        let footer = FldtMessage::Footer {
            file_type: FileTypeId::Firmware,
            footer,
        };
        client.on_receive(GATEWAY, &footer.encode()?, now);

        assert!(matches!(
            client.last_outcome(FileTypeId::Firmware),
            Some(TransferOutcome::VerificationFailed { .. })
        ));
        sent(&mut client)?;

        client.on_receive(GATEWAY, &announce(version)?, now);
        assert_eq!(client.state(FileTypeId::Firmware), SessionState::Idle);
        assert!(sent(&mut client)?.is_empty());

        assert!(client.request_update(FileTypeId::Firmware, now)?);
        assert_eq!(client.state(FileTypeId::Firmware), SessionState::AwaitingHeader);
        Ok(())
    }

    #[test]
    fn test_unsupported_error_fails_session() -> Result<(), Box<dyn std::error::Error>> {
        let (mut client, _) = client()?;
        let now = Instant::now();
        client.on_receive(GATEWAY, &announce(FileVersion::new(1, 0, 0))?, now);

        let reply = FldtMessage::Error {
            file_type: FileTypeId::Firmware,
            request: MessageKind::GetHeader,
            code: ErrorCode::Unsupported,
        };
        client.on_receive(GATEWAY, &reply.encode()?, now);
        assert_eq!(
            client.last_outcome(FileTypeId::Firmware),
            Some(&TransferOutcome::TransferFailed {
                version: FileVersion::new(1, 0, 0)
            })
        );
        Ok(())
    }

    #[test]
    fn test_timeout_retries_same_request() -> Result<(), Box<dyn std::error::Error>> {
        let (mut client, _) = client()?;
        let now = Instant::now();
        client.on_receive(GATEWAY, &announce(FileVersion::new(1, 0, 0))?, now);
        sent(&mut client)?;

        client.on_tick(now + Duration::from_millis(1999));
        assert!(sent(&mut client)?.is_empty());

        client.on_tick(now + Duration::from_millis(2000));
        assert_eq!(
            sent(&mut client)?,
            vec![FldtMessage::GetHeader {
                file_type: FileTypeId::Firmware
            }]
        );
        assert_eq!(client.session(FileTypeId::Firmware).map(TransferSession::attempts), Some(2));
        Ok(())
    }

    #[test]
    fn test_session_blocks_reregistration() -> Result<(), Box<dyn std::error::Error>> {
        let (mut client, _) = client()?;
        client.on_receive(GATEWAY, &announce(FileVersion::new(1, 0, 0))?, Instant::now());

        let storage = Box::new(MemoryStorage::new(FileTypeId::Firmware, 16));
        assert!(matches!(
            client.register_file_type(storage),
            Err(FldtError::SessionActive(FileTypeId::Firmware))
        ));
        assert!(client.cancel(FileTypeId::Firmware));
        assert!(!client.cancel(FileTypeId::Firmware));
        Ok(())
    }

    #[test]
    fn test_poll_targets_gateway() -> Result<(), Box<dyn std::error::Error>> {
        let (mut client, _) = client()?;
        client.request_info(FileTypeId::Firmware, None)?;
        let frames = client.transport_mut().drain();
        assert_eq!(frames.first().map(|e| e.to), Some(MacAddr::BROADCAST));

        assert!(matches!(
            client.request_info(FileTypeId::User(1), None),
            Err(FldtError::Unsupported(_))
        ));
        Ok(())
    }
}
