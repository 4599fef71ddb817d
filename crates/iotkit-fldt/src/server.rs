//! FLDT gateway server
//!
//! Holds a registry of served file types, answers client requests and
//! periodically announces what it holds. The server never sends file data
//! without a request; announcements are advisory and clients still poll.

use crate::config::ServerConfig;
use crate::error::{FldtError, FldtResult};
use crate::message::{ErrorCode, FldtMessage, MessageKind};
use crate::transport::Transport;
use iotkit_update::{FileInfo, FileTypeId, FileVersion, MacAddr, UpdateError, UpdateInterface};
use std::collections::HashMap;
use std::fmt;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Creates a binding for a file type requested by a peer but not registered.
///
/// Returning `None` answers the peer with an unsupported-type error.
pub type AddFileTypeCallback = Box<dyn FnMut(FileTypeId) -> Option<Box<dyn UpdateInterface>>>;

struct Binding {
    storage: Box<dyn UpdateInterface>,
    broadcast: bool,
}

/// Server counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerStats {
    /// Frames handed to `on_receive`
    pub frames_received: u64,
    /// Frames sent
    pub frames_sent: u64,
    /// Announcements sent
    pub announcements: u64,
    /// Chunks served
    pub chunks_served: u64,
    /// Error replies sent
    pub errors_sent: u64,
    /// Frames that failed to decode
    pub malformed: u64,
}

/// Gateway side of the protocol
pub struct FldtServer<T: Transport> {
    transport: T,
    config: ServerConfig,
    registry: HashMap<FileTypeId, Binding>,
    add_file_type: Option<AddFileTypeCallback>,
    transfers: HashMap<(MacAddr, FileTypeId), Instant>,
    last_announce: Option<Instant>,
    stats: ServerStats,
}

impl<T: Transport> FldtServer<T> {
    /// Server sending through `transport`
    pub fn new(transport: T, config: ServerConfig) -> Self {
        Self {
            transport,
            config,
            registry: HashMap::new(),
            add_file_type: None,
            transfers: HashMap::new(),
            last_announce: None,
            stats: ServerStats::default(),
        }
    }

    /// Ask `callback` for bindings of file types peers request but nobody registered
    pub fn with_add_file_type_callback(mut self, callback: AddFileTypeCallback) -> Self {
        self.add_file_type = Some(callback);
        self
    }

    /// Add or replace the binding for `storage.file_type()`.
    ///
    /// Returns the replaced binding. Fails while a peer is downloading the type.
    pub fn register_file_type(
        &mut self,
        storage: Box<dyn UpdateInterface>,
        broadcast_file_info: bool,
        now: Instant,
    ) -> FldtResult<Option<Box<dyn UpdateInterface>>> {
        let file_type = storage.file_type();
        self.ensure_idle(file_type, now)?;

        info!(
            "Registered {} (version {}, broadcast {})",
            file_type,
            version_text(storage.describe()),
            broadcast_file_info
        );
        let previous = self.registry.insert(
            file_type,
            Binding {
                storage,
                broadcast: broadcast_file_info,
            },
        );
        Ok(previous.map(|binding| binding.storage))
    }

    /// Remove the binding for `file_type`
    pub fn unregister_file_type(
        &mut self,
        file_type: FileTypeId,
        now: Instant,
    ) -> FldtResult<Option<Box<dyn UpdateInterface>>> {
        self.ensure_idle(file_type, now)?;
        Ok(self
            .registry
            .remove(&file_type)
            .map(|binding| binding.storage))
    }

    /// Registered file types
    pub fn file_types(&self) -> Vec<FileTypeId> {
        let mut types: Vec<_> = self.registry.keys().copied().collect();
        types.sort();
        types
    }

    /// What the server would announce for `file_type`
    pub fn file_info(&self, file_type: FileTypeId) -> Option<FileInfo> {
        let binding = self.registry.get(&file_type)?;
        Some(FileInfo {
            file_type,
            version: binding.storage.describe()?,
            gateway: self.transport.local_addr(),
        })
    }

    /// Peers currently downloading `file_type`
    pub fn active_transfers(&self, file_type: FileTypeId, now: Instant) -> Vec<MacAddr> {
        let idle = self.config.transfer_idle_timeout();
        let mut peers: Vec<_> = self
            .transfers
            .iter()
            .filter(|((_, ty), seen)| *ty == file_type && now.saturating_duration_since(**seen) < idle)
            .map(|((peer, _), _)| *peer)
            .collect();
        peers.sort();
        peers
    }

    /// Counters
    pub fn stats(&self) -> ServerStats {
        self.stats
    }

    /// Transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Transport, mutably
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Announce every broadcast-enabled file type if the interval elapsed.
    ///
    /// Returns the number of announcements sent.
    pub fn on_announce_tick(&mut self, now: Instant) -> FldtResult<usize> {
        self.prune_transfers(now);
        if let Some(last) = self.last_announce
            && now.saturating_duration_since(last) < self.config.announce_interval()
        {
            return Ok(0);
        }
        self.last_announce = Some(now);
        self.announce_all()
    }

    /// Announce every broadcast-enabled file type now
    pub fn announce_all(&mut self) -> FldtResult<usize> {
        let gateway = self.transport.local_addr();
        let mut infos: Vec<FileInfo> = self
            .registry
            .iter()
            .filter(|(_, binding)| binding.broadcast)
            .filter_map(|(file_type, binding)| {
                binding.storage.describe().map(|version| FileInfo {
                    file_type: *file_type,
                    version,
                    gateway,
                })
            })
            .collect();
        infos.sort_by_key(|info| info.file_type);

        for info in &infos {
            debug!("Announcing {} v{}", info.file_type, info.version);
            self.send(MacAddr::BROADCAST, &FldtMessage::Announce(*info))?;
            self.stats.announcements += 1;
        }
        Ok(infos.len())
    }

    /// Handle one inbound frame from `from`
    pub fn on_receive(&mut self, from: MacAddr, frame: &[u8], now: Instant) -> FldtResult<()> {
        self.stats.frames_received += 1;
        self.prune_transfers(now);

        let message = match FldtMessage::decode(frame) {
            Ok(message) => message,
            Err(e) => {
                self.stats.malformed += 1;
                warn!("Malformed frame from {}: {}", from, e);
                if let Ok((kind, file_type)) = FldtMessage::peek(frame)
                    && kind.is_request()
                {
                    self.send_error(from, file_type, kind, ErrorCode::Malformed)?;
                }
                return Ok(());
            }
        };

        let kind = message.kind();
        let file_type = message.file_type();
        if !kind.is_request() {
            debug!("Ignoring {:?} from {}", kind, from);
            return Ok(());
        }

        match self.answer(from, message, now) {
            Ok(reply) => self.send(from, &reply),
            Err(code) => self.send_error(from, file_type, kind, code),
        }
    }

    fn answer(
        &mut self,
        from: MacAddr,
        message: FldtMessage,
        now: Instant,
    ) -> Result<FldtMessage, ErrorCode> {
        let gateway = self.transport.local_addr();
        let file_type = message.file_type();
        let binding = self.resolve(file_type)?;

        match message {
            FldtMessage::GetInfo { .. } => {
                let version = binding.storage.describe().ok_or(ErrorCode::NotFound)?;
                Ok(FldtMessage::Info(FileInfo {
                    file_type,
                    version,
                    gateway,
                }))
            }
            FldtMessage::GetHeader { .. } => {
                let descriptor = binding.storage.load_descriptor().map_err(error_code)?;
                self.transfers.insert((from, file_type), now);
                Ok(FldtMessage::Header {
                    file_type,
                    descriptor,
                })
            }
            FldtMessage::GetChunk {
                version,
                offset,
                max_len,
                ..
            } => {
                let descriptor = current_descriptor(binding.storage.as_ref(), version)?;
                let data = binding
                    .storage
                    .read_chunk(&descriptor, offset, max_len)
                    .map_err(error_code)?;
                self.transfers.insert((from, file_type), now);
                self.stats.chunks_served += 1;
                Ok(FldtMessage::Chunk {
                    file_type,
                    version,
                    offset,
                    data,
                })
            }
            FldtMessage::GetFooter { version, .. } => {
                current_descriptor(binding.storage.as_ref(), version)?;
                let footer = binding.storage.read_footer().map_err(error_code)?;
                self.transfers.remove(&(from, file_type));
                Ok(FldtMessage::Footer { file_type, footer })
            }
            _ => Err(ErrorCode::Malformed),
        }
    }

    fn resolve(&mut self, file_type: FileTypeId) -> Result<&mut Binding, ErrorCode> {
        if !self.registry.contains_key(&file_type) {
            let storage = self
                .add_file_type
                .as_mut()
                .and_then(|callback| callback(file_type))
                .ok_or(ErrorCode::Unsupported)?;
            if storage.file_type() != file_type {
                warn!(
                    "Callback for {} returned a binding for {}",
                    file_type,
                    storage.file_type()
                );
                return Err(ErrorCode::Unsupported);
            }
            info!("Added {} on demand", file_type);
            self.registry.insert(
                file_type,
                Binding {
                    storage,
                    broadcast: false,
                },
            );
        }
        self.registry.get_mut(&file_type).ok_or(ErrorCode::Unsupported)
    }

    /// Forget peers that went quiet for longer than the idle timeout
    fn prune_transfers(&mut self, now: Instant) {
        let idle = self.config.transfer_idle_timeout();
        let before = self.transfers.len();
        self.transfers
            .retain(|_, seen| now.saturating_duration_since(*seen) < idle);
        let pruned = before.saturating_sub(self.transfers.len());
        if pruned > 0 {
            debug!("Dropped {} idle transfer(s)", pruned);
        }
    }

    fn ensure_idle(&mut self, file_type: FileTypeId, now: Instant) -> FldtResult<()> {
        self.prune_transfers(now);

        match self.transfers.keys().find(|(_, ty)| *ty == file_type) {
            Some((peer, _)) => Err(FldtError::TransferInFlight {
                file_type,
                peer: *peer,
            }),
            None => Ok(()),
        }
    }

    fn send(&mut self, to: MacAddr, message: &FldtMessage) -> FldtResult<()> {
        self.transport.send(to, message.encode()?)?;
        self.stats.frames_sent += 1;
        Ok(())
    }

    fn send_error(
        &mut self,
        to: MacAddr,
        file_type: FileTypeId,
        request: MessageKind,
        code: ErrorCode,
    ) -> FldtResult<()> {
        debug!("Answering {:?} for {} from {} with {}", request, file_type, to, code);
        self.stats.errors_sent += 1;
        self.send(
            to,
            &FldtMessage::Error {
                file_type,
                request,
                code,
            },
        )
    }
}

impl<T: Transport> fmt::Debug for FldtServer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FldtServer")
            .field("addr", &self.transport.local_addr())
            .field("file_types", &self.file_types())
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}

/// Active descriptor, provided it is the version the peer is downloading
fn current_descriptor(
    storage: &dyn UpdateInterface,
    version: FileVersion,
) -> Result<iotkit_update::FirmwareDescriptor, ErrorCode> {
    let descriptor = storage.load_descriptor().map_err(error_code)?;
    if descriptor.version != version {
        debug!(
            "Peer asked for v{} but v{} is served",
            version, descriptor.version
        );
        return Err(ErrorCode::NotFound);
    }
    Ok(descriptor)
}

fn error_code(error: UpdateError) -> ErrorCode {
    match error {
        UpdateError::NotFound(_) | UpdateError::InvalidOffset { .. } => ErrorCode::NotFound,
        other => {
            warn!("Storage failed while serving: {}", other);
            ErrorCode::Internal
        }
    }
}

fn version_text(version: Option<FileVersion>) -> String {
    version.map_or_else(|| "none".to_string(), |v| v.to_string())
}
