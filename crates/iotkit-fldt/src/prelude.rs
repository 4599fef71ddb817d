//! Prelude for iotkit-fldt
//!
//! Re-exports the server, client, transport and configuration types.

pub use crate::client::{ClientStats, FldtClient, SessionState, TransferOutcome};
pub use crate::config::{ClientConfig, FldtConfig, ServerConfig};
pub use crate::error::{FldtError, FldtResult};
pub use crate::message::{ErrorCode, FldtMessage, MessageKind};
pub use crate::server::{FldtServer, ServerStats};
pub use crate::transport::{Envelope, MemoryTransport, Transport};
