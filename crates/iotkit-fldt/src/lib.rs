//! FLDT: file transfer between gateways and devices
//!
//! A gateway runs an [`FldtServer`] that serves the files registered for each
//! [`FileTypeId`](iotkit_update::FileTypeId). A device runs an [`FldtClient`]
//! that notices newer versions, downloads them chunk by chunk and installs
//! them once the footer signatures pass the verification engine.
//!
//! Both sides are single-threaded state machines. The embedding loop feeds
//! inbound frames and timer ticks and supplies a [`Transport`] for outbound
//! frames.
//!
//! # Architecture
//!
//! - [`message`]: Wire messages and their codec
//! - [`transport`]: Transport contract and an in-memory transport
//! - [`server`]: Gateway side
//! - [`client`]: Device side with per-file-type sessions
//! - [`config`]: JSON configuration
//! - [`error`]: Error types
//!
//! # Example
//!
//! ```
//! use iotkit_fldt::prelude::*;
//! use iotkit_update::prelude::*;
//! use iotkit_crypto::prelude::*;
//! use std::time::Instant;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let gateway_addr = MacAddr([2, 0, 0, 0, 0, 1]);
//! let device_addr = MacAddr([2, 0, 0, 0, 0, 2]);
//! let now = Instant::now();
//!
//! let signer = KeyPair::generate()?;
//! let descriptor = FirmwareDescriptor::new(
//!     FirmwareDescriptor::manufacturer_from_str("ACME0000"),
//!     [1, 0, 0, 0],
//!     FileVersion::new(1, 0, 0),
//!     3,
//! );
//! let footer = FooterBuilder::new(descriptor, &[7, 8, 9])
//!     .sign_with(&signer, SignerRole::Firmware)?
//!     .build()?;
//! let mut published = MemoryStorage::new(FileTypeId::Firmware, 1024);
//! published.publish(descriptor, vec![7, 8, 9], footer)?;
//!
//! let mut server = FldtServer::new(MemoryTransport::new(gateway_addr), ServerConfig::default());
//! server.register_file_type(Box::new(published), true, now)?;
//!
//! let mut trust = TrustStore::new_in_memory();
//! trust.add_key(signer.public_key.clone(), TrustLevel::Trusted, None)?;
//! let engine = VerificationEngine::new(trust, VerificationPolicy::default());
//! let mut client = FldtClient::new(MemoryTransport::new(device_addr), ClientConfig::default(), engine);
//! client.register_file_type(Box::new(MemoryStorage::new(FileTypeId::Firmware, 1024)))?;
//!
//! server.announce_all()?;
//! loop {
//!     let to_device = server.transport_mut().drain();
//!     for envelope in to_device.iter().filter(|e| e.is_for(device_addr)) {
//!         client.on_receive(envelope.from, &envelope.frame, now);
//!     }
//!     let to_gateway = client.transport_mut().drain();
//!     if to_gateway.is_empty() {
//!         break;
//!     }
//!     for envelope in to_gateway.iter().filter(|e| e.is_for(gateway_addr)) {
//!         server.on_receive(envelope.from, &envelope.frame, now)?;
//!     }
//! }
//!
//! assert_eq!(client.installed_version(FileTypeId::Firmware), Some(FileVersion::new(1, 0, 0)));
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod client;
pub mod config;
pub mod error;
pub mod message;
pub mod prelude;
pub mod server;
pub mod transport;

pub use client::{ClientStats, FldtClient, SessionState, TransferOutcome, TransferSession};
pub use config::{ClientConfig, FldtConfig, ServerConfig};
pub use error::{ErrorCategory, FldtError, FldtResult};
pub use message::{ErrorCode, FldtMessage, MessageKind};
pub use server::{AddFileTypeCallback, FldtServer, ServerStats};
pub use transport::{Envelope, MemoryTransport, Transport};
