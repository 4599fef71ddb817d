//! Shared fixtures for the FLDT integration tests

#![allow(dead_code)]

use iotkit_crypto::prelude::*;
use iotkit_fldt::prelude::*;
use iotkit_update::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

pub const GATEWAY: MacAddr = MacAddr([2, 0, 0, 0, 0, 1]);
pub const DEVICE: MacAddr = MacAddr([2, 0, 0, 0, 0, 2]);

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

/// Deterministic file content
pub fn content(len: u32) -> Vec<u8> {
    (0..len).map(|i| (i.wrapping_mul(31) % 251) as u8).collect()
}

pub fn descriptor(version: FileVersion, len: u32) -> FirmwareDescriptor {
    FirmwareDescriptor::new(
        FirmwareDescriptor::manufacturer_from_str("ACME0000"),
        [1, 0, 0, 0],
        version,
        len,
    )
}

pub fn sign(
    descriptor: FirmwareDescriptor,
    content: &[u8],
    signer: &KeyPair,
) -> Result<FirmwareFooter, Box<dyn std::error::Error>> {
    Ok(FooterBuilder::new(descriptor, content)
        .sign_with(signer, SignerRole::Firmware)?
        .build()?)
}

/// Storage holding a signed, active file
pub fn published(
    file_type: FileTypeId,
    descriptor: FirmwareDescriptor,
    signer: &KeyPair,
) -> Result<MemoryStorage, Box<dyn std::error::Error>> {
    let mut storage = MemoryStorage::new(file_type, 1 << 20);
    let data = content(descriptor.firmware_length);
    let footer = sign(descriptor, &data, signer)?;
    storage.publish(descriptor, data, footer)?;
    Ok(storage)
}

pub fn server() -> FldtServer<MemoryTransport> {
    FldtServer::new(MemoryTransport::new(GATEWAY), ServerConfig::default())
}

pub fn client(signer: &KeyPair) -> Result<FldtClient<MemoryTransport>, Box<dyn std::error::Error>> {
    client_with(signer, ClientConfig::default())
}

pub fn client_with(
    signer: &KeyPair,
    config: ClientConfig,
) -> Result<FldtClient<MemoryTransport>, Box<dyn std::error::Error>> {
    let mut trust = TrustStore::new_in_memory();
    trust.add_key(signer.public_key.clone(), TrustLevel::Trusted, None)?;
    let engine = VerificationEngine::new(trust, VerificationPolicy::default());
    Ok(FldtClient::new(MemoryTransport::new(DEVICE), config, engine))
}

/// Read the whole active file back through the interface
pub fn read_active(
    storage: &dyn UpdateInterface,
) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let descriptor = storage.load_descriptor()?;
    let mut out = Vec::new();
    while (out.len() as u32) < descriptor.firmware_length {
        let chunk = storage.read_chunk(&descriptor, out.len() as u32, 512)?;
        out.extend_from_slice(&chunk);
    }
    Ok(out)
}

/// Exchange frames until the client stops sending; returns every frame in order
pub fn pump(
    server: &mut FldtServer<MemoryTransport>,
    client: &mut FldtClient<MemoryTransport>,
    now: Instant,
) -> Result<Vec<FldtMessage>, Box<dyn std::error::Error>> {
    let mut traffic = Vec::new();
    for _ in 0..10_000 {
        for envelope in server.transport_mut().drain() {
            traffic.push(FldtMessage::decode(&envelope.frame)?);
            if envelope.is_for(DEVICE) {
                client.on_receive(envelope.from, &envelope.frame, now);
            }
        }
        let requests = client.transport_mut().drain();
        if requests.is_empty() {
            break;
        }
        for envelope in requests {
            traffic.push(FldtMessage::decode(&envelope.frame)?);
            if envelope.is_for(GATEWAY) {
                server.on_receive(envelope.from, &envelope.frame, now)?;
            }
        }
    }
    Ok(traffic)
}

/// Update interface that records which operations were called
pub struct RecordingStorage {
    inner: MemoryStorage,
    calls: Rc<RefCell<Vec<&'static str>>>,
}

impl RecordingStorage {
    pub fn new(inner: MemoryStorage) -> (Self, Rc<RefCell<Vec<&'static str>>>) {
        let calls = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                inner,
                calls: calls.clone(),
            },
            calls,
        )
    }

    fn record(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }
}

impl UpdateInterface for RecordingStorage {
    fn file_type(&self) -> FileTypeId {
        self.inner.file_type()
    }

    fn describe(&self) -> Option<FileVersion> {
        self.inner.describe()
    }

    fn load_descriptor(&self) -> UpdateResult<FirmwareDescriptor> {
        self.inner.load_descriptor()
    }

    fn save_descriptor(&mut self, descriptor: &FirmwareDescriptor) -> UpdateResult<()> {
        self.record("save_descriptor");
        self.inner.save_descriptor(descriptor)
    }

    fn read_chunk(
        &self,
        descriptor: &FirmwareDescriptor,
        offset: u32,
        max_len: u16,
    ) -> UpdateResult<Vec<u8>> {
        self.inner.read_chunk(descriptor, offset, max_len)
    }

    fn write_chunk(
        &mut self,
        descriptor: &FirmwareDescriptor,
        offset: u32,
        bytes: &[u8],
    ) -> UpdateResult<()> {
        self.record("write_chunk");
        self.inner.write_chunk(descriptor, offset, bytes)
    }

    fn read_footer(&self) -> UpdateResult<FirmwareFooter> {
        self.inner.read_footer()
    }

    fn write_footer(&mut self, footer: &FirmwareFooter) -> UpdateResult<()> {
        self.record("write_footer");
        self.inner.write_footer(footer)
    }

    fn verify_and_install(
        &mut self,
        descriptor: &FirmwareDescriptor,
        footer: &FirmwareFooter,
    ) -> UpdateResult<()> {
        self.record("verify_and_install");
        self.inner.verify_and_install(descriptor, footer)
    }

    fn mark_invalid(&mut self, descriptor: &FirmwareDescriptor) -> UpdateResult<()> {
        self.record("mark_invalid");
        self.inner.mark_invalid(descriptor)
    }

    fn discard(&mut self) -> UpdateResult<()> {
        self.record("discard");
        self.inner.discard()
    }
}
