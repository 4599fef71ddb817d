//! Property tests for the transfer engine

mod common;

use common::*;
use iotkit_crypto::prelude::*;
use iotkit_fldt::prelude::*;
use iotkit_update::prelude::*;
use proptest::prelude::*;
use std::time::Instant;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_download_reconstructs_content(
        len in 0u32..6000,
        chunk_size in 1u16..1024,
        max_chunk_len in 1u16..1024,
    ) {
        let signer = KeyPair::generate().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let now = Instant::now();
        let file = descriptor(FileVersion::new(1, 0, 0), len).with_chunk_size(chunk_size);

        let mut server = server();
        let storage = published(FileTypeId::Firmware, file, &signer)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        server
            .register_file_type(Box::new(storage), true, now)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let config = ClientConfig { max_chunk_len, ..ClientConfig::default() };
        let mut client = client_with(&signer, config).map_err(|e| TestCaseError::fail(e.to_string()))?;
        client
            .register_file_type(Box::new(MemoryStorage::new(FileTypeId::Firmware, 8192)))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        server.announce_all().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let traffic = pump(&mut server, &mut client, now).map_err(|e| TestCaseError::fail(e.to_string()))?;

        let offsets: Vec<u32> = traffic
            .iter()
            .filter_map(|message| match message {
                FldtMessage::GetChunk { offset, .. } => Some(*offset),
                _ => None,
            })
            .collect();
        prop_assert!(offsets.windows(2).all(|pair| matches!(pair, [a, b] if a <= b)));
        prop_assert!(offsets.iter().all(|offset| *offset < len.max(1)));

        prop_assert_eq!(
            client.last_outcome(FileTypeId::Firmware),
            Some(&TransferOutcome::Installed(FileVersion::new(1, 0, 0)))
        );
        let installed = client
            .storage(FileTypeId::Firmware)
            .ok_or_else(|| TestCaseError::fail("binding missing"))?;
        let restored = read_active(installed).map_err(|e| TestCaseError::fail(e.to_string()))?;
        prop_assert_eq!(restored, content(len));
    }

    #[test]
    fn prop_garbage_frames_never_panic(frame in proptest::collection::vec(any::<u8>(), 0..128)) {
        let signer = KeyPair::generate().map_err(|e| TestCaseError::fail(e.to_string()))?;
        let now = Instant::now();

        let mut server = server();
        server
            .on_receive(DEVICE, &frame, now)
            .map_err(|e| TestCaseError::fail(e.to_string()))?;

        let mut client = client(&signer).map_err(|e| TestCaseError::fail(e.to_string()))?;
        client
            .register_file_type(Box::new(MemoryStorage::new(FileTypeId::Firmware, 8192)))
            .map_err(|e| TestCaseError::fail(e.to_string()))?;
        client.on_receive(GATEWAY, &frame, now);
        prop_assert!(client.installed_version(FileTypeId::Firmware).is_none());
    }
}
