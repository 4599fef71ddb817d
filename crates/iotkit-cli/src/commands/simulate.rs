//! `fldtctl simulate`
//!
//! Runs a gateway and a device in one process over an in-memory link that
//! drops frames at random, driving time forward whenever the link goes quiet.

use crate::commands::{SimulateArgs, trust_store};
use crate::error::CliError;
use crate::{output, package};
use iotkit_fldt::{FldtClient, FldtConfig, FldtServer, MemoryTransport, TransferOutcome};
use iotkit_update::{FileTypeId, MacAddr, MemoryStorage, VerificationEngine};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use std::time::Instant;
use tracing::{debug, info};

const GATEWAY: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x01]);
const DEVICE: MacAddr = MacAddr([0x02, 0, 0, 0, 0, 0x02]);

/// Result of a simulated transfer
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationReport {
    pub outcome: Option<TransferOutcome>,
    pub rounds: u32,
    pub frames_dropped: u64,
    pub simulated_ms: u128,
}

pub fn execute(args: &SimulateArgs, json: bool) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => FldtConfig::load_from_path(path)?,
        None => FldtConfig::default(),
    };
    if !(0.0..1.0).contains(&args.loss) {
        return Err(CliError::InvalidInput(format!("loss {} is not in [0, 1)", args.loss)).into());
    }
    let file_type: FileTypeId = args.file_type.parse().map_err(CliError::InvalidInput)?;

    let bytes = std::fs::read(&args.package)?;
    let (image, footer) = package::split(&bytes)?;
    let store = trust_store(&args.trust)?;

    let (report, stats) = run(
        &config,
        file_type,
        image.to_vec(),
        footer,
        VerificationEngine::new(store, config.verification),
        args,
    )?;

    output::print_value(
        json,
        &json!({
            "outcome": report.outcome.as_ref().map(ToString::to_string),
            "rounds": report.rounds,
            "frames_dropped": report.frames_dropped,
            "simulated_ms": report.simulated_ms,
            "retries": stats.retries,
            "timeouts": stats.timeouts,
            "bytes_received": stats.bytes_received,
        }),
    );

    match report.outcome {
        Some(TransferOutcome::Installed(_)) => Ok(()),
        Some(TransferOutcome::VerificationFailed { reason, .. }) => {
            Err(CliError::VerificationFailed(reason.to_string()).into())
        }
        Some(other) => Err(CliError::TransferFailed(other.to_string()).into()),
        None => Err(CliError::TransferFailed(format!(
            "no outcome after {} rounds",
            report.rounds
        ))
        .into()),
    }
}

fn run(
    config: &FldtConfig,
    file_type: FileTypeId,
    image: Vec<u8>,
    footer: iotkit_update::FirmwareFooter,
    engine: VerificationEngine,
    args: &SimulateArgs,
) -> anyhow::Result<(SimulationReport, iotkit_fldt::ClientStats)> {
    let start = Instant::now();
    let mut now = start;
    let mut rng = StdRng::seed_from_u64(args.seed);
    let mut frames_dropped = 0u64;

    let capacity = u64::try_from(image.len())?.max(1);
    let mut published = MemoryStorage::new(file_type, capacity);
    published.publish(footer.descriptor, image, footer)?;

    let mut server = FldtServer::new(MemoryTransport::new(GATEWAY), config.server);
    server.register_file_type(Box::new(published), true, now)?;

    let mut client = FldtClient::new(MemoryTransport::new(DEVICE), config.client, engine);
    client.register_file_type(Box::new(MemoryStorage::new(file_type, capacity)))?;

    let mut rounds = 0u32;
    while rounds < args.max_rounds {
        rounds = rounds.saturating_add(1);
        server.on_announce_tick(now)?;

        let mut delivered = false;
        for envelope in server.transport_mut().drain() {
            if rng.gen_bool(args.loss) {
                frames_dropped = frames_dropped.saturating_add(1);
                continue;
            }
            if envelope.is_for(DEVICE) {
                client.on_receive(envelope.from, &envelope.frame, now);
                delivered = true;
            }
        }
        for envelope in client.transport_mut().drain() {
            if rng.gen_bool(args.loss) {
                frames_dropped = frames_dropped.saturating_add(1);
                continue;
            }
            if envelope.is_for(GATEWAY) {
                server.on_receive(envelope.from, &envelope.frame, now)?;
                delivered = true;
            }
        }

        if let Some(outcome) = client.last_outcome(file_type) {
            info!("Simulation finished after {} rounds: {}", rounds, outcome);
            break;
        }
        if !delivered {
            now = now
                .checked_add(config.client.request_timeout())
                .unwrap_or(now);
            debug!("Link idle, advancing to {:?}", now.saturating_duration_since(start));
            client.on_tick(now);
        }
    }

    Ok((
        SimulationReport {
            outcome: client.last_outcome(file_type).cloned(),
            rounds,
            frames_dropped,
            simulated_ms: now.saturating_duration_since(start).as_millis(),
        },
        client.stats(),
    ))
}
