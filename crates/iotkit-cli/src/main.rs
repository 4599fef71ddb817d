//! fldtctl - FLDT signing and transfer tool
//!
//! Generates signing keys, packages and signs images, inspects signed
//! packages and simulates a gateway-to-device transfer over a lossy link.

#![deny(static_mut_refs)]
#![deny(unused_must_use)]
#![deny(clippy::unwrap_used)]

mod commands;
mod error;
mod output;
mod package;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{InspectArgs, KeygenArgs, SignArgs, SimulateArgs};
use crate::error::CliError;

#[derive(Parser)]
#[command(name = "fldtctl")]
#[command(about = "Sign, inspect and simulate FLDT file transfers")]
#[command(version)]
#[command(long_about = "
fldtctl manages files distributed over the FLDT protocol.
It creates Ed25519 signing keys, appends signed footers to images,
checks packages against a set of trusted keys and runs a complete
gateway-to-device transfer in process.

Use --json for machine-readable output.
")]
struct Cli {
    /// Output in JSON format for machine parsing
    #[arg(long, global = true)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate an Ed25519 signing key pair
    Keygen(KeygenArgs),

    /// Package an image with a signed footer
    Sign(SignArgs),

    /// Show a package's descriptor and signatures
    Inspect(InspectArgs),

    /// Transfer a package from a simulated gateway to a simulated device
    Simulate(SimulateArgs),
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "fldtctl={level},iotkit_fldt={level},iotkit_update={level},iotkit_crypto={level}",
                    level = log_level
                )
                .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr))
        .init();

    match execute_command(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let code = e.downcast_ref::<CliError>().map_or(1, CliError::exit_code);
            output::print_error(cli.json, &e, code);
            ExitCode::from(code)
        }
    }
}

fn execute_command(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Keygen(args) => commands::keygen::execute(args, cli.json),
        Commands::Sign(args) => commands::sign::execute(args, cli.json),
        Commands::Inspect(args) => commands::inspect::execute(args, cli.json),
        Commands::Simulate(args) => commands::simulate::execute(args, cli.json),
    }
}
