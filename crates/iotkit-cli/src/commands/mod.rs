//! Command implementations for fldtctl

pub mod inspect;
pub mod keygen;
pub mod sign;
pub mod simulate;

use crate::error::CliError;
use iotkit_crypto::{KeyPair, PublicKey, TrustLevel, TrustStore};
use std::path::{Path, PathBuf};

/// Arguments for `keygen`
#[derive(clap::Args, Debug)]
pub struct KeygenArgs {
    /// Output path prefix; writes `<prefix>.key` and `<prefix>.pub`
    pub out: PathBuf,
    /// Overwrite existing key files
    #[arg(short, long)]
    pub force: bool,
}

/// Arguments for `sign`
#[derive(clap::Args, Debug)]
pub struct SignArgs {
    /// Raw image to package
    pub image: PathBuf,
    /// Secret key file; repeat to add signatures
    #[arg(short, long = "key", required = true)]
    pub keys: Vec<PathBuf>,
    /// Version, e.g. `1.2.0` or `1.3.0-m1.b4`
    #[arg(long)]
    pub version: String,
    /// Manufacturer identifier, up to 16 bytes
    #[arg(long, default_value = "ACME0000")]
    pub manufacturer: String,
    /// Device type as 8 hex digits
    #[arg(long, default_value = "01000000")]
    pub device_type: String,
    /// Chunk size advertised in the descriptor
    #[arg(long, default_value_t = iotkit_update::descriptor::DEFAULT_CHUNK_SIZE)]
    pub chunk_size: u16,
    /// Signer role recorded with each signature
    #[arg(long, value_enum, default_value_t = RoleArg::Firmware)]
    pub role: RoleArg,
    /// Output package path
    #[arg(short, long)]
    pub out: PathBuf,
}

/// Arguments for `inspect`
#[derive(clap::Args, Debug)]
pub struct InspectArgs {
    /// Package produced by `sign`
    pub package: PathBuf,
    /// Public key files to verify against
    #[arg(short, long = "trust")]
    pub trust: Vec<PathBuf>,
    /// Signatures required to verify
    #[arg(long, default_value_t = 1)]
    pub required: u8,
}

/// Arguments for `simulate`
#[derive(clap::Args, Debug)]
pub struct SimulateArgs {
    /// Package served by the simulated gateway
    pub package: PathBuf,
    /// Public key files the simulated device trusts
    #[arg(short, long = "trust", required = true)]
    pub trust: Vec<PathBuf>,
    /// File type, e.g. `firmware`, `trust-list` or `user:7`
    #[arg(long, default_value = "firmware")]
    pub file_type: String,
    /// Configuration file; defaults are used when absent
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Probability that any frame is dropped
    #[arg(long, default_value_t = 0.0)]
    pub loss: f64,
    /// Seed for the loss pattern
    #[arg(long, default_value_t = 1)]
    pub seed: u64,
    /// Give up after this many rounds
    #[arg(long, default_value_t = 100_000)]
    pub max_rounds: u32,
}

/// Signer role as a CLI value
#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RoleArg {
    Recovery,
    Auth,
    TrustList,
    Firmware,
    Factory,
}

impl From<RoleArg> for iotkit_update::SignerRole {
    fn from(role: RoleArg) -> Self {
        match role {
            RoleArg::Recovery => Self::Recovery,
            RoleArg::Auth => Self::Auth,
            RoleArg::TrustList => Self::TrustList,
            RoleArg::Firmware => Self::Firmware,
            RoleArg::Factory => Self::Factory,
        }
    }
}

/// Read a secret key written by `keygen`
pub fn load_keypair(path: &Path) -> Result<KeyPair, CliError> {
    let text = std::fs::read_to_string(path)?;
    KeyPair::from_hex(text.trim(), path.display().to_string())
        .map_err(|e| CliError::KeyFile(format!("{}: {}", path.display(), e)))
}

/// Read a public key written by `keygen`
pub fn load_public_key(path: &Path) -> Result<PublicKey, CliError> {
    let text = std::fs::read_to_string(path)?;
    PublicKey::from_base64(text.trim(), path.display().to_string())
        .map_err(|e| CliError::KeyFile(format!("{}: {}", path.display(), e)))
}

/// In-memory trust store holding every key in `paths`
pub fn trust_store(paths: &[PathBuf]) -> Result<TrustStore, CliError> {
    let mut store = TrustStore::new_in_memory();
    for path in paths {
        let key = load_public_key(path)?;
        store
            .add_key(key, TrustLevel::Trusted, Some(path.display().to_string()))
            .map_err(|e| CliError::KeyFile(format!("{}: {}", path.display(), e)))?;
    }
    Ok(store)
}
