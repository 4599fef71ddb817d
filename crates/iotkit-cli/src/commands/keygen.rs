//! `fldtctl keygen`

use crate::commands::KeygenArgs;
use crate::error::CliError;
use crate::output;
use iotkit_crypto::KeyPair;
use serde_json::json;
use std::path::PathBuf;
use tracing::info;

pub fn execute(args: &KeygenArgs, json: bool) -> anyhow::Result<()> {
    let secret_path = with_suffix(&args.out, "key");
    let public_path = with_suffix(&args.out, "pub");
    for path in [&secret_path, &public_path] {
        if path.exists() && !args.force {
            return Err(CliError::InvalidInput(format!(
                "{} exists, pass --force to overwrite",
                path.display()
            ))
            .into());
        }
    }

    let keypair = KeyPair::generate()?;
    std::fs::write(&secret_path, hex::encode(keypair.seed()))?;
    std::fs::write(&public_path, keypair.public_key.to_base64())?;
    info!("Wrote key pair {}", keypair.public_key.key_id());

    output::print_value(
        json,
        &json!({
            "key_id": keypair.public_key.key_id().to_string(),
            "fingerprint": keypair.fingerprint(),
            "secret_key": secret_path.display().to_string(),
            "public_key": public_path.display().to_string(),
        }),
    );
    Ok(())
}

fn with_suffix(prefix: &std::path::Path, suffix: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_owned();
    name.push(".");
    name.push(suffix);
    PathBuf::from(name)
}
