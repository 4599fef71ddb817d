//! `fldtctl sign`

use crate::commands::{SignArgs, load_keypair};
use crate::error::CliError;
use crate::{output, package};
use iotkit_update::{FileVersion, FirmwareDescriptor, FooterBuilder};
use serde_json::json;
use tracing::info;

pub fn execute(args: &SignArgs, json: bool) -> anyhow::Result<()> {
    let image = std::fs::read(&args.image)?;
    let length = u32::try_from(image.len())
        .map_err(|e| CliError::InvalidInput(format!("{}: {}", args.image.display(), e)))?;
    let version: FileVersion = args.version.parse().map_err(CliError::InvalidInput)?;

    let descriptor = FirmwareDescriptor::new(
        FirmwareDescriptor::manufacturer_from_str(&args.manufacturer),
        parse_device_type(&args.device_type)?,
        version,
        length,
    )
    .with_chunk_size(args.chunk_size);
    descriptor
        .validate()
        .map_err(|e| CliError::InvalidInput(e.to_string()))?;

    let mut builder = FooterBuilder::new(descriptor, &image);
    for path in &args.keys {
        let keypair = load_keypair(path)?;
        builder = builder.sign_with(&keypair, args.role.into())?;
    }
    let footer = builder.build()?;

    let bundle = package::build(&image, &footer);
    std::fs::write(&args.out, &bundle)?;
    info!("Signed {} as v{}", args.image.display(), version);

    output::print_value(
        json,
        &json!({
            "package": args.out.display().to_string(),
            "version": version.to_string(),
            "firmware_length": length,
            "signatures": footer.signature_count(),
            "size": bundle.len(),
        }),
    );
    Ok(())
}

fn parse_device_type(text: &str) -> Result<[u8; 4], CliError> {
    let bytes = hex::decode(text)
        .map_err(|e| CliError::InvalidInput(format!("device type '{}': {}", text, e)))?;
    <[u8; 4]>::try_from(bytes.as_slice()).map_err(|e| {
        CliError::InvalidInput(format!("device type '{}' must be 4 bytes: {}", text, e))
    })
}
