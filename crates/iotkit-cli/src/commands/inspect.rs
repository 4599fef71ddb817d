//! `fldtctl inspect`

use crate::commands::{InspectArgs, trust_store};
use crate::error::CliError;
use crate::{output, package};
use iotkit_update::{RejectReason, VerificationPolicy, Verdict, verify_footer};
use serde_json::json;

pub fn execute(args: &InspectArgs, json: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.package)?;
    let (image, footer) = package::split(&bytes)?;
    let descriptor = footer.descriptor;
    let content_matches = footer.matches_content(image);

    let signatures: Vec<_> = footer
        .signatures()
        .iter()
        .map(|record| {
            json!({
                "role": record.role().map_or_else(|| format!("unknown({})", record.signer_role), |r| format!("{:?}", r)),
                "key_id": record.key_id.to_string(),
                "supported": record.is_supported_format(),
            })
        })
        .collect();

    let verdict = if args.trust.is_empty() {
        None
    } else {
        let store = trust_store(&args.trust)?;
        let policy = VerificationPolicy::all_of(args.required);
        policy
            .validate()
            .map_err(|e| CliError::InvalidInput(e.to_string()))?;
        Some(match verify_footer(&descriptor, &footer, &store, &policy) {
            Verdict::Approved { .. } if !content_matches => {
                Verdict::Rejected(RejectReason::ContentMismatch)
            }
            verdict => verdict,
        })
    };

    output::print_value(
        json,
        &json!({
            "version": descriptor.version.to_string(),
            "build_time": descriptor.version.build_time().map(|t| t.to_rfc3339()),
            "manufacturer": iotkit_update::codec::display_identifier(&descriptor.manufacturer_id),
            "device_type": hex::encode(descriptor.device_type),
            "chunk_size": descriptor.chunk_size,
            "firmware_length": descriptor.firmware_length,
            "app_size": descriptor.app_size,
            "image_bytes": image.len(),
            "content_digest": hex::encode(footer.content_digest),
            "content_matches": content_matches,
            "signatures": signatures,
            "verdict": verdict.map(|v| match v {
                Verdict::Approved { valid_signatures } => format!("approved ({} valid)", valid_signatures),
                Verdict::Rejected(reason) => format!("rejected: {}", reason),
            }),
        }),
    );

    match verdict {
        Some(Verdict::Rejected(reason)) => Err(CliError::VerificationFailed(reason.to_string()).into()),
        _ => Ok(()),
    }
}
