//! Signed package files: the image followed by its footer
//!
//! The footer length depends on its signature count, so a package is split
//! by trying each possible count until the footer's descriptor claims exactly
//! the bytes in front of it.

use crate::error::CliError;
use iotkit_update::{FirmwareFooter, SignatureRecord};

/// Append `footer` to `content`
pub fn build(content: &[u8], footer: &FirmwareFooter) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len().saturating_add(footer.encoded_len()));
    out.extend_from_slice(content);
    out.extend_from_slice(&footer.encode());
    out
}

/// Split a package into its image and footer
pub fn split(package: &[u8]) -> Result<(&[u8], FirmwareFooter), CliError> {
    for count in 0..=FirmwareFooter::MAX_SIGNATURES {
        let footer_len = count
            .checked_mul(SignatureRecord::ENCODED_LEN)
            .and_then(|len| len.checked_add(FirmwareFooter::HEADER_LEN));
        let Some(start) = footer_len.and_then(|len| package.len().checked_sub(len)) else {
            break;
        };
        let Some((content, footer_bytes)) = package.split_at_checked(start) else {
            break;
        };
        if let Ok(footer) = FirmwareFooter::decode(footer_bytes)
            && u32::try_from(content.len()).is_ok_and(|len| len == footer.descriptor.firmware_length)
        {
            return Ok((content, footer));
        }
    }
    Err(CliError::Package(
        "no footer matching the image length was found".to_string(),
    ))
}
