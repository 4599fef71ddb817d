//! Fixed-size file descriptor
//!
//! The descriptor is the HEADER of a transfer and the signed part of the
//! footer. Its encoding is 40 bytes, big-endian:
//!
//! | Field | Size |
//! |---|---|
//! | manufacturer id | 16 |
//! | device type | 4 |
//! | version | 9 |
//! | padding (zero) | 1 |
//! | chunk size | 2 |
//! | firmware length | 4 |
//! | app size | 4 |

use crate::codec::{ByteReader, display_identifier, pad_identifier};
use crate::error::CodecError;
use crate::types::FileVersion;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default transfer chunk size in bytes
pub const DEFAULT_CHUNK_SIZE: u16 = 512;

/// Manufacturer identifier length
pub const MANUFACTURER_ID_LEN: usize = 16;

/// Device type length
pub const DEVICE_TYPE_LEN: usize = 4;

/// Versioned metadata identifying one distributable file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FirmwareDescriptor {
    /// Manufacturer identifier, zero padded
    pub manufacturer_id: [u8; MANUFACTURER_ID_LEN],
    /// Device type the file targets
    pub device_type: [u8; DEVICE_TYPE_LEN],
    /// File version
    pub version: FileVersion,
    /// Transfer chunk size
    pub chunk_size: u16,
    /// Bytes transferred
    pub firmware_length: u32,
    /// Bytes the installed application occupies, never below `firmware_length`
    pub app_size: u32,
}

impl FirmwareDescriptor {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize =
        MANUFACTURER_ID_LEN + DEVICE_TYPE_LEN + FileVersion::ENCODED_LEN + 1 + 2 + 4 + 4;

    /// Descriptor for a file of `firmware_length` bytes using the default chunk size
    pub fn new(
        manufacturer_id: [u8; MANUFACTURER_ID_LEN],
        device_type: [u8; DEVICE_TYPE_LEN],
        version: FileVersion,
        firmware_length: u32,
    ) -> Self {
        Self {
            manufacturer_id,
            device_type,
            version,
            chunk_size: DEFAULT_CHUNK_SIZE,
            firmware_length,
            app_size: firmware_length,
        }
    }

    /// Build a manufacturer identifier from text, zero padded
    pub fn manufacturer_from_str(text: &str) -> [u8; MANUFACTURER_ID_LEN] {
        pad_identifier(text)
    }

    /// Override the chunk size
    pub fn with_chunk_size(mut self, chunk_size: u16) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Override the installed application size
    pub fn with_app_size(mut self, app_size: u32) -> Self {
        self.app_size = app_size;
        self
    }

    /// Check structural rules
    pub fn validate(&self) -> Result<(), CodecError> {
        if self.chunk_size == 0 {
            return Err(CodecError::InvalidField {
                field: "descriptor.chunk_size",
                value: 0,
            });
        }
        if self.app_size < self.firmware_length {
            return Err(CodecError::InvalidField {
                field: "descriptor.app_size",
                value: u64::from(self.app_size),
            });
        }
        Ok(())
    }

    /// Number of chunks the file is split into; the last one may be short
    pub fn chunk_count(&self) -> u32 {
        if self.chunk_size == 0 {
            return 0;
        }
        self.firmware_length.div_ceil(u32::from(self.chunk_size))
    }

    /// Length of the chunk starting at `offset`, bounded by `max_len`
    pub fn chunk_len_at(&self, offset: u32, max_len: u16) -> u32 {
        let left = self.firmware_length.saturating_sub(offset);
        left.min(u32::from(max_len)).min(u32::from(self.chunk_size))
    }

    /// Canonical byte representation, the data covered by footer signatures
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::ENCODED_LEN);
        self.encode_into(&mut out);
        out
    }

    /// Append the canonical encoding to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.manufacturer_id);
        out.extend_from_slice(&self.device_type);
        out.extend_from_slice(&self.version.encode());
        out.push(0);
        out.extend_from_slice(&self.chunk_size.to_be_bytes());
        out.extend_from_slice(&self.firmware_length.to_be_bytes());
        out.extend_from_slice(&self.app_size.to_be_bytes());
    }

    /// Decode exactly one descriptor
    pub fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        let mut reader = ByteReader::new(bytes);
        let descriptor = Self::decode_from(&mut reader)?;
        reader.finish()?;
        Ok(descriptor)
    }

    /// Decode from a reader and validate
    pub fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let manufacturer_id = reader.array::<MANUFACTURER_ID_LEN>()?;
        let device_type = reader.array::<DEVICE_TYPE_LEN>()?;
        let version = FileVersion::decode_from(reader)?;
        let padding = reader.u8()?;
        if padding != 0 {
            return Err(CodecError::InvalidField {
                field: "descriptor.padding",
                value: u64::from(padding),
            });
        }
        let descriptor = Self {
            manufacturer_id,
            device_type,
            version,
            chunk_size: reader.u16()?,
            firmware_length: reader.u32()?,
            app_size: reader.u32()?,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    /// Whether `other` describes the same artifact bit for bit
    pub fn same_artifact(&self, other: &FirmwareDescriptor) -> bool {
        self.encode() == other.encode()
    }
}

impl fmt::Display for FirmwareDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] v{} ({} bytes, chunk {})",
            display_identifier(&self.manufacturer_id),
            display_identifier(&self.device_type),
            self.version,
            self.firmware_length,
            self.chunk_size
        )
    }
}
