//! Identifiers and version metadata shared by servers and clients

use crate::codec::ByteReader;
use crate::error::CodecError;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Seconds between the Unix epoch and 2015-01-01T00:00:00Z, the base of build timestamps
pub const BUILD_EPOCH_OFFSET: i64 = 1_420_070_400;

/// Identifies which update interface handles a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FileTypeId {
    /// Device firmware image
    Firmware,
    /// Accepted-key list
    TrustList,
    /// Application-defined file type
    User(u32),
}

impl FileTypeId {
    /// Encoded size: kind byte plus big-endian user id
    pub const ENCODED_LEN: usize = 5;

    const KIND_FIRMWARE: u8 = 0;
    const KIND_TRUST_LIST: u8 = 1;
    const KIND_USER: u8 = 2;

    /// Encode to the wire form
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let (kind, user_id) = match self {
            FileTypeId::Firmware => (Self::KIND_FIRMWARE, 0),
            FileTypeId::TrustList => (Self::KIND_TRUST_LIST, 0),
            FileTypeId::User(id) => (Self::KIND_USER, *id),
        };
        let [a, b, c, d] = user_id.to_be_bytes();
        [kind, a, b, c, d]
    }

    /// Decode from a reader
    pub fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        let kind = reader.u8()?;
        let user_id = reader.u32()?;
        match kind {
            Self::KIND_FIRMWARE => Ok(FileTypeId::Firmware),
            Self::KIND_TRUST_LIST => Ok(FileTypeId::TrustList),
            Self::KIND_USER => Ok(FileTypeId::User(user_id)),
            other => Err(CodecError::InvalidField {
                field: "file_type.kind",
                value: u64::from(other),
            }),
        }
    }

    /// Directory-safe name used by file-backed storage
    pub fn storage_name(&self) -> String {
        match self {
            FileTypeId::Firmware => "firmware".to_string(),
            FileTypeId::TrustList => "trust-list".to_string(),
            FileTypeId::User(id) => format!("user-{}", id),
        }
    }
}

impl fmt::Display for FileTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileTypeId::Firmware => write!(f, "firmware"),
            FileTypeId::TrustList => write!(f, "trust-list"),
            FileTypeId::User(id) => write!(f, "user:{}", id),
        }
    }
}

impl FromStr for FileTypeId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "firmware" => Ok(FileTypeId::Firmware),
            "trust-list" | "trustlist" => Ok(FileTypeId::TrustList),
            other => other
                .strip_prefix("user:")
                .and_then(|id| id.parse().ok())
                .map(FileTypeId::User)
                .ok_or_else(|| format!("unknown file type '{}'", other)),
        }
    }
}

/// Version of a distributable file.
///
/// Ordered by `(major, minor, patch)`, then a release build (milestone and
/// build both zero) above every pre-release of the same numbers, then
/// `(dev_milestone, dev_build)`. The build timestamp only breaks ties.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileVersion {
    /// Major version
    pub major: u8,
    /// Minor version
    pub minor: u8,
    /// Patch version
    pub patch: u8,
    /// Development milestone, zero on release builds
    pub dev_milestone: u8,
    /// Development build number, zero on release builds
    pub dev_build: u8,
    /// Build time in seconds since 2015-01-01T00:00:00Z
    pub timestamp: u32,
}

impl FileVersion {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize = 9;

    /// Release version with no timestamp
    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
            dev_milestone: 0,
            dev_build: 0,
            timestamp: 0,
        }
    }

    /// Set pre-release qualifiers
    pub const fn with_pre_release(mut self, dev_milestone: u8, dev_build: u8) -> Self {
        self.dev_milestone = dev_milestone;
        self.dev_build = dev_build;
        self
    }

    /// Set the build timestamp
    pub const fn with_timestamp(mut self, timestamp: u32) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Stamp with a wall-clock build time; times before the build epoch clamp to zero
    pub fn with_build_time(self, time: DateTime<Utc>) -> Self {
        let seconds = time.timestamp().saturating_sub(BUILD_EPOCH_OFFSET);
        self.with_timestamp(u32::try_from(seconds.max(0)).unwrap_or(u32::MAX))
    }

    /// Whether this is a release build
    pub fn is_release(&self) -> bool {
        self.dev_milestone == 0 && self.dev_build == 0
    }

    /// Build time as a UTC date
    pub fn build_time(&self) -> Option<DateTime<Utc>> {
        let unix = BUILD_EPOCH_OFFSET.checked_add(i64::from(self.timestamp))?;
        Utc.timestamp_opt(unix, 0).single()
    }

    /// Encode to the wire form
    pub fn encode(&self) -> [u8; Self::ENCODED_LEN] {
        let [t0, t1, t2, t3] = self.timestamp.to_be_bytes();
        [
            self.major,
            self.minor,
            self.patch,
            self.dev_milestone,
            self.dev_build,
            t0,
            t1,
            t2,
            t3,
        ]
    }

    /// Decode from a reader
    pub fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            major: reader.u8()?,
            minor: reader.u8()?,
            patch: reader.u8()?,
            dev_milestone: reader.u8()?,
            dev_build: reader.u8()?,
            timestamp: reader.u32()?,
        })
    }

    fn ordering_key(&self) -> (u8, u8, u8, bool, u8, u8, u32) {
        (
            self.major,
            self.minor,
            self.patch,
            self.is_release(),
            self.dev_milestone,
            self.dev_build,
            self.timestamp,
        )
    }
}

impl Ord for FileVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.ordering_key().cmp(&other.ordering_key())
    }
}

impl PartialOrd for FileVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.is_release() {
            write!(f, "-m{}.b{}", self.dev_milestone, self.dev_build)?;
        }
        Ok(())
    }
}

impl FromStr for FileVersion {
    type Err = String;

    /// Parses `1.2.3` or `1.2.3-m4.b5`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (numbers, pre_release) = match s.split_once('-') {
            Some((numbers, pre)) => (numbers, Some(pre)),
            None => (s, None),
        };

        let parts: Vec<u8> = numbers
            .split('.')
            .map(|part| part.parse::<u8>())
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid version '{}': {}", s, e))?;
        let [major, minor, patch] = parts.as_slice() else {
            return Err(format!("invalid version '{}': expected major.minor.patch", s));
        };
        let mut version = FileVersion::new(*major, *minor, *patch);

        if let Some(pre) = pre_release {
            let (milestone, build) = pre
                .strip_prefix('m')
                .and_then(|rest| rest.split_once(".b"))
                .ok_or_else(|| format!("invalid pre-release '{}': expected mN.bN", pre))?;
            let milestone = milestone
                .parse()
                .map_err(|e| format!("invalid milestone '{}': {}", milestone, e))?;
            let build = build
                .parse()
                .map_err(|e| format!("invalid build '{}': {}", build, e))?;
            version = version.with_pre_release(milestone, build);
        }

        Ok(version)
    }
}

/// Transport address of a gateway or device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct MacAddr(pub [u8; 6]);

impl MacAddr {
    /// Broadcast address
    pub const BROADCAST: MacAddr = MacAddr([0xff; 6]);

    /// Whether this is the broadcast address
    pub fn is_broadcast(&self) -> bool {
        *self == Self::BROADCAST
    }
}

impl fmt::Display for MacAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            a, b, c, d, e, g
        )
    }
}

impl FromStr for MacAddr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let octets: Vec<u8> = s
            .split(':')
            .map(|part| u8::from_str_radix(part, 16))
            .collect::<Result<_, _>>()
            .map_err(|e| format!("invalid MAC address '{}': {}", s, e))?;
        let bytes: [u8; 6] = octets
            .try_into()
            .map_err(|octets: Vec<u8>| {
                format!(
                    "invalid MAC address '{}': expected 6 octets, got {}",
                    s,
                    octets.len()
                )
            })?;
        Ok(MacAddr(bytes))
    }
}

/// What a gateway holds for one file type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// File type
    pub file_type: FileTypeId,
    /// Version the gateway serves
    pub version: FileVersion,
    /// Address to request the file from
    pub gateway: MacAddr,
}

impl FileInfo {
    /// Encoded size in bytes
    pub const ENCODED_LEN: usize = FileTypeId::ENCODED_LEN + FileVersion::ENCODED_LEN + 6;

    /// Append the wire form to `out`
    pub fn encode_into(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.file_type.encode());
        out.extend_from_slice(&self.version.encode());
        out.extend_from_slice(&self.gateway.0);
    }

    /// Decode from a reader
    pub fn decode_from(reader: &mut ByteReader<'_>) -> Result<Self, CodecError> {
        Ok(Self {
            file_type: FileTypeId::decode_from(reader)?,
            version: FileVersion::decode_from(reader)?,
            gateway: MacAddr(reader.array::<6>()?),
        })
    }
}
