//! Protocol configuration
//!
//! Loaded from a JSON file or built from defaults, then validated once at
//! startup and handed to the server and client.

use crate::error::{FldtError, FldtResult};
use iotkit_update::VerificationPolicy;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Current configuration schema identifier
pub const SCHEMA_VERSION: &str = "iotkit.fldt/1";

/// Complete FLDT configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FldtConfig {
    /// Configuration schema version
    pub schema_version: String,
    /// Device-side settings
    pub client: ClientConfig,
    /// Gateway-side settings
    pub server: ServerConfig,
    /// Footer signature thresholds
    pub verification: VerificationPolicy,
}

/// Device-side settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Time to wait for a response before retrying
    pub request_timeout_ms: u64,
    /// Sends per request including the first
    pub retry_limit: u8,
    /// Largest chunk payload requested, bounded by the link MTU
    pub max_chunk_len: u16,
}

/// Gateway-side settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Interval between unsolicited announcements
    pub announce_interval_ms: u64,
    /// Silence after which a peer's download no longer counts as in flight
    pub transfer_idle_timeout_ms: u64,
}

impl Default for FldtConfig {
    fn default() -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            client: ClientConfig::default(),
            server: ServerConfig::default(),
            verification: VerificationPolicy::default(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 2000,
            retry_limit: 3,
            max_chunk_len: 512,
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            announce_interval_ms: 30_000,
            transfer_idle_timeout_ms: 10_000,
        }
    }
}

impl ClientConfig {
    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl ServerConfig {
    /// Announcement interval as a duration
    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }

    /// Transfer idle timeout as a duration
    pub fn transfer_idle_timeout(&self) -> Duration {
        Duration::from_millis(self.transfer_idle_timeout_ms)
    }
}

impl FldtConfig {
    /// Parse and validate JSON text
    pub fn from_json_str(text: &str) -> FldtResult<Self> {
        let config: FldtConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file, creating it with defaults if missing
    pub fn load_from_path(path: impl AsRef<Path>) -> FldtResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found at {}, creating default", path.display());
            let config = Self::default();
            config.save_to_path(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&content)?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save_to_path(&self, path: impl AsRef<Path>) -> FldtResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        debug!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> FldtResult<()> {
        if !self.schema_version.starts_with("iotkit.fldt/") {
            return Err(FldtError::Config(format!(
                "Invalid schema version: {}",
                self.schema_version
            )));
        }
        if self.client.retry_limit == 0 {
            return Err(FldtError::Config("retry_limit must be at least 1".to_string()));
        }
        if self.client.request_timeout_ms == 0 {
            return Err(FldtError::Config(
                "request_timeout_ms must be positive".to_string(),
            ));
        }
        if self.client.max_chunk_len == 0 {
            return Err(FldtError::Config("max_chunk_len must be positive".to_string()));
        }
        if self.server.announce_interval_ms == 0 {
            return Err(FldtError::Config(
                "announce_interval_ms must be positive".to_string(),
            ));
        }
        self.verification
            .validate()
            .map_err(|e| FldtError::Config(e.to_string()))?;
        Ok(())
    }
}
