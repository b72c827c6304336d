//! Database configuration via `chronicle.toml`
//!
//! On first open, a commented default `chronicle.toml` is created in the
//! data directory. To change settings, edit the file and reopen.

use super::retry::RetryConfig;
use chronicle_core::{Error, Result};
use chronicle_durability::{get_codec, DurabilityMode, StorageCodec, WalConfig};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Config file name placed in the database data directory.
pub const CONFIG_FILE_NAME: &str = "chronicle.toml";

/// Retry defaults as written in the `[retry]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrySection {
    /// Maximum number of retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    /// Backoff base in milliseconds
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Backoff cap in milliseconds
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_max_retries() -> usize {
    3
}

fn default_base_delay_ms() -> u64 {
    10
}

fn default_max_delay_ms() -> u64 {
    100
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

/// Database configuration loaded from `chronicle.toml`.
///
/// # Example
///
/// ```toml
/// durability = "standard"
/// codec = "identity"
/// wal_segment_size = 67108864
/// projection_poll_ms = 100
///
/// [retry]
/// max_retries = 3
/// base_delay_ms = 10
/// max_delay_ms = 100
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChronicleConfig {
    /// Durability mode: `"cache"`, `"standard"` or `"always"`.
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Id of the codec WAL entries are written with.
    #[serde(default = "default_codec")]
    pub codec: String,
    /// Maximum WAL segment size in bytes.
    #[serde(default = "default_wal_segment_size")]
    pub wal_segment_size: u64,
    /// Poll interval of background projection runners.
    #[serde(default = "default_projection_poll_ms")]
    pub projection_poll_ms: u64,
    /// Conflict retry defaults.
    #[serde(default)]
    pub retry: RetrySection,
}

fn default_durability_str() -> String {
    "standard".to_string()
}

fn default_codec() -> String {
    "identity".to_string()
}

fn default_wal_segment_size() -> u64 {
    WalConfig::default().segment_size
}

fn default_projection_poll_ms() -> u64 {
    100
}

impl Default for ChronicleConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            codec: default_codec(),
            wal_segment_size: default_wal_segment_size(),
            projection_poll_ms: default_projection_poll_ms(),
            retry: RetrySection::default(),
        }
    }
}

impl ChronicleConfig {
    /// Config with the given durability name and defaults elsewhere.
    pub fn with_durability(durability: impl Into<String>) -> Self {
        Self {
            durability: durability.into(),
            ..Self::default()
        }
    }

    /// Parse the durability string into a `DurabilityMode`.
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        self.durability.parse::<DurabilityMode>().map_err(|e| {
            Error::invalid_input(format!("{} in {}", e, CONFIG_FILE_NAME))
        })
    }

    /// Codec named by the `codec` key.
    pub fn storage_codec(&self) -> Result<Box<dyn StorageCodec>> {
        get_codec(&self.codec).map_err(|e| {
            Error::invalid_input(format!("{} in {}", e, CONFIG_FILE_NAME))
        })
    }

    /// WAL settings derived from this config.
    pub fn wal_config(&self) -> Result<WalConfig> {
        let config = WalConfig::new().with_segment_size(self.wal_segment_size);
        config.validate()?;
        Ok(config)
    }

    /// Retry policy derived from the `[retry]` table.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new()
            .with_max_retries(self.retry.max_retries)
            .with_base_delay_ms(self.retry.base_delay_ms)
            .with_max_delay_ms(self.retry.max_delay_ms)
    }

    /// Poll interval for background projection runners.
    pub fn projection_poll_interval(&self) -> Duration {
        Duration::from_millis(self.projection_poll_ms)
    }

    /// Check every field, failing with `InvalidInput`.
    pub fn validate(&self) -> Result<()> {
        self.durability_mode()?;
        self.storage_codec()?;
        self.wal_config()?;
        if self.projection_poll_ms == 0 {
            return Err(Error::invalid_input(
                "projection_poll_ms must be greater than zero",
            ));
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(Error::invalid_input(
                "retry.base_delay_ms cannot exceed retry.max_delay_ms",
            ));
        }
        Ok(())
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Chronicle event store configuration
#
# Durability mode: "standard" (default), "always" or "cache"
#   "standard" = periodic fsync (~100ms), may lose the last interval on crash
#   "always"   = fsync every write, zero data loss
#   "cache"    = no WAL, everything is lost on close
durability = "standard"

# Codec applied to every WAL entry. A database must be reopened with the
# codec it was written with.
codec = "identity"

# Maximum WAL segment size in bytes (default 64MB)
wal_segment_size = 67108864

# How often background projection runners poll for new commits
projection_poll_ms = 100

# Defaults for Database::retry_on_conflict
[retry]
max_retries = 3
base_delay_ms = 10
max_delay_ms = 100
"#
    }

    /// Read and parse config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::storage(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::InvalidInput(msg) => {
                Error::invalid_input(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })
    }

    /// Parse and validate TOML text.
    pub fn from_toml(content: &str) -> Result<Self> {
        let config: ChronicleConfig =
            toml::from_str(content).map_err(|e| Error::invalid_input(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::storage(format!(
                    "Failed to write default config file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Serialize this config to TOML and write it to the given path.
    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::serialization(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::storage(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}
