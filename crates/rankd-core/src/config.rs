//! Configuration parsing for the rankd daemon.
//!
//! Configuration is a TOML file with `[store]`, `[cache]`, and `[daemon]`
//! sections; every field has a default so an empty file (or no file at all)
//! yields a working development setup. CLI flags override individual fields
//! at the binary boundary.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level daemon configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct RankdConfig {
    /// Score store settings.
    #[serde(default)]
    pub store: StoreConfig,

    /// Cache TTL settings.
    #[serde(default)]
    pub cache: CacheConfig,

    /// Daemon process settings.
    #[serde(default)]
    pub daemon: DaemonConfig,
}

impl RankdConfig {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is invalid or a value is out of range.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.cache.top_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "cache.top_ttl_secs must be at least 1".to_string(),
            ));
        }
        if self.cache.rank_ttl_secs == 0 {
            return Err(ConfigError::Validation(
                "cache.rank_ttl_secs must be at least 1".to_string(),
            ));
        }
        if self.store.busy_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "store.busy_timeout_ms must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Score store settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    /// Path to the `SQLite` database file.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Bound on how long a store call may wait for the database lock
    /// before the transaction aborts.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

/// Cache TTL settings.
///
/// Both TTLs default to single-digit seconds, reflecting the staleness
/// tolerance of a live leaderboard: TTL expiry is only the backstop against
/// missed invalidations, writes invalidate proactively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    /// TTL in seconds for the cached top-10 projection.
    #[serde(default = "default_top_ttl_secs")]
    pub top_ttl_secs: u64,

    /// TTL in seconds for cached per-player rank projections.
    #[serde(default = "default_rank_ttl_secs")]
    pub rank_ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            top_ttl_secs: default_top_ttl_secs(),
            rank_ttl_secs: default_rank_ttl_secs(),
        }
    }
}

/// Daemon process settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DaemonConfig {
    /// Path to the Unix socket the daemon serves requests on.
    #[serde(default = "default_socket_path")]
    pub socket: PathBuf,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            socket: default_socket_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("rankd.db")
}

const fn default_busy_timeout_ms() -> u64 {
    5000
}

const fn default_top_ttl_secs() -> u64 {
    10
}

const fn default_rank_ttl_secs() -> u64 {
    5
}

fn default_socket_path() -> PathBuf {
    // ${XDG_RUNTIME_DIR}/rankd/rankd.sock, falling back to /tmp when the
    // runtime dir is not set.
    std::env::var("XDG_RUNTIME_DIR").map_or_else(
        |_| PathBuf::from("/tmp/rankd/rankd.sock"),
        |runtime_dir| PathBuf::from(runtime_dir).join("rankd").join("rankd.sock"),
    )
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// I/O error reading the configuration file.
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error.
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML serialization error.
    #[error("failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Value out of range.
    #[error("configuration validation failed: {0}")]
    Validation(String),
}
