//! Journal configuration via `journal.toml`
//!
//! Settings can be built in code with the `with_*` methods or loaded from a
//! TOML file in the journal directory. Missing keys take their defaults.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tickdb_concurrency::CommitEventChannel;
use tickdb_core::{Error, PartitionBy, Result};

/// Config file name placed in the journal directory.
pub const CONFIG_FILE_NAME: &str = "journal.toml";

/// Largest accepted commit channel capacity
pub const MAX_COMMIT_EVENT_CAPACITY: usize = 1 << 20;

/// Longest accepted consumer wait, in milliseconds
pub const MAX_CONSUMER_WAIT_TIMEOUT_MS: u64 = 60_000;

/// Journal configuration.
///
/// # Example
///
/// ```toml
/// partition_by = "day"
/// commit_event_capacity = 1024
/// consumer_wait_timeout_ms = 100
/// force_sync = false
/// purge_retained_txns = 1
/// lag_enabled = true
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JournalConfig {
    /// Partition granularity
    pub partition_by: PartitionBy,
    /// Slots in the commit event ring (rounded up to a power of two)
    pub commit_event_capacity: usize,
    /// Bound on a single consumer wait, in milliseconds
    pub consumer_wait_timeout_ms: u64,
    /// fsync frame and header on every commit
    pub force_sync: bool,
    /// Frames, counted back from the head, whose partitions the purge keeps
    pub purge_retained_txns: usize,
    /// Allow lag (staging) partitions
    pub lag_enabled: bool,
}

impl Default for JournalConfig {
    fn default() -> Self {
        JournalConfig {
            partition_by: PartitionBy::Day,
            commit_event_capacity: 1024,
            consumer_wait_timeout_ms: 100,
            force_sync: false,
            purge_retained_txns: 1,
            lag_enabled: true,
        }
    }
}

impl JournalConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set partition granularity (builder pattern).
    pub fn with_partition_by(mut self, partition_by: PartitionBy) -> Self {
        self.partition_by = partition_by;
        self
    }

    /// Set commit channel capacity (builder pattern).
    pub fn with_commit_event_capacity(mut self, capacity: usize) -> Self {
        self.commit_event_capacity = capacity;
        self
    }

    /// Set consumer wait timeout (builder pattern).
    pub fn with_consumer_wait_timeout(mut self, timeout: Duration) -> Self {
        self.consumer_wait_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set fsync-on-commit (builder pattern).
    pub fn with_force_sync(mut self, force_sync: bool) -> Self {
        self.force_sync = force_sync;
        self
    }

    /// Set purge retention depth (builder pattern).
    pub fn with_purge_retained_txns(mut self, txns: usize) -> Self {
        self.purge_retained_txns = txns;
        self
    }

    /// Enable or disable lag partitions (builder pattern).
    pub fn with_lag_enabled(mut self, enabled: bool) -> Self {
        self.lag_enabled = enabled;
        self
    }

    /// Consumer wait timeout as a `Duration`
    pub fn consumer_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.consumer_wait_timeout_ms)
    }

    /// Validate configuration.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.commit_event_capacity < 2 {
            return Err(ConfigError::CapacityTooSmall);
        }
        if self.commit_event_capacity > MAX_COMMIT_EVENT_CAPACITY {
            return Err(ConfigError::CapacityTooLarge);
        }
        if self.consumer_wait_timeout_ms == 0 {
            return Err(ConfigError::ZeroWaitTimeout);
        }
        if self.consumer_wait_timeout_ms > MAX_CONSUMER_WAIT_TIMEOUT_MS {
            return Err(ConfigError::WaitTimeoutTooLarge);
        }
        if self.purge_retained_txns == 0 {
            return Err(ConfigError::ZeroRetention);
        }
        Ok(())
    }

    /// Create a configuration suited to tests (small ring, short waits).
    pub fn for_testing() -> Self {
        JournalConfig {
            commit_event_capacity: 64,
            consumer_wait_timeout_ms: 10,
            ..Default::default()
        }
    }

    /// Build a commit channel sized by this configuration.
    pub fn commit_channel(&self) -> Arc<CommitEventChannel> {
        Arc::new(CommitEventChannel::new(
            self.commit_event_capacity,
            self.consumer_wait_timeout(),
        ))
    }

    /// Returns the default config file content with comments.
    pub fn default_toml() -> &'static str {
        r#"# Journal configuration
#
# Partition granularity: "day" (default), "month", "year" or "none"
partition_by = "day"

# Slots in the commit event ring, rounded up to a power of two.
# Writers block only when the slowest consumer is this far behind.
commit_event_capacity = 1024

# Longest single wait of a consumer thread, in milliseconds (1 to 60000).
# A stop request is noticed within one wait.
consumer_wait_timeout_ms = 100

# fsync the transaction log on every commit (default: false)
force_sync = false

# How many commits, counted back from the newest, keep their partitions
# safe from the partition cleaner.
purge_retained_txns = 1

# Allow lag (staging) partitions
lag_enabled = true
"#
    }

    /// Read, parse and validate config from a file path.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!(
                "Failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        let config: JournalConfig = toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "Failed to parse config file '{}': {}",
                path.display(),
                e
            ))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Write the default config file if it does not already exist.
    pub fn write_default_if_missing(path: &Path) -> Result<()> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml()).map_err(|e| {
                Error::config(format!(
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
            .map_err(|e| Error::config(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, content).map_err(|e| {
            Error::config(format!(
                "Failed to write config file '{}': {}",
                path.display(),
                e
            ))
        })
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Ring capacity below 2
    #[error("commit_event_capacity must be at least 2")]
    CapacityTooSmall,

    /// Ring capacity above [`MAX_COMMIT_EVENT_CAPACITY`]
    #[error("commit_event_capacity must not exceed 1048576")]
    CapacityTooLarge,

    /// Consumer wait timeout of zero
    #[error("consumer_wait_timeout_ms must be positive")]
    ZeroWaitTimeout,

    /// Consumer wait timeout above [`MAX_CONSUMER_WAIT_TIMEOUT_MS`]
    #[error("consumer_wait_timeout_ms must not exceed 60000")]
    WaitTimeoutTooLarge,

    /// Retention depth of zero
    #[error("purge_retained_txns must be at least 1")]
    ZeroRetention,
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::config(e.to_string())
    }
}
