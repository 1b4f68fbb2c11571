//! Journal engine for tickdb
//!
//! This crate ties the lower layers into a working journal:
//! - JournalWriter: appends rows, commits through the transaction log and
//!   publishes commit events
//! - PartitionStore: partition directories and the purge of unreferenced ones
//! - PartitionCleaner: commit-channel consumer that runs the purge
//! - JournalConfig: `journal.toml` settings

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cleaner;
pub mod config;
pub mod partition;
pub mod writer;

pub use cleaner::{CleanerState, CleanerStatus, PartitionCleaner};
pub use config::{ConfigError, JournalConfig, CONFIG_FILE_NAME, MAX_COMMIT_EVENT_CAPACITY};
pub use partition::{
    is_lag_partition, scan_partitions, unreferenced_partitions, PartitionLayout, PurgeReport,
    TEMP_PARTITION_PREFIX,
};
pub use writer::{JournalWriter, PartitionPurge, PartitionStore};
