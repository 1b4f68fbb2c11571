//! tickdb - durability and lifecycle core of an append-only, time-partitioned
//! record store
//!
//! tickdb records every committed write in a transaction log, fans commit
//! notifications out to background consumers, and reclaims partition
//! directories that the log no longer references.
//!
//! # Quick Start
//!
//! ```ignore
//! use tickdb::{ConsumerThread, JournalConfig, JournalWriter, PartitionCleaner};
//!
//! let config = JournalConfig::default();
//! let channel = config.commit_channel();
//! let mut writer = JournalWriter::open("/data/trades", config, Some(channel.clone()), 1)?;
//!
//! // Purge unreferenced partitions in the background
//! let mut cleaner = ConsumerThread::spawn("cleaner", channel, PartitionCleaner::new(&writer))?;
//!
//! writer.append_rows(1_426_291_200_000, 100)?;
//! writer.commit()?;
//! ```
//!
//! # Architecture
//!
//! - [`TxLog`]: the `_txi` transaction log (durability crate)
//! - [`CommitEventChannel`], [`EventProcessor`], [`ConsumerThread`]: commit
//!   notification fan-out (concurrency crate)
//! - [`JournalWriter`], [`PartitionCleaner`]: the journal itself (engine crate)

pub use tickdb_concurrency::{
    Availability, CommitEvent, CommitEventChannel, CommitEventHandler, ConsumerCursor,
    ConsumerThread, EventProcessor, Latch, ProcessorCounters,
};
pub use tickdb_core::{Error, PartitionBy, Result};
pub use tickdb_durability::{Tx, TxIter, TxLog, TxLogMode, TX_COMMAND_COMMIT, TX_COMMAND_ROLLBACK};
pub use tickdb_engine::{
    CleanerState, CleanerStatus, JournalConfig, JournalWriter, PartitionCleaner, PartitionPurge,
    PartitionStore, PurgeReport,
};
