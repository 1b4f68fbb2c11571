//! Journal writer
//!
//! The single writer of a journal. It appends rows into time partitions,
//! commits by appending a frame to the transaction log and then announces
//! the commit on the commit channel.
//!
//! Partition directories are owned by a [`PartitionStore`] shared with the
//! partition cleaner. Its lock orders directory creation against purge
//! scans, and directories created since the last commit are tracked as
//! pending so a purge never removes them.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use tickdb_concurrency::CommitEventChannel;
use tickdb_core::rows::{
    max_partition_index, to_local_row_id, to_row_id, LOCAL_ROW_MASK, MAX_PARTITION_INDEX, NO_ROWS,
};
use tickdb_core::{Error, Result};
use tickdb_durability::{Tx, TxIter, TxLog, TxLogMode, TX_COMMAND_COMMIT, TX_COMMAND_ROLLBACK};

use crate::config::JournalConfig;
use crate::partition::{
    is_lag_partition, scan_partitions, unreferenced_partitions, PartitionLayout, PurgeReport,
    TEMP_PARTITION_PREFIX,
};

/// Removes partitions the transaction log no longer references.
///
/// Implemented by the writer side; called by the partition cleaner with its
/// own read-only log handle.
pub trait PartitionPurge: Send + Sync {
    /// Remove every partition directory unreachable from the current head.
    fn purge_unreferenced_partitions(&self, tx_log: &mut TxLog) -> Result<PurgeReport>;
}

/// Partition directories of one journal.
pub struct PartitionStore {
    location: PathBuf,
    retained_txns: usize,
    /// Created since the last commit
    pending: Mutex<HashSet<String>>,
}

impl PartitionStore {
    /// Store for the journal at `location`, keeping partitions referenced by
    /// the newest `retained_txns` frames.
    pub fn new(location: impl Into<PathBuf>, retained_txns: usize) -> Self {
        PartitionStore {
            location: location.into(),
            retained_txns: retained_txns.max(1),
            pending: Mutex::new(HashSet::new()),
        }
    }

    /// Journal directory
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Create a partition directory (if missing) and mark it pending.
    pub fn create_partition(&self, name: &str) -> Result<()> {
        let mut pending = self.pending.lock();
        fs::create_dir_all(self.location.join(name))?;
        pending.insert(name.to_string());
        debug!(target: "tickdb::partition", partition = name, "Created partition");
        Ok(())
    }

    /// Create a fresh lag partition and mark it pending. Returns its name.
    pub fn create_lag_partition(&self) -> Result<String> {
        let name = format!("{}{}", TEMP_PARTITION_PREFIX, Uuid::new_v4());
        self.create_partition(&name)?;
        Ok(name)
    }

    /// Forget pending directories after they were committed.
    pub fn commit_pending(&self) {
        self.pending.lock().clear();
    }

    /// Remove pending directories after a rollback. Returns the names removed.
    pub fn discard_pending(&self) -> Result<Vec<String>> {
        let mut pending = self.pending.lock();
        let mut removed: Vec<String> = pending.drain().collect();
        removed.sort();
        for name in &removed {
            let path = self.location.join(name);
            if path.exists() {
                fs::remove_dir_all(&path)?;
            }
        }
        Ok(removed)
    }

    /// Names of pending directories, sorted
    pub fn pending(&self) -> Vec<String> {
        let mut names: Vec<String> = self.pending.lock().iter().cloned().collect();
        names.sort();
        names
    }
}

impl PartitionPurge for PartitionStore {
    fn purge_unreferenced_partitions(&self, tx_log: &mut TxLog) -> Result<PurgeReport> {
        let start = Instant::now();
        let pending = self.pending.lock();

        let frames = tx_log
            .transactions()?
            .take(self.retained_txns)
            .collect::<Result<Vec<Tx>>>()?;
        let layout = scan_partitions(&self.location)?;
        let victims = unreferenced_partitions(&frames, &layout, &pending);

        let mut report = PurgeReport {
            head_txn: frames.first().map(|tx| tx.txn),
            frames_examined: frames.len(),
            ..Default::default()
        };

        for name in victims {
            match fs::remove_dir_all(self.location.join(&name)) {
                Ok(()) => {
                    debug!(target: "tickdb::purge", partition = %name, "Removed partition");
                    if is_lag_partition(&name) {
                        report.lag_removed += 1;
                    } else {
                        report.partitions_removed += 1;
                    }
                    report.removed.push(name);
                }
                Err(e) => {
                    warn!(
                        target: "tickdb::purge",
                        partition = %name,
                        error = %e,
                        "Failed to remove partition"
                    );
                    report.failed += 1;
                }
            }
        }

        report.duration_ms = start.elapsed().as_millis() as u64;
        if !report.is_noop() {
            info!(
                target: "tickdb::purge",
                head_txn = ?report.head_txn,
                partitions_removed = report.partitions_removed,
                lag_removed = report.lag_removed,
                failed = report.failed,
                "Purged unreferenced partitions"
            );
        }
        Ok(report)
    }
}

impl std::fmt::Debug for PartitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionStore")
            .field("location", &self.location)
            .field("retained_txns", &self.retained_txns)
            .field("pending", &self.pending())
            .finish()
    }
}

/// What a commit makes durable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct JournalState {
    txn: u64,
    /// Regular partitions in index order
    partitions: Vec<String>,
    /// Rows in the last partition
    last_partition_rows: i64,
    last_partition_timestamp: i64,
    lag: Option<(String, i32)>,
}

impl JournalState {
    fn max_row_id(&self) -> i64 {
        if self.partitions.is_empty() || self.last_partition_rows == 0 {
            NO_ROWS
        } else {
            to_row_id(self.partitions.len() as i64 - 1, self.last_partition_rows - 1)
        }
    }

    /// Rebuild from the head frame and the directories on disk.
    fn from_head(head: &Tx, layout: &PartitionLayout) -> Result<Self> {
        let (partitions, last_partition_rows) = match max_partition_index(head.journal_max_row_id) {
            Some(index) => {
                let count = index as usize + 1;
                if layout.regular.len() < count {
                    return Err(Error::corruption(format!(
                        "head references partition {} but only {} exist",
                        index,
                        layout.regular.len()
                    )));
                }
                (
                    layout.regular[..count].to_vec(),
                    to_local_row_id(head.journal_max_row_id) + 1,
                )
            }
            None => (Vec::new(), 0),
        };
        Ok(JournalState {
            txn: head.txn,
            partitions,
            last_partition_rows,
            last_partition_timestamp: head.last_partition_timestamp,
            lag: head.lag_name.clone().map(|name| (name, head.lag_size)),
        })
    }
}

/// Writer of one journal.
pub struct JournalWriter {
    location: PathBuf,
    config: JournalConfig,
    source_id: u32,
    tx_log: TxLog,
    store: Arc<PartitionStore>,
    channel: Option<Arc<CommitEventChannel>>,
    committed: JournalState,
    working: JournalState,
    closed: bool,
}

impl JournalWriter {
    /// Open (or create) the journal at `location`.
    ///
    /// An empty log is bootstrapped with a txn-0 frame holding no rows.
    /// Commits are announced on `channel` as `(source_id, commit time)`.
    pub fn open(
        location: impl AsRef<Path>,
        config: JournalConfig,
        channel: Option<Arc<CommitEventChannel>>,
        source_id: u32,
    ) -> Result<Self> {
        config.validate()?;
        let location = location.as_ref().to_path_buf();
        let mut tx_log = TxLog::open(&location, TxLogMode::Append)?;

        let head = match tx_log.head()? {
            Some(head) => head,
            None => {
                let mut bootstrap = Tx::new(0);
                bootstrap.timestamp = Utc::now().timestamp_millis();
                tx_log.write(&mut bootstrap, true)?;
                bootstrap
            }
        };
        let layout = scan_partitions(&location)?;
        let committed = JournalState::from_head(&head, &layout)?;
        // partitions past the head were never committed; later partitions
        // must not inherit their indexes
        for orphan in &layout.regular[committed.partitions.len()..] {
            warn!(
                target: "tickdb::writer",
                partition = %orphan,
                "Removing uncommitted partition"
            );
            fs::remove_dir_all(location.join(orphan))?;
        }
        let store = Arc::new(PartitionStore::new(&location, config.purge_retained_txns));

        info!(
            target: "tickdb::writer",
            location = %location.display(),
            txn = committed.txn,
            partitions = committed.partitions.len(),
            partition_by = %config.partition_by,
            source_id,
            "Opened journal writer"
        );

        Ok(JournalWriter {
            location,
            config,
            source_id,
            tx_log,
            store,
            channel,
            working: committed.clone(),
            committed,
            closed: false,
        })
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::lifecycle(format!(
                "journal writer {} is closed",
                self.location.display()
            )));
        }
        Ok(())
    }

    /// Add `rows` rows stamped `timestamp_ms`.
    ///
    /// Rows go into the partition for the timestamp, which is created when
    /// new. Timestamps belonging before the last partition are rejected.
    pub fn append_rows(&mut self, timestamp_ms: i64, rows: u64) -> Result<()> {
        self.ensure_open()?;
        if rows == 0 {
            return Ok(());
        }
        let partition_by = self.config.partition_by;
        let name = partition_by.partition_name(timestamp_ms)?;

        let is_new = match self.working.partitions.last() {
            Some(last) if *last == name => false,
            Some(last) if name < *last => {
                return Err(Error::invalid(format!(
                    "timestamp {} belongs to partition {} before last partition {}",
                    timestamp_ms, name, last
                )));
            }
            _ => true,
        };

        if is_new {
            if self.working.partitions.len() as i64 > MAX_PARTITION_INDEX {
                return Err(Error::invalid("partition index space exhausted"));
            }
            self.store.create_partition(&name)?;
            self.working.partitions.push(name);
            self.working.last_partition_rows = 0;
            self.working.last_partition_timestamp = partition_by.interval_start(timestamp_ms)?;
        }

        let total = self.working.last_partition_rows.saturating_add(rows as i64);
        if total > LOCAL_ROW_MASK + 1 || total < 0 {
            return Err(Error::invalid("partition row capacity exceeded"));
        }
        self.working.last_partition_rows = total;
        Ok(())
    }

    /// Replace the lag partition with a fresh one holding `rows` rows.
    pub fn set_lag(&mut self, rows: i32) -> Result<String> {
        self.ensure_open()?;
        if !self.config.lag_enabled {
            return Err(Error::invalid("lag partitions are disabled"));
        }
        if rows < 0 {
            return Err(Error::invalid(format!("negative lag size {}", rows)));
        }
        let name = self.store.create_lag_partition()?;
        self.working.lag = Some((name.clone(), rows));
        Ok(name)
    }

    /// Drop the lag partition from the next commit.
    pub fn clear_lag(&mut self) -> Result<()> {
        self.ensure_open()?;
        self.working.lag = None;
        Ok(())
    }

    /// Commit pending work. Returns the new transaction number.
    ///
    /// The frame is written first; the commit is announced on the channel
    /// only after it is in the log. On error nothing is announced and the
    /// pending work stays in place for `rollback`.
    pub fn commit(&mut self) -> Result<u64> {
        self.ensure_open()?;
        let txn = self.committed.txn + 1;
        let timestamp = Utc::now().timestamp_millis();
        let mut tx = self.frame_for(&self.working, txn, TX_COMMAND_COMMIT, timestamp);

        self.tx_log.write(&mut tx, self.config.force_sync)?;
        self.working.txn = txn;
        self.committed = self.working.clone();
        self.store.commit_pending();

        if let Some(channel) = &self.channel {
            channel.publish(self.source_id, timestamp);
        }
        debug!(
            target: "tickdb::writer",
            txn,
            max_row_id = tx.journal_max_row_id,
            lag = ?tx.lag_name,
            "Committed"
        );
        Ok(txn)
    }

    /// Discard work since the last commit and record a rollback marker.
    ///
    /// Returns the marker's transaction number.
    pub fn rollback(&mut self) -> Result<u64> {
        self.ensure_open()?;
        let removed = self.store.discard_pending()?;
        self.working = self.committed.clone();

        let txn = self.committed.txn + 1;
        let timestamp = Utc::now().timestamp_millis();
        let mut tx = self.frame_for(&self.committed, txn, TX_COMMAND_ROLLBACK, timestamp);
        self.tx_log.write(&mut tx, self.config.force_sync)?;
        self.committed.txn = txn;
        self.working.txn = txn;

        info!(
            target: "tickdb::writer",
            txn,
            removed = removed.len(),
            "Rolled back uncommitted work"
        );
        Ok(txn)
    }

    fn frame_for(&self, state: &JournalState, txn: u64, command: i32, timestamp: i64) -> Tx {
        let (lag_name, lag_size) = match &state.lag {
            Some((name, size)) => (Some(name.clone()), *size),
            None => (None, 0),
        };
        Tx {
            txn,
            command,
            journal_max_row_id: state.max_row_id(),
            lag_size,
            lag_name,
            timestamp,
            last_partition_timestamp: state.last_partition_timestamp,
            ..Default::default()
        }
    }

    /// Frames from the head backwards.
    pub fn transactions(&mut self) -> Result<TxIter<'_>> {
        self.ensure_open()?;
        self.tx_log.transactions()
    }

    /// Remove partitions the log no longer references.
    pub fn purge_unreferenced_partitions(&self, tx_log: &mut TxLog) -> Result<PurgeReport> {
        self.ensure_open()?;
        self.store.purge_unreferenced_partitions(tx_log)
    }

    /// Shared purge handle for a partition cleaner
    pub fn purger(&self) -> Arc<dyn PartitionPurge> {
        Arc::clone(&self.store) as Arc<dyn PartitionPurge>
    }

    /// Shared partition store
    pub fn partition_store(&self) -> &Arc<PartitionStore> {
        &self.store
    }

    /// Regular partitions including uncommitted ones, in index order
    pub fn partitions(&self) -> &[String] {
        &self.working.partitions
    }

    /// Current lag partition name, including uncommitted changes
    pub fn lag_name(&self) -> Option<&str> {
        self.working.lag.as_ref().map(|(name, _)| name.as_str())
    }

    /// Highest row id including uncommitted rows, `-1` when empty
    pub fn max_row_id(&self) -> i64 {
        self.working.max_row_id()
    }

    /// Last committed transaction number
    pub fn current_txn(&self) -> u64 {
        self.committed.txn
    }

    /// True if there is work since the last commit
    pub fn has_uncommitted(&self) -> bool {
        self.working != self.committed
    }

    /// Journal directory
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Identity announced with each commit
    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    /// Configuration
    pub fn config(&self) -> &JournalConfig {
        &self.config
    }

    /// Close the writer. Uncommitted work is discarded. Calling it again is
    /// a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        if self.has_uncommitted() {
            warn!(
                target: "tickdb::writer",
                location = %self.location.display(),
                "Closing journal writer with uncommitted work, discarding it"
            );
            self.store.discard_pending()?;
            self.working = self.committed.clone();
        }
        self.tx_log.close()?;
        info!(
            target: "tickdb::writer",
            location = %self.location.display(),
            txn = self.committed.txn,
            "Closed journal writer"
        );
        Ok(())
    }

    /// True after `close`
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for JournalWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(target: "tickdb::writer", error = %e, "Failed to close journal writer");
        }
    }
}
