//! Partition cleaner
//!
//! A commit-channel consumer that removes partitions the transaction log no
//! longer references. Bursts of commits are coalesced: at most one purge
//! runs per delivered batch, at its last event.
//!
//! The cleaner reads the log through its own read-only handle, opened in
//! `on_start` and closed in `on_shutdown`.
//!
//! # Lifecycle
//!
//! ```text
//! Created -> Starting -> Ready -> Running -> ShuttingDown -> Stopped
//! ```
//!
//! If the log cannot be opened the cleaner goes from `Starting` straight to
//! `Stopped`, and `wait_started` reports the failure instead of timing out.
//! A stopped cleaner cannot be started again.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use tickdb_concurrency::{CommitEvent, CommitEventHandler, Latch};
use tickdb_core::{Error, Result};
use tickdb_durability::{TxLog, TxLogMode};

use crate::writer::{JournalWriter, PartitionPurge};

/// Lifecycle state of a [`PartitionCleaner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanerState {
    /// Constructed, not started
    Created,
    /// Opening its log handle
    Starting,
    /// Started, no event seen yet
    Ready,
    /// Processing events
    Running,
    /// Closing its log handle
    ShuttingDown,
    /// Stopped for good
    Stopped,
}

/// Observable side of a cleaner, shared with whoever started it.
#[derive(Debug)]
pub struct CleanerStatus {
    state: Mutex<CleanerState>,
    started: Latch,
    stopped: Latch,
    start_failure: Mutex<Option<String>>,
    events_seen: AtomicU64,
    purge_passes: AtomicU64,
    purge_failures: AtomicU64,
}

impl CleanerStatus {
    fn new() -> Self {
        CleanerStatus {
            state: Mutex::new(CleanerState::Created),
            started: Latch::new(),
            stopped: Latch::new(),
            start_failure: Mutex::new(None),
            events_seen: AtomicU64::new(0),
            purge_passes: AtomicU64::new(0),
            purge_failures: AtomicU64::new(0),
        }
    }

    /// Current state
    pub fn state(&self) -> CleanerState {
        *self.state.lock()
    }

    fn set_state(&self, state: CleanerState) {
        *self.state.lock() = state;
    }

    /// Wait for the cleaner to become ready.
    ///
    /// Fails with a lifecycle error as soon as a start attempt has failed,
    /// and with a timeout if the cleaner is merely slow.
    pub fn wait_started(&self, timeout: Duration) -> Result<()> {
        if !self.started.wait_timeout(timeout) {
            return Err(Error::timeout("partition cleaner start"));
        }
        match self.start_failure() {
            Some(reason) => Err(Error::lifecycle(format!(
                "partition cleaner failed to start: {}",
                reason
            ))),
            None => Ok(()),
        }
    }

    /// Why the last start attempt failed, if it did
    pub fn start_failure(&self) -> Option<String> {
        self.start_failure.lock().clone()
    }

    fn fail_start(&self, reason: String) {
        *self.start_failure.lock() = Some(reason);
        self.set_state(CleanerState::Stopped);
        self.started.fire();
        self.stopped.fire();
    }

    /// Wait for the cleaner to stop.
    pub fn wait_stopped(&self, timeout: Duration) -> Result<()> {
        if self.stopped.wait_timeout(timeout) {
            Ok(())
        } else {
            Err(Error::timeout("partition cleaner stop"))
        }
    }

    /// Events received
    pub fn events_seen(&self) -> u64 {
        self.events_seen.load(Ordering::Acquire)
    }

    /// Purge passes attempted
    pub fn purge_passes(&self) -> u64 {
        self.purge_passes.load(Ordering::Acquire)
    }

    /// Purge passes that failed
    pub fn purge_failures(&self) -> u64 {
        self.purge_failures.load(Ordering::Acquire)
    }
}

/// Consumer that purges unreferenced partitions after commits.
pub struct PartitionCleaner {
    location: PathBuf,
    source_id: u32,
    purger: Arc<dyn PartitionPurge>,
    tx_log: Option<TxLog>,
    /// A commit from our writer arrived since the last purge
    dirty: bool,
    status: Arc<CleanerStatus>,
}

impl PartitionCleaner {
    /// Cleaner for the journal of `writer`, reacting to its commits.
    pub fn new(writer: &JournalWriter) -> Self {
        Self::with_purger(writer.location(), writer.source_id(), writer.purger())
    }

    /// Cleaner for the journal at `location`, reacting to commits from
    /// `source_id` and purging through `purger`.
    pub fn with_purger(
        location: impl AsRef<Path>,
        source_id: u32,
        purger: Arc<dyn PartitionPurge>,
    ) -> Self {
        PartitionCleaner {
            location: location.as_ref().to_path_buf(),
            source_id,
            purger,
            tx_log: None,
            dirty: false,
            status: Arc::new(CleanerStatus::new()),
        }
    }

    /// Shared status handle
    pub fn status(&self) -> Arc<CleanerStatus> {
        Arc::clone(&self.status)
    }

    /// Current state
    pub fn state(&self) -> CleanerState {
        self.status.state()
    }

    /// Writer identity this cleaner reacts to
    pub fn source_id(&self) -> u32 {
        self.source_id
    }

    fn purge(&mut self) {
        let tx_log = match self.tx_log.as_mut() {
            Some(tx_log) => tx_log,
            None => return,
        };
        self.status.purge_passes.fetch_add(1, Ordering::AcqRel);
        match self.purger.purge_unreferenced_partitions(tx_log) {
            Ok(report) => {
                self.dirty = false;
                debug!(
                    target: "tickdb::cleaner",
                    head_txn = ?report.head_txn,
                    removed = report.removed.len(),
                    "Purge pass complete"
                );
            }
            Err(e) => {
                // stays dirty, so the next batch tries again
                self.status.purge_failures.fetch_add(1, Ordering::AcqRel);
                warn!(
                    target: "tickdb::cleaner",
                    location = %self.location.display(),
                    error = %e,
                    "Purge pass failed"
                );
            }
        }
    }
}

impl CommitEventHandler for PartitionCleaner {
    fn on_start(&mut self) -> Result<()> {
        {
            let mut state = self.status.state.lock();
            if *state != CleanerState::Created {
                return Err(Error::lifecycle(format!(
                    "partition cleaner cannot start from {:?}",
                    *state
                )));
            }
            *state = CleanerState::Starting;
        }

        let tx_log = match TxLog::open(&self.location, TxLogMode::Read) {
            Ok(tx_log) => tx_log,
            Err(e) => {
                warn!(
                    target: "tickdb::cleaner",
                    location = %self.location.display(),
                    error = %e,
                    "Partition cleaner failed to start"
                );
                self.status.fail_start(e.to_string());
                return Err(e);
            }
        };
        self.tx_log = Some(tx_log);
        self.status.set_state(CleanerState::Ready);
        self.status.started.fire();
        info!(
            target: "tickdb::cleaner",
            location = %self.location.display(),
            source_id = self.source_id,
            "Partition cleaner started"
        );
        Ok(())
    }

    fn on_event(&mut self, event: &CommitEvent, sequence: u64, end_of_batch: bool) -> Result<()> {
        match self.status.state() {
            CleanerState::Ready => self.status.set_state(CleanerState::Running),
            CleanerState::Running => {}
            other => {
                return Err(Error::lifecycle(format!(
                    "partition cleaner received event {} while {:?}",
                    sequence, other
                )));
            }
        }

        self.status.events_seen.fetch_add(1, Ordering::AcqRel);
        if event.source_id == self.source_id {
            self.dirty = true;
        }
        if end_of_batch && self.dirty {
            self.purge();
        }
        Ok(())
    }

    fn on_shutdown(&mut self) -> Result<()> {
        {
            let mut state = self.status.state.lock();
            if *state == CleanerState::Stopped {
                return Ok(());
            }
            *state = CleanerState::ShuttingDown;
        }

        if let Some(mut tx_log) = self.tx_log.take() {
            if let Err(e) = tx_log.close() {
                warn!(target: "tickdb::cleaner", error = %e, "Failed to close transaction log");
            }
        }
        self.status.set_state(CleanerState::Stopped);
        self.status.stopped.fire();
        info!(
            target: "tickdb::cleaner",
            location = %self.location.display(),
            events_seen = self.status.events_seen(),
            purge_passes = self.status.purge_passes(),
            "Partition cleaner stopped"
        );
        Ok(())
    }
}

impl std::fmt::Debug for PartitionCleaner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionCleaner")
            .field("location", &self.location)
            .field("source_id", &self.source_id)
            .field("state", &self.state())
            .field("dirty", &self.dirty)
            .finish()
    }
}
