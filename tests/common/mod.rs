//! Shared test utilities for the integration suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from a suite's main.rs.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};
use std::time::{Duration, Instant};

pub use tickdb::{
    CleanerState, CommitEvent, CommitEventChannel, CommitEventHandler, ConsumerThread, Error,
    EventProcessor, JournalConfig, JournalWriter, PartitionCleaner, Result, Tx, TxLog, TxLogMode,
};
use tempfile::TempDir;

/// 2015-03-12T00:00:00Z in milliseconds
pub const TS: i64 = 1_426_118_400_000;
/// One day in milliseconds
pub const DAY: i64 = 86_400_000;

static TRACING: Once = Once::new();

/// Install a test-writer subscriber once per binary (`RUST_LOG` selects levels).
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Poll `condition` until it holds or `timeout` passes.
pub fn wait_until(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// A scratch journal directory with a writer attached to a channel.
pub struct TestJournal {
    pub dir: TempDir,
    pub channel: Arc<CommitEventChannel>,
    pub writer: JournalWriter,
}

impl TestJournal {
    pub fn new(source_id: u32) -> Self {
        Self::with_config(JournalConfig::for_testing(), source_id)
    }

    pub fn with_config(config: JournalConfig, source_id: u32) -> Self {
        init_tracing();
        let dir = TempDir::new().unwrap();
        let channel = config.commit_channel();
        let writer =
            JournalWriter::open(dir.path(), config, Some(Arc::clone(&channel)), source_id)
                .unwrap();
        TestJournal {
            dir,
            channel,
            writer,
        }
    }

    /// Names of the subdirectories currently on disk
    pub fn dirs_on_disk(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|e| e.unwrap())
            .filter(|e| e.file_type().unwrap().is_dir())
            .map(|e| e.file_name().into_string().unwrap())
            .collect();
        names.sort();
        names
    }
}

/// Counts events whose source id matches `filter`.
pub struct CountingHandler {
    pub filter: u32,
    pub matched: Arc<AtomicU64>,
    pub seen: u64,
    pub last_sequence: Option<u64>,
}

impl CountingHandler {
    pub fn new(filter: u32) -> Self {
        CountingHandler {
            filter,
            matched: Arc::new(AtomicU64::new(0)),
            seen: 0,
            last_sequence: None,
        }
    }
}

impl CommitEventHandler for CountingHandler {
    fn on_event(&mut self, event: &CommitEvent, sequence: u64, _end_of_batch: bool) -> Result<()> {
        if let Some(last) = self.last_sequence {
            assert_eq!(sequence, last + 1, "events out of order");
        }
        self.last_sequence = Some(sequence);
        self.seen += 1;
        if event.source_id == self.filter {
            self.matched.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}
