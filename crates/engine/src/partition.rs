//! Partition directories and reachability
//!
//! A journal directory holds one subdirectory per time partition, named by
//! [`PartitionBy`](tickdb_core::PartitionBy), plus lag (staging) partitions
//! named `temp-<uuid>`. Regular partitions are addressed by their position
//! in name order, which is the partition index inside a row id.
//!
//! Reachability is decided by [`unreferenced_partitions`], a pure function
//! over recent log frames and a directory snapshot.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use tickdb_core::rows::max_partition_index;
use tickdb_core::Result;
use tickdb_durability::Tx;

/// Name prefix of lag partitions
pub const TEMP_PARTITION_PREFIX: &str = "temp-";

/// True if `name` is a lag partition directory
pub fn is_lag_partition(name: &str) -> bool {
    name.starts_with(TEMP_PARTITION_PREFIX)
}

/// Snapshot of the partition directories of a journal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionLayout {
    /// Regular partitions, sorted by name (= partition index order)
    pub regular: Vec<String>,
    /// Lag partitions, sorted by name
    pub lag: Vec<String>,
}

impl PartitionLayout {
    /// Total number of directories
    pub fn len(&self) -> usize {
        self.regular.len() + self.lag.len()
    }

    /// True if there are no partition directories
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// List partition directories under `location`.
///
/// Files (the transaction log, config) and hidden or `_`-prefixed entries
/// are ignored.
pub fn scan_partitions(location: &Path) -> Result<PartitionLayout> {
    let mut layout = PartitionLayout::default();
    for entry in fs::read_dir(location)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }
        if is_lag_partition(&name) {
            layout.lag.push(name);
        } else {
            layout.regular.push(name);
        }
    }
    layout.regular.sort();
    layout.lag.sort();
    Ok(layout)
}

/// Partitions no frame in `frames` references.
///
/// `frames` are the frames from the head backwards over the retention
/// window. A regular partition is referenced when its index is at or below
/// the highest partition index any of those frames' `journal_max_row_id`
/// reaches; a lag partition when a frame names it. Names in `pending`
/// (created but not yet committed) are always kept.
///
/// With no frames nothing is known to be unreferenced, so nothing is
/// returned. The result lists regular partitions first, then lag
/// partitions, each in name order.
pub fn unreferenced_partitions(
    frames: &[Tx],
    layout: &PartitionLayout,
    pending: &HashSet<String>,
) -> Vec<String> {
    if frames.is_empty() {
        return Vec::new();
    }

    let max_index = frames
        .iter()
        .filter_map(|tx| max_partition_index(tx.journal_max_row_id))
        .max();
    let lag_names: HashSet<&str> = frames
        .iter()
        .filter_map(|tx| tx.lag_name.as_deref())
        .collect();

    let regular = layout
        .regular
        .iter()
        .enumerate()
        .filter(|(index, _)| match max_index {
            Some(max) => *index as i64 > max,
            None => true,
        })
        .map(|(_, name)| name);
    let lag = layout
        .lag
        .iter()
        .filter(|name| !lag_names.contains(name.as_str()));

    regular
        .chain(lag)
        .filter(|name| !pending.contains(*name))
        .cloned()
        .collect()
}

/// Outcome of one purge pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Transaction number of the head the pass was computed from
    pub head_txn: Option<u64>,
    /// Frames examined (head plus retained history)
    pub frames_examined: usize,
    /// Regular partitions removed
    pub partitions_removed: usize,
    /// Lag partitions removed
    pub lag_removed: usize,
    /// Names of all removed directories
    pub removed: Vec<String>,
    /// Directories that could not be removed
    pub failed: usize,
    /// Duration of the pass in milliseconds
    pub duration_ms: u64,
}

impl PurgeReport {
    /// True if nothing was removed or attempted
    pub fn is_noop(&self) -> bool {
        self.removed.is_empty() && self.failed == 0
    }
}
