//! Partition cleaner driven by real commits

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tickdb::{PartitionPurge, PurgeReport};

use crate::common::*;

/// Counts purge calls, delegating to the writer's store.
struct CountingPurge {
    inner: Arc<dyn PartitionPurge>,
    calls: AtomicU64,
}

impl PartitionPurge for CountingPurge {
    fn purge_unreferenced_partitions(&self, tx_log: &mut TxLog) -> Result<PurgeReport> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.purge_unreferenced_partitions(tx_log)
    }
}

fn counting_cleaner(journal: &TestJournal) -> (Arc<CountingPurge>, PartitionCleaner) {
    let purge = Arc::new(CountingPurge {
        inner: journal.writer.purger(),
        calls: AtomicU64::new(0),
    });
    let cleaner = PartitionCleaner::with_purger(
        journal.dir.path(),
        journal.writer.source_id(),
        Arc::clone(&purge) as Arc<dyn PartitionPurge>,
    );
    (purge, cleaner)
}

#[test]
fn burst_of_commits_triggers_one_purge() {
    let mut journal = TestJournal::new(3);
    let (purge, mut cleaner) = counting_cleaner(&journal);
    let mut processor = EventProcessor::new(Arc::clone(&journal.channel));
    cleaner.on_start().unwrap();

    const K: u64 = 7;
    for i in 0..K as i64 {
        journal.writer.append_rows(TS + i, 10).unwrap();
        journal.writer.commit().unwrap();
    }

    assert!(processor.process(&mut cleaner, false));
    assert_eq!(processor.counters().delivered, K);
    assert_eq!(purge.calls.load(Ordering::SeqCst), 1);
    assert_eq!(cleaner.status().events_seen(), K);

    // nothing new, nothing to do
    assert!(processor.process(&mut cleaner, false));
    assert_eq!(purge.calls.load(Ordering::SeqCst), 1);
    cleaner.on_shutdown().unwrap();
}

#[test]
fn superseded_lag_is_removed_in_background() {
    let mut journal = TestJournal::new(1);
    let cleaner = PartitionCleaner::new(&journal.writer);
    let status = cleaner.status();
    let mut consumer =
        ConsumerThread::spawn("cleaner", Arc::clone(&journal.channel), cleaner).unwrap();
    status.wait_started(Duration::from_secs(5)).unwrap();
    assert_eq!(status.state(), CleanerState::Ready);

    journal.writer.append_rows(TS, 100).unwrap();
    let first_lag = journal.writer.set_lag(5).unwrap();
    journal.writer.commit().unwrap();

    journal.writer.append_rows(TS + DAY, 100).unwrap();
    let second_lag = journal.writer.set_lag(8).unwrap();
    journal.writer.commit().unwrap();

    assert!(wait_until(Duration::from_secs(5), || !journal
        .dir
        .path()
        .join(&first_lag)
        .exists()));
    assert_eq!(
        journal.dirs_on_disk(),
        vec![
            "2015-03-12".to_string(),
            "2015-03-13".to_string(),
            second_lag
        ]
    );

    let cleaner = consumer.join().unwrap();
    assert_eq!(cleaner.state(), CleanerState::Stopped);
    status.wait_stopped(Duration::ZERO).unwrap();
    assert_eq!(status.events_seen(), 2);
    assert_eq!(status.purge_failures(), 0);
}

#[test]
fn foreign_commits_do_not_purge() {
    let mut journal = TestJournal::new(1);
    let (purge, mut cleaner) = counting_cleaner(&journal);
    let mut processor = EventProcessor::new(Arc::clone(&journal.channel));
    cleaner.on_start().unwrap();

    // another writer sharing the channel
    journal.channel.publish(2, 0);
    journal.channel.publish(2, 1);
    assert!(processor.process(&mut cleaner, false));
    assert_eq!(purge.calls.load(Ordering::SeqCst), 0);

    journal.writer.append_rows(TS, 1).unwrap();
    journal.writer.commit().unwrap();
    assert!(processor.process(&mut cleaner, false));
    assert_eq!(purge.calls.load(Ordering::SeqCst), 1);
    cleaner.on_shutdown().unwrap();
}

#[test]
fn stopped_cleaner_cannot_be_restarted() {
    let mut journal = TestJournal::new(1);
    let cleaner = PartitionCleaner::new(&journal.writer);
    let status = cleaner.status();

    let mut consumer =
        ConsumerThread::spawn("cleaner", Arc::clone(&journal.channel), cleaner).unwrap();
    status.wait_started(Duration::from_secs(5)).unwrap();
    journal.writer.append_rows(TS, 1).unwrap();
    journal.writer.commit().unwrap();
    let cleaner = consumer.join().unwrap();
    assert_eq!(status.events_seen(), 1);

    // on_start fails on the new thread; no event reaches the cleaner
    let mut restarted =
        ConsumerThread::spawn("cleaner-again", Arc::clone(&journal.channel), cleaner).unwrap();
    journal.writer.append_rows(TS, 1).unwrap();
    journal.writer.commit().unwrap();
    let cleaner = restarted.join().unwrap();

    assert_eq!(cleaner.state(), CleanerState::Stopped);
    assert_eq!(status.events_seen(), 1);
}

#[test]
fn cleaner_sees_writer_reopen() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = JournalConfig::for_testing();
    let channel = config.commit_channel();

    let mut writer =
        JournalWriter::open(dir.path(), config.clone(), Some(Arc::clone(&channel)), 4).unwrap();
    let cleaner = PartitionCleaner::new(&writer);
    let status = cleaner.status();
    let mut consumer = ConsumerThread::spawn("cleaner", Arc::clone(&channel), cleaner).unwrap();
    status.wait_started(Duration::from_secs(5)).unwrap();

    writer.append_rows(TS, 10).unwrap();
    let old_lag = writer.set_lag(1).unwrap();
    writer.commit().unwrap();
    writer.close().unwrap();

    let mut writer = JournalWriter::open(dir.path(), config, Some(Arc::clone(&channel)), 4).unwrap();
    writer.clear_lag().unwrap();
    writer.commit().unwrap();

    assert!(wait_until(Duration::from_secs(5), || !dir
        .path()
        .join(&old_lag)
        .exists()));
    assert!(dir.path().join("2015-03-12").exists());
    consumer.join().unwrap();
}
