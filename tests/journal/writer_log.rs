//! What a writer leaves in the transaction log, seen by independent readers

use tickdb::{TX_COMMAND_COMMIT, TX_COMMAND_ROLLBACK};

use crate::common::*;

#[test]
fn n_commits_give_txn_n_and_full_chain() {
    let mut journal = TestJournal::new(1);
    const N: u64 = 10;
    for i in 0..N as i64 {
        journal.writer.append_rows(TS + i * DAY, 100).unwrap();
        assert_eq!(journal.writer.commit().unwrap(), i as u64 + 1);
    }

    let mut reader = TxLog::open(journal.dir.path(), TxLogMode::Read).unwrap();
    assert_eq!(reader.current_txn().unwrap(), Some(N));

    // backward chain: N commits plus the bootstrap frame
    let txns: Vec<u64> = reader
        .transactions()
        .unwrap()
        .map(|tx| tx.unwrap().txn)
        .collect();
    assert_eq!(txns, (0..=N).rev().collect::<Vec<_>>());

    let forward: Vec<Tx> = reader.iter_all().unwrap().map(|tx| tx.unwrap()).collect();
    assert_eq!(forward.len() as u64, N + 1);
    for pair in forward.windows(2) {
        assert!(pair[1].journal_max_row_id > pair[0].journal_max_row_id);
        assert!(pair[1].pin > pair[0].pin);
    }
}

#[test]
fn reader_follows_writer_commits() {
    let mut journal = TestJournal::new(1);
    let mut reader = TxLog::open(journal.dir.path(), TxLogMode::Read).unwrap();

    // the bootstrap frame is the only frame
    assert!(reader.has_next().unwrap());
    assert_eq!(reader.head().unwrap().unwrap().txn, 0);
    assert!(!reader.has_next().unwrap());

    journal.writer.append_rows(TS, 5).unwrap();
    journal.writer.commit().unwrap();
    assert!(reader.has_next().unwrap());
    let head = reader.head().unwrap().unwrap();
    assert_eq!(head.txn, 1);
    assert_eq!(head.journal_max_row_id, journal.writer.max_row_id());
    assert!(!reader.has_next().unwrap());
}

#[test]
fn rollback_marker_restores_previous_state() {
    let mut journal = TestJournal::new(1);
    journal.writer.append_rows(TS, 5).unwrap();
    journal.writer.commit().unwrap();
    let committed_max = journal.writer.max_row_id();

    journal.writer.append_rows(TS + DAY, 5).unwrap();
    assert!(journal.dir.path().join("2015-03-13").exists());
    assert_eq!(journal.writer.rollback().unwrap(), 2);
    assert!(!journal.dir.path().join("2015-03-13").exists());

    let mut reader = TxLog::open(journal.dir.path(), TxLogMode::Read).unwrap();
    let chain: Vec<Tx> = reader
        .transactions()
        .unwrap()
        .map(|tx| tx.unwrap())
        .collect();
    assert_eq!(chain[0].command, TX_COMMAND_ROLLBACK);
    assert_eq!(chain[0].journal_max_row_id, committed_max);
    assert_eq!(chain[1].command, TX_COMMAND_COMMIT);

    // rollbacks are not announced
    assert_eq!(journal.channel.published(), 1);
}

#[test]
fn commit_is_published_after_frame_is_readable() {
    struct CheckHead {
        reader: TxLog,
        checked: u64,
        early: u64,
    }

    impl CommitEventHandler for CheckHead {
        fn on_event(&mut self, _event: &CommitEvent, _seq: u64, _eob: bool) -> Result<()> {
            self.checked += 1;
            let txn = self.reader.current_txn()?.unwrap_or(0);
            if txn < self.checked {
                self.early += 1;
            }
            Ok(())
        }
    }

    let mut journal = TestJournal::new(1);
    let handler = CheckHead {
        reader: TxLog::open(journal.dir.path(), TxLogMode::Read).unwrap(),
        checked: 0,
        early: 0,
    };
    let mut consumer =
        ConsumerThread::spawn("check-head", std::sync::Arc::clone(&journal.channel), handler)
            .unwrap();
    for i in 0..50 {
        journal.writer.append_rows(TS + i, 1).unwrap();
        journal.writer.commit().unwrap();
    }
    let handler = consumer.join().unwrap();
    assert_eq!(handler.checked, 50);
    assert_eq!(handler.early, 0);
}

#[test]
fn reopen_continues_the_chain() {
    let dir = tempfile::TempDir::new().unwrap();
    let config = JournalConfig::for_testing();
    {
        let mut writer = JournalWriter::open(dir.path(), config.clone(), None, 1).unwrap();
        writer.append_rows(TS, 10).unwrap();
        writer.commit().unwrap();
    }
    let mut writer = JournalWriter::open(dir.path(), config, None, 1).unwrap();
    assert_eq!(writer.current_txn(), 1);
    assert_eq!(writer.partitions(), &["2015-03-12".to_string()]);
    writer.append_rows(TS, 10).unwrap();
    assert_eq!(writer.commit().unwrap(), 2);
    writer.close().unwrap();
    writer.close().unwrap();
    assert!(matches!(writer.commit(), Err(Error::LifecycleMisuse(_))));
}
