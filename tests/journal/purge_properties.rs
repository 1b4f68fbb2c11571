//! Purge never removes what the writer still needs

use std::collections::BTreeSet;

use proptest::prelude::*;

use crate::common::*;

#[derive(Debug, Clone)]
enum Op {
    AppendSameDay(u64),
    AppendNextDay(u64),
    SetLag,
    ClearLag,
    Commit,
    Rollback,
    Purge,
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => (1u64..1_000).prop_map(Op::AppendSameDay),
        2 => (1u64..1_000).prop_map(Op::AppendNextDay),
        1 => Just(Op::SetLag),
        1 => Just(Op::ClearLag),
        3 => Just(Op::Commit),
        1 => Just(Op::Rollback),
        2 => Just(Op::Purge),
    ]
}

/// Directories the writer's working state points at
fn needed(writer: &JournalWriter) -> BTreeSet<String> {
    let mut names: BTreeSet<String> = writer.partitions().iter().cloned().collect();
    if let Some(lag) = writer.lag_name() {
        names.insert(lag.to_string());
    }
    names
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn purge_keeps_every_live_partition(ops in prop::collection::vec(op(), 1..40)) {
        let mut journal = TestJournal::new(1);
        let mut reader = TxLog::open(journal.dir.path(), TxLogMode::Read).unwrap();
        let mut day = 0i64;

        for op in ops {
            match op {
                Op::AppendSameDay(rows) => journal.writer.append_rows(TS + day * DAY, rows).unwrap(),
                Op::AppendNextDay(rows) => {
                    day += 1;
                    journal.writer.append_rows(TS + day * DAY, rows).unwrap();
                }
                Op::SetLag => {
                    journal.writer.set_lag(3).unwrap();
                }
                Op::ClearLag => journal.writer.clear_lag().unwrap(),
                Op::Commit => {
                    journal.writer.commit().unwrap();
                }
                Op::Rollback => {
                    journal.writer.rollback().unwrap();
                }
                Op::Purge => {
                    journal.writer.purge_unreferenced_partitions(&mut reader).unwrap();
                }
            }
            let on_disk: BTreeSet<String> = journal.dirs_on_disk().into_iter().collect();
            let missing: Vec<_> = needed(&journal.writer).difference(&on_disk).cloned().collect();
            prop_assert!(missing.is_empty(), "purged live partitions {:?}", missing);
        }

        // once everything is committed, a purge leaves exactly the live set
        journal.writer.commit().unwrap();
        journal.writer.purge_unreferenced_partitions(&mut reader).unwrap();
        let on_disk: BTreeSet<String> = journal.dirs_on_disk().into_iter().collect();
        prop_assert_eq!(on_disk, needed(&journal.writer));
    }
}
