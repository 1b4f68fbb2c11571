//! Multi-producer, multi-consumer delivery

use std::sync::atomic::Ordering;
use std::sync::{Arc, Barrier};
use std::thread;

use crate::common::*;

const BATCH_SIZE: u64 = 5_000;

#[test]
fn filtered_counts_match_published_counts() {
    init_tracing();
    let channel = Arc::new(CommitEventChannel::new(64, std::time::Duration::from_millis(10)));

    // consumers filter on source ids 1, 2 and 3; only 1 and 2 publish
    let mut consumers = Vec::new();
    let mut counters = Vec::new();
    for filter in 1..=3u32 {
        let handler = CountingHandler::new(filter);
        counters.push(Arc::clone(&handler.matched));
        consumers.push(
            ConsumerThread::spawn(format!("count-{}", filter), Arc::clone(&channel), handler)
                .unwrap(),
        );
    }

    let barrier = Arc::new(Barrier::new(2));
    let producers: Vec<_> = (1..=2u32)
        .map(|source_id| {
            let channel = Arc::clone(&channel);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for i in 0..BATCH_SIZE {
                    channel.publish(source_id, i as i64);
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    assert_eq!(channel.published(), 2 * BATCH_SIZE);

    let mut handlers = Vec::new();
    for mut consumer in consumers {
        consumer.stop();
        handlers.push(consumer.join().expect("consumer thread"));
    }

    assert_eq!(counters[0].load(Ordering::Relaxed), BATCH_SIZE);
    assert_eq!(counters[1].load(Ordering::Relaxed), BATCH_SIZE);
    assert_eq!(counters[2].load(Ordering::Relaxed), 0);
    for handler in &handlers {
        // every consumer saw every event exactly once, in order
        assert_eq!(handler.seen, 2 * BATCH_SIZE);
        assert_eq!(handler.last_sequence, Some(2 * BATCH_SIZE - 1));
    }
    assert_eq!(channel.cursor_count(), 0);
}

#[test]
fn consumers_progress_independently() {
    init_tracing();
    let channel = Arc::new(CommitEventChannel::new(16, std::time::Duration::from_millis(10)));
    let mut fast = EventProcessor::new(Arc::clone(&channel));
    let mut slow = EventProcessor::new(Arc::clone(&channel));
    let mut fast_handler = CountingHandler::new(7);
    let mut slow_handler = CountingHandler::new(7);

    for round in 0..3 {
        for i in 0..4 {
            channel.publish(7, round * 4 + i);
        }
        assert!(fast.process(&mut fast_handler, false));
    }
    assert_eq!(fast_handler.seen, 12);
    assert_eq!(slow_handler.seen, 0);

    // the slow consumer still gets everything, in one batch
    assert!(slow.process(&mut slow_handler, false));
    assert_eq!(slow_handler.seen, 12);
    assert_eq!(slow.sequence(), fast.sequence());
}

#[test]
fn failing_handler_does_not_block_other_consumers() {
    struct FailOdd;
    impl CommitEventHandler for FailOdd {
        fn on_event(&mut self, _event: &CommitEvent, sequence: u64, _eob: bool) -> Result<()> {
            if sequence % 2 == 1 {
                return Err(Error::handler(format!("odd sequence {}", sequence)));
            }
            Ok(())
        }
    }

    init_tracing();
    let channel = Arc::new(CommitEventChannel::new(16, std::time::Duration::from_millis(10)));
    let mut failing = EventProcessor::new(Arc::clone(&channel));
    let mut healthy = EventProcessor::new(Arc::clone(&channel));
    let mut counter = CountingHandler::new(1);

    for i in 0..6 {
        channel.publish(1, i);
    }
    // each call stops at the failed event; keep polling until drained
    while failing.sequence() != Some(6) {
        assert!(failing.process(&mut FailOdd, false));
    }
    assert!(healthy.process(&mut counter, false));

    assert_eq!(failing.counters().delivered, 3);
    assert_eq!(failing.counters().skipped, 3);
    assert_eq!(counter.matched.load(Ordering::Relaxed), 6);
}
