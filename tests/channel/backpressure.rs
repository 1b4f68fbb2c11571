//! Ring wraparound: the single point where a producer waits

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::common::*;

const CAPACITY: u64 = 8;

fn channel() -> Arc<CommitEventChannel> {
    Arc::new(CommitEventChannel::new(
        CAPACITY as usize,
        Duration::from_millis(10),
    ))
}

/// Publish `count` events on a thread, counting completed publishes.
fn spawn_producer(
    channel: &Arc<CommitEventChannel>,
    count: u64,
) -> (Arc<AtomicU64>, thread::JoinHandle<()>) {
    let done = Arc::new(AtomicU64::new(0));
    let channel = Arc::clone(channel);
    let thread_done = Arc::clone(&done);
    let handle = thread::spawn(move || {
        for i in 0..count {
            channel.publish(1, i as i64);
            thread_done.fetch_add(1, Ordering::SeqCst);
        }
    });
    (done, handle)
}

#[test]
fn producers_never_wait_without_consumers() {
    let channel = channel();
    for i in 0..(CAPACITY * 10) {
        channel.publish(1, i as i64);
    }
    assert_eq!(channel.published(), CAPACITY * 10);
}

#[test]
fn unpolled_consumer_blocks_producer_but_loses_nothing() {
    init_tracing();
    let channel = channel();
    let mut processor = EventProcessor::new(Arc::clone(&channel));
    let mut handler = CountingHandler::new(1);

    let total = CAPACITY * 3;
    let (done, producer) = spawn_producer(&channel, total);

    // the ring fills and the producer stops at exactly one ring's worth
    assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == CAPACITY));
    thread::sleep(Duration::from_millis(50));
    assert_eq!(done.load(Ordering::SeqCst), CAPACITY);

    // polling releases it; every event is delivered
    while handler.seen < total {
        processor.process(&mut handler, true);
    }
    producer.join().unwrap();

    assert_eq!(handler.matched.load(Ordering::Relaxed), total);
    assert_eq!(processor.counters().lost, 0);
    assert_eq!(processor.counters().delivered, total);
}

#[test]
fn removing_lagging_cursor_unblocks_producer() {
    init_tracing();
    let channel = channel();
    let stalled = channel.new_consumer_cursor();

    let (done, producer) = spawn_producer(&channel, CAPACITY * 2);
    assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == CAPACITY));
    thread::sleep(Duration::from_millis(30));
    assert_eq!(done.load(Ordering::SeqCst), CAPACITY);

    assert!(channel.remove_consumer_cursor(&stalled));
    assert!(wait_until(Duration::from_secs(1), || done.load(Ordering::SeqCst)
        == CAPACITY * 2));
    producer.join().unwrap();
    assert!(!channel.remove_consumer_cursor(&stalled));
}

#[test]
fn halt_releases_blocked_producer() {
    init_tracing();
    let channel = channel();
    let _stalled = channel.new_consumer_cursor();

    let (done, producer) = spawn_producer(&channel, CAPACITY + 1);
    assert!(wait_until(Duration::from_secs(5), || done.load(Ordering::SeqCst) == CAPACITY));

    channel.halt();
    producer.join().unwrap();
    assert_eq!(done.load(Ordering::SeqCst), CAPACITY + 1);
}

#[test]
fn consumer_thread_stops_promptly_on_halt() {
    init_tracing();
    let channel = channel();
    let handler = CountingHandler::new(1);
    let mut consumer = ConsumerThread::spawn("halt", Arc::clone(&channel), handler).unwrap();

    channel.publish(1, 0);
    channel.halt();
    assert!(wait_until(Duration::from_secs(2), || !consumer.is_running()));
    let handler = consumer.join().unwrap();
    assert_eq!(handler.seen, 1);
}
