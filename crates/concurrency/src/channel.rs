//! Commit event ring buffer
//!
//! Producers (committing writers) claim a global sequence with one atomic
//! increment and publish `(source_id, stamp)` into the slot `seq & mask`.
//! Consumers own a [`ConsumerCursor`] each and read at their own pace.
//!
//! A producer blocks only when its slot still holds an event that some live
//! cursor has not passed, i.e. while `seq >= slowest_cursor + capacity`, or
//! while the producer of the previous lap of that slot has claimed it but not
//! yet written it. Writes to one slot therefore land in sequence order, so a
//! late claim can never overwrite a newer event.
//! Consumers block only inside [`CommitEventChannel::highest_published`],
//! bounded by a timeout.
//!
//! # Wakeups
//!
//! Both sides use the same handshake: the waiter bumps a waiting counter
//! while holding the wait mutex and re-checks its condition before parking;
//! the other side makes its progress visible first and then checks the
//! counter. All four operations are `SeqCst`, so at least one side sees the
//! other and no wakeup is lost.

use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Default ring capacity
pub const DEFAULT_CAPACITY: usize = 1024;

/// Default bound on a single blocking wait
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_millis(100);

/// Ceiling on a single blocking wait; longer requests are clamped
pub const MAX_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

/// A commit notification. Carries no payload; consumers re-read the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitEvent {
    /// Identity of the committing writer
    pub source_id: u32,
    /// Commit timestamp (ms since epoch)
    pub stamp: i64,
}

/// Result of asking for the highest readable sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    /// Events up to and including this sequence are readable
    Available(u64),
    /// Nothing new (non-blocking call)
    Empty,
    /// Nothing new before the timeout elapsed
    TimedOut,
    /// The channel was halted and nothing is left to read
    Halted,
}

/// One consumer's read position: the next sequence it will read.
///
/// Written only by the owning consumer (through
/// [`CommitEventChannel::advance`]), read by producers for backpressure.
#[derive(Debug)]
pub struct ConsumerCursor {
    id: u64,
    next: AtomicU64,
}

impl ConsumerCursor {
    /// Registry id of this cursor
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next sequence this consumer will read
    pub fn next_sequence(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}

struct Slot {
    /// Published sequence + 1; 0 means never written
    sequence: AtomicU64,
    source_id: AtomicU32,
    stamp: AtomicI64,
}

impl Slot {
    fn new() -> Self {
        Slot {
            sequence: AtomicU64::new(0),
            source_id: AtomicU32::new(0),
            stamp: AtomicI64::new(0),
        }
    }

    fn holds(&self, seq: u64) -> bool {
        self.sequence.load(Ordering::Acquire) == seq + 1
    }
}

/// Multi-producer, multi-consumer ring of commit events.
pub struct CommitEventChannel {
    slots: Box<[Slot]>,
    mask: u64,
    wait_timeout: Duration,

    /// Next sequence to claim
    next: AtomicU64,
    /// Lower bound on the slowest cursor, refreshed when a producer nears it
    gating: AtomicU64,

    cursors: RwLock<Vec<Arc<ConsumerCursor>>>,
    next_cursor_id: AtomicU64,

    consumer_lock: Mutex<()>,
    consumer_signal: Condvar,
    consumers_waiting: AtomicUsize,

    producer_lock: Mutex<()>,
    producer_signal: Condvar,
    producers_waiting: AtomicUsize,

    halted: AtomicBool,
}

impl CommitEventChannel {
    /// Create a channel. `capacity` is rounded up to a power of two, minimum 2.
    /// `wait_timeout` is clamped to [`MAX_WAIT_TIMEOUT`].
    pub fn new(capacity: usize, wait_timeout: Duration) -> Self {
        let capacity = capacity.max(2).next_power_of_two();
        let slots: Vec<Slot> = (0..capacity).map(|_| Slot::new()).collect();
        CommitEventChannel {
            slots: slots.into_boxed_slice(),
            mask: capacity as u64 - 1,
            wait_timeout: wait_timeout.min(MAX_WAIT_TIMEOUT),
            next: AtomicU64::new(0),
            gating: AtomicU64::new(0),
            cursors: RwLock::new(Vec::new()),
            next_cursor_id: AtomicU64::new(0),
            consumer_lock: Mutex::new(()),
            consumer_signal: Condvar::new(),
            consumers_waiting: AtomicUsize::new(0),
            producer_lock: Mutex::new(()),
            producer_signal: Condvar::new(),
            producers_waiting: AtomicUsize::new(0),
            halted: AtomicBool::new(false),
        }
    }

    /// Channel with [`DEFAULT_CAPACITY`] and [`DEFAULT_WAIT_TIMEOUT`]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_WAIT_TIMEOUT)
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Bound on a single blocking wait
    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    /// Number of sequences claimed so far
    pub fn published(&self) -> u64 {
        self.next.load(Ordering::Acquire)
    }

    /// Number of registered cursors
    pub fn cursor_count(&self) -> usize {
        self.cursors.read().len()
    }

    /// Publish one event and return its sequence.
    ///
    /// Blocks only while the target slot holds an event some live cursor
    /// has not passed, or its previous lap is claimed but unwritten.
    pub fn publish(&self, source_id: u32, stamp: i64) -> u64 {
        let seq = self.claim();
        self.wait_for_slot(seq);
        self.fill(seq, source_id, stamp);
        seq
    }

    fn claim(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }

    fn fill(&self, seq: u64, source_id: u32, stamp: i64) {
        let slot = &self.slots[(seq & self.mask) as usize];
        slot.source_id.store(source_id, Ordering::Relaxed);
        slot.stamp.store(stamp, Ordering::Relaxed);
        slot.sequence.store(seq + 1, Ordering::SeqCst);

        if self.consumers_waiting.load(Ordering::SeqCst) > 0 {
            let _guard = self.consumer_lock.lock();
            self.consumer_signal.notify_all();
        }
        // the next lap of this slot may be parked on us
        self.wake_producers();
    }

    /// True once the previous lap of `seq`'s slot has been written.
    fn lap_written(&self, seq: u64) -> bool {
        let capacity = self.capacity() as u64;
        seq < capacity
            || self.slots[(seq & self.mask) as usize]
                .sequence
                .load(Ordering::SeqCst)
                > seq - capacity
    }

    fn has_room(&self, seq: u64, min_cursor: u64) -> bool {
        seq < min_cursor.saturating_add(self.capacity() as u64)
    }

    /// Slowest cursor position, `u64::MAX` when nobody is registered.
    fn min_cursor(&self) -> u64 {
        self.cursors
            .read()
            .iter()
            .map(|c| c.next.load(Ordering::SeqCst))
            .min()
            .unwrap_or(u64::MAX)
    }

    fn refresh_gating(&self, seq: u64) -> bool {
        let min = self.min_cursor();
        if min != u64::MAX {
            self.gating.fetch_max(min, Ordering::AcqRel);
        }
        self.has_room(seq, min)
    }

    fn writable(&self, seq: u64) -> bool {
        self.lap_written(seq) && (self.halted.load(Ordering::SeqCst) || self.refresh_gating(seq))
    }

    fn wait_for_slot(&self, seq: u64) {
        if self.lap_written(seq)
            && (self.has_room(seq, self.gating.load(Ordering::Acquire)) || self.refresh_gating(seq))
        {
            return;
        }

        debug!(target: "tickdb::channel", seq, "Producer waiting for slot");
        let mut guard = self.producer_lock.lock();
        self.producers_waiting.fetch_add(1, Ordering::SeqCst);
        while !self.writable(seq) {
            self.producer_signal.wait_for(&mut guard, self.wait_timeout);
        }
        self.producers_waiting.fetch_sub(1, Ordering::SeqCst);
    }

    fn wake_producers(&self) {
        if self.producers_waiting.load(Ordering::SeqCst) > 0 {
            let _guard = self.producer_lock.lock();
            self.producer_signal.notify_all();
        }
    }

    /// Register a cursor starting at the next sequence to be published.
    pub fn new_consumer_cursor(&self) -> Arc<ConsumerCursor> {
        let mut cursors = self.cursors.write();
        let cursor = Arc::new(ConsumerCursor {
            id: self.next_cursor_id.fetch_add(1, Ordering::Relaxed),
            next: AtomicU64::new(self.next.load(Ordering::SeqCst)),
        });
        cursors.push(Arc::clone(&cursor));
        debug!(
            target: "tickdb::channel",
            cursor = cursor.id,
            start = cursor.next_sequence(),
            "Registered consumer cursor"
        );
        cursor
    }

    /// Deregister a cursor. Producers held back by it are woken.
    ///
    /// Returns false if the cursor was not registered.
    pub fn remove_consumer_cursor(&self, cursor: &ConsumerCursor) -> bool {
        let removed = {
            let mut cursors = self.cursors.write();
            let before = cursors.len();
            cursors.retain(|c| c.id != cursor.id);
            cursors.len() != before
        };
        if removed {
            debug!(target: "tickdb::channel", cursor = cursor.id, "Removed consumer cursor");
            let _guard = self.producer_lock.lock();
            self.producer_signal.notify_all();
        }
        removed
    }

    /// Move a cursor forward to `next` (the next sequence it will read).
    pub fn advance(&self, cursor: &ConsumerCursor, next: u64) {
        cursor.next.fetch_max(next, Ordering::SeqCst);
        self.wake_producers();
    }

    /// Read the event at `seq`, `None` if the slot no longer holds it.
    pub fn get(&self, seq: u64) -> Option<CommitEvent> {
        let slot = &self.slots[(seq & self.mask) as usize];
        if !slot.holds(seq) {
            return None;
        }
        let event = CommitEvent {
            source_id: slot.source_id.load(Ordering::Relaxed),
            stamp: slot.stamp.load(Ordering::Relaxed),
        };
        // overwritten while reading (only possible after halt)
        if !slot.holds(seq) {
            return None;
        }
        Some(event)
    }

    /// Highest sequence published contiguously from `from`.
    fn scan(&self, from: u64) -> Option<u64> {
        let limit = from.saturating_add(self.capacity() as u64);
        let mut seq = from;
        while seq < limit && self.slots[(seq & self.mask) as usize].holds(seq) {
            seq += 1;
        }
        if seq > from {
            Some(seq - 1)
        } else {
            None
        }
    }

    /// Highest sequence readable by `cursor`.
    ///
    /// With `blocking`, waits up to `timeout` (at most [`MAX_WAIT_TIMEOUT`])
    /// for something to arrive. Timing out is a scheduling signal, not an
    /// error.
    pub fn highest_published(
        &self,
        cursor: &ConsumerCursor,
        blocking: bool,
        timeout: Duration,
    ) -> Availability {
        let from = cursor.next_sequence();
        if let Some(highest) = self.scan(from) {
            return Availability::Available(highest);
        }
        if self.halted.load(Ordering::SeqCst) {
            return Availability::Halted;
        }
        if !blocking {
            return Availability::Empty;
        }

        let now = Instant::now();
        let deadline = now
            .checked_add(timeout.min(MAX_WAIT_TIMEOUT))
            .unwrap_or(now);
        let mut guard = self.consumer_lock.lock();
        self.consumers_waiting.fetch_add(1, Ordering::SeqCst);
        let result = loop {
            if let Some(highest) = self.scan(from) {
                break Availability::Available(highest);
            }
            if self.halted.load(Ordering::SeqCst) {
                break Availability::Halted;
            }
            if Instant::now() >= deadline {
                break Availability::TimedOut;
            }
            self.consumer_signal.wait_until(&mut guard, deadline);
        };
        self.consumers_waiting.fetch_sub(1, Ordering::SeqCst);
        result
    }

    /// Stop the channel: wake every waiter. Afterwards blocking waits return
    /// `Halted` once drained and producers no longer wait for consumers.
    pub fn halt(&self) {
        if self.halted.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!(target: "tickdb::channel", published = self.published(), "Halting commit channel");
        {
            let _guard = self.consumer_lock.lock();
            self.consumer_signal.notify_all();
        }
        let _guard = self.producer_lock.lock();
        self.producer_signal.notify_all();
    }

    /// True after `halt`
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }
}

impl Default for CommitEventChannel {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl std::fmt::Debug for CommitEventChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitEventChannel")
            .field("capacity", &self.capacity())
            .field("published", &self.published())
            .field("cursors", &self.cursor_count())
            .field("halted", &self.is_halted())
            .finish()
    }
}
