//! Consumer side of the commit channel
//!
//! An [`EventProcessor`] owns one cursor and drives a
//! [`CommitEventHandler`] over everything published since its last call.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::warn;

use crate::channel::{Availability, CommitEvent, CommitEventChannel, ConsumerCursor};
use crate::handler::CommitEventHandler;

/// Per-processor delivery counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessorCounters {
    /// Events the handler accepted
    pub delivered: u64,
    /// Events skipped because the handler failed or panicked
    pub skipped: u64,
    /// Events lost because their slot was overwritten (only after halt)
    pub lost: u64,
}

/// Reads the channel through its own cursor and feeds a handler.
///
/// Dropping the processor deregisters its cursor.
pub struct EventProcessor {
    channel: Arc<CommitEventChannel>,
    cursor: Option<Arc<ConsumerCursor>>,
    counters: ProcessorCounters,
}

impl EventProcessor {
    /// Register a new cursor on `channel`, starting at the next sequence to
    /// be published.
    pub fn new(channel: Arc<CommitEventChannel>) -> Self {
        let cursor = channel.new_consumer_cursor();
        EventProcessor {
            channel,
            cursor: Some(cursor),
            counters: ProcessorCounters::default(),
        }
    }

    /// Deliver everything published since the last call.
    ///
    /// Returns `true` after delivering a batch, or when nothing was available
    /// and `blocking` is false. Returns `false` when a blocking wait timed
    /// out, the channel was halted, or the processor is closed.
    ///
    /// If the handler fails on sequence `s`, the event is skipped: the cursor
    /// moves past `s`, the rest of the batch is left for the next call, and
    /// the call returns `true`. `end_of_batch` is set on the last event that
    /// is actually delivered.
    pub fn process<H: CommitEventHandler + ?Sized>(
        &mut self,
        handler: &mut H,
        blocking: bool,
    ) -> bool {
        let cursor = match &self.cursor {
            Some(cursor) => Arc::clone(cursor),
            None => return false,
        };

        let next = cursor.next_sequence();
        let highest = match self
            .channel
            .highest_published(&cursor, blocking, self.channel.wait_timeout())
        {
            Availability::Available(highest) => highest,
            Availability::Empty => return true,
            Availability::TimedOut | Availability::Halted => return false,
        };

        // one event of lookahead so the batch-end flag lands on the last
        // event actually delivered, even when later slots were lost
        let mut pending: Option<(u64, CommitEvent)> = None;
        for sequence in next..=highest {
            let event = match self.channel.get(sequence) {
                Some(event) => event,
                None => {
                    warn!(
                        target: "tickdb::processor",
                        sequence,
                        "Commit event overwritten before it was read"
                    );
                    self.counters.lost += 1;
                    continue;
                }
            };
            if let Some((previous, previous_event)) = pending.replace((sequence, event)) {
                if !self.deliver(handler, previous, &previous_event, false) {
                    self.channel.advance(&cursor, sequence);
                    return true;
                }
            }
        }
        if let Some((last, event)) = pending {
            self.deliver(handler, last, &event, true);
        }

        self.channel.advance(&cursor, highest + 1);
        true
    }

    /// Hand one event to the handler. Returns false if it failed or panicked.
    fn deliver<H: CommitEventHandler + ?Sized>(
        &mut self,
        handler: &mut H,
        sequence: u64,
        event: &CommitEvent,
        end_of_batch: bool,
    ) -> bool {
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            handler.on_event(event, sequence, end_of_batch)
        }));
        let failure = match outcome {
            Ok(Ok(())) => {
                self.counters.delivered += 1;
                return true;
            }
            Ok(Err(e)) => e.to_string(),
            Err(panic) => panic_message(panic.as_ref()),
        };

        warn!(
            target: "tickdb::processor",
            sequence,
            source_id = event.source_id,
            error = %failure,
            "Commit event handler failed, skipping event"
        );
        self.counters.skipped += 1;
        false
    }

    /// Next sequence this processor will read, `None` once closed
    pub fn sequence(&self) -> Option<u64> {
        self.cursor.as_ref().map(|c| c.next_sequence())
    }

    /// Delivery counters
    pub fn counters(&self) -> ProcessorCounters {
        self.counters.clone()
    }

    /// The channel this processor reads
    pub fn channel(&self) -> &Arc<CommitEventChannel> {
        &self.channel
    }

    /// Deregister the cursor. Calling it again is a no-op.
    pub fn close(&mut self) {
        if let Some(cursor) = self.cursor.take() {
            self.channel.remove_consumer_cursor(&cursor);
        }
    }
}

impl Drop for EventProcessor {
    fn drop(&mut self) {
        self.close();
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic with non-string payload".to_string()
    }
}
