//! Consumer callbacks

use crate::channel::CommitEvent;
use tickdb_core::Result;

/// Receives commit events from an [`EventProcessor`](crate::EventProcessor).
///
/// `on_start` runs once on the consumer thread before the first event and
/// `on_shutdown` once after the last. An `Err` (or a panic) from `on_event`
/// skips that one event; it is not redelivered.
pub trait CommitEventHandler {
    /// Called once before the first event
    fn on_start(&mut self) -> Result<()> {
        Ok(())
    }

    /// Called for each event in sequence order. `end_of_batch` is set on the
    /// last event of one `process` call.
    fn on_event(&mut self, event: &CommitEvent, sequence: u64, end_of_batch: bool) -> Result<()>;

    /// Called once after the last event
    fn on_shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<H: CommitEventHandler + ?Sized> CommitEventHandler for Box<H> {
    fn on_start(&mut self) -> Result<()> {
        (**self).on_start()
    }

    fn on_event(&mut self, event: &CommitEvent, sequence: u64, end_of_batch: bool) -> Result<()> {
        (**self).on_event(event, sequence, end_of_batch)
    }

    fn on_shutdown(&mut self) -> Result<()> {
        (**self).on_shutdown()
    }
}
