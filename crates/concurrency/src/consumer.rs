//! Dedicated consumer thread
//!
//! Runs one handler on its own named thread: `on_start`, then blocking
//! `process` calls until asked to stop or the channel halts, then
//! `on_shutdown`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use tickdb_core::{Error, Result};
use tracing::{debug, error, warn};

use crate::channel::CommitEventChannel;
use crate::handler::CommitEventHandler;
use crate::processor::EventProcessor;

/// A handler running on its own thread.
///
/// The cursor is registered before the thread starts, so every event
/// published after `spawn` returns and before `stop` is delivered.
pub struct ConsumerThread<H> {
    name: String,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<H>>,
}

impl<H: CommitEventHandler + Send + 'static> ConsumerThread<H> {
    /// Spawn a thread named `tickdb-<name>` consuming `channel` with `handler`.
    pub fn spawn(
        name: impl Into<String>,
        channel: Arc<CommitEventChannel>,
        handler: H,
    ) -> Result<Self> {
        let name = name.into();
        let stop = Arc::new(AtomicBool::new(false));
        let processor = EventProcessor::new(channel);

        let thread_stop = Arc::clone(&stop);
        let thread_name = name.clone();
        let handle = std::thread::Builder::new()
            .name(format!("tickdb-{}", name))
            .spawn(move || run(thread_name, processor, handler, thread_stop))
            .map_err(Error::Io)?;

        Ok(ConsumerThread {
            name,
            stop,
            handle: Some(handle),
        })
    }
}

impl<H> ConsumerThread<H> {
    /// Ask the thread to finish. Returns immediately; the thread exits after
    /// its current wait, bounded by the channel's wait timeout.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// True while the thread has not exited
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().map(|h| !h.is_finished()).unwrap_or(false)
    }

    /// Name given at spawn
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop the thread and wait for it. Returns the handler on the first
    /// call, `None` afterwards or if the thread panicked.
    pub fn join(&mut self) -> Option<H> {
        self.stop();
        let handle = self.handle.take()?;
        match handle.join() {
            Ok(handler) => Some(handler),
            Err(_) => {
                error!(target: "tickdb::consumer", name = %self.name, "Consumer thread panicked");
                None
            }
        }
    }
}

impl<H> Drop for ConsumerThread<H> {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run<H: CommitEventHandler>(
    name: String,
    mut processor: EventProcessor,
    mut handler: H,
    stop: Arc<AtomicBool>,
) -> H {
    match handler.on_start() {
        Ok(()) => {
            debug!(target: "tickdb::consumer", name = %name, "Consumer started");
            while !stop.load(Ordering::Acquire) {
                if !processor.process(&mut handler, true) && processor.channel().is_halted() {
                    break;
                }
            }
            // deliver what was published before the stop request
            processor.process(&mut handler, false);
        }
        Err(e) => {
            error!(
                target: "tickdb::consumer",
                name = %name,
                error = %e,
                "Consumer failed to start, no events will be delivered"
            );
        }
    }

    processor.close();
    if let Err(e) = handler.on_shutdown() {
        warn!(target: "tickdb::consumer", name = %name, error = %e, "Consumer shutdown failed");
    }
    debug!(
        target: "tickdb::consumer",
        name = %name,
        delivered = processor.counters().delivered,
        skipped = processor.counters().skipped,
        "Consumer stopped"
    );
    handler
}
