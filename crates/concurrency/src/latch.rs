//! One-shot signal

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A signal that fires once and stays fired.
///
/// Used for "consumer started" and "consumer stopped" notifications.
#[derive(Debug, Default)]
pub struct Latch {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Latch {
    /// Create an unfired latch
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire the latch, waking all waiters. Firing twice is a no-op.
    pub fn fire(&self) {
        let mut fired = self.fired.lock();
        if !*fired {
            *fired = true;
            self.cond.notify_all();
        }
    }

    /// True once fired
    pub fn is_fired(&self) -> bool {
        *self.fired.lock()
    }

    /// Wait until fired or `timeout` elapses. Returns whether it fired.
    ///
    /// A timeout too large to form a deadline waits without one.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = match Instant::now().checked_add(timeout) {
            Some(deadline) => deadline,
            None => {
                self.wait();
                return true;
            }
        };
        let mut fired = self.fired.lock();
        while !*fired {
            if self.cond.wait_until(&mut fired, deadline).timed_out() {
                return *fired;
            }
        }
        true
    }

    /// Wait until fired
    pub fn wait(&self) {
        let mut fired = self.fired.lock();
        while !*fired {
            self.cond.wait(&mut fired);
        }
    }
}
