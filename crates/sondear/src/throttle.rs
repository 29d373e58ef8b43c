//! Occurrence-gated logging for repeated failures.
//!
//! A transport outage produces a failure on every tick and an unregistered
//! class produces one on every instrumented call. Logging each occurrence
//! would flood the host application's logs, so repeated events are logged on
//! power-of-two occurrence counts (1st, 2nd, 4th, 8th, ...).

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter that gates log emission to power-of-two occurrence counts.
#[derive(Debug, Default)]
pub(crate) struct LogThrottle {
    count: AtomicU64,
}

impl LogThrottle {
    pub(crate) const fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
        }
    }

    /// Record one occurrence and report whether it should be logged.
    pub(crate) fn should_log(&self) -> bool {
        let n = self.count.fetch_add(1, Ordering::Relaxed) + 1;
        n.is_power_of_two()
    }

    /// Total occurrences recorded so far.
    pub(crate) fn occurrences(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Reset the counter, so the next occurrence logs immediately.
    ///
    /// Called when a failing operation succeeds again: the next outage is a
    /// new event and deserves a fresh first log line.
    pub(crate) fn reset(&self) {
        self.count.store(0, Ordering::Relaxed);
    }
}
