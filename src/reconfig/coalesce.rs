use std::time::{Duration, Instant};

/// Trailing-edge coalescing of filter parameter updates.
///
/// The first update after an apply opens a window; the apply happens once the window
/// has elapsed and carries whatever values are current by then. Applies are therefore
/// at least `interval` apart and the last value written inside a window wins.
#[derive(Clone, Debug)]
pub struct ParamCoalescer {
    interval: Duration,
    pending_since: Option<Instant>,
    last_applied: Option<Instant>,
}

impl ParamCoalescer {
    /// Coalescer with the given minimum spacing.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            pending_since: None,
            last_applied: None,
        }
    }

    /// Record an update made at `now`.
    pub fn mark(&mut self, now: Instant) {
        if self.pending_since.is_none() {
            self.pending_since = Some(now);
        }
    }

    /// Return `true` when updates are waiting.
    pub fn is_pending(&self) -> bool {
        self.pending_since.is_some()
    }

    /// When the pending updates become due.
    pub fn deadline(&self) -> Option<Instant> {
        let since = self.pending_since?;
        let mut due = since + self.interval;
        if let Some(last) = self.last_applied {
            due = due.max(last + self.interval);
        }
        Some(due)
    }

    /// Return `true` when an apply should happen at `now`.
    pub fn is_due(&self, now: Instant) -> bool {
        self.deadline().is_some_and(|d| now >= d)
    }

    /// Mark the pending updates as applied at `now`.
    pub fn applied(&mut self, now: Instant) {
        self.pending_since = None;
        self.last_applied = Some(now);
    }

    /// Drop pending updates without applying them.
    pub fn cancel(&mut self) {
        self.pending_since = None;
    }
}

#[cfg(test)]
#[path = "../../tests/unit/reconfig/coalesce.rs"]
mod tests;
