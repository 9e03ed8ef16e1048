//! Pausable logical clock for expiration bookkeeping.

use std::time::{Duration, Instant};

/// A monotonic clock that only advances while unpaused.
///
/// Entry deadlines are expressed in logical time (duration since the clock's
/// epoch, minus all accumulated pause time). Pausing therefore freezes every
/// deadline at once with a single offset instead of touching each entry, so
/// pause/resume are O(1) regardless of how many entries the registry holds.
#[derive(Debug)]
pub(crate) struct LogicalClock {
    epoch: Instant,
    paused_accum: Duration,
    paused_since: Option<Instant>,
}

impl LogicalClock {
    pub(crate) fn new(epoch: Instant) -> Self {
        Self {
            epoch,
            paused_accum: Duration::ZERO,
            paused_since: None,
        }
    }

    /// Logical time elapsed at wall instant `at`.
    pub(crate) fn now(&self, at: Instant) -> Duration {
        let paused = self.paused_accum
            + self
                .paused_since
                .map(|since| at.saturating_duration_since(since))
                .unwrap_or(Duration::ZERO);
        at.saturating_duration_since(self.epoch).saturating_sub(paused)
    }

    /// Freeze the clock. Idempotent; returns `true` if newly paused.
    pub(crate) fn pause(&mut self, at: Instant) -> bool {
        if self.paused_since.is_some() {
            return false;
        }
        self.paused_since = Some(at);
        true
    }

    /// Unfreeze the clock. Idempotent; returns `true` if newly resumed.
    pub(crate) fn resume(&mut self, at: Instant) -> bool {
        match self.paused_since.take() {
            Some(since) => {
                self.paused_accum += at.saturating_duration_since(since);
                true
            }
            None => false,
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }
}
