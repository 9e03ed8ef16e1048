//! Entry bookkeeping for the presence registry.

use std::time::{Duration, Instant};

/// A point-in-time view of one tracked entry.
///
/// Listeners and snapshot callers receive this by value (the payload is
/// cloned out); nothing here aliases registry-internal state.
#[derive(Clone, Debug)]
pub struct EntryInfo<V> {
    /// Stable 64-bit identifier for this entry.
    pub id: u64,
    /// Caller-supplied payload as of the snapshot.
    pub payload: V,
    /// When the entry was first observed. Immutable for the entry's lifetime.
    pub added_at: Instant,
    /// When the entry was last refreshed by an observation.
    pub last_refreshed_at: Instant,
    /// The registry's refresh timeout at snapshot time.
    pub timeout: Duration,
    /// Logical time left until the entry becomes eligible for expiration.
    pub remaining: Duration,
}

impl<V> EntryInfo<V> {
    /// Whether the entry was eligible for expiration at snapshot time.
    pub fn is_expired(&self) -> bool {
        self.remaining == Duration::ZERO
    }

    /// Wall-clock age of the entry at `now`.
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.added_at)
    }
}

/// Registry-internal entry state.
///
/// Expiry bookkeeping is kept in logical time (`refreshed_logical`) so that
/// pausing the registry's clock freezes every deadline at once. The wall
/// `last_refreshed_at` only records observations; an expiration veto extends
/// the logical deadline without counting as an observation.
#[derive(Debug)]
pub(crate) struct EntryState<V> {
    pub(crate) payload: V,
    pub(crate) added_at: Instant,
    pub(crate) last_refreshed_at: Instant,
    pub(crate) refreshed_logical: Duration,
}

impl<V> EntryState<V> {
    pub(crate) fn new(payload: V, now: Instant, logical_now: Duration) -> Self {
        Self {
            payload,
            added_at: now,
            last_refreshed_at: now,
            refreshed_logical: logical_now,
        }
    }

    /// Logical instant at which this entry becomes eligible for expiration.
    pub(crate) fn deadline(&self, timeout: Duration) -> Duration {
        self.refreshed_logical + timeout
    }

    pub(crate) fn info(&self, id: u64, timeout: Duration, logical_now: Duration) -> EntryInfo<V>
    where
        V: Clone,
    {
        EntryInfo {
            id,
            payload: self.payload.clone(),
            added_at: self.added_at,
            last_refreshed_at: self.last_refreshed_at,
            timeout,
            remaining: self.deadline(timeout).saturating_sub(logical_now),
        }
    }
}
