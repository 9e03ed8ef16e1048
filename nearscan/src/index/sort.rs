//! Sort keys and comparator for the device index.

use std::cmp::Ordering;
use std::fmt;

use super::DeviceRow;

/// The field the sorted index orders by.
///
/// Every key is a total order over [`DeviceRow`]; ties keep their insertion
/// order (the index inserts equal elements after the existing run). Signal
/// strength orders descending by convention (strongest first); all other
/// keys ascend. The index's reversal flag inverts whichever key is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortKey {
    /// Hardware address (folded-id ordering, equal to canonical string order).
    Address,
    /// Display name.
    Name,
    /// Smoothed signal strength, strongest first.
    Signal,
    /// Time since first observation, most recent first.
    Age,
    /// Logical time left before expiration, soonest first.
    TimeoutRemaining,
}

impl SortKey {
    /// Short label for display and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SortKey::Address => "address",
            SortKey::Name => "name",
            SortKey::Signal => "signal",
            SortKey::Age => "age",
            SortKey::TimeoutRemaining => "timeout",
        }
    }
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Compare two rows under the given key and direction.
pub(crate) fn compare(a: &DeviceRow, b: &DeviceRow, key: SortKey, reversed: bool) -> Ordering {
    let ordering = match key {
        SortKey::Address => a.id.cmp(&b.id),
        SortKey::Name => a.name.cmp(&b.name),
        // Inverted on purpose: strongest signal (greatest dBm) sorts first.
        SortKey::Signal => b.signal.cmp(&a.signal),
        // Smallest age first means most recently added first.
        SortKey::Age => b.added_at.cmp(&a.added_at),
        SortKey::TimeoutRemaining => a.remaining.cmp(&b.remaining),
    };
    if reversed {
        ordering.reverse()
    } else {
        ordering
    }
}
