//! Order-preserving sorted projection of the registry.
//!
//! Mirrors registry contents into a comparator-ordered sequence for display.
//! The index maintains both directions of the mapping, `order[index] -> id`
//! and `position[id] -> index`, and updates only the affected contiguous
//! index range on insert, move, and remove instead of re-sorting. Changing
//! the sort key drains and reinserts every element so that downstream
//! consumers relying on per-item add/remove notifications stay consistent.
//!
//! The index is single-writer: it is fed serially from one registry's
//! listener callbacks (the presence service guards it with a mutex).

mod sort;

pub use sort::SortKey;

use std::cmp::Ordering;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::registry::EntryInfo;
use crate::scan::{format_address, DeviceInfo};
use sort::compare;

/// The index's read-only snapshot of one device.
///
/// A value copy, deliberately detached from the registry's live entry so the
/// display order cannot mutate out from under a render pass.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceRow {
    /// Folded hardware address (registry key).
    pub id: u64,
    /// Canonical address string.
    pub address: String,
    /// Display name.
    pub name: String,
    /// Smoothed signal strength in dBm.
    pub signal: i32,
    /// When the device was first observed.
    pub added_at: Instant,
    /// Logical time left before the entry expires.
    pub remaining: Duration,
}

impl From<&EntryInfo<DeviceInfo>> for DeviceRow {
    fn from(entry: &EntryInfo<DeviceInfo>) -> Self {
        Self {
            id: entry.id,
            address: format_address(entry.id),
            name: entry.payload.name().to_string(),
            signal: entry.payload.signal_smoothed(),
            added_at: entry.added_at,
            remaining: entry.remaining,
        }
    }
}

/// A single index mutation, reported with the affected positions so a
/// display collaborator can render incrementally.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IndexEvent {
    /// A row was inserted at `index`; later rows shifted right by one.
    Inserted { id: u64, index: usize },
    /// The row at `index` changed without affecting sort order.
    Updated { id: u64, index: usize },
    /// A row moved from `from` to `to`; only that range shifted.
    Moved { id: u64, from: usize, to: usize },
    /// The row at `index` was removed; later rows shifted left by one.
    Removed { id: u64, index: usize },
}

/// Comparator-ordered projection with O(1) reverse lookup.
pub struct SortedIndex {
    /// Forward ordered sequence; source of truth for render order.
    order: Vec<u64>,
    /// Row snapshots by id.
    rows: HashMap<u64, DeviceRow>,
    /// Reverse map, kept in sync with `order` by every mutation.
    position: HashMap<u64, usize>,
    sort_key: SortKey,
    reversed: bool,
}

impl SortedIndex {
    /// Create an empty index ordered by `sort_key`.
    pub fn new(sort_key: SortKey) -> Self {
        Self::with_direction(sort_key, false)
    }

    /// Create an empty index with an explicit initial direction.
    pub fn with_direction(sort_key: SortKey, reversed: bool) -> Self {
        Self {
            order: Vec::new(),
            rows: HashMap::new(),
            position: HashMap::new(),
            sort_key,
            reversed,
        }
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the index holds no rows.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The active sort key.
    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }

    /// Whether the active order is reversed.
    pub fn is_reversed(&self) -> bool {
        self.reversed
    }

    /// Row at a display position.
    pub fn get(&self, index: usize) -> Option<&DeviceRow> {
        self.order.get(index).and_then(|id| self.rows.get(id))
    }

    /// Row by id.
    pub fn row(&self, id: u64) -> Option<&DeviceRow> {
        self.rows.get(&id)
    }

    /// Display position of `id`, O(1) via the reverse map.
    ///
    /// Valid only because every mutation keeps the map in sync with the
    /// ordered sequence; this is not a search.
    pub fn index_of(&self, id: u64) -> Option<usize> {
        self.position.get(&id).copied()
    }

    /// Iterate rows in display order.
    pub fn iter(&self) -> impl Iterator<Item = &DeviceRow> {
        self.order.iter().filter_map(|id| self.rows.get(id))
    }

    /// Insert a new row or update an existing one.
    ///
    /// A new id is inserted at its sorted position. An existing id whose
    /// order-relevant fields changed is moved (remove-then-reinsert with a
    /// range-limited reverse-map adjustment); otherwise the row is replaced
    /// in place with no index churn.
    pub fn insert_or_update(&mut self, row: DeviceRow) -> IndexEvent {
        let id = row.id;
        let event = if let Some(from) = self.locate(id) {
            let order_unchanged = self
                .rows
                .get(&id)
                .map(|old| compare(old, &row, self.sort_key, self.reversed) == Ordering::Equal)
                .unwrap_or(false);
            if order_unchanged {
                self.rows.insert(id, row);
                IndexEvent::Updated { id, index: from }
            } else {
                self.order.remove(from);
                let to = self.insertion_point(&row);
                self.order.insert(to, id);
                self.rows.insert(id, row);
                if to == from {
                    // Sort field changed but the row stayed put.
                    IndexEvent::Updated { id, index: from }
                } else {
                    // Only the range between the two positions shifted.
                    self.reindex_range(from.min(to), from.max(to));
                    IndexEvent::Moved { id, from, to }
                }
            }
        } else {
            let at = self.insertion_point(&row);
            self.order.insert(at, id);
            self.rows.insert(id, row);
            self.reindex_range(at, self.order.len() - 1);
            IndexEvent::Inserted { id, index: at }
        };
        self.debug_check();
        event
    }

    /// Remove a row. Removing an absent id is a no-op returning `None`.
    pub fn remove(&mut self, id: u64) -> Option<IndexEvent> {
        let from = self.locate(id)?;
        self.order.remove(from);
        self.rows.remove(&id);
        self.position.remove(&id);
        if from < self.order.len() {
            self.reindex_range(from, self.order.len() - 1);
        }
        self.debug_check();
        Some(IndexEvent::Removed { id, index: from })
    }

    /// Change the sort key, or reverse the direction when the key is already
    /// active ("tap again to reverse").
    ///
    /// All rows are drained (one `Removed` event each, always at index 0)
    /// and reinserted under the new order (one `Inserted` event each), so
    /// consumers tracking per-item notifications never observe a silent bulk
    /// replace. Ties keep their previous relative order.
    pub fn set_sort_key(&mut self, sort_key: SortKey) -> Vec<IndexEvent> {
        if sort_key == self.sort_key {
            self.reversed = !self.reversed;
        } else {
            self.sort_key = sort_key;
            self.reversed = false;
        }
        debug!(key = %self.sort_key, reversed = self.reversed, "sort order changed");

        let mut events = Vec::with_capacity(self.order.len() * 2);
        let drained: Vec<u64> = self.order.drain(..).collect();
        self.position.clear();
        for &id in &drained {
            events.push(IndexEvent::Removed { id, index: 0 });
        }
        for id in drained {
            if let Some(row) = self.rows.get(&id).cloned() {
                let at = self.insertion_point(&row);
                self.order.insert(at, id);
                self.reindex_range(at, self.order.len() - 1);
                events.push(IndexEvent::Inserted { id, index: at });
            }
        }
        self.debug_check();
        events
    }

    /// Upper-bound insertion point under the active comparator: equal rows
    /// sort after the existing run, keeping insertion order stable.
    fn insertion_point(&self, row: &DeviceRow) -> usize {
        let rows = &self.rows;
        let key = self.sort_key;
        let reversed = self.reversed;
        self.order.partition_point(|id| {
            rows.get(id)
                .map(|other| compare(other, row, key, reversed) != Ordering::Greater)
                .unwrap_or(false)
        })
    }

    /// Reverse-map position of `id`, verifying the maps agree.
    ///
    /// On disagreement: assertion failure in debug builds, full rebuild in
    /// release builds.
    fn locate(&mut self, id: u64) -> Option<usize> {
        let at = *self.position.get(&id)?;
        if self.order.get(at).copied() != Some(id) {
            debug_assert!(false, "sorted index maps disagree for id {id:#x}");
            warn!(id, "sorted index maps disagree; rebuilding");
            self.rebuild();
            return self.position.get(&id).copied();
        }
        Some(at)
    }

    fn reindex_range(&mut self, lo: usize, hi: usize) {
        for i in lo..=hi {
            if let Some(&id) = self.order.get(i) {
                self.position.insert(id, i);
            }
        }
    }

    fn rebuild(&mut self) {
        let rows = &self.rows;
        let key = self.sort_key;
        let reversed = self.reversed;
        self.order = rows.keys().copied().collect();
        self.order.sort_by(|a, b| {
            match (rows.get(a), rows.get(b)) {
                (Some(ra), Some(rb)) => compare(ra, rb, key, reversed).then(a.cmp(b)),
                _ => a.cmp(b),
            }
        });
        self.position = self
            .order
            .iter()
            .enumerate()
            .map(|(i, &id)| (id, i))
            .collect();
    }

    fn is_consistent(&self) -> bool {
        self.order.len() == self.rows.len()
            && self.order.len() == self.position.len()
            && self
                .order
                .iter()
                .enumerate()
                .all(|(i, id)| self.position.get(id) == Some(&i))
            && self.order.windows(2).all(|pair| {
                match (self.rows.get(&pair[0]), self.rows.get(&pair[1])) {
                    (Some(a), Some(b)) => {
                        compare(a, b, self.sort_key, self.reversed) != Ordering::Greater
                    }
                    _ => false,
                }
            })
    }

    fn debug_check(&self) {
        debug_assert!(self.is_consistent(), "sorted index invariants violated");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(id: u64, name: &str, signal: i32) -> DeviceRow {
        row_aged(id, name, signal, Duration::ZERO)
    }

    fn row_aged(id: u64, name: &str, signal: i32, age: Duration) -> DeviceRow {
        // A fixed anchor keeps ages deterministic within one test; older rows
        // sit closer to the anchor.
        thread_local! {
            static ANCHOR: Instant = Instant::now();
        }
        let offset = Duration::from_secs(3600).saturating_sub(age);
        DeviceRow {
            id,
            address: format_address(id),
            name: name.to_string(),
            signal,
            added_at: ANCHOR.with(|a| *a + offset),
            remaining: Duration::from_secs(30),
        }
    }

    fn names(index: &SortedIndex) -> Vec<String> {
        index.iter().map(|r| r.name.clone()).collect()
    }

    #[test]
    fn test_insert_keeps_sorted_order_and_positions() {
        let mut index = SortedIndex::new(SortKey::Name);
        assert_eq!(
            index.insert_or_update(row(3, "charlie", -60)),
            IndexEvent::Inserted { id: 3, index: 0 }
        );
        assert_eq!(
            index.insert_or_update(row(1, "alpha", -50)),
            IndexEvent::Inserted { id: 1, index: 0 }
        );
        assert_eq!(
            index.insert_or_update(row(2, "bravo", -40)),
            IndexEvent::Inserted { id: 2, index: 1 }
        );
        assert_eq!(names(&index), vec!["alpha", "bravo", "charlie"]);
        assert_eq!(index.index_of(1), Some(0));
        assert_eq!(index.index_of(2), Some(1));
        assert_eq!(index.index_of(3), Some(2));
    }

    #[test]
    fn test_update_in_place_when_order_unchanged() {
        let mut index = SortedIndex::new(SortKey::Signal);
        index.insert_or_update(row(1, "alpha", -40));
        index.insert_or_update(row(2, "bravo", -60));

        // Name changes but signal (the sort field) does not: no move.
        let event = index.insert_or_update(row(1, "renamed", -40));
        assert_eq!(event, IndexEvent::Updated { id: 1, index: 0 });
        assert_eq!(index.row(1).map(|r| r.name.as_str()), Some("renamed"));
    }

    #[test]
    fn test_order_change_moves_row() {
        let mut index = SortedIndex::new(SortKey::Signal);
        index.insert_or_update(row(1, "a", -40));
        index.insert_or_update(row(2, "b", -50));
        index.insert_or_update(row(3, "c", -60));
        assert_eq!(index.index_of(3), Some(2));

        // id 3 strengthens past id 2: moves from 2 to 1.
        let event = index.insert_or_update(row(3, "c", -45));
        assert_eq!(event, IndexEvent::Moved { id: 3, from: 2, to: 1 });
        assert_eq!(index.index_of(1), Some(0));
        assert_eq!(index.index_of(3), Some(1));
        assert_eq!(index.index_of(2), Some(2));
    }

    #[test]
    fn test_move_right_to_left_and_back() {
        let mut index = SortedIndex::new(SortKey::Name);
        for (id, name) in [(1, "a"), (2, "b"), (3, "c"), (4, "d")] {
            index.insert_or_update(row(id, name, -50));
        }

        let event = index.insert_or_update(row(4, "aa", -50));
        assert_eq!(event, IndexEvent::Moved { id: 4, from: 3, to: 1 });
        assert_eq!(names(&index), vec!["a", "aa", "b", "c"]);

        let event = index.insert_or_update(row(4, "z", -50));
        assert_eq!(event, IndexEvent::Moved { id: 4, from: 1, to: 3 });
        assert_eq!(names(&index), vec!["a", "b", "c", "z"]);
    }

    #[test]
    fn test_sort_field_change_without_position_change_is_update() {
        let mut index = SortedIndex::new(SortKey::Signal);
        index.insert_or_update(row(1, "a", -40));
        index.insert_or_update(row(2, "b", -60));

        // Still the strongest: stays at index 0.
        let event = index.insert_or_update(row(1, "a", -45));
        assert_eq!(event, IndexEvent::Updated { id: 1, index: 0 });
        assert!(index.is_consistent());
    }

    #[test]
    fn test_remove_shifts_later_positions() {
        let mut index = SortedIndex::new(SortKey::Name);
        for (id, name) in [(1, "a"), (2, "b"), (3, "c")] {
            index.insert_or_update(row(id, name, -50));
        }
        assert_eq!(index.remove(1), Some(IndexEvent::Removed { id: 1, index: 0 }));
        assert_eq!(index.index_of(2), Some(0));
        assert_eq!(index.index_of(3), Some(1));
        assert_eq!(index.remove(1), None);
    }

    #[test]
    fn test_sort_key_change_fires_remove_add_pairs() {
        // Scenario: ascending-by-name C, A, B, then flip direction.
        let mut index = SortedIndex::new(SortKey::Name);
        index.insert_or_update(row(3, "C", -60));
        index.insert_or_update(row(1, "A", -50));
        index.insert_or_update(row(2, "B", -40));
        assert_eq!(names(&index), vec!["A", "B", "C"]);

        let events = index.set_sort_key(SortKey::Name);
        assert!(index.is_reversed());
        assert_eq!(names(&index), vec!["C", "B", "A"]);
        let removes = events
            .iter()
            .filter(|e| matches!(e, IndexEvent::Removed { .. }))
            .count();
        let inserts = events
            .iter()
            .filter(|e| matches!(e, IndexEvent::Inserted { .. }))
            .count();
        assert_eq!((removes, inserts), (3, 3));
        // All removes precede all inserts.
        assert!(events[..3].iter().all(|e| matches!(e, IndexEvent::Removed { .. })));
    }

    #[test]
    fn test_same_key_toggles_direction_new_key_resets_it() {
        let mut index = SortedIndex::new(SortKey::Name);
        index.set_sort_key(SortKey::Name);
        assert!(index.is_reversed());
        index.set_sort_key(SortKey::Name);
        assert!(!index.is_reversed());
        index.set_sort_key(SortKey::Name);
        assert!(index.is_reversed());
        index.set_sort_key(SortKey::Signal);
        assert_eq!(index.sort_key(), SortKey::Signal);
        assert!(!index.is_reversed());
    }

    #[test]
    fn test_signal_sort_is_strongest_first() {
        let mut index = SortedIndex::new(SortKey::Signal);
        index.insert_or_update(row(1, "weak", -80));
        index.insert_or_update(row(2, "strong", -40));
        index.insert_or_update(row(3, "mid", -60));
        assert_eq!(names(&index), vec!["strong", "mid", "weak"]);
    }

    #[test]
    fn test_age_sort_is_newest_first() {
        let mut index = SortedIndex::new(SortKey::Age);
        index.insert_or_update(row_aged(1, "old", -50, Duration::from_secs(60)));
        index.insert_or_update(row_aged(2, "new", -50, Duration::from_secs(1)));
        index.insert_or_update(row_aged(3, "mid", -50, Duration::from_secs(30)));
        assert_eq!(names(&index), vec!["new", "mid", "old"]);
    }

    #[test]
    fn test_equal_keys_keep_insertion_order() {
        let mut index = SortedIndex::new(SortKey::Signal);
        index.insert_or_update(row(1, "first", -50));
        index.insert_or_update(row(2, "second", -50));
        index.insert_or_update(row(3, "third", -50));
        assert_eq!(names(&index), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_consistency_after_mixed_operations() {
        let mut index = SortedIndex::new(SortKey::Signal);
        for id in 0..20u64 {
            index.insert_or_update(row(id, &format!("dev{id}"), -40 - id as i32));
        }
        for id in (0..20u64).step_by(3) {
            index.remove(id);
        }
        for id in 0..20u64 {
            index.insert_or_update(row(id, &format!("dev{id}"), -70 + id as i32));
        }
        index.set_sort_key(SortKey::Name);
        assert!(index.is_consistent());
    }

    #[derive(Debug, Clone)]
    enum Op {
        Upsert { id: u64, name: String, signal: i32 },
        Remove { id: u64 },
        SetKey { key: SortKey },
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..12u64, "[a-f]{1,3}", -90..-30i32).prop_map(|(id, name, signal)| Op::Upsert {
                id,
                name,
                signal
            }),
            (0..12u64).prop_map(|id| Op::Remove { id }),
            prop_oneof![
                Just(SortKey::Address),
                Just(SortKey::Name),
                Just(SortKey::Signal),
                Just(SortKey::Age),
                Just(SortKey::TimeoutRemaining),
            ]
            .prop_map(|key| Op::SetKey { key }),
        ]
    }

    proptest! {
        // position[order[i]] == i and order stays sorted, whatever the op sequence.
        #[test]
        fn prop_index_invariants_hold(ops in proptest::collection::vec(op_strategy(), 1..80)) {
            let mut index = SortedIndex::new(SortKey::Signal);
            for op in ops {
                match op {
                    Op::Upsert { id, name, signal } => {
                        index.insert_or_update(row(id, &name, signal));
                    }
                    Op::Remove { id } => {
                        index.remove(id);
                    }
                    Op::SetKey { key } => {
                        index.set_sort_key(key);
                    }
                }
                prop_assert!(index.is_consistent());
                for (i, device) in index.iter().enumerate() {
                    prop_assert_eq!(index.index_of(device.id), Some(i));
                }
            }
        }
    }
}
