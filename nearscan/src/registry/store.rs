//! The expiring keyed registry.

use std::collections::{hash_map, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::clock::LogicalClock;
use super::entry::{EntryInfo, EntryState};
use super::listener::{ListenerSet, RegistryListener};

/// Default refresh timeout before an unrefreshed entry expires.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Current monotonic time, read through the runtime's clock.
///
/// Equal to `Instant::now()` in production; honors tokio's paused test time
/// so timer-driven tests can advance expiration deterministically.
fn monotonic_now() -> Instant {
    tokio::time::Instant::now().into_std()
}

/// Keyed store of transient entries with automatic expiration.
///
/// Each entry is refreshed by [`put`](Self::put) and becomes eligible for
/// expiration once the registry's logical clock passes its deadline
/// (`last refresh + timeout`). The logical clock can be paused and resumed in
/// lockstep with scan activity: time spent paused is never charged against
/// any entry.
///
/// Expiration is driven by [`sweep`](Self::sweep), which the owner calls
/// periodically (the presence service runs it from a timer task). Expiring
/// entries are offered to listeners, which may veto the removal for one more
/// timeout period.
///
/// # Concurrency
///
/// One mutex guards the entry map. Listener callbacks are invoked with the
/// mutex released (the listener set is snapshotted first), so callbacks may
/// re-enter the registry without deadlocking.
///
/// All time-dependent operations come in pairs: `put(..)` stamps the call
/// with the current time, `put_at(.., now)` takes the timestamp explicitly
/// for deterministic tests.
pub struct PresenceRegistry<V> {
    inner: Mutex<Inner<V>>,
    listeners: ListenerSet<V>,
}

struct Inner<V> {
    entries: HashMap<u64, EntryState<V>>,
    clock: LogicalClock,
    timeout: Duration,
}

enum Event<V> {
    Added(EntryInfo<V>),
    Updated(EntryInfo<V>),
}

impl<V> PresenceRegistry<V>
where
    V: Clone + PartialEq,
{
    /// Create a registry with the given refresh timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                clock: LogicalClock::new(monotonic_now()),
                timeout,
            }),
            listeners: ListenerSet::new(),
        }
    }

    /// Attach a lifecycle listener. Returns `false` if already attached.
    pub fn attach(&self, listener: Arc<dyn RegistryListener<V>>) -> bool {
        self.listeners.attach(listener)
    }

    /// Detach a lifecycle listener. Returns `false` if it was not attached.
    pub fn detach(&self, listener: &Arc<dyn RegistryListener<V>>) -> bool {
        self.listeners.detach(listener)
    }

    /// Number of attached listeners.
    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Insert or refresh an entry with the given payload.
    ///
    /// Fires `on_added` for a previously unseen id, `on_updated` only when
    /// the payload observably changed. The entry's deadline is reset either
    /// way. Returns the resulting entry view and whether it was newly added.
    pub fn put(&self, id: u64, payload: V) -> (EntryInfo<V>, bool) {
        self.put_at(id, payload, monotonic_now())
    }

    /// [`put`](Self::put) with an explicit timestamp.
    pub fn put_at(&self, id: u64, payload: V, now: Instant) -> (EntryInfo<V>, bool) {
        self.put_with_at(id, now, |_| payload)
    }

    /// Insert or refresh an entry, deriving the payload from the previous one.
    ///
    /// The closure receives the current payload for an existing id (`None`
    /// for a new one) and produces the replacement, all under the registry
    /// lock; the read-modify-write cannot interleave with other writers.
    pub fn put_with<F>(&self, id: u64, make: F) -> (EntryInfo<V>, bool)
    where
        F: FnOnce(Option<&V>) -> V,
    {
        self.put_with_at(id, monotonic_now(), make)
    }

    /// [`put_with`](Self::put_with) with an explicit timestamp.
    pub fn put_with_at<F>(&self, id: u64, now: Instant, make: F) -> (EntryInfo<V>, bool)
    where
        F: FnOnce(Option<&V>) -> V,
    {
        let (info, is_new, event) = {
            let mut inner = self.inner.lock();
            let logical_now = inner.clock.now(now);
            let timeout = inner.timeout;
            match inner.entries.entry(id) {
                hash_map::Entry::Occupied(mut occupied) => {
                    let state = occupied.get_mut();
                    let payload = make(Some(&state.payload));
                    let changed = payload != state.payload;
                    state.payload = payload;
                    state.last_refreshed_at = now;
                    state.refreshed_logical = logical_now;
                    let info = state.info(id, timeout, logical_now);
                    let event = changed.then(|| Event::Updated(info.clone()));
                    (info, false, event)
                }
                hash_map::Entry::Vacant(vacant) => {
                    let payload = make(None);
                    let state = vacant.insert(EntryState::new(payload, now, logical_now));
                    let info = state.info(id, timeout, logical_now);
                    (info.clone(), true, Some(Event::Added(info)))
                }
            }
        };
        match event {
            Some(Event::Added(entry)) => {
                debug!(id, "presence entry added");
                for listener in self.listeners.snapshot() {
                    listener.on_added(id, &entry);
                }
            }
            Some(Event::Updated(entry)) => {
                for listener in self.listeners.snapshot() {
                    listener.on_updated(id, &entry);
                }
            }
            None => {}
        }
        (info, is_new)
    }

    /// Look up an entry without side effects.
    pub fn get(&self, id: u64) -> Option<EntryInfo<V>> {
        self.get_at(id, monotonic_now())
    }

    /// [`get`](Self::get) with an explicit timestamp.
    pub fn get_at(&self, id: u64, now: Instant) -> Option<EntryInfo<V>> {
        let inner = self.inner.lock();
        let logical_now = inner.clock.now(now);
        inner
            .entries
            .get(&id)
            .map(|state| state.info(id, inner.timeout, logical_now))
    }

    /// Explicitly remove an entry.
    ///
    /// Fires `on_removed` unconditionally, bypassing the expiring veto.
    /// Removing an absent id is a no-op returning `None`.
    pub fn remove(&self, id: u64) -> Option<V> {
        self.remove_at(id, monotonic_now())
    }

    /// [`remove`](Self::remove) with an explicit timestamp.
    pub fn remove_at(&self, id: u64, now: Instant) -> Option<V> {
        let info = {
            let mut inner = self.inner.lock();
            let logical_now = inner.clock.now(now);
            let timeout = inner.timeout;
            inner
                .entries
                .remove(&id)
                .map(|state| state.info(id, timeout, logical_now))
        }?;
        debug!(id, "presence entry removed");
        for listener in self.listeners.snapshot() {
            listener.on_removed(id, &info);
        }
        Some(info.payload)
    }

    /// Remove all entries, firing `on_removed` for each.
    pub fn clear(&self) {
        self.clear_at(monotonic_now())
    }

    /// [`clear`](Self::clear) with an explicit timestamp.
    pub fn clear_at(&self, now: Instant) {
        let mut infos: Vec<EntryInfo<V>> = {
            let mut inner = self.inner.lock();
            let logical_now = inner.clock.now(now);
            let timeout = inner.timeout;
            inner
                .entries
                .drain()
                .map(|(id, state)| state.info(id, timeout, logical_now))
                .collect()
        };
        if infos.is_empty() {
            return;
        }
        infos.sort_by_key(|info| info.id);
        info!(count = infos.len(), "presence registry cleared");
        let listeners = self.listeners.snapshot();
        for entry in &infos {
            for listener in &listeners {
                listener.on_removed(entry.id, entry);
            }
        }
    }

    /// Freeze the expiration clock. Idempotent.
    ///
    /// While paused, wall time does not advance any entry's effective age;
    /// entries cannot expire due to time spent paused.
    pub fn pause(&self) {
        self.pause_at(monotonic_now())
    }

    /// [`pause`](Self::pause) with an explicit timestamp.
    pub fn pause_at(&self, now: Instant) {
        if self.inner.lock().clock.pause(now) {
            debug!("presence registry paused");
        }
    }

    /// Unfreeze the expiration clock. Idempotent.
    pub fn resume(&self) {
        self.resume_at(monotonic_now())
    }

    /// [`resume`](Self::resume) with an explicit timestamp.
    pub fn resume_at(&self, now: Instant) {
        if self.inner.lock().clock.resume(now) {
            debug!("presence registry resumed");
        }
    }

    /// Whether the expiration clock is currently frozen.
    pub fn is_paused(&self) -> bool {
        self.inner.lock().clock.is_paused()
    }

    /// Scan for entries whose deadline has passed and expire them.
    ///
    /// Each overdue entry is offered to listeners via `on_expiring`; if any
    /// listener vetoes (returns `true`) the deadline is pushed out by one
    /// more timeout period, otherwise the entry is removed and `on_removed`
    /// fires. Returns the number of entries removed. A paused registry never
    /// expires anything.
    pub fn sweep(&self) -> usize {
        self.sweep_at(monotonic_now())
    }

    /// [`sweep`](Self::sweep) with an explicit timestamp.
    pub fn sweep_at(&self, now: Instant) -> usize {
        let mut candidates: Vec<EntryInfo<V>> = {
            let inner = self.inner.lock();
            if inner.clock.is_paused() {
                return 0;
            }
            let logical_now = inner.clock.now(now);
            inner
                .entries
                .iter()
                .filter(|(_, state)| state.deadline(inner.timeout) <= logical_now)
                .map(|(&id, state)| state.info(id, inner.timeout, logical_now))
                .collect()
        };
        if candidates.is_empty() {
            return 0;
        }
        candidates.sort_by_key(|info| info.id);

        let listeners = self.listeners.snapshot();
        let mut removed = 0;
        for candidate in candidates {
            let id = candidate.id;
            let keep = listeners
                .iter()
                .any(|listener| listener.on_expiring(id, &candidate));

            let removed_info = {
                let mut inner = self.inner.lock();
                let logical_now = inner.clock.now(now);
                let timeout = inner.timeout;
                let overdue = inner
                    .entries
                    .get(&id)
                    .map(|state| state.deadline(timeout) <= logical_now)
                    .unwrap_or(false);
                if !overdue {
                    // Gone or refreshed while the lock was released.
                    None
                } else if keep {
                    // Vetoed: one more timeout period, not an observation.
                    if let Some(state) = inner.entries.get_mut(&id) {
                        state.refreshed_logical = logical_now;
                    }
                    debug!(id, "expiration vetoed; deadline extended");
                    None
                } else {
                    inner
                        .entries
                        .remove(&id)
                        .map(|state| state.info(id, timeout, logical_now))
                }
            };

            if let Some(entry) = removed_info {
                info!(id, timeout_ms = entry.timeout.as_millis() as u64, "presence entry expired");
                removed += 1;
                for listener in &listeners {
                    listener.on_removed(id, &entry);
                }
            }
        }
        removed
    }

    /// Number of tracked entries.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the registry holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Whether an entry exists for `id`.
    pub fn contains(&self, id: u64) -> bool {
        self.inner.lock().entries.contains_key(&id)
    }

    /// Snapshot all entries, ordered by id.
    pub fn snapshot(&self) -> Vec<EntryInfo<V>> {
        self.snapshot_at(monotonic_now())
    }

    /// [`snapshot`](Self::snapshot) with an explicit timestamp.
    pub fn snapshot_at(&self, now: Instant) -> Vec<EntryInfo<V>> {
        let inner = self.inner.lock();
        let logical_now = inner.clock.now(now);
        let mut entries: Vec<EntryInfo<V>> = inner
            .entries
            .iter()
            .map(|(&id, state)| state.info(id, inner.timeout, logical_now))
            .collect();
        entries.sort_by_key(|info| info.id);
        entries
    }

    /// The current refresh timeout.
    pub fn timeout(&self) -> Duration {
        self.inner.lock().timeout
    }

    /// Change the refresh timeout.
    ///
    /// Takes effect immediately for every entry: deadlines are derived from
    /// each entry's last refresh plus the current timeout.
    pub fn set_timeout(&self, timeout: Duration) {
        let mut inner = self.inner.lock();
        if inner.timeout != timeout {
            info!(timeout_ms = timeout.as_millis() as u64, "registry timeout changed");
            inner.timeout = timeout;
        }
    }
}
