//! Listener protocol and fan-out for the presence registry.

use std::sync::Arc;

use parking_lot::Mutex;

use super::entry::EntryInfo;

/// Receives entry lifecycle notifications from a [`PresenceRegistry`].
///
/// For a given id, exactly one `on_added` precedes any `on_updated` or
/// `on_removed`, and exactly one terminal `on_removed` ends the lifecycle; no
/// events fire for that id afterwards until a new put recreates it as a new
/// logical instance. Callbacks are invoked with the registry mutex released,
/// so a listener may re-enter the registry.
///
/// [`PresenceRegistry`]: super::PresenceRegistry
pub trait RegistryListener<V>: Send + Sync {
    /// A previously unseen id was inserted.
    fn on_added(&self, id: u64, entry: &EntryInfo<V>) {
        let _ = (id, entry);
    }

    /// An existing entry's payload observably changed.
    fn on_updated(&self, id: u64, entry: &EntryInfo<V>) {
        let _ = (id, entry);
    }

    /// An entry's deadline passed. Return `true` to keep it alive for one
    /// more timeout period, `false` to let it be removed.
    fn on_expiring(&self, id: u64, entry: &EntryInfo<V>) -> bool {
        let _ = (id, entry);
        false
    }

    /// An entry was removed (expired, explicitly removed, or cleared).
    fn on_removed(&self, id: u64, entry: &EntryInfo<V>) {
        let _ = (id, entry);
    }
}

/// Set of attached listeners with copy-on-traversal semantics.
///
/// Notification paths take a snapshot of the set and invoke callbacks on the
/// snapshot, so attaching or detaching from inside a callback never mutates a
/// collection that is being iterated; the change simply takes effect from the
/// next traversal.
pub(crate) struct ListenerSet<V> {
    listeners: Mutex<Vec<Arc<dyn RegistryListener<V>>>>,
}

impl<V> ListenerSet<V> {
    pub(crate) fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Attach a listener. Returns `false` if it was already attached.
    pub(crate) fn attach(&self, listener: Arc<dyn RegistryListener<V>>) -> bool {
        let mut listeners = self.listeners.lock();
        if listeners.iter().any(|l| Arc::ptr_eq(l, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    /// Detach a listener. Returns `false` if it was not attached.
    pub(crate) fn detach(&self, listener: &Arc<dyn RegistryListener<V>>) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|l| !Arc::ptr_eq(l, listener));
        listeners.len() != before
    }

    pub(crate) fn snapshot(&self) -> Vec<Arc<dyn RegistryListener<V>>> {
        self.listeners.lock().clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.listeners.lock().len()
    }
}
