//! The presence service: one context object wiring the stack together.
//!
//! [`PresenceService`] owns the registry, the duty-cycle scheduler, and the
//! sorted index, and is constructed once at process start and passed by
//! reference to whatever needs it; there is no process-global handle.
//!
//! # Architecture
//!
//! ```text
//! ScanSource ──► DutyCycleScheduler ──► pause/resume ──► PresenceRegistry
//!                                                             │ listener
//! on_discovery ──────────────────────────────────────────────►│
//!                                                             ▼
//! sweeper task ──► registry.sweep() ──► expirations ──► SortedIndex
//!                                                             │
//!                                                             ▼
//!                                                    PresenceObserver fan-out
//! ```
//!
//! Registry listener callbacks arrive serially with the registry lock
//! released; the bridge applies them to the index under the index mutex and
//! then notifies observers with no lock held.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::config::PresenceConfig;
use crate::index::{DeviceRow, IndexEvent, SortKey, SortedIndex};
use crate::registry::{EntryInfo, PresenceRegistry, RegistryListener};
use crate::scan::{DeviceInfo, Discovery, ScanSource};
use crate::scheduler::{
    DutyCycleScheduler, PresenceClock, SchedulerError, SchedulerHandle, SchedulerStatus,
};

/// Decides whether an expiring device should be kept alive.
///
/// Consulted once per expiring entry; returning `true` extends the entry's
/// deadline by one timeout period. The crate ships no business rule here;
/// integrators plug their own policy in.
pub trait ExpiryPolicy: Send + Sync {
    /// Return `true` to veto the removal of `entry`.
    fn keep_alive(&self, entry: &EntryInfo<DeviceInfo>) -> bool;
}

/// Default policy: expirations are never vetoed.
#[derive(Debug, Default, Clone, Copy)]
pub struct NeverKeep;

impl ExpiryPolicy for NeverKeep {
    fn keep_alive(&self, _entry: &EntryInfo<DeviceInfo>) -> bool {
        false
    }
}

/// Receives per-device notifications with display positions attached.
///
/// This is the surface a display collaborator binds to: every callback
/// carries the index range it affects, so rendering can be incremental.
pub trait PresenceObserver: Send + Sync {
    /// A device appeared at `index`.
    fn on_device_added(&self, row: &DeviceRow, index: usize) {
        let _ = (row, index);
    }

    /// The device at `index` changed without moving.
    fn on_device_updated(&self, row: &DeviceRow, index: usize) {
        let _ = (row, index);
    }

    /// A device moved between display positions.
    fn on_device_moved(&self, row: &DeviceRow, from: usize, to: usize) {
        let _ = (row, from, to);
    }

    /// The device at `index` disappeared.
    fn on_device_removed(&self, id: u64, index: usize) {
        let _ = (id, index);
    }
}

struct ObserverSet {
    observers: Mutex<Vec<Arc<dyn PresenceObserver>>>,
}

impl ObserverSet {
    fn new() -> Self {
        Self {
            observers: Mutex::new(Vec::new()),
        }
    }

    fn attach(&self, observer: Arc<dyn PresenceObserver>) -> bool {
        let mut observers = self.observers.lock();
        if observers.iter().any(|o| Arc::ptr_eq(o, &observer)) {
            return false;
        }
        observers.push(observer);
        true
    }

    fn detach(&self, observer: &Arc<dyn PresenceObserver>) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|o| !Arc::ptr_eq(o, observer));
        observers.len() != before
    }

    fn snapshot(&self) -> Vec<Arc<dyn PresenceObserver>> {
        self.observers.lock().clone()
    }
}

fn dispatch(observers: &[Arc<dyn PresenceObserver>], event: &IndexEvent, row: Option<&DeviceRow>) {
    match *event {
        IndexEvent::Inserted { index, .. } => {
            if let Some(row) = row {
                for observer in observers {
                    observer.on_device_added(row, index);
                }
            }
        }
        IndexEvent::Updated { index, .. } => {
            if let Some(row) = row {
                for observer in observers {
                    observer.on_device_updated(row, index);
                }
            }
        }
        IndexEvent::Moved { from, to, .. } => {
            if let Some(row) = row {
                for observer in observers {
                    observer.on_device_moved(row, from, to);
                }
            }
        }
        IndexEvent::Removed { id, index } => {
            for observer in observers {
                observer.on_device_removed(id, index);
            }
        }
    }
}

/// Registry listener projecting entry events into the sorted index and
/// re-fanning them out to observers.
struct IndexBridge {
    index: Arc<Mutex<SortedIndex>>,
    observers: Arc<ObserverSet>,
    policy: Arc<dyn ExpiryPolicy>,
}

impl IndexBridge {
    fn apply(&self, entry: &EntryInfo<DeviceInfo>) {
        let row = DeviceRow::from(entry);
        let event = self.index.lock().insert_or_update(row.clone());
        dispatch(&self.observers.snapshot(), &event, Some(&row));
    }
}

impl RegistryListener<DeviceInfo> for IndexBridge {
    fn on_added(&self, _id: u64, entry: &EntryInfo<DeviceInfo>) {
        self.apply(entry);
    }

    fn on_updated(&self, _id: u64, entry: &EntryInfo<DeviceInfo>) {
        self.apply(entry);
    }

    fn on_expiring(&self, _id: u64, entry: &EntryInfo<DeviceInfo>) -> bool {
        self.policy.keep_alive(entry)
    }

    fn on_removed(&self, id: u64, _entry: &EntryInfo<DeviceInfo>) {
        if let Some(event) = self.index.lock().remove(id) {
            dispatch(&self.observers.snapshot(), &event, None);
        }
    }
}

/// Owns and wires the presence stack.
///
/// Must be constructed inside a Tokio runtime: the scheduler task and the
/// expiration sweeper are spawned at construction time.
pub struct PresenceService {
    registry: Arc<PresenceRegistry<DeviceInfo>>,
    index: Arc<Mutex<SortedIndex>>,
    observers: Arc<ObserverSet>,
    scheduler: SchedulerHandle,
    alpha: f64,
    shutdown: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl PresenceService {
    /// Start the service with the default (never-veto) expiry policy.
    pub fn start<S: ScanSource>(config: PresenceConfig, source: S) -> Self {
        Self::with_policy(config, source, Arc::new(NeverKeep))
    }

    /// Start the service with a custom expiry veto policy.
    pub fn with_policy<S: ScanSource>(
        config: PresenceConfig,
        source: S,
        policy: Arc<dyn ExpiryPolicy>,
    ) -> Self {
        let registry = Arc::new(PresenceRegistry::new(config.timeout));
        let index = Arc::new(Mutex::new(SortedIndex::with_direction(
            config.sort_key,
            config.sort_reversed,
        )));
        let observers = Arc::new(ObserverSet::new());
        registry.attach(Arc::new(IndexBridge {
            index: Arc::clone(&index),
            observers: Arc::clone(&observers),
            policy,
        }));

        let shutdown = CancellationToken::new();
        let clock: Arc<dyn PresenceClock> = registry.clone();
        let (scheduler_task, scheduler) = DutyCycleScheduler::new(source, clock, config.limits);
        let mut tasks = Vec::new();
        tasks.push(tokio::spawn(scheduler_task.run(shutdown.child_token())));
        tasks.push(Self::spawn_sweeper(
            Arc::clone(&registry),
            config.sweep_interval,
            shutdown.child_token(),
        ));

        info!(
            timeout_ms = config.timeout.as_millis() as u64,
            sort_key = %config.sort_key,
            "presence service started"
        );
        Self {
            registry,
            index,
            observers,
            scheduler,
            alpha: config.alpha,
            shutdown,
            tasks,
        }
    }

    fn spawn_sweeper(
        registry: Arc<PresenceRegistry<DeviceInfo>>,
        interval: std::time::Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let expired = registry.sweep();
                        if expired > 0 {
                            debug!(expired, "sweep removed expired entries");
                        }
                    }
                }
            }
        })
    }

    /// Begin duty-cycled scanning (idempotent; see [`SchedulerHandle::start`]).
    pub async fn start_scanning(&self) -> Result<bool, SchedulerError> {
        self.scheduler.start().await
    }

    /// Stop scanning (idempotent).
    pub async fn stop_scanning(&self) -> Result<(), SchedulerError> {
        self.scheduler.stop().await
    }

    /// Latest scheduler status.
    pub fn scheduler_status(&self) -> SchedulerStatus {
        self.scheduler.status()
    }

    /// Whether the service is logically scanning.
    pub fn is_scanning(&self) -> bool {
        self.scheduler.is_scanning()
    }

    /// Feed one discovery event from the scan source.
    ///
    /// Creates or refreshes the device's registry entry, smoothing the signal
    /// against the previous smoothed value. Discoveries arriving while the
    /// service is not logically scanning are ignored (the radio may still be
    /// draining its callback queue after a stop).
    ///
    /// Returns `true` if the discovery was applied.
    pub fn on_discovery(&self, discovery: &Discovery) -> bool {
        if !self.scheduler.is_scanning() {
            debug!(address = discovery.address, "discovery ignored while not scanning");
            return false;
        }
        let alpha = self.alpha;
        self.registry
            .put_with_at(discovery.address, discovery.timestamp, |previous| {
                match previous {
                    Some(existing) => {
                        let mut updated = existing.clone();
                        updated.observe(discovery.name.as_deref(), discovery.signal, alpha);
                        updated
                    }
                    None => DeviceInfo::from_discovery(discovery),
                }
            });
        true
    }

    /// Subscribe to device notifications. Returns `false` if already attached.
    pub fn attach_observer(&self, observer: Arc<dyn PresenceObserver>) -> bool {
        self.observers.attach(observer)
    }

    /// Unsubscribe. Returns `false` if the observer was not attached.
    pub fn detach_observer(&self, observer: &Arc<dyn PresenceObserver>) -> bool {
        self.observers.detach(observer)
    }

    /// The underlying registry, for direct lookups.
    pub fn registry(&self) -> &Arc<PresenceRegistry<DeviceInfo>> {
        &self.registry
    }

    /// Number of currently tracked devices.
    pub fn device_count(&self) -> usize {
        self.registry.len()
    }

    /// Current display rows in sorted order.
    pub fn snapshot(&self) -> Vec<DeviceRow> {
        self.index.lock().iter().cloned().collect()
    }

    /// The active sort key and direction.
    pub fn sort_order(&self) -> (SortKey, bool) {
        let index = self.index.lock();
        (index.sort_key(), index.is_reversed())
    }

    /// Change the sort key; selecting the active key reverses direction.
    ///
    /// Observers receive the full remove/add storm so per-item bookkeeping
    /// stays consistent through the re-sort.
    pub fn set_sort_key(&self, sort_key: SortKey) {
        let (events, rows) = {
            let mut index = self.index.lock();
            let events = index.set_sort_key(sort_key);
            let rows: Vec<Option<DeviceRow>> = events
                .iter()
                .map(|event| match event {
                    IndexEvent::Inserted { id, .. } => index.row(*id).cloned(),
                    _ => None,
                })
                .collect();
            (events, rows)
        };
        let observers = self.observers.snapshot();
        for (event, row) in events.iter().zip(&rows) {
            dispatch(&observers, event, row.as_ref());
        }
    }

    /// Drop every tracked device, notifying listeners and observers.
    pub fn clear(&self) {
        self.registry.clear();
    }

    /// Stop scanning, cancel background tasks, and wait for them to finish.
    pub async fn shutdown(self) {
        self.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("presence service stopped");
    }
}
