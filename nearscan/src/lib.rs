//! NearScan - presence tracking for duty-cycled wireless scanning
//!
//! This library tracks the transient presence of wireless devices reported by
//! a scanning backend. Three pieces do the real work:
//!
//! - [`registry`]: an expiring keyed store with pause/resume semantics. A
//!   device that is not re-observed within the timeout is offered for
//!   expiration, but time spent with the radio off is never charged.
//! - [`scheduler`]: a duty-cycle scheduler that alternates the scan source on
//!   and off to respect "at most K scan starts per rolling window" limits,
//!   pausing the registry's clock in lockstep.
//! - [`index`]: a comparator-ordered projection of the registry with O(1)
//!   reverse lookup and incremental index maintenance for display layers.
//!
//! [`service::PresenceService`] wires the three together behind one context
//! object; [`scan`] defines the scan-source contract and discovery-record
//! parsing, and [`signal`] the low-pass filter applied to signal readings.

pub mod config;
pub mod index;
pub mod registry;
pub mod scan;
pub mod scheduler;
pub mod service;
pub mod signal;

pub use config::PresenceConfig;
pub use index::{DeviceRow, IndexEvent, SortKey, SortedIndex};
pub use registry::{EntryInfo, PresenceRegistry, RegistryListener};
pub use scan::{DeviceInfo, Discovery, ScanSource};
pub use scheduler::{DutyCycleScheduler, ScanRateLimits, SchedulerHandle};
pub use service::{PresenceObserver, PresenceService};
