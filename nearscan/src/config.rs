//! Configuration surface for the presence stack.
//!
//! One struct covers every tunable the service needs: the registry timeout,
//! the scan-start rate limits, the smoothing factor, the initial sort order,
//! and the sweep cadence. Defaults match the constants documented on each
//! component.

use std::time::Duration;

use crate::index::SortKey;
use crate::registry::DEFAULT_TIMEOUT;
use crate::scheduler::ScanRateLimits;
use crate::signal::DEFAULT_ALPHA;

/// Default interval between expiration sweeps.
///
/// One second keeps expiry latency well under the 30s default timeout while
/// the sweep itself stays cheap (a single pass over tracked entries).
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Top-level configuration for [`PresenceService`].
///
/// [`PresenceService`]: crate::service::PresenceService
#[derive(Debug, Clone)]
pub struct PresenceConfig {
    /// Refresh timeout before an unrefreshed device expires.
    pub timeout: Duration,

    /// External scan-start rate limit and duty-cycle parameters.
    pub limits: ScanRateLimits,

    /// Signal smoothing factor (see [`crate::signal`]).
    pub alpha: f64,

    /// Initial sort key for the device index.
    pub sort_key: SortKey,

    /// Initial sort direction.
    pub sort_reversed: bool,

    /// Interval between expiration sweeps.
    pub sweep_interval: Duration,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            limits: ScanRateLimits::default(),
            alpha: DEFAULT_ALPHA,
            sort_key: SortKey::Signal,
            sort_reversed: false,
            sweep_interval: DEFAULT_SWEEP_INTERVAL,
        }
    }
}

impl PresenceConfig {
    /// Set the refresh timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the scan rate limits.
    pub fn with_limits(mut self, limits: ScanRateLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Set the smoothing factor.
    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.alpha = alpha;
        self
    }

    /// Set the initial sort order.
    pub fn with_sort(mut self, sort_key: SortKey, reversed: bool) -> Self {
        self.sort_key = sort_key;
        self.sort_reversed = reversed;
        self
    }

    /// Set the sweep interval.
    pub fn with_sweep_interval(mut self, sweep_interval: Duration) -> Self {
        self.sweep_interval = sweep_interval;
        self
    }
}
