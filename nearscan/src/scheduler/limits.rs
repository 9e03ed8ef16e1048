//! Derived duty-cycle timing from an external scan-start rate limit.
//!
//! Scan stacks commonly throttle callers that start scans too often; the
//! limit has the shape "at most K starts per rolling window of W seconds",
//! and exceeding it silently withholds results rather than reporting an
//! error. The scheduler therefore never risks the boundary: it alternates
//! on/off phases of `ceil(W / K * duty_cycle)` plus a small safety margin.

use std::time::Duration;

/// Default maximum scan starts per window.
pub const DEFAULT_MAX_STARTS: u32 = 5;

/// Default rolling window the start limit applies to.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(30);

/// Default fraction of each cycle spent actively scanning.
pub const DEFAULT_DUTY_CYCLE: f64 = 0.5;

/// Default margin added to each phase to stay clear of the limiter boundary.
pub const DEFAULT_SAFETY_MARGIN: Duration = Duration::from_millis(100);

/// External rate-limit constants and the duty-cycle timing derived from them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScanRateLimits {
    /// Maximum scan starts (K) per rolling window.
    pub max_starts: u32,
    /// Rolling window (W) the limit applies to.
    pub window: Duration,
    /// Fraction of each cycle spent scanning (0 < d <= 1).
    pub duty_cycle: f64,
    /// Margin added to each phase duration.
    pub safety_margin: Duration,
}

impl Default for ScanRateLimits {
    fn default() -> Self {
        Self {
            max_starts: DEFAULT_MAX_STARTS,
            window: DEFAULT_WINDOW,
            duty_cycle: DEFAULT_DUTY_CYCLE,
            safety_margin: DEFAULT_SAFETY_MARGIN,
        }
    }
}

impl ScanRateLimits {
    /// Limits for "at most `max_starts` starts per `window`" with default
    /// duty cycle and margin.
    pub fn new(max_starts: u32, window: Duration) -> Self {
        Self {
            max_starts,
            window,
            ..Self::default()
        }
    }

    /// Set the duty-cycle fraction.
    pub fn with_duty_cycle(mut self, duty_cycle: f64) -> Self {
        self.duty_cycle = duty_cycle;
        self
    }

    /// Set the safety margin.
    pub fn with_safety_margin(mut self, safety_margin: Duration) -> Self {
        self.safety_margin = safety_margin;
        self
    }

    /// Average budget per scan start: `W / K`.
    pub fn average_per_start(&self) -> Duration {
        self.window / self.max_starts.max(1)
    }

    /// Minimum active (and resting) phase duration, rounded up to a whole
    /// millisecond: `ceil(W / K * d)`.
    pub fn active_duration(&self) -> Duration {
        let millis = (self.average_per_start().as_secs_f64() * self.duty_cycle * 1000.0).ceil();
        Duration::from_millis(millis as u64)
    }

    /// Phase duration actually scheduled: active duration plus the margin.
    pub fn phase_period(&self) -> Duration {
        self.active_duration() + self.safety_margin
    }
}
