//! Scan source contract and discovery records.
//!
//! The crate never talks to a radio itself. A concrete backend implements
//! [`ScanSource`] and delivers [`Discovery`] events; everything downstream
//! (registry, scheduler, index) only sees these two shapes. Backends are
//! permitted to fail silently: `start_scan`/`stop_scan` report success as a
//! boolean and the caller decides on any retry policy.

mod device;
mod record;

pub use device::DeviceInfo;
pub use record::{format_address, local_name, parse_address, RecordError};

use std::time::Instant;

/// An abstract scanning backend that can be switched on and off.
///
/// Implementations live inside the duty-cycle scheduler's task, so calls are
/// always serialized. A `false` return means the backend is not running; the
/// scheduler does not retry on its own.
pub trait ScanSource: Send + 'static {
    /// Ask the backend to start delivering discoveries.
    fn start_scan(&mut self) -> bool;

    /// Ask the backend to stop delivering discoveries.
    fn stop_scan(&mut self) -> bool;
}

/// One discovery event from a scan source.
#[derive(Clone, Debug)]
pub struct Discovery {
    /// Folded hardware address (see [`parse_address`]).
    pub address: u64,
    /// Advertised local name, if the record carried one.
    pub name: Option<String>,
    /// Raw signal strength in dBm; 0 means "no reading".
    pub signal: i32,
    /// Monotonic timestamp of the observation.
    pub timestamp: Instant,
}

impl Discovery {
    /// Convenience constructor stamping the discovery with the current time.
    pub fn new(address: u64, name: Option<String>, signal: i32) -> Self {
        Self {
            address,
            name,
            signal,
            timestamp: Instant::now(),
        }
    }
}

/// A scan source with no backing radio.
///
/// Start/stop always succeed and nothing is ever discovered. Useful for
/// simulations and for wiring the service in environments without a real
/// backend.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullScanSource;

impl ScanSource for NullScanSource {
    fn start_scan(&mut self) -> bool {
        true
    }

    fn stop_scan(&mut self) -> bool {
        true
    }
}
