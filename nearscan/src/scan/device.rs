//! Per-device discovery payload.

use crate::scan::record::format_address;
use crate::scan::Discovery;
use crate::signal;

/// The tracked payload for one discovered device.
///
/// Holds the most recent observation along with the smoothed signal value.
/// Instances are owned by the registry; consumers receive clones, never live
/// references.
#[derive(Clone, Debug, PartialEq)]
pub struct DeviceInfo {
    address: u64,
    name: String,
    signal_raw: i32,
    signal_smoothed: i32,
}

impl DeviceInfo {
    /// Create the payload for a first observation.
    ///
    /// A missing advertised name falls back to the canonical address string.
    pub fn new(address: u64, name: Option<String>, signal: i32) -> Self {
        Self {
            address,
            name: name.unwrap_or_else(|| format_address(address)),
            signal_raw: signal,
            signal_smoothed: signal,
        }
    }

    /// Create the payload from a discovery event.
    pub fn from_discovery(discovery: &Discovery) -> Self {
        Self::new(discovery.address, discovery.name.clone(), discovery.signal)
    }

    /// Fold a new observation into this payload.
    ///
    /// The smoothed signal is blended against the previous smoothed value via
    /// the low-pass filter. A reading of 0 dBm means "no reading" and leaves
    /// the smoothed value alone; likewise the first nonzero reading seeds the
    /// smoothed value directly instead of filtering against nothing.
    ///
    /// Returns `true` when any observable field changed.
    pub fn observe(&mut self, name: Option<&str>, signal: i32, alpha: f64) -> bool {
        let mut changed = false;

        if let Some(name) = name {
            if name != self.name {
                self.name = name.to_string();
                changed = true;
            }
        }

        if signal != self.signal_raw {
            self.signal_raw = signal;
            changed = true;
        }

        if signal != 0 {
            let smoothed = if self.signal_smoothed != 0 {
                signal::smooth_i32(signal, self.signal_smoothed, alpha)
            } else {
                signal
            };
            if smoothed != self.signal_smoothed {
                self.signal_smoothed = smoothed;
                changed = true;
            }
        }

        changed
    }

    /// The folded hardware address this payload belongs to.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// The display name (advertised name, or address string fallback).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The most recent raw signal reading in dBm.
    pub fn signal_raw(&self) -> i32 {
        self.signal_raw
    }

    /// The low-pass-filtered signal value in dBm.
    pub fn signal_smoothed(&self) -> i32 {
        self.signal_smoothed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::ALPHA_MEDIUM;

    #[test]
    fn test_new_seeds_smoothed_from_raw() {
        let info = DeviceInfo::new(0xAA01, Some("FNDR".into()), -60);
        assert_eq!(info.signal_raw(), -60);
        assert_eq!(info.signal_smoothed(), -60);
        assert_eq!(info.name(), "FNDR");
    }

    #[test]
    fn test_missing_name_falls_back_to_address() {
        let info = DeviceInfo::new(0xAABB_CCDD_EEFF, None, -60);
        assert_eq!(info.name(), "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_observe_smooths_signal() {
        let mut info = DeviceInfo::new(0xAA01, Some("FNDR".into()), -60);
        let changed = info.observe(Some("FNDR"), -40, ALPHA_MEDIUM);
        assert!(changed);
        assert_eq!(info.signal_raw(), -40);
        assert_eq!(info.signal_smoothed(), -50);
    }

    #[test]
    fn test_observe_identical_reading_reports_unchanged() {
        let mut info = DeviceInfo::new(0xAA01, Some("FNDR".into()), -60);
        assert!(!info.observe(Some("FNDR"), -60, ALPHA_MEDIUM));
    }

    #[test]
    fn test_observe_zero_reading_keeps_smoothed_value() {
        let mut info = DeviceInfo::new(0xAA01, Some("FNDR".into()), -60);
        let changed = info.observe(Some("FNDR"), 0, ALPHA_MEDIUM);
        // Raw changed, smoothed untouched.
        assert!(changed);
        assert_eq!(info.signal_raw(), 0);
        assert_eq!(info.signal_smoothed(), -60);
    }

    #[test]
    fn test_observe_seeds_smoothed_after_zero_start() {
        let mut info = DeviceInfo::new(0xAA01, Some("FNDR".into()), 0);
        info.observe(Some("FNDR"), -48, ALPHA_MEDIUM);
        assert_eq!(info.signal_smoothed(), -48);
    }

    #[test]
    fn test_observe_name_change_is_observable() {
        let mut info = DeviceInfo::new(0xAA01, Some("FNDR".into()), -60);
        assert!(info.observe(Some("CARD"), -60, ALPHA_MEDIUM));
        assert_eq!(info.name(), "CARD");
    }

    #[test]
    fn test_observe_without_name_keeps_existing() {
        let mut info = DeviceInfo::new(0xAA01, Some("FNDR".into()), -60);
        info.observe(None, -60, ALPHA_MEDIUM);
        assert_eq!(info.name(), "FNDR");
    }
}
