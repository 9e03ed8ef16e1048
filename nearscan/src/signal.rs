//! Exponential low-pass smoothing for signal-strength readings.
//!
//! Raw RSSI readings from a scan source are noisy; a single nearby device can
//! easily swing 15 dBm between consecutive advertisements. Each tracked entry
//! keeps a smoothed value that is blended with every new raw reading:
//!
//! ```text
//! smoothed = value + alpha * (previous - value)
//! ```
//!
//! `alpha` close to 0 follows the raw readings closely (more noise), close to
//! 1 holds on to the previous value (less noise). 0 and 1 disable smoothing
//! entirely in either direction.

/// Follow raw readings closely; minimal smoothing.
pub const ALPHA_LOW: f64 = 0.1;

/// Balanced smoothing; a new reading moves the value halfway.
pub const ALPHA_MEDIUM: f64 = 0.5;

/// Heavy smoothing; slow to react to genuine movement.
pub const ALPHA_HIGH: f64 = 0.8;

/// Default smoothing factor used when none is configured.
pub const DEFAULT_ALPHA: f64 = ALPHA_MEDIUM;

/// Blend a new raw reading with the previous smoothed value.
pub fn smooth(value: f64, previous: f64, alpha: f64) -> f64 {
    value + alpha * (previous - value)
}

/// Integer variant of [`smooth`] for dBm readings, rounding to nearest.
pub fn smooth_i32(value: i32, previous: i32, alpha: f64) -> i32 {
    smooth(value as f64, previous as f64, alpha).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medium_alpha_moves_halfway() {
        assert_eq!(smooth_i32(-40, -60, ALPHA_MEDIUM), -50);
        assert_eq!(smooth(-40.0, -60.0, ALPHA_MEDIUM), -50.0);
    }

    #[test]
    fn test_alpha_zero_passes_raw_value_through() {
        assert_eq!(smooth_i32(-42, -80, 0.0), -42);
    }

    #[test]
    fn test_alpha_one_holds_previous_value() {
        assert_eq!(smooth_i32(-42, -80, 1.0), -80);
    }

    #[test]
    fn test_low_alpha_tracks_new_reading() {
        // -40 + 0.1 * (-60 - -40) = -42
        assert_eq!(smooth_i32(-40, -60, ALPHA_LOW), -42);
    }

    #[test]
    fn test_high_alpha_tracks_previous_reading() {
        // -40 + 0.8 * (-60 - -40) = -56
        assert_eq!(smooth_i32(-40, -60, ALPHA_HIGH), -56);
    }

    #[test]
    fn test_rounding_to_nearest() {
        // -41 + 0.5 * (-60 - -41) = -50.5, rounds away from zero
        assert_eq!(smooth_i32(-41, -60, ALPHA_MEDIUM), -51);
    }

    #[test]
    fn test_smoothed_value_stays_between_inputs() {
        for alpha in [0.1, 0.25, 0.5, 0.75, 0.9] {
            let s = smooth(-40.0, -60.0, alpha);
            assert!((-60.0..=-40.0).contains(&s), "alpha={alpha} gave {s}");
        }
    }
}
