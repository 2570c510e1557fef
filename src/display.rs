//! Display records and brightness value conversion.

/// One physical display addressed through an I2C bus.
///
/// Built during a discovery pass and replaced wholesale on every
/// re-discovery; only `bus` identifies a display across passes.
#[derive(Debug, Clone, PartialEq)]
pub struct Display {
    /// I2C bus number as reported by `ddcutil detect` (e.g. "3").
    pub bus: String,

    /// Human-readable model name from the detect output.
    pub name: String,

    /// VCP feature code that answered the brightness query for this
    /// display ("10" or a configured fallback). Reused for writes.
    pub vcp_code: String,

    /// Maximum raw brightness value reported by the display (>= 1).
    pub max: u16,

    /// Normalized brightness in [0, 1]; `current * max` rounds to the
    /// last raw value read or written.
    pub current: f64,
}

impl Display {
    /// Current brightness as a whole percentage (0-100).
    pub fn percent(&self) -> u8 {
        (self.current * 100.0).round().clamp(0.0, 100.0) as u8
    }
}

/// Converts a requested percentage to the raw value sent to the display.
///
/// The raw value is `round(percent/100 * max)`. Displays are observed to
/// blank completely at raw 0, so a computed value of zero is floored to 1
/// unless `allow_zero` is set.
pub fn raw_from_percent(percent: u8, max: u16, allow_zero: bool) -> u16 {
    let percent = percent.min(100);
    let raw = (f64::from(percent) / 100.0 * f64::from(max)).round() as u16;
    if raw == 0 && !allow_zero { 1 } else { raw.min(max) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn zero_percent_floors_to_one_by_default() {
        assert_eq!(raw_from_percent(0, 100, false), 1);
    }

    #[test]
    fn zero_percent_permitted_when_allowed() {
        assert_eq!(raw_from_percent(0, 100, true), 0);
    }

    #[test]
    fn full_percent_maps_to_max() {
        assert_eq!(raw_from_percent(100, 100, false), 100);
        assert_eq!(raw_from_percent(100, 255, false), 255);
    }

    #[test]
    fn midpoint_rounds() {
        // 50% of max 255 is 127.5, rounds to 128
        assert_eq!(raw_from_percent(50, 255, false), 128);
        assert_eq!(raw_from_percent(40, 100, false), 40);
    }

    #[test]
    fn small_nonzero_percent_is_not_floored() {
        assert_eq!(raw_from_percent(2, 100, false), 2);
    }

    #[test]
    fn low_percent_on_small_range_floors() {
        // 1% of max 10 rounds to 0, which must become 1
        assert_eq!(raw_from_percent(1, 10, false), 1);
        assert_eq!(raw_from_percent(1, 10, true), 0);
    }

    #[test]
    fn out_of_range_percent_is_clamped() {
        assert_eq!(raw_from_percent(150, 100, false), 100);
    }

    #[test]
    fn display_percent_round_trips() {
        let display = Display {
            bus: "3".to_string(),
            name: "LG Display".to_string(),
            vcp_code: "10".to_string(),
            max: 100,
            current: 0.4,
        };
        assert_eq!(display.percent(), 40);
    }

    proptest! {
        #[test]
        fn raw_never_exceeds_max(percent in 0u8..=100, max in 1u16..=1000) {
            let raw = raw_from_percent(percent, max, false);
            prop_assert!(raw >= 1);
            prop_assert!(raw <= max);
        }

        #[test]
        fn raw_is_monotonic_in_percent(a in 0u8..=99, max in 1u16..=1000) {
            let lo = raw_from_percent(a, max, true);
            let hi = raw_from_percent(a + 1, max, true);
            prop_assert!(lo <= hi);
        }
    }
}
