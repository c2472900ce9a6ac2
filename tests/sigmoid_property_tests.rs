//! Property tests for the sigmoid transition engine.

use abraxas::constants::{TEMP_DAY_CLEAR, TEMP_DAY_DARK, TEMP_NIGHT};
use abraxas::sigmoid::{
    calculate_manual_temp, calculate_solar_temp, next_transition_resume, sigmoid_norm,
};
use proptest::prelude::*;

/// Steepness values worth exercising, including the extremes
fn steepness_strategy() -> impl Strategy<Value = f64> {
    0.01f64..100.0
}

proptest! {
    /// The normalization pins the endpoints exactly for every
    /// steepness: S(-1, k) = 0 and S(1, k) = 1.
    #[test]
    fn endpoints_exact_for_all_steepness(k in steepness_strategy()) {
        prop_assert!(sigmoid_norm(-1.0, k).abs() < 1e-12);
        prop_assert!((sigmoid_norm(1.0, k) - 1.0).abs() < 1e-12);
    }

    /// S is monotone over [-1, 1].
    #[test]
    fn sigmoid_monotone(k in steepness_strategy(), a in -1.0f64..1.0, b in -1.0f64..1.0) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(sigmoid_norm(lo, k) <= sigmoid_norm(hi, k) + 1e-12);
    }

    /// Solar output always lands between the night and day targets.
    #[test]
    fn solar_temp_bounded(
        from_sunrise in -1440.0f64..1440.0,
        to_sunset in -1440.0f64..1440.0,
        dark in any::<bool>(),
    ) {
        let temp = calculate_solar_temp(from_sunrise, to_sunset, dark);
        let day = if dark { TEMP_DAY_DARK } else { TEMP_DAY_CLEAR };
        prop_assert!(temp >= TEMP_NIGHT && temp <= day, "temp {temp}");
    }

    /// Manual transitions start at start_temp, end at target_temp, and
    /// hold the target forever after.
    #[test]
    fn manual_temp_endpoints(
        start in 1000i32..25000,
        target in 1000i32..25000,
        duration in 1i32..600,
        hold in 0i64..100_000,
    ) {
        let t0 = 1_700_000_000i64;
        prop_assert!((calculate_manual_temp(start, target, t0, duration, t0) - start).abs() <= 1);
        let end = t0 + duration as i64 * 60;
        prop_assert_eq!(calculate_manual_temp(start, target, t0, duration, end), target);
        prop_assert_eq!(calculate_manual_temp(start, target, t0, duration, end + hold), target);
    }

    /// With distinct endpoints the transition never reverses direction.
    #[test]
    fn manual_temp_monotone(
        start in 1000i32..25000,
        target in 1000i32..25000,
        duration in 1i32..240,
    ) {
        let t0 = 1_700_000_000i64;
        let mut prev = calculate_manual_temp(start, target, t0, duration, t0);
        for minute in 1..=duration {
            let cur = calculate_manual_temp(start, target, t0, duration, t0 + minute as i64 * 60);
            if start <= target {
                prop_assert!(cur >= prev, "minute {minute}: {cur} < {prev}");
            } else {
                prop_assert!(cur <= prev, "minute {minute}: {cur} > {prev}");
            }
            prev = cur;
        }
    }

    /// Zero duration is an instant jump to the target.
    #[test]
    fn manual_temp_instant(start in 1000i32..25000, target in 1000i32..25000) {
        let t0 = 1_700_000_000i64;
        prop_assert_eq!(calculate_manual_temp(start, target, t0, 0, t0), target);
    }

    /// The auto-resume instant is strictly in the future everywhere on
    /// the planet, polar regions included.
    #[test]
    fn resume_strictly_future(
        lat in -90.0f64..90.0,
        lon in -180.0f64..180.0,
        day_offset in 0i64..365,
        second in 0i64..86_400,
    ) {
        let now = 1_704_067_200 + day_offset * 86_400 + second; // within 2024
        prop_assert!(next_transition_resume(now, lat, lon) > now);
    }
}
