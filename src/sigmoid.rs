//! Sigmoid transition math.
//!
//! Every temperature change in abraxas rides the same normalized curve:
//! `S(x, k) = (s(x, k) − s(−1, k)) / (s(1, k) − s(−1, k))` where
//! `s(x, k) = 1 / (1 + e^(−k·x))`. The normalization pins `S(−1) = 0`
//! and `S(1) = 1` exactly, so transition windows land on their endpoint
//! temperatures with no drift.
//!
//! Dawn maps night → day over `DAWN_DURATION` centered on sunrise; dusk
//! is the mirror image over `DUSK_DURATION` centered on sunset. Manual
//! overrides reuse the curve over `[0, duration]`.

use crate::constants::{
    CLOUD_THRESHOLD, DAWN_DURATION, DUSK_DURATION, RESUME_LEAD_MIN, SIGMOID_STEEPNESS,
    TEMP_DAY_CLEAR, TEMP_DAY_DARK, TEMP_NIGHT,
};
use crate::solar;

const SECONDS_PER_DAY: i64 = 86400;

fn sigmoid_raw(x: f64, steepness: f64) -> f64 {
    1.0 / (1.0 + (-steepness * x).exp())
}

/// Normalized sigmoid over `[-1, 1]` with exact endpoints.
pub fn sigmoid_norm(x: f64, steepness: f64) -> f64 {
    let raw = sigmoid_raw(x, steepness);
    let low = sigmoid_raw(-1.0, steepness);
    let high = sigmoid_raw(1.0, steepness);
    (raw - low) / (high - low)
}

/// Whether the cached cloud cover puts the day in dark mode.
pub fn is_dark_mode(cloud_cover: i32) -> bool {
    cloud_cover >= CLOUD_THRESHOLD
}

/// Solar temperature from the position within the day.
///
/// `minutes_from_sunrise` is positive after sunrise; `minutes_to_sunset`
/// is positive before sunset. Dawn and dusk are treated identically,
/// with only the axis of `x` differing.
pub fn calculate_solar_temp(
    minutes_from_sunrise: f64,
    minutes_to_sunset: f64,
    dark_mode: bool,
) -> i32 {
    let day_temp = if dark_mode { TEMP_DAY_DARK } else { TEMP_DAY_CLEAR };
    let night_temp = TEMP_NIGHT;

    let dawn_half = DAWN_DURATION / 2.0;
    let dusk_half = DUSK_DURATION / 2.0;

    // Dawn window: night -> day
    if minutes_from_sunrise.abs() < dawn_half {
        let x = minutes_from_sunrise / dawn_half; // [-1, 1]
        let factor = sigmoid_norm(x, SIGMOID_STEEPNESS);
        return (night_temp as f64 + (day_temp - night_temp) as f64 * factor) as i32;
    }

    // Dusk window: day -> night (x runs +1 -> -1 as sunset approaches and passes)
    if minutes_to_sunset.abs() < dusk_half {
        let x = minutes_to_sunset / dusk_half;
        let factor = sigmoid_norm(x, SIGMOID_STEEPNESS);
        return (night_temp as f64 + (day_temp - night_temp) as f64 * factor) as i32;
    }

    // Between the windows on the day side
    if minutes_from_sunrise >= dawn_half && minutes_to_sunset >= dusk_half {
        return day_temp;
    }

    night_temp
}

/// Manual override temperature at `now`.
///
/// A non-positive duration means the target applies instantly. After
/// the duration has elapsed the target holds.
pub fn calculate_manual_temp(
    start_temp: i32,
    target_temp: i32,
    start_time: i64,
    duration_min: i32,
    now: i64,
) -> i32 {
    if duration_min <= 0 {
        return target_temp;
    }

    let elapsed_min = (now - start_time) as f64 / 60.0;
    if elapsed_min >= duration_min as f64 {
        return target_temp;
    }

    // Map [0, duration] -> [-1, 1]
    let x = 2.0 * (elapsed_min / duration_min as f64) - 1.0;
    let factor = sigmoid_norm(x, SIGMOID_STEEPNESS);
    (start_temp as f64 + (target_temp - start_temp) as f64 * factor) as i32
}

/// When to hand control back to the solar engine after a manual
/// override: `RESUME_LEAD_MIN` minutes before the next transition
/// window opens.
///
/// Returns the earliest of today's dawn and dusk candidates strictly in
/// the future, falling back to tomorrow's dawn. Polar-invalid regions
/// get `now + 24h`.
pub fn next_transition_resume(now: i64, lat: f64, lon: f64) -> i64 {
    let st = match solar::sunrise_sunset(now, lat, lon) {
        Some(st) => st,
        None => return now + SECONDS_PER_DAY,
    };

    let dawn_window_start = st.sunrise - (DAWN_DURATION / 2.0 * 60.0) as i64;
    let dusk_window_start = st.sunset - (DUSK_DURATION / 2.0 * 60.0) as i64;

    let resume_dawn = dawn_window_start - RESUME_LEAD_MIN * 60;
    let resume_dusk = dusk_window_start - RESUME_LEAD_MIN * 60;

    let mut best: i64 = 0;
    if resume_dawn > now {
        best = resume_dawn;
    }
    if resume_dusk > now && (best == 0 || resume_dusk < best) {
        best = resume_dusk;
    }
    if best > 0 {
        return best;
    }

    // Both of today's windows have opened; target tomorrow's dawn.
    // Near the polar boundary a pre-1am sunrise can pull the candidate
    // behind the clock, so anything not in the future degrades to the
    // 24h fallback.
    let tomorrow = now + SECONDS_PER_DAY;
    match solar::sunrise_sunset(tomorrow, lat, lon) {
        Some(st2) => {
            let resume =
                st2.sunrise - (DAWN_DURATION / 2.0 * 60.0) as i64 - RESUME_LEAD_MIN * 60;
            if resume > now { resume } else { now + SECONDS_PER_DAY }
        }
        None => now + SECONDS_PER_DAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn norm_endpoints_exact() {
        for &k in &[0.5, 1.0, 6.0, 8.0, 20.0] {
            assert!(sigmoid_norm(-1.0, k).abs() < 1e-12, "S(-1, {k})");
            assert!((sigmoid_norm(1.0, k) - 1.0).abs() < 1e-12, "S(1, {k})");
        }
    }

    #[test]
    fn norm_midpoint_is_half() {
        assert!((sigmoid_norm(0.0, SIGMOID_STEEPNESS) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn full_day_clear() {
        // Scenario: noon, clear, mid-latitude. Well inside both windows.
        assert_eq!(calculate_solar_temp(360.0, 480.0, false), TEMP_DAY_CLEAR);
    }

    #[test]
    fn full_day_dark() {
        assert_eq!(calculate_solar_temp(360.0, 480.0, true), TEMP_DAY_DARK);
    }

    #[test]
    fn full_night() {
        assert_eq!(calculate_solar_temp(-300.0, 900.0, false), TEMP_NIGHT);
        assert_eq!(calculate_solar_temp(700.0, -200.0, false), TEMP_NIGHT);
    }

    #[test]
    fn sunrise_is_midpoint() {
        // At the sunrise instant the curve sits exactly between night and day
        let clear = calculate_solar_temp(0.0, 600.0, false);
        assert!((clear - (TEMP_NIGHT + TEMP_DAY_CLEAR) / 2).abs() <= 1);
        let dark = calculate_solar_temp(0.0, 600.0, true);
        assert!((dark - (TEMP_NIGHT + TEMP_DAY_DARK) / 2).abs() <= 1);
    }

    #[test]
    fn sunset_is_midpoint() {
        let temp = calculate_solar_temp(600.0, 0.0, false);
        assert!((temp - (TEMP_NIGHT + TEMP_DAY_CLEAR) / 2).abs() <= 1);
    }

    #[test]
    fn window_edges_hit_targets_exactly() {
        let dawn_half = DAWN_DURATION / 2.0;
        let dusk_half = DUSK_DURATION / 2.0;
        assert_eq!(calculate_solar_temp(dawn_half, 600.0, false), TEMP_DAY_CLEAR);
        assert_eq!(calculate_solar_temp(-dawn_half, 600.0, false), TEMP_NIGHT);
        assert_eq!(calculate_solar_temp(600.0, dusk_half, false), TEMP_DAY_CLEAR);
        assert_eq!(calculate_solar_temp(600.0, -dusk_half, false), TEMP_NIGHT);
    }

    #[test]
    fn dusk_overcast_half_hour_out() {
        // 30 min before sunset, 90% clouds: x = 0.5, S(0.5, 6) ~ 0.955
        let temp = calculate_solar_temp(700.0, 30.0, true);
        assert!((4422..=4432).contains(&temp), "got {temp}");
    }

    #[test]
    fn manual_identities() {
        let t0 = 1_700_000_000;
        assert_eq!(calculate_manual_temp(6500, 2900, t0, 0, t0), 2900);
        assert_eq!(calculate_manual_temp(6500, 2900, t0, 30, t0), 6500);
        assert_eq!(calculate_manual_temp(6500, 2900, t0, 30, t0 + 30 * 60), 2900);
    }

    #[test]
    fn manual_halfway_is_midpoint() {
        let t0 = 1_700_000_000;
        let temp = calculate_manual_temp(6500, 2900, t0, 30, t0 + 15 * 60);
        assert!((temp - 4700).abs() <= 1);
    }

    #[test]
    fn manual_monotone() {
        let t0 = 1_700_000_000;
        let mut prev = calculate_manual_temp(6500, 2900, t0, 30, t0);
        for minute in 1..=30 {
            let cur = calculate_manual_temp(6500, 2900, t0, 30, t0 + minute * 60);
            assert!(cur <= prev, "minute {minute}: {cur} > {prev}");
            prev = cur;
        }
    }

    #[test]
    fn resume_time_is_strictly_future() {
        // Sample across a full day at a mid-latitude location
        let base = 1718928000; // 2024-06-21T00:00:00Z
        for hour in 0..24 {
            let now = base + hour * 3600;
            let resume = next_transition_resume(now, 41.88, -87.63);
            assert!(resume > now, "hour {hour}: {resume} <= {now}");
        }
    }

    #[test]
    fn resume_time_polar_fallback() {
        let now = 1718928000;
        assert_eq!(next_transition_resume(now, 78.22, 15.64), now + SECONDS_PER_DAY);
    }
}
