//! Property tests for the NOAA ephemeris.

use abraxas::solar::{position, sunrise_sunset};
use proptest::prelude::*;

fn latitude_strategy() -> impl Strategy<Value = f64> {
    -90.0f64..=90.0
}

fn longitude_strategy() -> impl Strategy<Value = f64> {
    -180.0f64..=180.0
}

/// Instants across 2024 and 2025
fn instant_strategy() -> impl Strategy<Value = i64> {
    1_704_067_200i64..1_767_225_600
}

proptest! {
    /// Elevation is an angle above or below the horizon; it can never
    /// leave [-90, 90].
    #[test]
    fn elevation_in_range(
        lat in latitude_strategy(),
        lon in longitude_strategy(),
        when in instant_strategy(),
    ) {
        let pos = position(when, lat, lon);
        prop_assert!((-90.0..=90.0).contains(&pos.elevation), "{}", pos.elevation);
    }

    /// Between the polar circles the sun rises and sets every single
    /// day of the year.
    #[test]
    fn mid_latitudes_always_valid(
        lat in -66.0f64..66.0,
        lon in longitude_strategy(),
        day in 0i64..365,
    ) {
        let when = 1_704_067_200 + day * 86_400 + 43_200;
        prop_assert!(sunrise_sunset(when, lat, lon).is_some());
    }

    /// Sunrise precedes sunset, and both land within a day or so of
    /// the queried instant.
    #[test]
    fn sunrise_before_sunset(
        lat in -60.0f64..60.0,
        lon in longitude_strategy(),
        day in 0i64..365,
    ) {
        let when = 1_704_067_200 + day * 86_400 + 43_200;
        if let Some(times) = sunrise_sunset(when, lat, lon) {
            prop_assert!(times.sunrise < times.sunset);
            prop_assert!((times.sunrise - when).abs() < 2 * 86_400);
            prop_assert!((times.sunset - when).abs() < 2 * 86_400);
        }
    }

    /// Day length stays inside physical bounds away from the poles.
    #[test]
    fn day_length_sane(
        lat in -60.0f64..60.0,
        lon in longitude_strategy(),
        day in 0i64..365,
    ) {
        let when = 1_704_067_200 + day * 86_400 + 43_200;
        if let Some(times) = sunrise_sunset(when, lat, lon) {
            let hours = (times.sunset - times.sunrise) as f64 / 3600.0;
            prop_assert!((2.0..22.0).contains(&hours), "day length {hours}h at lat {lat}");
        }
    }
}
