//! NOAA sun position and sunrise/sunset calculations.
//!
//! Standard NOAA/Meeus closed forms: Julian day → Julian century →
//! geometric mean longitude and anomaly → equation of center → apparent
//! longitude → declination and equation of time → hour angle. Pure
//! arithmetic over the instant's local calendar fields; no I/O.
//!
//! All trigonometric arguments are radians internally; the public
//! surface speaks degrees and epoch seconds.

use chrono::{DateTime, Datelike, Local, TimeZone, Timelike, Utc};
use std::f64::consts::PI;

/// Sun position at a specific instant.
#[derive(Debug, Clone, Copy)]
pub struct SunPosition {
    /// Elevation above the horizon in degrees, in `[-90, 90]`.
    pub elevation: f64,
}

/// Sunrise and sunset for a calendar day, as epoch seconds.
#[derive(Debug, Clone, Copy)]
pub struct SunTimes {
    pub sunrise: i64,
    pub sunset: i64,
}

/// Zenith angle used for sunrise/sunset: 90° plus atmospheric
/// refraction and the solar radius.
const SUNRISE_ZENITH_DEG: f64 = 90.833;

fn deg2rad(d: f64) -> f64 {
    d * PI / 180.0
}

fn rad2deg(r: f64) -> f64 {
    r * 180.0 / PI
}

fn local(when: i64) -> DateTime<Local> {
    DateTime::<Utc>::from_timestamp(when, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&Local)
}

fn tz_offset_hours(dt: &DateTime<Local>) -> f64 {
    dt.offset().local_minus_utc() as f64 / 3600.0
}

/// Julian Day from calendar fields plus fractional hour.
fn julian_day(year: i32, month: u32, day: u32, hour_frac: f64) -> f64 {
    let (y, m) = if month <= 2 {
        (year - 1, month + 12)
    } else {
        (year, month)
    };

    let a = y / 100;
    let b = 2 - a + a / 4;

    let jd = (365.25 * (y + 4716) as f64).floor()
        + (30.6001 * (m + 1) as f64).floor()
        + day as f64
        + b as f64
        - 1524.5;
    jd + hour_frac / 24.0
}

/// The two derived quantities every caller needs, computed from the
/// Julian century `T = (JD − 2451545) / 36525`.
struct SolarParams {
    /// Solar declination (degrees)
    declination: f64,
    /// Equation of time (minutes)
    eq_time: f64,
}

fn solar_params(jc: f64) -> SolarParams {
    let l0 = (280.46646 + jc * (36000.76983 + 0.0003032 * jc)).rem_euclid(360.0);
    let m = 357.52911 + jc * (35999.05029 - 0.0001537 * jc);
    let m_rad = deg2rad(m);
    let e = 0.016708634 - jc * (0.000042037 + 0.0000001267 * jc);

    // Equation of center
    let c = m_rad.sin() * (1.914602 - jc * (0.004817 + 0.000014 * jc))
        + (2.0 * m_rad).sin() * (0.019993 - 0.000101 * jc)
        + (3.0 * m_rad).sin() * 0.000289;

    // True and apparent longitude
    let sun_lon = l0 + c;
    let omega = 125.04 - 1934.136 * jc;
    let apparent_lon = sun_lon - 0.00569 - 0.00478 * deg2rad(omega).sin();

    // Mean obliquity, corrected for nutation
    let obliq_mean =
        23.0 + (26.0 + (21.448 - jc * (46.815 + jc * (0.00059 - jc * 0.001813))) / 60.0) / 60.0;
    let obliq_corr = obliq_mean + 0.00256 * deg2rad(omega).cos();
    let obliq_corr_rad = deg2rad(obliq_corr);

    let declination = rad2deg((obliq_corr_rad.sin() * deg2rad(apparent_lon).sin()).asin());

    let var_y = (obliq_corr_rad / 2.0).tan().powi(2);
    let eq_time = 4.0
        * rad2deg(
            var_y * (2.0 * deg2rad(l0)).sin() - 2.0 * e * m_rad.sin()
                + 4.0 * e * var_y * m_rad.sin() * (2.0 * deg2rad(l0)).cos()
                - 0.5 * var_y * var_y * (4.0 * deg2rad(l0)).sin()
                - 1.25 * e * e * (2.0 * m_rad).sin(),
        );

    SolarParams {
        declination,
        eq_time,
    }
}

/// Sun elevation at `when` as seen from `(lat, lon)`.
pub fn position(when: i64, lat: f64, lon: f64) -> SunPosition {
    let lt = local(when);

    let hour_frac =
        lt.hour() as f64 + lt.minute() as f64 / 60.0 + lt.second() as f64 / 3600.0;
    let jd = julian_day(lt.year(), lt.month(), lt.day(), hour_frac);
    let jc = (jd - 2451545.0) / 36525.0;

    let sp = solar_params(jc);

    // True solar time in minutes since local midnight
    let time_offset = sp.eq_time + 4.0 * lon - 60.0 * tz_offset_hours(&lt);
    let tst =
        lt.hour() as f64 * 60.0 + lt.minute() as f64 + lt.second() as f64 / 60.0 + time_offset;

    let mut hour_angle = tst / 4.0 - 180.0;
    if hour_angle < -180.0 {
        hour_angle += 360.0;
    }

    let lat_rad = deg2rad(lat);
    let declin_rad = deg2rad(sp.declination);
    let ha_rad = deg2rad(hour_angle);

    let cos_zenith = (lat_rad.sin() * declin_rad.sin()
        + lat_rad.cos() * declin_rad.cos() * ha_rad.cos())
    .clamp(-1.0, 1.0);

    SunPosition {
        elevation: 90.0 - rad2deg(cos_zenith.acos()),
    }
}

/// Sunrise and sunset for the calendar day containing `when`.
///
/// Returns `None` when the location is polar for that day, i.e. the
/// hour-angle equation has no solution (`|cos H| > 1`).
pub fn sunrise_sunset(when: i64, lat: f64, lon: f64) -> Option<SunTimes> {
    let lt = local(when);

    // Evaluate the solar parameters at local noon of the day
    let jd = julian_day(lt.year(), lt.month(), lt.day(), 12.0);
    let jc = (jd - 2451545.0) / 36525.0;
    let sp = solar_params(jc);

    let lat_rad = deg2rad(lat);
    let declin_rad = deg2rad(sp.declination);

    let cos_ha = deg2rad(SUNRISE_ZENITH_DEG).cos() / (lat_rad.cos() * declin_rad.cos())
        - lat_rad.tan() * declin_rad.tan();

    if !(-1.0..=1.0).contains(&cos_ha) {
        return None;
    }

    let ha = rad2deg(cos_ha.acos());
    let tz_offset = tz_offset_hours(&lt);

    let sunrise_min = 720.0 - 4.0 * (lon + ha) - sp.eq_time + tz_offset * 60.0;
    let sunset_min = 720.0 - 4.0 * (lon - ha) - sp.eq_time + tz_offset * 60.0;

    let midnight = local_midnight(&lt);

    Some(SunTimes {
        sunrise: midnight + (sunrise_min * 60.0) as i64,
        sunset: midnight + (sunset_min * 60.0) as i64,
    })
}

/// Epoch of the day's local midnight. Falls back to truncating the
/// instant itself when midnight does not exist in the local zone (DST
/// transitions that skip it).
fn local_midnight(lt: &DateTime<Local>) -> i64 {
    Local
        .with_ymd_and_hms(lt.year(), lt.month(), lt.day(), 0, 0, 0)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| {
            lt.timestamp()
                - (lt.hour() as i64 * 3600 + lt.minute() as i64 * 60 + lt.second() as i64)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    // 2024-06-21 18:00:00 UTC, around solar noon in Chicago
    const SOLSTICE_NOON: i64 = 1718992800;
    const CHICAGO_LAT: f64 = 41.88;
    const CHICAGO_LON: f64 = -87.63;

    #[test]
    fn solstice_noon_elevation_chicago() {
        let pos = position(SOLSTICE_NOON, CHICAGO_LAT, CHICAGO_LON);
        // Max elevation at 41.88N on the June solstice is ~71.6 degrees
        assert!(
            pos.elevation > 70.0 && pos.elevation < 73.0,
            "elevation {} out of expected range",
            pos.elevation
        );
    }

    #[test]
    fn elevation_always_in_range() {
        for &lat in &[-89.9, -45.0, 0.0, 41.88, 66.0, 89.9] {
            for day in 0..12 {
                let when = 1704067200 + day * 30 * 86400; // 2024, monthly samples
                let pos = position(when, lat, 10.0);
                assert!(
                    (-90.0..=90.0).contains(&pos.elevation),
                    "lat {lat} day {day}: {}",
                    pos.elevation
                );
            }
        }
    }

    #[test]
    fn solstice_day_length_chicago() {
        let st = sunrise_sunset(SOLSTICE_NOON, CHICAGO_LAT, CHICAGO_LON)
            .expect("Chicago is not polar");
        assert!(st.sunrise < st.sunset);
        let day_len_hours = (st.sunset - st.sunrise) as f64 / 3600.0;
        // Longest day of the year in Chicago runs a bit over 15 hours
        assert!(
            (14.5..=15.6).contains(&day_len_hours),
            "day length {day_len_hours}"
        );
    }

    #[test]
    fn polar_day_returns_none() {
        // Longyearbyen in midsummer: sun never sets
        assert!(sunrise_sunset(SOLSTICE_NOON, 78.22, 15.64).is_none());
    }

    #[test]
    fn mid_latitudes_never_polar() {
        for day in 0..365 {
            let when = 1704067200 + day * 86400;
            assert!(
                sunrise_sunset(when, 60.0, 5.0).is_some(),
                "day {day} unexpectedly polar"
            );
        }
    }

    #[test]
    fn elevation_positive_at_noon_negative_at_midnight() {
        let noon = position(SOLSTICE_NOON, CHICAGO_LAT, CHICAGO_LON);
        let midnight = position(SOLSTICE_NOON + 12 * 3600, CHICAGO_LAT, CHICAGO_LON);
        assert!(noon.elevation > 0.0);
        assert!(midnight.elevation < 0.0);
    }
}
