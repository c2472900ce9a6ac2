//! `--status`: print the current state of the world to stdout.

use anyhow::Result;
use chrono::{DateTime, Local, Utc};

use crate::config::{self, Location, Paths};
use crate::daemon::solar_temperature;
use crate::now_epoch;
use crate::sigmoid;
use crate::solar;

fn local_stamp(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&Local)
        .format("%Y-%m-%d %H:%M:%S")
        .to_string()
}

fn local_hm(epoch: i64) -> String {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&Local)
        .format("%H:%M")
        .to_string()
}

pub fn run(paths: &Paths, location: Location) -> Result<()> {
    let now = now_epoch();
    let Location { lat, lon } = location;

    println!("Location: {lat:.4}, {lon:.4}");
    println!("Date: {}", local_stamp(now));

    let times = solar::sunrise_sunset(now, lat, lon);
    match times {
        Some(ref t) => {
            println!("Sunrise: {}", local_hm(t.sunrise));
            println!("Sunset: {}", local_hm(t.sunset));
        }
        None => println!("Sunrise/Sunset: N/A (polar region)"),
    }

    let pos = solar::position(now, lat, lon);
    println!("Sun elevation: {:.1} degrees", pos.elevation);
    println!();

    let weather = config::load_weather_cache(paths);
    match weather {
        Some(ref w) if !w.has_error => {
            println!("Weather: {}", w.forecast);
            println!("Cloud cover: {}%", w.cloud_cover);
            println!("Last updated: {}", local_stamp(w.fetched_at));
        }
        _ => println!("Weather: not available"),
    }
    println!();

    // An active override takes precedence over the solar report
    if let Some(ovr) = config::load_override(paths)
        && ovr.active
    {
        println!(
            "Mode: manual override, target {}K over {} min, issued {}",
            ovr.target_temp,
            ovr.duration_minutes,
            local_stamp(ovr.issued_at)
        );
        return Ok(());
    }

    let dark = weather
        .as_ref()
        .map(|w| !w.has_error && sigmoid::is_dark_mode(w.cloud_cover))
        .unwrap_or(false);
    let temp = solar_temperature(now, lat, lon, weather.as_ref());

    println!(
        "Mode: {}, target {temp}K",
        if dark { "dark" } else { "clear" }
    );
    Ok(())
}
