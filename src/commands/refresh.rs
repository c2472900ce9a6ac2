//! `--refresh`: synchronous weather fetch, update the cache.
//!
//! The daemon notices the rewritten cache through inotify on its next
//! tick; nothing else needs to talk to it.

use anyhow::{Result, bail};

use crate::config::{self, Location, Paths};
use crate::weather;

pub fn run(paths: &Paths, location: Location) -> Result<()> {
    println!("Fetching weather...");
    let wd = weather::fetch(location.lat, location.lon);

    if wd.has_error {
        bail!("weather fetch failed");
    }

    config::save_weather_cache(paths, &wd)?;
    println!("Weather: {}", wd.forecast);
    println!("Cloud cover: {}%", wd.cloud_cover);
    Ok(())
}
