//! Configuration, override state, weather cache, and path resolution.
//!
//! Everything the daemon and CLI share lives as small files under
//! `$HOME/.config/abraxas/`: an INI file with the location, two JSON
//! files (manual override, weather cache), an advisory PID file, and
//! the read-only ZIP database. The CLI writes, the daemon observes via
//! inotify; parse failure is always treated as absence rather than an
//! error, so a half-written or mangled file can never take the daemon
//! down.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};

use crate::constants::{OVERRIDE_MAX_BYTES, WEATHER_CACHE_MAX_BYTES, WEATHER_REFRESH_SEC};
use crate::now_epoch;

/// Resolved filesystem paths under the configuration directory.
#[derive(Debug, Clone)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub cache_file: PathBuf,
    pub override_file: PathBuf,
    pub zipdb_file: PathBuf,
    pub pid_file: PathBuf,
}

impl Paths {
    /// Resolve paths from `$HOME` and create the configuration
    /// directory (mode 0755, idempotent).
    pub fn init() -> Result<Self> {
        let home = std::env::var("HOME").map_err(|_| anyhow!("HOME is not set"))?;
        let config_dir = PathBuf::from(home).join(".config").join("abraxas");

        let mut builder = fs::DirBuilder::new();
        builder.recursive(true).mode(0o755);
        builder
            .create(&config_dir)
            .with_context(|| format!("failed to create {}", config_dir.display()))?;

        Ok(Self::in_dir(config_dir))
    }

    /// Build paths rooted at an explicit directory. The directory must
    /// already exist.
    pub fn in_dir(config_dir: PathBuf) -> Self {
        Self {
            config_file: config_dir.join("config.ini"),
            cache_file: config_dir.join("weather_cache.json"),
            override_file: config_dir.join("override.json"),
            zipdb_file: config_dir.join("us_zipcodes.bin"),
            pid_file: config_dir.join("daemon.pid"),
            config_dir,
        }
    }
}

/// Geographic location.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub lat: f64,
    pub lon: f64,
}

/// Load the location from the `[location]` section of `config.ini`.
///
/// The reader is tolerant: whitespace is trimmed, blank lines and
/// `#`/`;` comments are skipped, unknown keys are ignored. Returns
/// `None` when either coordinate is missing or unparseable.
pub fn load_location(paths: &Paths) -> Option<Location> {
    let content = fs::read_to_string(&paths.config_file).ok()?;

    let mut lat: Option<f64> = None;
    let mut lon: Option<f64> = None;
    let mut in_location = false;

    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with(';') {
            continue;
        }

        if trimmed.starts_with('[') {
            in_location = trimmed == "[location]";
            continue;
        }
        if !in_location {
            continue;
        }

        if let Some((key, value)) = trimmed.split_once('=') {
            match key.trim() {
                "latitude" => lat = value.trim().parse().ok(),
                "longitude" => lon = value.trim().parse().ok(),
                _ => {}
            }
        }
    }

    match (lat, lon) {
        (Some(lat), Some(lon)) => Some(Location { lat, lon }),
        _ => None,
    }
}

/// Write the location in canonical form with six-decimal coordinates.
pub fn save_location(paths: &Paths, lat: f64, lon: f64) -> Result<()> {
    let content = format!("[location]\nlatitude = {lat:.6}\nlongitude = {lon:.6}\n");
    fs::write(&paths.config_file, content)
        .with_context(|| format!("failed to write {}", paths.config_file.display()))
}

/// Manual override state, as persisted in `override.json`.
///
/// The CLI writes this with `start_temp = 0`; the daemon fills in the
/// start temperature on first observation and writes it back so the
/// transition survives a daemon restart.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct OverrideState {
    pub active: bool,
    pub target_temp: i32,
    pub duration_minutes: i32,
    pub issued_at: i64,
    pub start_temp: i32,
}

/// Load the override file. Absent, oversized, or malformed all read as
/// "no override".
pub fn load_override(paths: &Paths) -> Option<OverrideState> {
    let meta = fs::metadata(&paths.override_file).ok()?;
    if meta.len() > OVERRIDE_MAX_BYTES {
        return None;
    }
    let content = fs::read_to_string(&paths.override_file).ok()?;
    serde_json::from_str(&content).ok()
}

pub fn save_override(paths: &Paths, ovr: &OverrideState) -> Result<()> {
    let json = serde_json::to_string_pretty(ovr).context("failed to encode override")?;
    fs::write(&paths.override_file, json)
        .with_context(|| format!("failed to write {}", paths.override_file.display()))
}

/// Remove the override file. Absence of the file means `active=false`.
pub fn clear_override(paths: &Paths) {
    let _ = fs::remove_file(&paths.override_file);
}

/// Cached weather observation.
#[derive(Debug, Clone, PartialEq)]
pub struct WeatherData {
    pub cloud_cover: i32,
    pub forecast: String,
    pub temperature: f64,
    pub is_day: bool,
    pub fetched_at: i64,
    pub has_error: bool,
}

impl WeatherData {
    /// The fixed sentinel stored when a fetch fails or NOAA support is
    /// compiled out.
    pub fn error_sentinel(forecast: &str) -> Self {
        Self {
            cloud_cover: 0,
            forecast: forecast.to_string(),
            temperature: 0.0,
            is_day: true,
            fetched_at: now_epoch(),
            has_error: true,
        }
    }
}

/// On-disk shape of the weather cache. The presence of an `error` key
/// marks the entry as erroneous, as does `fetched_at == 0` (a freshly
/// created but never-populated cache).
#[derive(Serialize, Deserialize)]
struct WeatherCacheJson {
    #[serde(default)]
    cloud_cover: i32,
    #[serde(default)]
    forecast: String,
    #[serde(default)]
    temperature: f64,
    #[serde(default)]
    is_day: bool,
    #[serde(default)]
    fetched_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// Load the weather cache. Oversized or malformed reads as absent.
pub fn load_weather_cache(paths: &Paths) -> Option<WeatherData> {
    let meta = fs::metadata(&paths.cache_file).ok()?;
    if meta.len() > WEATHER_CACHE_MAX_BYTES {
        return None;
    }
    let content = fs::read_to_string(&paths.cache_file).ok()?;
    let cached: WeatherCacheJson = serde_json::from_str(&content).ok()?;

    let has_error = cached.error.is_some() || cached.fetched_at == 0;

    Some(WeatherData {
        cloud_cover: cached.cloud_cover,
        forecast: cached.forecast,
        temperature: cached.temperature,
        is_day: cached.is_day,
        fetched_at: cached.fetched_at,
        has_error,
    })
}

pub fn save_weather_cache(paths: &Paths, wd: &WeatherData) -> Result<()> {
    let cached = if wd.has_error {
        WeatherCacheJson {
            cloud_cover: 0,
            forecast: String::new(),
            temperature: 0.0,
            is_day: true,
            fetched_at: wd.fetched_at,
            error: Some("fetch failed".to_string()),
        }
    } else {
        WeatherCacheJson {
            cloud_cover: wd.cloud_cover,
            forecast: wd.forecast.clone(),
            temperature: wd.temperature,
            is_day: wd.is_day,
            fetched_at: wd.fetched_at,
            error: None,
        }
    };

    let json = serde_json::to_string_pretty(&cached).context("failed to encode weather cache")?;
    fs::write(&paths.cache_file, json)
        .with_context(|| format!("failed to write {}", paths.cache_file.display()))
}

/// A cache is stale when it is erroneous or older than the refresh
/// window.
pub fn weather_needs_refresh(wd: &WeatherData) -> bool {
    if wd.has_error || wd.fetched_at == 0 {
        return true;
    }
    now_epoch() - wd.fetched_at > WEATHER_REFRESH_SEC
}

/// Write the daemon's PID as decimal text.
pub fn write_pid(paths: &Paths) -> Result<()> {
    fs::write(&paths.pid_file, format!("{}\n", std::process::id()))
        .with_context(|| format!("failed to write {}", paths.pid_file.display()))
}

pub fn remove_pid(paths: &Paths) {
    let _ = fs::remove_file(&paths.pid_file);
}

/// Advisory liveness check: read the PID file and signal-0 the
/// process. Absent file, garbage content, or ESRCH all mean "not
/// alive".
pub fn daemon_alive(paths: &Paths) -> bool {
    pid_alive(&paths.pid_file)
}

fn pid_alive(pid_file: &Path) -> bool {
    let content = match fs::read_to_string(pid_file) {
        Ok(c) => c,
        Err(_) => return false,
    };
    let pid: i32 = match content.trim().parse() {
        Ok(p) => p,
        Err(_) => return false,
    };
    if pid <= 0 {
        return false;
    }
    nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths() -> (TempDir, Paths) {
        let dir = TempDir::new().expect("tempdir");
        let paths = Paths::in_dir(dir.path().to_path_buf());
        (dir, paths)
    }

    #[test]
    #[serial_test::serial]
    fn paths_init_follows_home() {
        let dir = TempDir::new().expect("tempdir");
        let old_home = std::env::var("HOME").ok();

        unsafe { std::env::set_var("HOME", dir.path()) };
        let paths = Paths::init().expect("init with HOME set");
        assert!(paths.config_dir.starts_with(dir.path()));
        assert!(paths.config_dir.ends_with(".config/abraxas"));
        assert!(paths.config_dir.is_dir());
        // Idempotent
        assert!(Paths::init().is_ok());

        unsafe { std::env::remove_var("HOME") };
        assert!(Paths::init().is_err());

        if let Some(home) = old_home {
            unsafe { std::env::set_var("HOME", home) };
        }
    }

    #[test]
    fn location_roundtrip() {
        let (_dir, paths) = temp_paths();
        save_location(&paths, 41.88, -87.63).unwrap();
        let loc = load_location(&paths).expect("location");
        assert!((loc.lat - 41.88).abs() < 1e-6);
        assert!((loc.lon + 87.63).abs() < 1e-6);
    }

    #[test]
    fn location_reader_tolerates_noise() {
        let (_dir, paths) = temp_paths();
        fs::write(
            &paths.config_file,
            "# comment\n; another\n\n[location]\n  latitude =  12.5 \nlongitude=-33.25\nunknown=1\n",
        )
        .unwrap();
        let loc = load_location(&paths).expect("location");
        assert_eq!(loc, Location { lat: 12.5, lon: -33.25 });
    }

    #[test]
    fn location_missing_key_is_none() {
        let (_dir, paths) = temp_paths();
        fs::write(&paths.config_file, "[location]\nlatitude = 1.0\n").unwrap();
        assert!(load_location(&paths).is_none());
    }

    #[test]
    fn location_wrong_section_is_none() {
        let (_dir, paths) = temp_paths();
        fs::write(&paths.config_file, "[other]\nlatitude = 1.0\nlongitude = 2.0\n").unwrap();
        assert!(load_location(&paths).is_none());
    }

    #[test]
    fn override_roundtrip() {
        let (_dir, paths) = temp_paths();
        let ovr = OverrideState {
            active: true,
            target_temp: 3500,
            duration_minutes: 5,
            issued_at: 1_700_000_000,
            start_temp: 6500,
        };
        save_override(&paths, &ovr).unwrap();
        assert_eq!(load_override(&paths), Some(ovr));
    }

    #[test]
    fn override_missing_fields_default() {
        let (_dir, paths) = temp_paths();
        fs::write(&paths.override_file, r#"{"active": true}"#).unwrap();
        let ovr = load_override(&paths).expect("override");
        assert!(ovr.active);
        assert_eq!(ovr.target_temp, 0);
        assert_eq!(ovr.start_temp, 0);
    }

    #[test]
    fn override_oversized_rejected() {
        let (_dir, paths) = temp_paths();
        let blob = format!("{{\"active\": true, \"pad\": \"{}\"}}", "x".repeat(8192));
        fs::write(&paths.override_file, blob).unwrap();
        assert!(load_override(&paths).is_none());
    }

    #[test]
    fn override_garbage_is_none() {
        let (_dir, paths) = temp_paths();
        fs::write(&paths.override_file, "not json at all").unwrap();
        assert!(load_override(&paths).is_none());
    }

    #[test]
    fn clear_override_makes_absent() {
        let (_dir, paths) = temp_paths();
        save_override(&paths, &OverrideState { active: true, ..Default::default() }).unwrap();
        clear_override(&paths);
        assert!(load_override(&paths).is_none());
        // Clearing twice is harmless
        clear_override(&paths);
    }

    #[test]
    fn weather_roundtrip() {
        let (_dir, paths) = temp_paths();
        let wd = WeatherData {
            cloud_cover: 75,
            forecast: "Mostly Cloudy".to_string(),
            temperature: 68.0,
            is_day: true,
            fetched_at: 1_700_000_000,
            has_error: false,
        };
        save_weather_cache(&paths, &wd).unwrap();
        assert_eq!(load_weather_cache(&paths), Some(wd));
    }

    #[test]
    fn weather_error_sentinel_persists_as_error() {
        let (_dir, paths) = temp_paths();
        let wd = WeatherData::error_sentinel("Unknown");
        save_weather_cache(&paths, &wd).unwrap();
        let loaded = load_weather_cache(&paths).expect("cache");
        assert!(loaded.has_error);
    }

    #[test]
    fn weather_zero_fetched_at_is_error() {
        let (_dir, paths) = temp_paths();
        fs::write(&paths.cache_file, r#"{"cloud_cover": 10, "fetched_at": 0}"#).unwrap();
        let loaded = load_weather_cache(&paths).expect("cache");
        assert!(loaded.has_error);
    }

    #[test]
    fn weather_stale_after_window() {
        let fresh = WeatherData {
            cloud_cover: 10,
            forecast: "Sunny".to_string(),
            temperature: 70.0,
            is_day: true,
            fetched_at: now_epoch(),
            has_error: false,
        };
        assert!(!weather_needs_refresh(&fresh));

        let stale = WeatherData { fetched_at: now_epoch() - WEATHER_REFRESH_SEC - 1, ..fresh };
        assert!(weather_needs_refresh(&stale));
    }

    #[test]
    fn pid_file_roundtrip_and_liveness() {
        let (_dir, paths) = temp_paths();
        assert!(!daemon_alive(&paths));
        write_pid(&paths).unwrap();
        // We are that process, so we are alive
        assert!(daemon_alive(&paths));
        remove_pid(&paths);
        assert!(!daemon_alive(&paths));
    }

    #[test]
    fn pid_garbage_not_alive() {
        let (_dir, paths) = temp_paths();
        fs::write(&paths.pid_file, "not-a-pid\n").unwrap();
        assert!(!daemon_alive(&paths));
        fs::write(&paths.pid_file, "-4\n").unwrap();
        assert!(!daemon_alive(&paths));
    }
}
