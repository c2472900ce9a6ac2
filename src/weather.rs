//! NOAA weather API client.
//!
//! Two-step flow against the National Weather Service:
//!   1. `GET https://api.weather.gov/points/{lat},{lon}` and extract the
//!      `properties.forecastHourly` URL;
//!   2. `GET` that URL and read the first period's `shortForecast`,
//!      `temperature`, and `isDaytime`.
//!
//! HTTP rides an external `curl` child found on `PATH` with a hard
//! five-second per-request timeout, so no TLS or HTTP library ever
//! enters this address space and the daemon's syscall filter stays
//! minimal. The daemon drives [`FetchState`], a nonblocking-pipe state
//! machine that never stalls the event loop; the CLI's `--refresh` uses
//! the blocking [`fetch`].
//!
//! The hourly forecast has no cloud-cover percentage, so it is derived
//! from the `shortForecast` text by keyword priority.
//!
//! Without the `noaa` feature every fetch returns the fixed error
//! sentinel and the engine falls back to clear-sky behavior.

use anyhow::{Context, Result, anyhow};
use std::io::Read;
use std::os::fd::AsRawFd;
use std::process::{Child, ChildStdout, Command, Stdio};

use crate::config::WeatherData;
use crate::now_epoch;

const USER_AGENT: &str = concat!(
    "User-Agent: abraxas/",
    env!("CARGO_PKG_VERSION"),
    " (weather color temp daemon)"
);
const ACCEPT: &str = "Accept: application/geo+json";
const CURL_TIMEOUT_SEC: &str = "5";

/// Longest `shortForecast` we keep; NOAA strings are far shorter.
const FORECAST_MAX_LEN: usize = 128;

fn points_url(lat: f64, lon: f64) -> String {
    format!("https://api.weather.gov/points/{lat:.4},{lon:.4}")
}

fn curl_command(url: &str) -> Command {
    let mut cmd = Command::new("curl");
    cmd.args([
        "-s",
        "-f",
        "-L",
        "--max-time",
        CURL_TIMEOUT_SEC,
        "-H",
        USER_AGENT,
        "-H",
        ACCEPT,
        url,
    ])
    .stdin(Stdio::null())
    .stdout(Stdio::piped())
    .stderr(Stdio::null());
    cmd
}

fn truncate_forecast(s: &str) -> String {
    if s.len() <= FORECAST_MAX_LEN {
        return s.to_string();
    }
    let mut end = FORECAST_MAX_LEN;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Cloud cover heuristic from NOAA forecast keywords, checked in
/// priority order. "mostly cloudy" must precede "cloudy", and "mostly
/// sunny"/"mostly clear" must precede "sunny"/"clear".
pub fn cloud_cover_from_forecast(forecast: &str) -> i32 {
    let lower = forecast.to_lowercase();

    // Precipitation always means heavy cloud
    if ["rain", "storm", "snow", "drizzle", "showers"]
        .iter()
        .any(|kw| lower.contains(kw))
    {
        return 95;
    }
    if lower.contains("overcast") {
        return 90;
    }
    if lower.contains("mostly cloudy") {
        return 75;
    }
    if lower.contains("cloudy") {
        return 90;
    }
    if lower.contains("partly") {
        return 50;
    }
    if lower.contains("mostly sunny") || lower.contains("mostly clear") {
        return 25;
    }
    if lower.contains("sunny") || lower.contains("clear") {
        return 10;
    }
    0
}

/// Pull the fields we need out of an hourly-forecast response body.
fn parse_forecast_body(body: &[u8]) -> Result<WeatherData> {
    let resp: serde_json::Value =
        serde_json::from_slice(body).context("forecast response is not JSON")?;

    let period = &resp["properties"]["periods"][0];
    if period.is_null() {
        return Err(anyhow!("no forecast periods in response"));
    }

    let forecast = truncate_forecast(period["shortForecast"].as_str().unwrap_or("Unknown"));
    let temperature = period["temperature"].as_f64().unwrap_or(0.0);
    let is_day = period["isDaytime"].as_bool().unwrap_or(true);
    let cloud_cover = cloud_cover_from_forecast(&forecast);

    Ok(WeatherData {
        cloud_cover,
        forecast,
        temperature,
        is_day,
        fetched_at: now_epoch(),
        has_error: false,
    })
}

fn parse_points_body(body: &[u8]) -> Result<String> {
    let resp: serde_json::Value =
        serde_json::from_slice(body).context("points response is not JSON")?;
    resp["properties"]["forecastHourly"]
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("no forecastHourly URL in points response"))
}

/// Blocking two-step fetch for the CLI. Never takes longer than two
/// curl timeouts.
#[cfg(feature = "noaa")]
pub fn fetch(lat: f64, lon: f64) -> WeatherData {
    match fetch_blocking(lat, lon) {
        Ok(wd) => wd,
        Err(_) => WeatherData::error_sentinel("Unknown"),
    }
}

#[cfg(feature = "noaa")]
fn fetch_blocking(lat: f64, lon: f64) -> Result<WeatherData> {
    let body = http_get_blocking(&points_url(lat, lon))?;
    let forecast_url = parse_points_body(&body)?;
    let body = http_get_blocking(&forecast_url)?;
    parse_forecast_body(&body)
}

#[cfg(feature = "noaa")]
fn http_get_blocking(url: &str) -> Result<Vec<u8>> {
    let output = curl_command(url)
        .output()
        .context("failed to spawn curl (is it on PATH?)")?;
    if !output.status.success() || output.stdout.is_empty() {
        return Err(anyhow!("curl exited with {}", output.status));
    }
    Ok(output.stdout)
}

/// Fixed sentinel when NOAA support is compiled out.
#[cfg(not(feature = "noaa"))]
pub fn fetch(_lat: f64, _lon: f64) -> WeatherData {
    WeatherData::error_sentinel("Disabled (non-USA build)")
}

// --- Async fetch state machine ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchPhase {
    Idle,
    ReadingPoints,
    ReadingForecast,
}

/// Outcome of draining the fetch pipe after it polled readable.
pub enum ReadOutcome {
    /// EAGAIN: the child is still writing, poll again next iteration.
    Pending,
    /// The points phase finished and the forecast child was spawned;
    /// poll the new pipe from now on.
    NewPipe,
    /// The fetch finished. Failures arrive as the error sentinel.
    Done(WeatherData),
}

/// Nonblocking two-phase weather fetch driven by the event loop.
///
/// `IDLE → READING_POINTS → READING_FORECAST → IDLE`; transitions
/// happen on EOF of each curl child. The event loop polls
/// [`FetchState::pipe_fd`] whenever a fetch is in flight.
pub struct FetchState {
    phase: FetchPhase,
    child: Option<Child>,
    pipe: Option<ChildStdout>,
    buf: Vec<u8>,
}

impl FetchState {
    pub fn new() -> Self {
        Self {
            phase: FetchPhase::Idle,
            child: None,
            pipe: None,
            buf: Vec::new(),
        }
    }

    pub fn in_flight(&self) -> bool {
        self.phase != FetchPhase::Idle
    }

    /// The pipe to poll, when a fetch is in flight.
    pub fn pipe_fd(&self) -> Option<i32> {
        self.pipe.as_ref().map(|p| p.as_raw_fd())
    }

    /// Start the points request. Errors if a fetch is already running
    /// or curl cannot be spawned.
    pub fn start(&mut self, lat: f64, lon: f64) -> Result<()> {
        if self.phase != FetchPhase::Idle {
            return Err(anyhow!("weather fetch already in flight"));
        }
        self.spawn_phase(&points_url(lat, lon))?;
        self.phase = FetchPhase::ReadingPoints;
        Ok(())
    }

    fn spawn_phase(&mut self, url: &str) -> Result<()> {
        let mut child = curl_command(url)
            .spawn()
            .context("failed to spawn curl (is it on PATH?)")?;
        let pipe = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("curl child has no stdout"))?;
        set_nonblocking(pipe.as_raw_fd())?;

        self.child = Some(child);
        self.pipe = Some(pipe);
        self.buf.clear();
        Ok(())
    }

    /// Drain the pipe after a readable event.
    pub fn read_response(&mut self) -> ReadOutcome {
        match self.drain_pipe() {
            Drain::Pending => ReadOutcome::Pending,
            Drain::Error => {
                self.reset();
                ReadOutcome::Done(WeatherData::error_sentinel("Unknown"))
            }
            Drain::Eof => self.on_child_done(),
        }
    }

    fn on_child_done(&mut self) -> ReadOutcome {
        self.pipe = None;

        let ok = match self.child.take() {
            Some(mut child) => child.wait().map(|st| st.success()).unwrap_or(false),
            None => false,
        };
        if !ok || self.buf.is_empty() {
            self.reset();
            return ReadOutcome::Done(WeatherData::error_sentinel("Unknown"));
        }

        match self.phase {
            FetchPhase::ReadingPoints => {
                let url = match parse_points_body(&self.buf) {
                    Ok(url) => url,
                    Err(_) => {
                        self.reset();
                        return ReadOutcome::Done(WeatherData::error_sentinel("Unknown"));
                    }
                };
                if self.spawn_phase(&url).is_err() {
                    self.reset();
                    return ReadOutcome::Done(WeatherData::error_sentinel("Unknown"));
                }
                self.phase = FetchPhase::ReadingForecast;
                ReadOutcome::NewPipe
            }
            FetchPhase::ReadingForecast => {
                let result = parse_forecast_body(&self.buf);
                self.reset();
                match result {
                    Ok(wd) => ReadOutcome::Done(wd),
                    Err(_) => ReadOutcome::Done(WeatherData::error_sentinel("Unknown")),
                }
            }
            FetchPhase::Idle => ReadOutcome::Pending,
        }
    }

    fn drain_pipe(&mut self) -> Drain {
        let Some(pipe) = self.pipe.as_mut() else {
            return Drain::Error;
        };
        let mut chunk = [0u8; 4096];
        loop {
            match pipe.read(&mut chunk) {
                Ok(0) => return Drain::Eof,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => return Drain::Pending,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return Drain::Error,
            }
        }
    }

    /// Kill and reap a pending child; free buffers. Used on shutdown
    /// and after terminal errors.
    pub fn abort(&mut self) {
        self.reset();
    }

    fn reset(&mut self) {
        self.pipe = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.buf = Vec::new();
        self.phase = FetchPhase::Idle;
    }
}

impl Default for FetchState {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for FetchState {
    fn drop(&mut self) {
        self.reset();
    }
}

enum Drain {
    Pending,
    Eof,
    Error,
}

fn set_nonblocking(fd: i32) -> Result<()> {
    use nix::fcntl::{FcntlArg, OFlag, fcntl};
    let flags = fcntl(fd, FcntlArg::F_GETFL).context("F_GETFL failed on weather pipe")?;
    let flags = OFlag::from_bits_retain(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).context("F_SETFL failed on weather pipe")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precipitation_dominates() {
        assert_eq!(cloud_cover_from_forecast("Light Rain"), 95);
        assert_eq!(cloud_cover_from_forecast("Thunderstorms"), 95);
        assert_eq!(cloud_cover_from_forecast("Snow Showers"), 95);
        assert_eq!(cloud_cover_from_forecast("Drizzle"), 95);
        // Precipitation wins even when a sunnier keyword also appears
        assert_eq!(cloud_cover_from_forecast("Partly Sunny then Rain"), 95);
    }

    #[test]
    fn overcast_and_cloudy_tiers() {
        assert_eq!(cloud_cover_from_forecast("Overcast"), 90);
        assert_eq!(cloud_cover_from_forecast("Cloudy"), 90);
        // "Mostly Cloudy" must match before the general "cloudy" check
        assert_eq!(cloud_cover_from_forecast("Mostly Cloudy"), 75);
        assert_eq!(cloud_cover_from_forecast("Partly Cloudy"), 50);
    }

    #[test]
    fn sunny_tiers() {
        assert_eq!(cloud_cover_from_forecast("Sunny"), 10);
        assert_eq!(cloud_cover_from_forecast("Clear"), 10);
        // "Mostly Sunny"/"Mostly Clear" before the general checks
        assert_eq!(cloud_cover_from_forecast("Mostly Sunny"), 25);
        assert_eq!(cloud_cover_from_forecast("Mostly Clear"), 25);
    }

    #[test]
    fn unknown_forecast_is_clear() {
        assert_eq!(cloud_cover_from_forecast("Haze"), 0);
        assert_eq!(cloud_cover_from_forecast(""), 0);
    }

    #[test]
    fn matching_is_case_insensitive() {
        assert_eq!(cloud_cover_from_forecast("MOSTLY CLOUDY"), 75);
        assert_eq!(cloud_cover_from_forecast("light rain"), 95);
    }

    #[test]
    fn forecast_truncated_to_bound() {
        let long = "Cloudy ".repeat(40);
        let truncated = truncate_forecast(&long);
        assert!(truncated.len() <= FORECAST_MAX_LEN);
    }

    #[test]
    fn parse_forecast_extracts_fields() {
        let body = br#"{
            "properties": {
                "periods": [
                    {"shortForecast": "Mostly Cloudy", "temperature": 68, "isDaytime": true}
                ]
            }
        }"#;
        let wd = parse_forecast_body(body).expect("parse");
        assert_eq!(wd.forecast, "Mostly Cloudy");
        assert_eq!(wd.cloud_cover, 75);
        assert_eq!(wd.temperature, 68.0);
        assert!(wd.is_day);
        assert!(!wd.has_error);
        assert!(wd.fetched_at > 0);
    }

    #[test]
    fn parse_forecast_without_periods_errors() {
        let body = br#"{"properties": {"periods": []}}"#;
        assert!(parse_forecast_body(body).is_err());
    }

    #[test]
    fn parse_points_extracts_url() {
        let body = br#"{"properties": {"forecastHourly": "https://api.weather.gov/gridpoints/LOT/76,73/forecast/hourly"}}"#;
        let url = parse_points_body(body).expect("parse");
        assert!(url.ends_with("/forecast/hourly"));
    }

    #[test]
    fn parse_points_missing_url_errors() {
        assert!(parse_points_body(br#"{"properties": {}}"#).is_err());
        assert!(parse_points_body(b"not json").is_err());
    }

    #[test]
    fn fetch_state_starts_idle() {
        let wfs = FetchState::new();
        assert!(!wfs.in_flight());
        assert!(wfs.pipe_fd().is_none());
    }
}
