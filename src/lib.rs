//! # Abraxas Library
//!
//! Internal library for the abraxas binary: a Linux user-session
//! daemon that continuously sets the display's color temperature as a
//! smooth function of the local sun's position, attenuated by cloud
//! cover, with file-coordinated manual overrides.
//!
//! The binary is a thin CLI dispatcher; all logic lives here.
//!
//! ## Architecture
//!
//! - **`solar`**: NOAA ephemeris (sunrise, sunset, elevation). Pure math.
//! - **`sigmoid`**: normalized transition curve, solar/manual
//!   temperature computation, auto-resume scheduling. Pure math.
//! - **`gamma`**: blackbody color ramps plus four sibling backends
//!   (DRM, Wayland wlr-gamma-control, X11 RandR, GNOME Mutter) behind a
//!   probing sum-type dispatcher.
//! - **`config`**: paths under `~/.config/abraxas/`, INI location,
//!   JSON override and weather cache, advisory PID file.
//! - **`weather`**: two-step NOAA fetch through an external `curl`
//!   child; nonblocking state machine for the daemon, blocking path
//!   for the CLI.
//! - **`daemon`**: the event loop (io_uring or ppoll), inotify
//!   observation, signalfd shutdown, Landlock sandbox and seccomp
//!   filter.
//! - **`commands`**: the one-shot CLI verbs.
//! - **`logger`**: box-drawing structured logging to stderr.

// Logger macros are used by every other module; keep this first.
#[macro_use]
pub mod logger;

pub mod args;
pub mod commands;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod gamma;
pub mod sigmoid;
pub mod solar;
pub mod weather;
pub mod zipdb;

/// Current wall-clock time as epoch seconds. All persisted state and
/// scheduling math runs on this.
pub fn now_epoch() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
