//! Application constants and operational defaults for abraxas.
//!
//! This module contains the temperature targets, transition window
//! durations, timing intervals, and validation limits used throughout
//! the application.

// ═══ Temperature Bounds (Kelvin) ═══
// Hard clamp range for everything that touches the display

pub const TEMP_MIN: i32 = 1000; // Candlelight
pub const TEMP_MAX: i32 = 25000; // Deep blue sky

// ═══ Temperature Targets (Kelvin) ═══

pub const TEMP_DAY_CLEAR: i32 = 6500; // Clear daytime, close to natural sunlight
pub const TEMP_DAY_DARK: i32 = 4500; // Heavily overcast daytime
pub const TEMP_NIGHT: i32 = 2900; // Warm night

/// Cloud cover percentage at or above which the day target drops to
/// `TEMP_DAY_DARK`. Single cutoff, no hysteresis.
pub const CLOUD_THRESHOLD: i32 = 75;

// ═══ Transition Windows (minutes) ═══
// Each window is centered on its astronomical event. Dusk mirrors dawn
// with only the sign of the normalized position flipped.

pub const DAWN_DURATION: f64 = 90.0;
pub const DUSK_DURATION: f64 = 120.0;

/// Steepness of the normalized sigmoid used for all transitions.
pub const SIGMOID_STEEPNESS: f64 = 6.0;

/// Auto-resume targets this many minutes before the next window opens.
pub const RESUME_LEAD_MIN: i64 = 15;

// ═══ Timing ═══

/// Daemon tick period. One kernel wait per tick in steady state.
pub const TEMP_UPDATE_SEC: i64 = 60;

/// Weather cache lifetime. No retries inside a cycle; the next fetch
/// happens a full cycle later.
pub const WEATHER_REFRESH_SEC: i64 = 900;

/// Default manual override transition length when `--set` is given no
/// duration argument.
pub const DEFAULT_OVERRIDE_MINUTES: i32 = 3;

// ═══ Startup ═══
// At login the display server may not be accepting connections yet, so
// backend probing retries on a short cadence before giving up.

pub const GAMMA_INIT_MAX_RETRIES: u32 = 60;
pub const GAMMA_INIT_RETRY_MS: u64 = 500;

// ═══ Persisted File Limits (bytes) ═══
// Files larger than these are rejected without parsing.

pub const OVERRIDE_MAX_BYTES: u64 = 4096;
pub const WEATHER_CACHE_MAX_BYTES: u64 = 8192;
