//! Structured logging with visual formatting.
//!
//! Box-drawing log output: a header line opens the run, `┣`-prefixed
//! lines carry messages, `┃` carries spacing and nested detail, and `╹`
//! closes the run. Semantic macros (`log_warning!`, `log_error!`,
//! `log_debug!`) use a `[LEVEL]` prefix instead.
//!
//! All output goes to stderr; stdout is reserved for command reports
//! (`--status` and friends). Logging can be disabled at runtime for
//! quiet operation in tests.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);

/// Runtime switch for all log macros.
pub struct Log;

impl Log {
    /// Enable or disable logging. Useful when log output would
    /// interfere with test assertions or machine-read output.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }
}

// Routes formatted text to stderr. Needed by the macros; not intended
// for direct use.
pub fn write_output(text: &str) {
    let mut err = std::io::stderr().lock();
    let _ = err.write_all(text.as_bytes());
    let _ = err.flush();
}

/// Print the application startup header.
#[macro_export]
macro_rules! log_version {
    () => {{
        if $crate::logger::Log::is_enabled() {
            $crate::logger::write_output(&format!(
                "┏ abraxas v{} ━━╸\n",
                env!("CARGO_PKG_VERSION")
            ));
        }
    }};
}

/// Start a new conceptual block: an empty pipe for spacing, then the message.
#[macro_export]
macro_rules! log_block_start {
    ($($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            let message = format!($($arg)*);
            $crate::logger::write_output(&format!("┃\n┣ {message}\n"));
        }
    }};
}

/// Log a message within the current block.
#[macro_export]
macro_rules! log_decorated {
    ($($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            let message = format!($($arg)*);
            $crate::logger::write_output(&format!("┣ {message}\n"));
        }
    }};
}

/// Log nested detail under the current block.
#[macro_export]
macro_rules! log_indented {
    ($($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            let message = format!($($arg)*);
            $crate::logger::write_output(&format!("┃   {message}\n"));
        }
    }};
}

/// Insert a single empty prefixed line for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        if $crate::logger::Log::is_enabled() {
            $crate::logger::write_output("┃\n");
        }
    }};
}

/// Print the final log termination marker.
#[macro_export]
macro_rules! log_end {
    () => {{
        if $crate::logger::Log::is_enabled() {
            $crate::logger::write_output("╹\n");
        }
    }};
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            let message = format!($($arg)*);
            $crate::logger::write_output(&format!("┣ [INFO] {message}\n"));
        }
    }};
}

#[macro_export]
macro_rules! log_warning {
    ($($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            let message = format!($($arg)*);
            $crate::logger::write_output(&format!("┣ [WARNING] {message}\n"));
        }
    }};
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            let message = format!($($arg)*);
            $crate::logger::write_output(&format!("┣ [ERROR] {message}\n"));
        }
    }};
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {{
        if $crate::logger::Log::is_enabled() {
            let message = format!($($arg)*);
            $crate::logger::write_output(&format!("┣ [DEBUG] {message}\n"));
        }
    }};
}
