//! `--set TEMP [MINUTES]`: write a manual override.

use anyhow::{Result, bail};

use crate::config::{self, OverrideState, Paths};
use crate::constants::{TEMP_MAX, TEMP_MIN};
use crate::now_epoch;

pub fn run(paths: &Paths, temp: i32, duration_min: i32) -> Result<()> {
    if !(TEMP_MIN..=TEMP_MAX).contains(&temp) {
        bail!("temperature must be between {TEMP_MIN}K and {TEMP_MAX}K");
    }

    let ovr = OverrideState {
        active: true,
        target_temp: temp,
        duration_minutes: duration_min,
        issued_at: now_epoch(),
        start_temp: 0, // the daemon fills this in on first observation
    };
    config::save_override(paths, &ovr)?;

    if duration_min > 0 {
        println!("Override: -> {temp}K over {duration_min} min");
    } else {
        println!("Override: -> {temp}K (instant)");
    }

    if config::daemon_alive(paths) {
        println!("Daemon will apply it on the next tick.");
    } else {
        log_warning!("daemon is not running; the override takes effect when it starts");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_override_with_zero_start_temp() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::in_dir(dir.path().to_path_buf());
        crate::logger::Log::set_enabled(false);

        run(&paths, 3500, 5).unwrap();

        let ovr = config::load_override(&paths).expect("override written");
        assert!(ovr.active);
        assert_eq!(ovr.target_temp, 3500);
        assert_eq!(ovr.duration_minutes, 5);
        assert_eq!(ovr.start_temp, 0);
        assert!(ovr.issued_at > 0);
    }

    #[test]
    fn rejects_out_of_range() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::in_dir(dir.path().to_path_buf());
        assert!(run(&paths, 500, 3).is_err());
        assert!(run(&paths, 30000, 3).is_err());
        assert!(config::load_override(&paths).is_none());
    }
}
