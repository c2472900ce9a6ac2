//! `--resume`: clear the manual override.

use anyhow::Result;

use crate::config::{self, OverrideState, Paths};

pub fn run(paths: &Paths) -> Result<()> {
    // Writing active=false and deleting the file are equivalent to the
    // daemon; writing keeps an inotify event even on filesystems where
    // unlink coalesces oddly
    config::save_override(paths, &OverrideState::default())?;

    println!("Resume sent.");
    if config::daemon_alive(paths) {
        println!("Daemon will return to solar control on the next tick.");
    } else {
        log_warning!("daemon is not running");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_inactive_override() {
        let dir = TempDir::new().unwrap();
        let paths = Paths::in_dir(dir.path().to_path_buf());
        crate::logger::Log::set_enabled(false);

        config::save_override(
            &paths,
            &OverrideState {
                active: true,
                target_temp: 3500,
                ..Default::default()
            },
        )
        .unwrap();

        run(&paths).unwrap();
        let ovr = config::load_override(&paths).expect("file still present");
        assert!(!ovr.active);
    }
}
