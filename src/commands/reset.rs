//! `--reset`: restore display gamma and exit.
//!
//! Builds a short-lived dispatcher handle, restores the saved ramps,
//! and releases it. Also clears any pending override so a restarted
//! daemon does not immediately re-tint the screen.

use anyhow::Result;

use crate::config::{self, Paths};
use crate::gamma;

pub fn run(paths: &Paths) -> Result<()> {
    config::clear_override(paths);

    match gamma::init() {
        Ok(mut state) => {
            if let Err(e) = state.restore() {
                log_warning!("gamma restore failed: {e}");
            }
        }
        Err(e) => log_warning!("no gamma backend to reset: {e}"),
    }

    println!("Screen temperature reset.");
    Ok(())
}
