//! Thin CLI dispatcher for abraxas.
//!
//! Parses the command line, resolves the configuration directory, and
//! hands off to the daemon or the matching one-shot command. All user
//! errors exit with code 1 after a one-line message.

use abraxas::args::{CliAction, ParsedArgs, display_help};
use abraxas::{commands, config, daemon, log_end, log_error, log_version};
use std::process::ExitCode;

fn main() -> ExitCode {
    let parsed = ParsedArgs::from_env();

    match parsed.action {
        CliAction::ShowHelp => {
            display_help();
            return ExitCode::SUCCESS;
        }
        CliAction::ShowHelpDueToError { ref message } => {
            log_error!("{message}");
            display_help();
            return ExitCode::FAILURE;
        }
        _ => {}
    }

    let paths = match config::Paths::init() {
        Ok(p) => p,
        Err(e) => {
            log_error!("{e:#}");
            return ExitCode::FAILURE;
        }
    };

    // Commands that work without a configured location
    let result = match parsed.action {
        CliAction::Reset => commands::reset::run(&paths),
        CliAction::Resume => commands::resume::run(&paths),
        CliAction::Set { temp, duration_min } => commands::set::run(&paths, temp, duration_min),
        CliAction::SetLocation { ref spec } => commands::set_location::run(&paths, spec),
        // The rest need a location
        ref action => match config::load_location(&paths) {
            Some(location) => match action {
                CliAction::Status => commands::status::run(&paths, location),
                CliAction::Refresh => commands::refresh::run(&paths, location),
                CliAction::Daemon => {
                    log_version!();
                    let result = daemon::run(location, &paths);
                    log_end!();
                    result
                }
                _ => unreachable!("handled above"),
            },
            None => {
                log_error!("no location configured, use --set-location first");
                log_error!("  example: abraxas --set-location 60614");
                log_error!("  example: abraxas --set-location 41.88,-87.63");
                return ExitCode::FAILURE;
            }
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log_error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}
