//! Command-line argument parsing.
//!
//! Long options only, one action per invocation. Anything unparseable
//! produces `ShowHelpDueToError` so the dispatcher can print a one-line
//! message plus usage and exit 1.

/// The action a single CLI invocation asks for.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the daemon in the foreground (default when no flags given).
    Daemon,
    /// Print the current status report.
    Status,
    /// Write a manual override: target temperature over a duration.
    Set { temp: i32, duration_min: i32 },
    /// Clear the manual override.
    Resume,
    /// Set the location from `lat,lon` or a 5-digit ZIP.
    SetLocation { spec: String },
    /// Synchronous weather fetch, update the cache.
    Refresh,
    /// Restore gamma and exit.
    Reset,
    /// Print usage, exit 0.
    ShowHelp,
    /// Bad invocation: print the message plus usage, exit 1.
    ShowHelpDueToError { message: String },
}

/// Parsed command line.
#[derive(Debug)]
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    pub fn from_env() -> Self {
        let args: Vec<String> = std::env::args().skip(1).collect();
        Self::from_args(&args)
    }

    pub fn from_args(args: &[String]) -> Self {
        let action = match args.first().map(String::as_str) {
            None | Some("--daemon") => CliAction::Daemon,
            Some("--status") => CliAction::Status,
            Some("--resume") => CliAction::Resume,
            Some("--refresh") => CliAction::Refresh,
            Some("--reset") => CliAction::Reset,
            Some("--help") => CliAction::ShowHelp,
            Some("--set") => parse_set(&args[1..]),
            Some("--set-location") => match args.get(1) {
                Some(spec) => CliAction::SetLocation { spec: spec.clone() },
                None => CliAction::ShowHelpDueToError {
                    message: "--set-location requires a location argument (ZIP or LAT,LON)"
                        .to_string(),
                },
            },
            Some(other) => CliAction::ShowHelpDueToError {
                message: format!("unknown option: {other}"),
            },
        };
        Self { action }
    }
}

fn parse_set(rest: &[String]) -> CliAction {
    let Some(temp_arg) = rest.first() else {
        return CliAction::ShowHelpDueToError {
            message: "--set requires a temperature argument".to_string(),
        };
    };
    let Ok(temp) = temp_arg.parse::<i32>() else {
        return CliAction::ShowHelpDueToError {
            message: format!("invalid temperature: {temp_arg}"),
        };
    };

    let duration_min = match rest.get(1) {
        Some(arg) => match arg.parse::<i32>() {
            Ok(d) if d >= 0 => d,
            _ => {
                return CliAction::ShowHelpDueToError {
                    message: format!("invalid duration: {arg}"),
                };
            }
        },
        None => crate::constants::DEFAULT_OVERRIDE_MINUTES,
    };

    CliAction::Set { temp, duration_min }
}

/// Print usage to stdout.
pub fn display_help() {
    println!("abraxas - dynamic color temperature daemon");
    println!();
    println!("Usage: abraxas [OPTION]");
    println!();
    println!("  --daemon              Run the daemon in the foreground (default)");
    println!("  --status              Show location, sun times, weather, and mode");
    println!("  --set TEMP [MINUTES]  Override to TEMP over MINUTES (default 3, 0 = instant)");
    println!("  --resume              Clear the override, resume solar control");
    println!("  --set-location LOC    Set location (5-digit ZIP or LAT,LON)");
    println!("  --refresh             Fetch weather now and update the cache");
    println!("  --reset               Restore display gamma and exit");
    println!("  --help                Show this help");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> CliAction {
        let owned: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        ParsedArgs::from_args(&owned).action
    }

    #[test]
    fn no_args_runs_daemon() {
        assert_eq!(parse(&[]), CliAction::Daemon);
        assert_eq!(parse(&["--daemon"]), CliAction::Daemon);
    }

    #[test]
    fn simple_flags() {
        assert_eq!(parse(&["--status"]), CliAction::Status);
        assert_eq!(parse(&["--resume"]), CliAction::Resume);
        assert_eq!(parse(&["--refresh"]), CliAction::Refresh);
        assert_eq!(parse(&["--reset"]), CliAction::Reset);
        assert_eq!(parse(&["--help"]), CliAction::ShowHelp);
    }

    #[test]
    fn set_with_default_duration() {
        assert_eq!(
            parse(&["--set", "3500"]),
            CliAction::Set {
                temp: 3500,
                duration_min: 3
            }
        );
    }

    #[test]
    fn set_with_duration() {
        assert_eq!(
            parse(&["--set", "3500", "30"]),
            CliAction::Set {
                temp: 3500,
                duration_min: 30
            }
        );
        assert_eq!(
            parse(&["--set", "3500", "0"]),
            CliAction::Set {
                temp: 3500,
                duration_min: 0
            }
        );
    }

    #[test]
    fn set_rejects_garbage() {
        assert!(matches!(
            parse(&["--set"]),
            CliAction::ShowHelpDueToError { .. }
        ));
        assert!(matches!(
            parse(&["--set", "warm"]),
            CliAction::ShowHelpDueToError { .. }
        ));
        assert!(matches!(
            parse(&["--set", "3500", "-2"]),
            CliAction::ShowHelpDueToError { .. }
        ));
    }

    #[test]
    fn set_location_takes_argument() {
        assert_eq!(
            parse(&["--set-location", "60614"]),
            CliAction::SetLocation {
                spec: "60614".to_string()
            }
        );
        assert!(matches!(
            parse(&["--set-location"]),
            CliAction::ShowHelpDueToError { .. }
        ));
    }

    #[test]
    fn unknown_option_is_error() {
        assert!(matches!(
            parse(&["--frobnicate"]),
            CliAction::ShowHelpDueToError { .. }
        ));
        assert!(matches!(
            parse(&["status"]),
            CliAction::ShowHelpDueToError { .. }
        ));
    }
}
