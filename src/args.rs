//! Command-line argument parsing.
//!
//! The daemon takes a handful of flags and an optional subcommand. Running
//! without a subcommand starts the service; `status` probes the hardware and
//! prints the resolved settings without taking over the display.

use std::path::PathBuf;

/// Settings shared by every action that touches the system.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunOptions {
    pub debug_enabled: bool,
    /// Directory holding the display configuration file.
    pub config_dir: Option<PathBuf>,
    /// Messagebus URL override.
    pub bus_url: Option<String>,
    /// Backlight sysfs directory override.
    pub backlight_dir: Option<PathBuf>,
    /// Mirror log output into this file.
    pub log_file: Option<PathBuf>,
}

/// What the binary should do.
#[derive(Debug, PartialEq)]
pub enum CliAction {
    /// Run the brightness service until signalled
    Run(RunOptions),
    /// Probe the display and print the current settings
    Status { options: RunOptions, json: bool },
    /// Display help information and exit
    ShowHelp,
    /// Display version information and exit
    ShowVersion,
    /// Show help due to bad arguments and exit
    ShowHelpDueToError,
}

/// Result of parsing command-line arguments.
pub struct ParsedArgs {
    pub action: CliAction,
}

impl ParsedArgs {
    /// Parse arguments, the first of which is the program name.
    pub fn parse<I, S>(args: I) -> ParsedArgs
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let args_vec: Vec<String> = args
            .into_iter()
            .skip(1)
            .map(|s| s.as_ref().to_string())
            .collect();

        let mut options = RunOptions::default();
        let mut command: Option<String> = None;
        let mut json = false;
        let mut display_help = false;
        let mut display_version = false;
        let mut bad_args = false;

        let mut i = 0;
        while i < args_vec.len() {
            let arg = args_vec[i].as_str();
            match arg {
                "--help" | "-h" => display_help = true,
                "--version" | "-V" | "-v" => display_version = true,
                "--debug" | "-d" => options.debug_enabled = true,
                "--json" => json = true,
                "--config" | "-c" | "--bus-url" | "-u" | "--backlight-dir" | "-b" | "--log"
                | "-l" => match args_vec.get(i + 1).filter(|v| !v.starts_with('-')) {
                    Some(value) => {
                        match arg {
                            "--config" | "-c" => options.config_dir = Some(PathBuf::from(value)),
                            "--bus-url" | "-u" => options.bus_url = Some(value.clone()),
                            "--backlight-dir" | "-b" => {
                                options.backlight_dir = Some(PathBuf::from(value))
                            }
                            _ => options.log_file = Some(PathBuf::from(value)),
                        }
                        i += 1;
                    }
                    None => {
                        log_warning!("Missing value for {arg}. Usage: {arg} <value>");
                        bad_args = true;
                    }
                },
                _ if arg.starts_with('-') => {
                    log_warning!("Unknown option: {arg}");
                    bad_args = true;
                }
                _ => {
                    if let Some(first) = &command {
                        log_error!("Cannot use multiple commands at once: '{first}' and '{arg}'");
                        bad_args = true;
                    } else {
                        command = Some(arg.to_string());
                    }
                }
            }
            i += 1;
        }

        let action = if display_version {
            CliAction::ShowVersion
        } else if bad_args {
            CliAction::ShowHelpDueToError
        } else if display_help {
            CliAction::ShowHelp
        } else {
            match command.as_deref() {
                None | Some("run") => CliAction::Run(options),
                Some("status") => CliAction::Status { options, json },
                Some("help") => CliAction::ShowHelp,
                Some(other) => {
                    log_warning!("Unknown command: {other}");
                    CliAction::ShowHelpDueToError
                }
            }
        };

        ParsedArgs { action }
    }

    pub fn from_env() -> ParsedArgs {
        Self::parse(std::env::args())
    }
}

/// Displays version information using the logger framing.
pub fn display_version_info() {
    log_version!();
    log_decorated!("Brightness control for voice assistant displays");
    log_end!();
}

/// Displays the general help message.
pub fn display_help() {
    log_version!();
    log_block_start!("Brightness control for voice assistant displays");
    log_block_start!("Usage:");
    log_indented!("display-companion [OPTIONS] [COMMAND]");
    log_block_start!("Options:");
    log_indented!("-b, --backlight-dir <dir>  Use a different DSI backlight directory");
    log_indented!("-c, --config <dir>         Use custom configuration directory");
    log_indented!("-d, --debug                Enable detailed debug output");
    log_indented!("-h, --help                 Print help information");
    log_indented!("-l, --log <file>           Write log output to a file");
    log_indented!("-u, --bus-url <url>        Connect to a different messagebus");
    log_indented!("-V, --version              Print version information");
    log_block_start!("Commands:");
    log_indented!("run                        Run the brightness service (default)");
    log_indented!("status [--json]            Probe the display and show settings");
    log_indented!("help                       Show this message");
    log_end!();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn action(args: &[&str]) -> CliAction {
        crate::logger::Log::set_enabled(false);
        ParsedArgs::parse(args.iter().copied()).action
    }

    #[test]
    fn test_parse_no_args_runs() {
        assert_eq!(action(&["display-companion"]), CliAction::Run(RunOptions::default()));
    }

    #[test]
    fn test_parse_run_with_paths() {
        let parsed = action(&[
            "display-companion",
            "--debug",
            "-c",
            "/tmp/conf",
            "--bus-url",
            "ws://10.0.0.5:8181/core",
            "run",
        ]);
        assert_eq!(
            parsed,
            CliAction::Run(RunOptions {
                debug_enabled: true,
                config_dir: Some(PathBuf::from("/tmp/conf")),
                bus_url: Some("ws://10.0.0.5:8181/core".to_string()),
                ..RunOptions::default()
            })
        );
    }

    #[test]
    fn test_parse_status_json() {
        let parsed = action(&["display-companion", "status", "--json", "-b", "/sys/x"]);
        assert_eq!(
            parsed,
            CliAction::Status {
                options: RunOptions {
                    backlight_dir: Some(PathBuf::from("/sys/x")),
                    ..RunOptions::default()
                },
                json: true,
            }
        );
    }

    #[test]
    fn test_version_wins_over_help() {
        assert_eq!(action(&["display-companion", "-h", "-V"]), CliAction::ShowVersion);
        assert_eq!(action(&["display-companion", "help"]), CliAction::ShowHelp);
    }

    #[test]
    fn test_bad_arguments() {
        assert_eq!(action(&["display-companion", "--bogus"]), CliAction::ShowHelpDueToError);
        assert_eq!(action(&["display-companion", "--config"]), CliAction::ShowHelpDueToError);
        assert_eq!(action(&["display-companion", "dance"]), CliAction::ShowHelpDueToError);
        assert_eq!(
            action(&["display-companion", "status", "run"]),
            CliAction::ShowHelpDueToError
        );
    }
}
