//! Entry point: parse arguments and dispatch.
//!
//! - No command or `run`: start the daemon through [`DisplayCompanion`]
//! - `status`: one-shot probe of the display and settings
//! - `--help` / `--version`: print and exit

use anyhow::Result;
use std::io::IsTerminal;

use display_companion::args::{self, CliAction, ParsedArgs, RunOptions};
use display_companion::commands;
use display_companion::config;
use display_companion::constants::EXIT_FAILURE;
use display_companion::logger::{Log, LoggerGuard};
use display_companion::{DisplayCompanion, log_error_exit};

fn main() -> Result<()> {
    let parsed_args = ParsedArgs::from_env();

    match parsed_args.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::Run(options) => {
            let _log_guard = prepare(&options)?;
            // Journal output needs wall-clock context
            Log::set_timestamps(!std::io::stdout().is_terminal());
            DisplayCompanion::new(options).run()
        }
        CliAction::Status { options, json } => {
            let _log_guard = prepare(&options)?;
            commands::status::handle_status_command(&options, json)
        }
    }
}

/// Apply the process-wide options shared by every command.
fn prepare(options: &RunOptions) -> Result<Option<LoggerGuard>> {
    let config_dir = options
        .config_dir
        .as_ref()
        .map(|dir| dir.to_string_lossy().into_owned());
    config::set_config_dir(config_dir)?;

    match &options.log_file {
        Some(path) => match Log::start_file_logging(path.to_string_lossy().into_owned()) {
            Ok(guard) => Ok(Some(guard)),
            Err(e) => {
                log_error_exit!("Cannot log to {}: {e:#}", path.display());
                std::process::exit(EXIT_FAILURE);
            }
        },
        None => Ok(None),
    }
}
