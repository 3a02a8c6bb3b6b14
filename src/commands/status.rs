//! Status command: probe the display and print the resolved settings.
//!
//! Runs the same discovery and sun time calculation as the daemon but never
//! writes brightness or the config file, so it is safe next to a running
//! instance.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::Arc;

use crate::args::RunOptions;
use crate::backend::{SystemCommandRunner, discover};
use crate::bus::LocalBus;
use crate::companion::load_location;
use crate::config::{DisplayConfigStore, display_config_path, system_display_config_path};
use crate::constants::DEFAULT_BACKLIGHT_DIR;
use crate::lock::{default_lock_path, running_pid};
use crate::manager::{BrightnessManager, ManagerParams, ManagerStatus};
use crate::scheduler::Scheduler;
use crate::time_source::{RealTimeSource, TimeSource};

pub fn handle_status_command(options: &RunOptions, json: bool) -> Result<()> {
    let debug_enabled = options.debug_enabled;
    if !json {
        log_version!();
    } else {
        crate::logger::Log::set_enabled(false);
    }

    let store = DisplayConfigStore::load(display_config_path()?, system_display_config_path())?;
    let location = load_location();
    let backlight_dir = options
        .backlight_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKLIGHT_DIR));
    let backend = discover(
        Arc::new(SystemCommandRunner::new(debug_enabled)),
        backlight_dir,
        debug_enabled,
    );

    // Not started: no handlers, no alarms, no config writes
    let time: Arc<dyn TimeSource> = Arc::new(RealTimeSource);
    let manager = BrightnessManager::new(ManagerParams {
        backend,
        config: store,
        location,
        bus: Arc::new(LocalBus::new()),
        scheduler: Arc::new(Scheduler::new(Arc::clone(&time))),
        time: Arc::clone(&time),
        debug_enabled,
    });
    let status = manager.status();

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    display_human_readable(&status, time.now());
    match running_pid(&default_lock_path()) {
        Some(pid) => log_indented!("Daemon running as PID {pid}"),
        None => log_indented!("Daemon not running"),
    }
    log_end!();
    Ok(())
}

fn display_human_readable(status: &ManagerStatus, now: DateTime<Local>) {
    log_block_start!("Display: {}", status.interface);
    if let Some(device) = &status.device {
        log_indented!("{device}");
    }
    log_indented!("Brightness: {}", status.current_level);

    log_block_start!("Levels");
    log_indented!("Day default: {}", status.default_level);
    log_indented!("Night default: {}", status.night_default_level);
    log_indented!("Dimmed: {}", status.low_level);

    log_block_start!("Policies");
    log_indented!("Auto-dim: {}", on_off(status.auto_dim));
    log_indented!("Auto night mode: {}", on_off(status.auto_nightmode));

    log_block_start!("Currently {}", if status.is_night { "night" } else { "day" });
    log_indented!(
        "Next sunrise: {} (in {})",
        status.sunrise.format("%a %H:%M"),
        format_duration(status.sunrise, now)
    );
    log_indented!(
        "Next sunset: {} (in {})",
        status.sunset.format("%a %H:%M"),
        format_duration(status.sunset, now)
    );
    log_pipe!();
}

fn on_off(enabled: bool) -> &'static str {
    if enabled { "on" } else { "off" }
}

/// Compact "in ..." text for a future instant.
fn format_duration(at: DateTime<Local>, now: DateTime<Local>) -> String {
    let total_seconds = (at - now).num_seconds().max(0);
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;

    if hours > 0 {
        format!("{hours}h{minutes:02}m")
    } else if minutes > 0 {
        format!("{minutes}m")
    } else {
        format!("{total_seconds}s")
    }
}
