//! Configuration path resolution.
//!
//! Paths are resolved from XDG locations unless a custom directory was set at
//! startup with `--config-dir`, in which case every file lives inside it.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::OnceLock;

use crate::constants::*;

/// Global configuration directory, set once at startup
static CONFIG_DIR: OnceLock<Option<PathBuf>> = OnceLock::new();

/// Set the configuration directory for the current process.
///
/// Can only be called once; later calls return an error.
pub fn set_config_dir(dir: Option<String>) -> Result<()> {
    CONFIG_DIR
        .set(dir.map(PathBuf::from))
        .map_err(|_| anyhow::anyhow!("Configuration directory already set"))
}

/// The custom configuration directory, if one was set.
pub fn get_custom_config_dir() -> Option<PathBuf> {
    CONFIG_DIR.get().and_then(|d| d.clone())
}

/// Path of the user display config (`OvosDisplay.conf`).
pub fn display_config_path() -> Result<PathBuf> {
    if let Some(custom_dir) = get_custom_config_dir() {
        return Ok(custom_dir.join(DISPLAY_CONFIG_FILE));
    }
    let config_dir = dirs::config_dir().context("Could not determine config directory")?;
    Ok(config_dir.join(DISPLAY_CONFIG_FILE))
}

/// The system-wide display config, used as the base layer when present.
///
/// Skipped when a custom directory is active so that a test or alternate
/// profile is fully self-contained.
pub fn system_display_config_path() -> Option<PathBuf> {
    if get_custom_config_dir().is_some() {
        None
    } else {
        Some(PathBuf::from(SYSTEM_DISPLAY_CONFIG))
    }
}

/// Core config (`mycroft.conf`) candidates, lowest priority first.
///
/// Read for the device location and the messagebus endpoint.
pub fn core_config_paths() -> Vec<PathBuf> {
    if let Some(custom_dir) = get_custom_config_dir() {
        return vec![custom_dir.join(LOCATION_CONFIG_FILE)];
    }
    let mut paths = vec![PathBuf::from(SYSTEM_LOCATION_CONFIG)];
    if let Some(config_dir) = dirs::config_dir() {
        paths.push(config_dir.join(LOCATION_CONFIG_FILE));
    }
    paths
}

/// Per-user runtime directory for the lock file.
pub fn runtime_dir() -> PathBuf {
    std::env::var_os("XDG_RUNTIME_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(format!("/run/user/{}", nix::unistd::getuid())))
}
