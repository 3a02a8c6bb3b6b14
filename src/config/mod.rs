//! Display configuration: the flat JSON key-value file shared with the shell.
//!
//! The shell's settings pages and this daemon both read and write
//! `OvosDisplay.conf`. Only a handful of keys belong to brightness control;
//! every other key is carried through untouched so a store never drops
//! settings owned by someone else.
//!
//! ```json
//! {
//!   "auto_dim": true,
//!   "auto_nightmode": true,
//!   "auto_dim_seconds": 60,
//!   "low_brightness": 20,
//!   "default_brightness": 100,
//!   "night_default_brightness": 70,
//!   "sunrise_time": "auto",
//!   "sunset_time": "21:45"
//! }
//! ```
//!
//! Values are in the device's native range (0-255 for DSI, 0-100 for HDMI)
//! and are clamped to the active range when applied.
//!
//! ## Sources
//!
//! 1. `/etc/xdg/OvosDisplay.conf` (system defaults, optional, never written)
//! 2. `$XDG_CONFIG_HOME/OvosDisplay.conf` (user file, wins over the system file)
//!
//! A custom directory given with `--config-dir` replaces the user location.
//!
//! A file with invalid brightness values still loads: the bad keys fall back
//! to their defaults and the rest is kept. A file that is not JSON at all is
//! never overwritten until it parses again.

pub mod loading;
pub mod validation;
pub mod watcher;

use anyhow::{Context, Result};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};

use crate::constants::*;

pub use loading::{
    display_config_path, get_custom_config_dir, core_config_paths, runtime_dir, set_config_dir,
    system_display_config_path,
};
pub use validation::validate_config;
pub use watcher::ConfigWatcher;

/// A user override for sunrise or sunset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SunTimeSetting {
    /// Compute from location, or fall back to the fixed defaults.
    #[default]
    Auto,
    /// Fixed wall-clock time.
    At(NaiveTime),
}

impl SunTimeSetting {
    pub fn fixed(&self) -> Option<NaiveTime> {
        match self {
            SunTimeSetting::Auto => None,
            SunTimeSetting::At(time) => Some(*time),
        }
    }
}

impl TryFrom<String> for SunTimeSetting {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let trimmed = value.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
            return Ok(SunTimeSetting::Auto);
        }
        NaiveTime::parse_from_str(trimmed, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(trimmed, "%H:%M:%S"))
            .map(SunTimeSetting::At)
            .map_err(|_| format!("invalid time '{trimmed}', expected \"HH:MM\" or \"auto\""))
    }
}

impl From<SunTimeSetting> for String {
    fn from(value: SunTimeSetting) -> Self {
        match value {
            SunTimeSetting::Auto => "auto".to_string(),
            SunTimeSetting::At(time) => time.format("%H:%M").to_string(),
        }
    }
}

/// Keys of the display config owned by brightness control.
pub const OWNED_KEYS: [&str; 8] = [
    "auto_dim",
    "auto_nightmode",
    "auto_dim_seconds",
    "low_brightness",
    "default_brightness",
    "night_default_brightness",
    "sunrise_time",
    "sunset_time",
];

/// Brightness related keys of the display config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    pub auto_dim: bool,
    pub auto_nightmode: bool,
    /// Idle seconds before dimming.
    pub auto_dim_seconds: u64,
    pub low_brightness: u32,
    pub default_brightness: u32,
    pub night_default_brightness: u32,
    pub sunrise_time: SunTimeSetting,
    pub sunset_time: SunTimeSetting,
    /// Keys owned by other components, preserved on store.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            auto_dim: DEFAULT_AUTO_DIM,
            auto_nightmode: DEFAULT_AUTO_NIGHTMODE,
            auto_dim_seconds: DEFAULT_AUTO_DIM_SECONDS,
            low_brightness: DEFAULT_LOW_BRIGHTNESS,
            default_brightness: DEFAULT_BRIGHTNESS,
            night_default_brightness: DEFAULT_NIGHT_BRIGHTNESS,
            sunrise_time: SunTimeSetting::Auto,
            sunset_time: SunTimeSetting::Auto,
            extra: Map::new(),
        }
    }
}

impl DisplayConfig {
    /// Build from a flat JSON object. Missing keys take their defaults.
    pub fn from_map(map: Map<String, Value>) -> Result<Self> {
        serde_json::from_value(Value::Object(map)).context("Invalid display configuration")
    }

    /// Parse and validate, dropping owned keys that cannot be used.
    ///
    /// Each owned key is checked on its own against the defaults of the
    /// others; a key that fails is removed so its default applies. When the
    /// remaining keys still conflict, every owned key falls back. Foreign
    /// keys always survive. Returns the config and the keys that were reset.
    pub fn repaired(mut map: Map<String, Value>) -> (Self, Vec<&'static str>) {
        let mut reset = Vec::new();
        for key in OWNED_KEYS {
            let Some(value) = map.get(key) else {
                continue;
            };
            let alone = Map::from_iter([(key.to_string(), value.clone())]);
            if checked(alone).is_none() {
                map.remove(key);
                reset.push(key);
            }
        }

        if let Some(config) = checked(map.clone()) {
            return (config, reset);
        }

        for key in OWNED_KEYS {
            if map.remove(key).is_some() {
                reset.push(key);
            }
        }
        let config = Self {
            extra: map,
            ..Self::default()
        };
        (config, reset)
    }
}

fn checked(map: Map<String, Value>) -> Option<DisplayConfig> {
    let config = DisplayConfig::from_map(map).ok()?;
    validate_config(&config).ok()?;
    Some(config)
}

/// The display config plus where it lives on disk.
///
/// A store without a path keeps changes in memory only, which is what the
/// daemon falls back to when the config directory cannot be determined.
#[derive(Debug, Clone)]
pub struct DisplayConfigStore {
    path: Option<PathBuf>,
    system_path: Option<PathBuf>,
    config: DisplayConfig,
    /// Cleared while the user file is unreadable, so a store cannot clobber it.
    writable: bool,
}

impl DisplayConfigStore {
    /// Load the user file layered over the optional system file.
    ///
    /// A missing user file is not an error; defaults (and system values) apply
    /// and the file is created on the first store.
    pub fn load(path: PathBuf, system_path: Option<PathBuf>) -> Result<Self> {
        let config = read_layers(&path, system_path.as_deref())?;
        validate_config(&config)?;
        Ok(Self {
            path: Some(path),
            system_path,
            config,
            writable: true,
        })
    }

    /// Like [`load`](Self::load), but never fails.
    ///
    /// Invalid brightness values are replaced by their defaults and every
    /// other key is kept, so a later store only repairs what was wrong. When
    /// a file cannot be read as JSON the defaults apply in memory and the
    /// store stays read-only until a reload succeeds.
    pub fn load_or_default(path: PathBuf, system_path: Option<PathBuf>) -> Self {
        let (config, writable) = match read_raw_layers(&path, system_path.as_deref()) {
            Ok(merged) => match checked(merged.clone()) {
                Some(config) => (config, true),
                None => {
                    let (config, reset) = DisplayConfig::repaired(merged);
                    log_pipe!();
                    log_error!("Invalid display configuration in {}", path.display());
                    log_indented!("Using defaults for: {}", reset.join(", "));
                    (config, true)
                }
            },
            Err(e) => {
                log_pipe!();
                log_error!("Failed to load display configuration: {e:#}");
                log_indented!("Using default brightness settings");
                log_indented!("{} will not be written until it parses", path.display());
                (DisplayConfig::default(), false)
            }
        };

        Self {
            path: Some(path),
            system_path,
            config,
            writable,
        }
    }

    /// A store that never touches the filesystem.
    pub fn in_memory(config: DisplayConfig) -> Self {
        Self {
            path: None,
            system_path: None,
            config,
            writable: true,
        }
    }

    pub fn config(&self) -> &DisplayConfig {
        &self.config
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Set the auto-dim flag, storing only when it changed.
    pub fn set_auto_dim(&mut self, enabled: bool) -> Result<bool> {
        if self.config.auto_dim == enabled {
            return Ok(false);
        }
        self.config.auto_dim = enabled;
        self.store()?;
        Ok(true)
    }

    /// Set the auto-night-mode flag, storing only when it changed.
    pub fn set_auto_nightmode(&mut self, enabled: bool) -> Result<bool> {
        if self.config.auto_nightmode == enabled {
            return Ok(false);
        }
        self.config.auto_nightmode = enabled;
        self.store()?;
        Ok(true)
    }

    /// Re-read from disk, returning the previous values.
    ///
    /// On failure the in-memory config is left as it was.
    pub fn reload(&mut self) -> Result<DisplayConfig> {
        let Some(path) = self.path.as_deref() else {
            return Ok(self.config.clone());
        };
        let fresh = read_layers(path, self.system_path.as_deref())?;
        validate_config(&fresh)?;
        self.writable = true;
        Ok(std::mem::replace(&mut self.config, fresh))
    }

    /// Write the user file. The system file is never written.
    pub fn store(&self) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            return Ok(());
        };
        if !self.writable {
            anyhow::bail!(
                "Not overwriting {}: it is not valid JSON",
                path.display()
            );
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let content = serde_json::to_string_pretty(&self.config)
            .context("Failed to serialize display configuration")?;

        // Write-then-rename so the shell never reads a half-written file
        let tmp = path.with_extension("conf.tmp");
        fs::write(&tmp, content).with_context(|| format!("Failed to write {}", tmp.display()))?;
        fs::rename(&tmp, path).with_context(|| format!("Failed to replace {}", path.display()))?;
        Ok(())
    }
}

fn read_layers(path: &Path, system_path: Option<&Path>) -> Result<DisplayConfig> {
    DisplayConfig::from_map(read_raw_layers(path, system_path)?)
        .with_context(|| format!("Failed to parse display config at {}", path.display()))
}

/// The user file's keys over the system file's, without interpretation.
fn read_raw_layers(path: &Path, system_path: Option<&Path>) -> Result<Map<String, Value>> {
    let mut merged = match system_path {
        Some(system) if system.exists() => read_object(system)?,
        _ => Map::new(),
    };
    if path.exists() {
        merged.extend(read_object(path)?);
    }
    Ok(merged)
}

/// Read a JSON object from disk. An empty file counts as an empty object.
pub(crate) fn read_object(path: &Path) -> Result<Map<String, Value>> {
    let content =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Map::new());
    }
    match serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse JSON in {}", path.display()))?
    {
        Value::Object(map) => Ok(map),
        other => anyhow::bail!(
            "Expected a JSON object in {}, found {}",
            path.display(),
            json_kind(&other)
        ),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
