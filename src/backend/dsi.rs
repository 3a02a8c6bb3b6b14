//! DSI touch display backlight through sysfs.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

use super::{BrightnessBackend, DeviceInterface};
use crate::constants::{BACKLIGHT_CONTROL_FILE, BACKLIGHT_STATUS_FILE};

/// Backlight under `/sys/class/backlight/<name>`.
///
/// Reads come from `actual_brightness` (what the panel shows), writes go to
/// `brightness`.
#[derive(Debug, Clone)]
pub struct DsiBackend {
    dir: PathBuf,
}

impl DsiBackend {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// A backlight directory is usable when its status file exists.
    pub fn probe(dir: &Path) -> bool {
        dir.join(BACKLIGHT_STATUS_FILE).is_file()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl BrightnessBackend for DsiBackend {
    fn interface(&self) -> DeviceInterface {
        DeviceInterface::Dsi
    }

    fn get_level(&mut self) -> Result<u32> {
        let path = self.dir.join(BACKLIGHT_STATUS_FILE);
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        raw.trim()
            .parse::<u32>()
            .with_context(|| format!("Unexpected backlight value '{}'", raw.trim()))
    }

    fn set_level(&mut self, level: u32) -> Result<()> {
        let path = self.dir.join(BACKLIGHT_CONTROL_FILE);
        fs::write(&path, level.to_string())
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    fn describe(&self) -> String {
        format!("DSI backlight at {}", self.dir.display())
    }
}
