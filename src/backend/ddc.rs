//! External HDMI monitor over DDC/CI, driven by `ddcutil`.
//!
//! Relevant `ddcutil` output looks like this:
//!
//! ```text
//! $ ddcutil detect
//! Display 1
//!    I2C bus:  /dev/i2c-4
//!    ...
//! $ ddcutil getvcp known --bus 4
//! VCP code 0x10 (Brightness                    ): current value =    60, max value =   100
//! ```

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::{BrightnessBackend, CommandRunner, DeviceInterface};

const BUS_MARKER: &str = "I2C bus:";
const BRIGHTNESS_MARKER: &str = "Brightness";

/// `None` only when the pattern fails to compile.
static CURRENT_VALUE: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"current value\s*=\s*(\d+)").ok());

/// Bus number from `ddcutil detect` output: `I2C bus:  /dev/i2c-4` gives `4`.
pub fn parse_i2c_bus(detect_output: &str) -> Option<String> {
    let (_, rest) = detect_output.split_once(BUS_MARKER)?;
    let line = rest.lines().next()?;
    let bus = line.split('-').nth(1)?.trim();
    (!bus.is_empty() && bus.chars().all(|c| c.is_ascii_digit())).then(|| bus.to_string())
}

/// VCP code of the brightness feature: the third token of the first line
/// mentioning `Brightness`.
pub fn parse_brightness_code(getvcp_output: &str) -> Option<String> {
    getvcp_output
        .lines()
        .find(|line| line.contains(BRIGHTNESS_MARKER))
        .and_then(|line| line.split_whitespace().nth(2))
        .map(str::to_string)
}

/// Integer after `current value =` in `ddcutil getvcp` output.
pub fn parse_current_value(getvcp_output: &str) -> Option<u32> {
    let pattern = CURRENT_VALUE.as_ref()?;
    getvcp_output
        .lines()
        .find_map(|line| pattern.captures(line))
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// Brightness of one monitor on a known I2C bus.
pub struct DdcBackend {
    runner: Arc<dyn CommandRunner>,
    program: PathBuf,
    bus: String,
    code: String,
    timeout: Duration,
}

impl DdcBackend {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        program: PathBuf,
        bus: String,
        code: String,
        timeout: Duration,
    ) -> Self {
        Self {
            runner,
            program,
            bus,
            code,
            timeout,
        }
    }

    pub fn bus(&self) -> &str {
        &self.bus
    }

    pub fn code(&self) -> &str {
        &self.code
    }
}

impl BrightnessBackend for DdcBackend {
    fn interface(&self) -> DeviceInterface {
        DeviceInterface::Hdmi
    }

    fn get_level(&mut self) -> Result<u32> {
        let args = vec![
            "getvcp".to_string(),
            self.code.clone(),
            "--bus".to_string(),
            self.bus.clone(),
        ];
        let output = self
            .runner
            .run(&self.program, &args, self.timeout)
            .context("Failed to query monitor brightness")?;
        parse_current_value(&output)
            .with_context(|| format!("No current value in ddcutil output: {}", output.trim()))
    }

    fn set_level(&mut self, level: u32) -> Result<()> {
        let args = vec![
            "setvcp".to_string(),
            self.code.clone(),
            "--bus".to_string(),
            self.bus.clone(),
            level.to_string(),
        ];
        self.runner
            .run(&self.program, &args, self.timeout)
            .context("Failed to set monitor brightness")?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("HDMI monitor on i2c-{} (VCP {})", self.bus, self.code)
    }
}
