//! One-time discovery of the display backend.
//!
//! Probing order:
//! 1. Neither `vcgencmd` nor `ddcutil` installed: no brightness control.
//! 2. `vcgencmd get_config display_default_lcd` reports the LCD: DSI backlight.
//! 3. Otherwise, when `ddcutil` is installed: find the monitor's I2C bus, then
//!    the VCP code of its brightness control.
//!
//! Every failure is logged and ends in "no backend"; discovery never returns
//! an error to the caller.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::ddc::{parse_brightness_code, parse_i2c_bus};
use super::{BrightnessBackend, CommandRunner, DdcBackend, DsiBackend, find_tool};
use crate::constants::{COMMAND_TIMEOUT, DDCUTIL, DSI_SENTINELS, VCGENCMD};

/// Inputs to discovery.
pub struct Discovery {
    pub vcgencmd: Option<PathBuf>,
    pub ddcutil: Option<PathBuf>,
    pub backlight_dir: PathBuf,
    pub runner: Arc<dyn CommandRunner>,
    pub timeout: Duration,
    pub debug_enabled: bool,
}

impl Discovery {
    /// Look the tools up on this system.
    pub fn from_system(
        runner: Arc<dyn CommandRunner>,
        backlight_dir: PathBuf,
        debug_enabled: bool,
    ) -> Self {
        Self {
            vcgencmd: find_tool(VCGENCMD),
            ddcutil: find_tool(DDCUTIL),
            backlight_dir,
            runner,
            timeout: COMMAND_TIMEOUT,
            debug_enabled,
        }
    }

    /// Probe the hardware. `None` means brightness control is unavailable.
    pub fn run(&self) -> Option<Box<dyn BrightnessBackend>> {
        if self.vcgencmd.is_none() && self.ddcutil.is_none() {
            log_pipe!();
            log_warning!("Neither {VCGENCMD} nor {DDCUTIL} found, brightness control disabled");
            return None;
        }

        if let Some(vcgencmd) = &self.vcgencmd {
            match self.lcd_is_default(vcgencmd) {
                Ok(true) => return self.dsi(),
                Ok(false) => {
                    if self.debug_enabled {
                        log_debug!("Display is not the DSI panel, trying HDMI");
                    }
                }
                Err(e) => {
                    log_pipe!();
                    log_warning!("Display probe failed: {e:#}");
                }
            }
        }

        let Some(ddcutil) = &self.ddcutil else {
            log_pipe!();
            log_warning!("HDMI display detected but {DDCUTIL} is not installed");
            log_indented!("Brightness control disabled");
            return None;
        };

        match self.hdmi(ddcutil) {
            Ok(backend) => Some(Box::new(backend)),
            Err(e) => {
                log_pipe!();
                log_warning!("HDMI brightness control unavailable: {e:#}");
                None
            }
        }
    }

    fn lcd_is_default(&self, vcgencmd: &Path) -> Result<bool> {
        let args = vec!["get_config".to_string(), "display_default_lcd".to_string()];
        let output = self.runner.run(vcgencmd, &args, self.timeout)?;
        let value = output.trim();
        if self.debug_enabled {
            log_debug!("{VCGENCMD} reported '{value}'");
        }
        Ok(DSI_SENTINELS.contains(&value))
    }

    fn dsi(&self) -> Option<Box<dyn BrightnessBackend>> {
        if DsiBackend::probe(&self.backlight_dir) {
            return Some(Box::new(DsiBackend::new(self.backlight_dir.clone())));
        }
        log_pipe!();
        log_warning!(
            "DSI display reported but no backlight at {}",
            self.backlight_dir.display()
        );
        log_indented!("Brightness control disabled");
        None
    }

    fn hdmi(&self, ddcutil: &Path) -> Result<DdcBackend> {
        let detect = self
            .runner
            .run(ddcutil, &["detect".to_string()], self.timeout)
            .context("Monitor detection failed")?;
        let bus = parse_i2c_bus(&detect).context("No I2C bus in ddcutil detect output")?;

        let args = vec![
            "getvcp".to_string(),
            "known".to_string(),
            "--bus".to_string(),
            bus.clone(),
        ];
        let known = self
            .runner
            .run(ddcutil, &args, self.timeout)
            .with_context(|| format!("Failed to list VCP codes on bus {bus}"))?;
        let code = parse_brightness_code(&known)
            .with_context(|| format!("Monitor on bus {bus} has no brightness control"))?;

        if self.debug_enabled {
            log_debug!("Found monitor on i2c-{bus}, brightness VCP code {code}");
        }

        Ok(DdcBackend::new(
            self.runner.clone(),
            ddcutil.to_path_buf(),
            bus,
            code,
            self.timeout,
        ))
    }
}

/// Discover the backend on this system.
pub fn discover(
    runner: Arc<dyn CommandRunner>,
    backlight_dir: PathBuf,
    debug_enabled: bool,
) -> Option<Box<dyn BrightnessBackend>> {
    Discovery::from_system(runner, backlight_dir, debug_enabled).run()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::DeviceInterface;
    use crate::backend::command::MockCommandRunner;
    use crate::constants::BACKLIGHT_STATUS_FILE;

    fn discovery(
        runner: MockCommandRunner,
        vcgencmd: bool,
        ddcutil: bool,
        backlight_dir: &Path,
    ) -> Discovery {
        crate::logger::Log::set_enabled(false);
        Discovery {
            vcgencmd: vcgencmd.then(|| PathBuf::from("/opt/vc/bin/vcgencmd")),
            ddcutil: ddcutil.then(|| PathBuf::from("/usr/bin/ddcutil")),
            backlight_dir: backlight_dir.to_path_buf(),
            runner: Arc::new(runner),
            timeout: Duration::from_secs(1),
            debug_enabled: false,
        }
    }

    fn is_vcgencmd(program: &Path) -> bool {
        program.ends_with("vcgencmd")
    }

    #[test]
    fn test_no_tools_runs_nothing() {
        let mut runner = MockCommandRunner::new();
        runner.expect_run().times(0);
        let dir = tempfile::tempdir().unwrap();
        assert!(discovery(runner, false, false, dir.path()).run().is_none());
    }

    #[test]
    fn test_dsi_sentinels_select_backlight() {
        for sentinel in ["1", "display_default_lcd=1\n"] {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(dir.path().join(BACKLIGHT_STATUS_FILE), "255").unwrap();

            let mut runner = MockCommandRunner::new();
            let output = sentinel.to_string();
            runner
                .expect_run()
                .withf(|program, _, _| is_vcgencmd(program))
                .times(1)
                .returning(move |_, _, _| Ok(output.clone()));

            let backend = discovery(runner, true, true, dir.path()).run().unwrap();
            assert_eq!(backend.interface(), DeviceInterface::Dsi);
        }
    }

    #[test]
    fn test_dsi_without_backlight_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .returning(|_, _, _| Ok("display_default_lcd=1".into()));
        assert!(discovery(runner, true, false, dir.path()).run().is_none());
    }

    #[test]
    fn test_hdmi_discovery_parses_bus_and_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _, _| is_vcgencmd(program))
            .returning(|_, _, _| Ok("display_default_lcd=0".into()));
        runner
            .expect_run()
            .withf(|_, args, _| args == ["detect"])
            .returning(|_, _, _| Ok("Display 1\n   I2C bus:  /dev/i2c-4\n".into()));
        runner
            .expect_run()
            .withf(|_, args, _| args == ["getvcp", "known", "--bus", "4"])
            .returning(|_, _, _| {
                Ok("VCP code 0x10 (Brightness): current value = 50, max value = 100\n".into())
            });

        let backend = discovery(runner, true, true, dir.path()).run().unwrap();
        assert_eq!(backend.interface(), DeviceInterface::Hdmi);
        assert_eq!(backend.describe(), "HDMI monitor on i2c-4 (VCP 0x10)");
    }

    #[test]
    fn test_hdmi_without_ddcutil_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .times(1)
            .returning(|_, _, _| Ok("display_default_lcd=0".into()));
        assert!(discovery(runner, true, false, dir.path()).run().is_none());
    }

    #[test]
    fn test_missing_bus_is_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|_, args, _| args == ["detect"])
            .times(1)
            .returning(|_, _, _| Ok("No displays found.\n".into()));
        assert!(discovery(runner, false, true, dir.path()).run().is_none());
    }

    #[test]
    fn test_vcgencmd_failure_falls_through_to_hdmi() {
        let dir = tempfile::tempdir().unwrap();
        let mut runner = MockCommandRunner::new();
        runner
            .expect_run()
            .withf(|program, _, _| is_vcgencmd(program))
            .returning(|_, _, _| Err(anyhow::anyhow!("timed out")));
        runner
            .expect_run()
            .withf(|_, args, _| args == ["detect"])
            .returning(|_, _, _| Err(anyhow::anyhow!("exited with 1")));
        assert!(discovery(runner, true, true, dir.path()).run().is_none());
    }
}
