//! Mutable brightness state and the operations that touch the hardware.

use anyhow::Result;
use chrono::{DateTime, Local};
use serde_json::json;

use crate::backend::{BrightnessBackend, DeviceInterface, clamp_level};
use crate::bus::Message;
use crate::config::{DisplayConfig, DisplayConfigStore};
use crate::constants::TOPIC_DIM_UPDATE;
use crate::geo::{Location, SunTimes, get_suntimes};

/// Messages produced while the state lock is held, emitted after release.
pub(crate) type Outbox = Vec<Message>;

/// Target levels derived from the config, clamped to the active range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Levels {
    pub default: u32,
    pub night_default: u32,
    pub low: u32,
}

impl Levels {
    pub fn from_config(config: &DisplayConfig, max: Option<u32>) -> Self {
        let clamp = |level: u32| match max {
            Some(max) => clamp_level(level as i64, max),
            None => level,
        };
        Self {
            default: clamp(config.default_brightness),
            night_default: clamp(config.night_default_brightness),
            low: clamp(config.low_brightness),
        }
    }
}

pub(crate) struct BrightnessState {
    /// `None` when discovery found no usable display.
    pub backend: Option<Box<dyn BrightnessBackend>>,
    pub current_level: u32,
    /// Level restored on undim; the night level between sunset and sunrise.
    pub default_level: u32,
    pub levels: Levels,
    pub config: DisplayConfigStore,
    pub location: Option<Location>,
    pub sun_times: Option<SunTimes>,
    /// Bumped whenever the dim alarm is armed or disarmed.
    pub dim_generation: u64,
    /// Bumped whenever the night alarm is armed or disarmed.
    pub night_generation: u64,
}

impl BrightnessState {
    pub fn new(
        mut backend: Option<Box<dyn BrightnessBackend>>,
        config: DisplayConfigStore,
        location: Option<Location>,
    ) -> Self {
        let max = backend.as_ref().map(|b| b.max_level());
        let levels = Levels::from_config(config.config(), max);

        let current_level = match backend.as_mut().map(|b| b.get_level()) {
            Some(Ok(level)) => clamp_level(level as i64, max.unwrap_or(level)),
            Some(Err(e)) => {
                log_warning!("Could not read initial brightness: {e:#}");
                levels.default
            }
            None => levels.default,
        };

        Self {
            backend,
            current_level,
            default_level: levels.default,
            levels,
            config,
            location,
            sun_times: None,
            dim_generation: 0,
            night_generation: 0,
        }
    }

    pub fn interface(&self) -> DeviceInterface {
        self.backend
            .as_ref()
            .map(|b| b.interface())
            .unwrap_or(DeviceInterface::Unknown)
    }

    pub fn max_level(&self) -> Option<u32> {
        self.backend.as_ref().map(|b| b.max_level())
    }

    pub fn config(&self) -> &DisplayConfig {
        self.config.config()
    }

    /// Read the hardware level, falling back to the cache on any failure.
    pub fn refresh_level(&mut self, debug_enabled: bool) -> u32 {
        let Some(backend) = self.backend.as_mut() else {
            return self.current_level;
        };
        match backend.get_level() {
            Ok(level) => {
                self.current_level = clamp_level(level as i64, backend.max_level());
            }
            Err(e) => {
                if debug_enabled {
                    log_debug!("Using cached brightness {}: {e:#}", self.current_level);
                }
            }
        }
        self.current_level
    }

    /// Clamp and apply a level, announcing the change on success.
    ///
    /// A level equal to the cache skips the hardware write and the
    /// announcement. The cache only changes after a successful write.
    pub fn apply_level(&mut self, level: i64, out: &mut Outbox) -> Result<u32> {
        let Some(backend) = self.backend.as_mut() else {
            anyhow::bail!("Brightness control unavailable");
        };
        let level = clamp_level(level, backend.max_level());
        if level == self.current_level {
            return Ok(level);
        }

        backend.set_level(level)?;
        self.current_level = level;
        out.push(Message::new(TOPIC_DIM_UPDATE, json!({ "brightness": level })));
        Ok(level)
    }

    /// [`apply_level`](Self::apply_level) for internal transitions, where a
    /// failure is logged and otherwise ignored.
    pub fn apply_or_log(&mut self, level: u32, out: &mut Outbox) {
        if self.backend.is_none() {
            return;
        }
        if let Err(e) = self.apply_level(level as i64, out) {
            log_pipe!();
            log_warning!("Failed to set brightness to {level}: {e:#}");
        }
    }

    /// Recompute sun times for `now` and cache them.
    pub fn refresh_sun_times(&mut self, now: DateTime<Local>) -> SunTimes {
        let times = get_suntimes(now, self.config.config(), self.location.as_ref());
        self.sun_times = Some(times);
        times
    }

    pub fn is_night(&mut self, now: DateTime<Local>) -> bool {
        self.refresh_sun_times(now).is_night()
    }

    /// Dimming applies when the user enabled it, or night mode is on and it
    /// is night.
    pub fn auto_dim_effective(&mut self, now: DateTime<Local>) -> bool {
        let config = self.config.config();
        if config.auto_dim {
            return true;
        }
        config.auto_nightmode && self.is_night(now)
    }

    /// Recompute target levels after a config change. The night level stays
    /// the default between sunset and sunrise.
    pub fn update_levels(&mut self, night_active: bool) {
        self.levels = Levels::from_config(self.config.config(), self.max_level());
        self.default_level = if night_active {
            self.levels.night_default
        } else {
            self.levels.default
        };
    }
}
