//! Bus request handling, config reloads and reset.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use std::sync::Arc;

use super::BrightnessManager;
use super::state::Outbox;
use crate::backend::{DeviceInterface, clamp_level, level_from_fraction, level_to_percent};
use crate::bus::Message;
use crate::constants::*;

/// Native level for a `brightness` payload value.
///
/// Numbers (or numeric strings) up to 1 are fractions of the full range and
/// go through [`level_from_fraction`]; anything above 1 is a native level
/// and is only clamped.
pub fn requested_level(value: &Value, max: u32) -> Result<u32> {
    let raw = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
    .with_context(|| format!("Invalid brightness level provided: {value}"))?;

    if raw <= 1.0 {
        Ok(level_from_fraction(raw, max))
    } else {
        Ok(clamp_level(raw.round() as i64, max))
    }
}

impl BrightnessManager {
    pub(super) fn register_handlers(self: &Arc<Self>) {
        self.subscribe(TOPIC_GET, |manager, message| manager.handle_get(message));
        self.subscribe(TOPIC_SET, |manager, message| manager.handle_set(message));
        self.subscribe(TOPIC_SYNC, |manager, message| manager.handle_sync(message));
        self.subscribe(TOPIC_AUTO_DIM_CHANGED, |manager, _| {
            manager.handle_auto_dim_changed()
        });
        self.subscribe(TOPIC_NIGHT_MODE_CHANGED, |manager, _| {
            manager.handle_night_mode_changed()
        });
        self.subscribe(TOPIC_RESET_REQUEST, |manager, _| manager.reset_to_default());
        for topic in INTERACTION_TOPICS {
            self.subscribe(topic, |manager, _| manager.undim());
        }
    }

    fn subscribe<F>(self: &Arc<Self>, topic: &str, handler: F)
    where
        F: Fn(&BrightnessManager, &Message) + Send + Sync + 'static,
    {
        let manager = Arc::downgrade(self);
        self.bus.on(
            topic,
            Arc::new(move |message: &Message| {
                if let Some(manager) = manager.upgrade() {
                    handler(&manager, message);
                }
            }),
        );
    }

    /// Read the hardware level, or the cached one when reading fails.
    pub fn get_brightness(&self) -> u32 {
        let debug_enabled = self.debug_enabled;
        self.lock_state().refresh_level(debug_enabled)
    }

    /// Apply a native level. Refused when no display is controllable.
    pub fn set_brightness(&self, level: i64) -> Result<u32> {
        let level = self.with_state(|state, out| state.apply_level(level, out))?;
        if self.debug_enabled {
            log_debug!("Brightness set to {level}");
        }
        Ok(level)
    }

    /// Apply a 0-1 fraction of the full range, on a 10-step grid.
    pub fn set_brightness_fraction(&self, fraction: f64) -> Result<u32> {
        self.with_state(|state, out| {
            let Some(max) = state.max_level() else {
                anyhow::bail!("Brightness control unavailable");
            };
            state.apply_level(level_from_fraction(fraction, max) as i64, out)
        })
    }

    fn handle_get(&self, message: &Message) {
        let debug_enabled = self.debug_enabled;
        let reply = {
            let mut state = self.lock_state();
            let level = state.refresh_level(debug_enabled);
            match state.interface() {
                DeviceInterface::Unknown => message.reply(
                    TOPIC_GET_ERROR,
                    json!({ "error": "Brightness control unavailable" }),
                ),
                DeviceInterface::Dsi => message.reply(
                    TOPIC_GET_RESPONSE,
                    json!({ "brightness": level_to_percent(level, MAX_BRIGHTNESS_DSI) }),
                ),
                DeviceInterface::Hdmi => {
                    message.reply(TOPIC_GET_RESPONSE, json!({ "brightness": level }))
                }
            }
        };
        self.emit(reply);
    }

    fn handle_set(&self, message: &Message) {
        let result = self.with_state(|state, out| -> Result<u32> {
            let value = message
                .get("brightness")
                .context("No brightness level provided")?;
            let max = state
                .max_level()
                .context("Brightness control unavailable")?;
            let level = requested_level(value, max)?;
            state.apply_level(level as i64, out)
        });

        let reply = match result {
            Ok(level) => {
                if self.debug_enabled {
                    log_debug!("Brightness set to {level} from bus");
                }
                message.reply(TOPIC_SET_RESPONSE, json!({ "brightness": level }))
            }
            Err(e) => {
                log_pipe!();
                log_warning!("Brightness request rejected: {e:#}");
                message.reply(TOPIC_SET_ERROR, json!({ "error": format!("{e:#}") }))
            }
        };
        self.emit(reply);
    }

    /// Another component changed the brightness itself; adopt its value
    /// without writing or re-announcing it.
    fn handle_sync(&self, message: &Message) {
        let mut state = self.lock_state();
        let Some(max) = state.max_level() else {
            return;
        };
        let Some(value) = message.get("brightness") else {
            return;
        };
        match requested_level(value, max) {
            Ok(level) => {
                state.current_level = level;
                if self.debug_enabled {
                    log_debug!("Brightness synced to {level}");
                }
            }
            Err(e) => {
                if self.debug_enabled {
                    log_debug!("Ignoring sync: {e}");
                }
            }
        }
    }

    fn handle_auto_dim_changed(&self) {
        let before = self.auto_dim_enabled();
        self.reload_or_log();
        let enabled = self.auto_dim_enabled();
        // A flip was already handled by the reload
        if enabled == before {
            if enabled {
                self.start_auto_dim();
            } else {
                self.stop_auto_dim();
            }
        }
    }

    fn handle_night_mode_changed(&self) {
        let before = self.auto_nightmode_enabled();
        self.reload_or_log();
        let enabled = self.auto_nightmode_enabled();
        if enabled == before {
            if enabled {
                self.start_auto_night_mode();
            } else {
                self.stop_auto_night_mode();
            }
        }
    }

    fn reload_or_log(&self) {
        if let Err(e) = self.reload_config() {
            log_pipe!();
            log_warning!("Keeping current display settings: {e:#}");
        }
    }

    /// Re-read the display config and act on what changed.
    ///
    /// Flags that flipped start or stop their policy; changed levels or sun
    /// times re-apply the current profile. On error nothing changes.
    pub fn reload_config(&self) -> Result<()> {
        let now = self.time.now();
        let (previous, current, shown_default) = {
            let mut state = self.lock_state();
            let previous = state.config.reload()?;
            let current = state.config().clone();
            let shown_default = state.current_level == state.default_level;
            let night_active = current.auto_nightmode && state.is_night(now);
            state.update_levels(night_active);
            (previous, current, shown_default)
        };

        if previous == current {
            return Ok(());
        }
        log_pipe!();
        log_info!("Display settings changed");

        if previous.auto_dim != current.auto_dim {
            if current.auto_dim {
                self.start_auto_dim();
            } else {
                self.stop_auto_dim();
            }
        }

        let levels_changed = previous.default_brightness != current.default_brightness
            || previous.night_default_brightness != current.night_default_brightness
            || previous.low_brightness != current.low_brightness;
        let sun_changed = previous.sunrise_time != current.sunrise_time
            || previous.sunset_time != current.sunset_time;

        if previous.auto_nightmode != current.auto_nightmode {
            if current.auto_nightmode {
                self.start_auto_night_mode();
            } else {
                self.stop_auto_night_mode();
            }
        } else if current.auto_nightmode && (levels_changed || sun_changed) {
            self.with_state(|state, out| {
                self.evaluate_night_mode(state, now, out);
            });
        } else if levels_changed && shown_default {
            self.with_state(|state, out| {
                let level = state.default_level;
                state.apply_or_log(level, out);
            });
        }

        if previous.auto_dim_seconds != current.auto_dim_seconds && current.auto_dim {
            // Pick up the new timeout without waiting for an interaction
            self.start_auto_dim();
        }

        Ok(())
    }

    /// Back to factory behavior: auto-dim off, night mode on, default level.
    pub fn reset_to_default(&self) {
        log_block_start!("Resetting brightness settings to defaults");

        self.with_state(|state, _| {
            self.disarm_dim_alarm(state);
            super::log_store_failure(state.config.set_auto_dim(false), "auto_dim");
        });
        self.start_auto_night_mode();

        let mut out = Outbox::new();
        {
            let mut state = self.lock_state();
            let level = state.default_level;
            state.apply_or_log(level, &mut out);
            out.push(Message::new(
                TOPIC_RESET,
                json!({
                    "brightness": state.current_level,
                    "auto_dim": state.config().auto_dim,
                    "auto_nightmode": state.config().auto_nightmode,
                }),
            ));
        }
        self.flush(out);
    }
}
