//! Idle-timeout dimming.
//!
//! Two states: bright (showing `default_level`) and dimmed (showing the low
//! level). A single named alarm moves bright to dimmed; user interaction
//! moves back and re-arms the alarm, so the screen dims `auto_dim_seconds`
//! after the *last* interaction.

use chrono::{DateTime, Duration as ChronoDuration, Local};
use serde_json::json;

use super::state::BrightnessState;
use super::{BrightnessManager, log_store_failure};
use crate::bus::Message;
use crate::constants::{ALARM_AUTO_DIM, TOPIC_NIGHT_MODE_ENABLED};

impl BrightnessManager {
    /// Enable auto-dim, persist the flag and (re)start the idle timer.
    pub fn start_auto_dim(&self) {
        let now = self.time.now();
        let seconds = self.with_state(|state, _| {
            log_store_failure(state.config.set_auto_dim(true), "auto_dim");
            self.arm_dim_alarm(state, now);
            state.config().auto_dim_seconds
        });

        log_decorated!("Auto-dim enabled, dimming after {seconds}s idle");
    }

    /// Disable auto-dim, cancel the idle timer and restore the default level.
    ///
    /// At night with night mode on, dimming stays in effect until sunrise:
    /// the idle timer restarts instead of being cancelled.
    pub fn stop_auto_dim(&self) {
        let now = self.time.now();
        let night_dimming = self.with_state(|state, out| {
            log_store_failure(state.config.set_auto_dim(false), "auto_dim");
            if state.config().auto_nightmode && state.is_night(now) {
                self.arm_dim_alarm(state, now);
                return true;
            }
            self.disarm_dim_alarm(state);
            if state.current_level < state.default_level {
                let level = state.default_level;
                state.apply_or_log(level, out);
            }
            false
        });

        if night_dimming {
            log_decorated!("Auto-dim disabled, night dimming continues until sunrise");
        } else {
            log_decorated!("Auto-dim disabled");
        }
    }

    /// User interaction: restore the default level and restart the idle
    /// timer. Does nothing while dimming is not in effect.
    pub fn undim(&self) {
        let now = self.time.now();
        self.with_state(|state, out| {
            if !state.auto_dim_effective(now) {
                return;
            }
            if state.current_level < state.default_level {
                if self.debug_enabled {
                    log_debug!("Undimming to {}", state.default_level);
                }
                let level = state.default_level;
                state.apply_or_log(level, out);
            }
            self.arm_dim_alarm(state, now);
        });
    }

    /// Replace the pending dim alarm with one due `auto_dim_seconds` from now.
    pub(super) fn arm_dim_alarm(&self, state: &mut BrightnessState, now: DateTime<Local>) {
        state.dim_generation += 1;
        let generation = state.dim_generation;
        let seconds = i64::try_from(state.config().auto_dim_seconds).unwrap_or(i64::MAX);
        let due = now + ChronoDuration::seconds(seconds);

        let manager = self.this.clone();
        self.scheduler.schedule(ALARM_AUTO_DIM, due, move || {
            if let Some(manager) = manager.upgrade() {
                manager.on_dim_alarm(generation);
            }
        });

        if self.debug_enabled {
            log_debug!("Dim alarm armed for {}", due.format("%H:%M:%S"));
        }
    }

    pub(super) fn disarm_dim_alarm(&self, state: &mut BrightnessState) {
        state.dim_generation += 1;
        self.scheduler.cancel(ALARM_AUTO_DIM);
    }

    pub(super) fn on_dim_alarm(&self, generation: u64) {
        let now = self.time.now();
        self.with_state(|state, out| {
            // Re-armed or cancelled after this alarm was taken off the queue
            if generation != state.dim_generation {
                return;
            }
            if !state.auto_dim_effective(now) {
                return;
            }

            if state.current_level > state.levels.low {
                if self.debug_enabled {
                    log_debug!("Idle timeout, dimming to {}", state.levels.low);
                }
                let level = state.levels.low;
                state.apply_or_log(level, out);
            }

            if state.config().auto_nightmode && state.is_night(now) {
                out.push(Message::new(TOPIC_NIGHT_MODE_ENABLED, json!({})));
            }
        });
    }
}
