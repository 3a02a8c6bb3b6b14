//! Sunset/sunrise driven night profile.
//!
//! Each transition schedules exactly one alarm, for the next opposite
//! transition. Sun times are recomputed against the current clock every time
//! a decision is made, so a stale cached value can never pick the wrong
//! profile.

use chrono::{DateTime, Local};
use serde_json::json;

use super::state::{BrightnessState, Outbox};
use super::{BrightnessManager, log_store_failure};
use crate::bus::Message;
use crate::constants::{ALARM_NIGHT_MODE, TOPIC_MAIN_VIEW_INDEX, TOPIC_NIGHT_MODE_ENABLED};

impl BrightnessManager {
    /// Enable night mode, persist the flag and apply the profile for the
    /// current time of day.
    pub fn start_auto_night_mode(&self) {
        let now = self.time.now();
        let (is_night, sunrise, sunset) = self.with_state(|state, out| {
            log_store_failure(state.config.set_auto_nightmode(true), "auto_nightmode");
            self.evaluate_night_mode(state, now, out)
        });

        log_decorated!("Auto night mode enabled");
        log_indented!(
            "Currently {}, next sunrise {}, next sunset {}",
            if is_night { "night" } else { "day" },
            sunrise.format("%a %H:%M"),
            sunset.format("%a %H:%M")
        );
    }

    /// Disable night mode and cancel the pending sunrise/sunset alarm.
    ///
    /// The day default becomes the undim target again. Brightness only
    /// changes when night-time dimming had left the screen dimmed with
    /// nothing left to undim it.
    pub fn stop_auto_night_mode(&self) {
        self.with_state(|state, out| {
            log_store_failure(state.config.set_auto_nightmode(false), "auto_nightmode");
            self.disarm_night_alarm(state);
            state.default_level = state.levels.default;
            if !state.config().auto_dim {
                self.disarm_dim_alarm(state);
                if state.current_level <= state.levels.low && state.levels.low < state.default_level {
                    let level = state.default_level;
                    state.apply_or_log(level, out);
                }
            }
        });

        log_decorated!("Auto night mode disabled");
    }

    /// Run the transition matching `now` and schedule the next one.
    /// Returns `(is_night, next_sunrise, next_sunset)`.
    pub(super) fn evaluate_night_mode(
        &self,
        state: &mut BrightnessState,
        now: DateTime<Local>,
        out: &mut Outbox,
    ) -> (bool, DateTime<Local>, DateTime<Local>) {
        let times = state.refresh_sun_times(now);
        if times.is_night() {
            self.sunset_transition(state, now, times.sunrise, out);
        } else {
            self.sunrise_transition(state, times.sunset, out);
        }
        (times.is_night(), times.sunrise, times.sunset)
    }

    fn sunset_transition(
        &self,
        state: &mut BrightnessState,
        now: DateTime<Local>,
        next_sunrise: DateTime<Local>,
        out: &mut Outbox,
    ) {
        if self.debug_enabled {
            log_debug!("Sunset: night brightness {}", state.levels.night_default);
        }

        state.default_level = state.levels.night_default;
        let level = state.default_level;
        state.apply_or_log(level, out);
        out.push(Message::new(TOPIC_NIGHT_MODE_ENABLED, json!({})));

        // Night implies dimming even without the user setting, and the
        // night level just shown restarts the idle timer
        self.arm_dim_alarm(state, now);

        self.arm_night_alarm(state, next_sunrise);
    }

    fn sunrise_transition(
        &self,
        state: &mut BrightnessState,
        next_sunset: DateTime<Local>,
        out: &mut Outbox,
    ) {
        if self.debug_enabled {
            log_debug!("Sunrise: day brightness {}", state.levels.default);
        }

        state.default_level = state.levels.default;
        out.push(Message::new(
            TOPIC_MAIN_VIEW_INDEX,
            json!({ "current_index": 0 }),
        ));

        let level = state.default_level;
        if !state.config().auto_dim {
            self.disarm_dim_alarm(state);
            state.apply_or_log(level, out);
        } else if state.current_level > state.levels.low {
            // A dimmed screen stays dimmed until the next interaction
            state.apply_or_log(level, out);
        }

        self.arm_night_alarm(state, next_sunset);
    }

    fn arm_night_alarm(&self, state: &mut BrightnessState, due: DateTime<Local>) {
        state.night_generation += 1;
        let generation = state.night_generation;

        let manager = self.this.clone();
        self.scheduler.schedule(ALARM_NIGHT_MODE, due, move || {
            if let Some(manager) = manager.upgrade() {
                manager.on_night_alarm(generation);
            }
        });

        if self.debug_enabled {
            log_debug!("Night mode alarm armed for {}", due.format("%Y-%m-%d %H:%M:%S"));
        }
    }

    pub(super) fn disarm_night_alarm(&self, state: &mut BrightnessState) {
        state.night_generation += 1;
        self.scheduler.cancel(ALARM_NIGHT_MODE);
    }

    pub(super) fn on_night_alarm(&self, generation: u64) {
        let now = self.time.now();
        let transition = self.with_state(|state, out| {
            if generation != state.night_generation || !state.config().auto_nightmode {
                return None;
            }
            Some(self.evaluate_night_mode(state, now, out))
        });

        if let Some((is_night, sunrise, sunset)) = transition {
            log_pipe!();
            if is_night {
                log_info!("Sunset reached, night profile active until {}", sunrise.format("%H:%M"));
            } else {
                log_info!("Sunrise reached, day profile active until {}", sunset.format("%H:%M"));
            }
        }
    }
}
