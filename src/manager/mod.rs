//! The brightness manager.
//!
//! Owns the display brightness and two policies layered on top of it:
//!
//! - **Auto-dim**: after `auto_dim_seconds` without interaction the screen
//!   drops to `low_brightness`; any interaction restores it and restarts the
//!   idle timer.
//! - **Auto night mode**: at sunset the default level becomes
//!   `night_default_brightness` and dimming is enabled for the night; at
//!   sunrise the day default comes back.
//!
//! All state lives in one [`Mutex`]. Bus handlers and scheduler alarms both
//! lock it; messages produced while it is held are emitted only after it is
//! released, so a synchronous bus can call straight back into the manager.
//! Time-driven behavior is built entirely from scheduler alarms.

mod auto_dim;
mod handlers;
mod night_mode;
pub(crate) mod state;

use chrono::{DateTime, Local};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::backend::{BrightnessBackend, DeviceInterface};
use crate::bus::{Message, MessageBus};
use crate::config::DisplayConfigStore;
use crate::geo::Location;
use crate::scheduler::Scheduler;
use crate::time_source::TimeSource;

pub use handlers::requested_level;
use state::{BrightnessState, Outbox};

/// Everything the manager needs at construction.
pub struct ManagerParams {
    /// Result of discovery; `None` disables brightness control.
    pub backend: Option<Box<dyn BrightnessBackend>>,
    pub config: DisplayConfigStore,
    pub location: Option<Location>,
    pub bus: Arc<dyn MessageBus>,
    pub scheduler: Arc<Scheduler>,
    pub time: Arc<dyn TimeSource>,
    pub debug_enabled: bool,
}

pub struct BrightnessManager {
    state: Mutex<BrightnessState>,
    bus: Arc<dyn MessageBus>,
    scheduler: Arc<Scheduler>,
    time: Arc<dyn TimeSource>,
    /// Handed to alarm callbacks and bus handlers so they never keep the
    /// manager alive.
    this: Weak<BrightnessManager>,
    debug_enabled: bool,
}

/// Point-in-time view for logging and the status command.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub interface: String,
    pub device: Option<String>,
    pub current_level: u32,
    pub default_level: u32,
    pub low_level: u32,
    pub night_default_level: u32,
    pub auto_dim: bool,
    pub auto_nightmode: bool,
    pub is_night: bool,
    pub sunrise: DateTime<Local>,
    pub sunset: DateTime<Local>,
    pub pending_alarms: Vec<(String, DateTime<Local>)>,
}

impl BrightnessManager {
    pub fn new(params: ManagerParams) -> Arc<Self> {
        let state = BrightnessState::new(params.backend, params.config, params.location);
        Arc::new_cyclic(|this| Self {
            state: Mutex::new(state),
            bus: params.bus,
            scheduler: params.scheduler,
            time: params.time,
            this: this.clone(),
            debug_enabled: params.debug_enabled,
        })
    }

    /// Subscribe to the bus and apply the persisted policies.
    pub fn start(self: &Arc<Self>) {
        self.register_handlers();

        let (auto_dim, auto_nightmode, interface) = {
            let state = self.lock_state();
            (
                state.config().auto_dim,
                state.config().auto_nightmode,
                state.interface(),
            )
        };

        log_block_start!("Brightness control: {interface}");
        if interface == DeviceInterface::Unknown {
            log_indented!("No controllable display, brightness requests will be refused");
        }

        if auto_dim {
            self.start_auto_dim();
        }
        if auto_nightmode {
            self.start_auto_night_mode();
        }
    }

    pub fn interface(&self) -> DeviceInterface {
        self.lock_state().interface()
    }

    /// Last applied or read level, without touching the hardware.
    pub fn current_level(&self) -> u32 {
        self.lock_state().current_level
    }

    /// Level that undim restores (the night level during night mode).
    pub fn default_level(&self) -> u32 {
        self.lock_state().default_level
    }

    pub fn auto_dim_enabled(&self) -> bool {
        self.lock_state().config().auto_dim
    }

    pub fn auto_nightmode_enabled(&self) -> bool {
        self.lock_state().config().auto_nightmode
    }

    pub fn status(&self) -> ManagerStatus {
        let now = self.time.now();
        let mut state = self.lock_state();
        let times = state.refresh_sun_times(now);
        ManagerStatus {
            interface: state.interface().to_string(),
            device: state.backend.as_ref().map(|b| b.describe()),
            current_level: state.current_level,
            default_level: state.default_level,
            low_level: state.levels.low,
            night_default_level: state.levels.night_default,
            auto_dim: state.config().auto_dim,
            auto_nightmode: state.config().auto_nightmode,
            is_night: times.is_night(),
            sunrise: times.sunrise,
            sunset: times.sunset,
            pending_alarms: self.scheduler.pending(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, BrightnessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Run `f` under the state lock, then emit whatever it queued.
    fn with_state<R>(&self, f: impl FnOnce(&mut BrightnessState, &mut Outbox) -> R) -> R {
        let mut out = Outbox::new();
        let result = {
            let mut state = self.lock_state();
            f(&mut state, &mut out)
        };
        self.flush(out);
        result
    }

    fn flush(&self, out: Outbox) {
        for message in out {
            self.bus.emit(message);
        }
    }

    fn emit(&self, message: Message) {
        self.bus.emit(message);
    }
}

/// Log a failed config store; the in-memory value still applies.
fn log_store_failure(result: anyhow::Result<bool>, key: &str) {
    if let Err(e) = result {
        log_pipe!();
        log_warning!("Failed to save {key}: {e:#}");
        log_indented!("The change applies until the next restart");
    }
}

#[cfg(test)]
mod tests;
