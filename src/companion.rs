//! Application coordinator for the brightness daemon.
//!
//! Acquires the process-wide resources (instance lock, signal thread, config
//! watcher, bus connection, scheduler worker), wires them into a
//! [`BrightnessManager`] and then blocks on the signal channel until shutdown.
//!
//! The `DisplayCompanion` builder supports two startup contexts:
//! - Normal startup: `DisplayCompanion::new(options).run()`
//! - Embedded or test runs: `DisplayCompanion::new(options).without_lock().run()`

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;

use crate::args::RunOptions;
use crate::backend::{SystemCommandRunner, discover};
use crate::bus::{LocalBus, WebSocketBridge, default_bus_url};
use crate::config::{
    self, ConfigWatcher, DisplayConfigStore, display_config_path, system_display_config_path,
};
use crate::constants::DEFAULT_BACKLIGHT_DIR;
use crate::geo::Location;
use crate::lock::{acquire_lock, default_lock_path};
use crate::manager::{BrightnessManager, ManagerParams};
use crate::scheduler::Scheduler;
use crate::signals::{SignalMessage, setup_signal_handler};
use crate::time_source::{RealTimeSource, TimeSource};

pub struct DisplayCompanion {
    options: RunOptions,
    create_lock: bool,
    show_headers: bool,
}

impl DisplayCompanion {
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            create_lock: true,
            show_headers: true,
        }
    }

    /// Skip the single-instance lock.
    pub fn without_lock(mut self) -> Self {
        self.create_lock = false;
        self
    }

    pub fn without_headers(mut self) -> Self {
        self.show_headers = false;
        self
    }

    /// Run until SIGINT, SIGTERM or SIGHUP.
    pub fn run(self) -> Result<()> {
        let debug_enabled = self.options.debug_enabled;

        if self.show_headers {
            log_version!();
            if debug_enabled {
                log_pipe!();
                log_debug!("Debug mode enabled, showing detailed hardware and bus operations");
            }
        }

        // Held until the end of run
        let _lock = if self.create_lock {
            match acquire_lock(&default_lock_path())? {
                Some(lock) => Some(lock),
                None => return Ok(()),
            }
        } else {
            None
        };

        let signal_state = setup_signal_handler(debug_enabled)?;

        let config_path = display_config_path()?;
        let store = DisplayConfigStore::load_or_default(
            config_path.clone(),
            system_display_config_path(),
        );

        if let Err(e) =
            ConfigWatcher::new(signal_state.signal_sender.clone(), config_path, debug_enabled)
                .start()
        {
            log_pipe!();
            log_warning!("Config file watching unavailable: {e:#}");
            log_indented!("Use SIGUSR2 or the bus events to reload settings");
        }

        let location = load_location();
        let backend = discover(
            Arc::new(SystemCommandRunner::new(debug_enabled)),
            self.backlight_dir(),
            debug_enabled,
        );

        let time: Arc<dyn TimeSource> = Arc::new(RealTimeSource);
        let scheduler = Arc::new(Scheduler::new(Arc::clone(&time)));
        scheduler.start()?;

        let bus = Arc::new(LocalBus::new());
        let bus_url = self
            .options
            .bus_url
            .clone()
            .unwrap_or_else(default_bus_url);
        let bridge = WebSocketBridge::new(
            bus_url,
            Arc::clone(&bus),
            Arc::clone(&signal_state.running),
            debug_enabled,
        )
        .start()
        .context("Failed to start the bus connection")?;

        let manager = BrightnessManager::new(ManagerParams {
            backend,
            config: store,
            location,
            bus,
            scheduler: Arc::clone(&scheduler),
            time,
            debug_enabled,
        });
        manager.start();

        while let Ok(message) = signal_state.signal_receiver.recv() {
            match message {
                SignalMessage::Reload => {
                    log_pipe!();
                    log_info!("Reloading display settings");
                    if let Err(e) = manager.reload_config() {
                        log_warning!("Keeping current display settings: {e:#}");
                    }
                }
                SignalMessage::Shutdown => break,
            }
        }

        log_block_start!("Shutting down");
        signal_state.running.store(false, Ordering::SeqCst);
        scheduler.shutdown();
        if bridge.join().is_err() && debug_enabled {
            log_debug!("Bus thread ended with a panic");
        }
        log_end!();
        Ok(())
    }

    fn backlight_dir(&self) -> PathBuf {
        self.options
            .backlight_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_BACKLIGHT_DIR))
    }
}

/// Device location, or `None` (fixed fallback sun times) when not configured.
pub fn load_location() -> Option<Location> {
    match Location::load(&config::core_config_paths()) {
        Ok(Some(location)) => {
            log_block_start!("Location: {location}");
            Some(location)
        }
        Ok(None) => {
            log_pipe!();
            log_warning!("No location configured, using fixed sunrise and sunset times");
            None
        }
        Err(e) => {
            log_pipe!();
            log_warning!("Ignoring location settings: {e:#}");
            None
        }
    }
}
