//! # display-companion
//!
//! Brightness control for the display of a voice assistant device.
//!
//! The library exists so the daemon's internals can be exercised by
//! integration tests; `main.rs` only parses arguments and dispatches.
//!
//! ## Layout
//!
//! - **Hardware**: `backend` discovers a DSI panel or an HDMI monitor (DDC/CI)
//!   and reads and writes its brightness through external tools or sysfs
//! - **Policy**: `manager` owns the brightness state, the auto-dim idle timer
//!   and the sunrise/sunset night profile
//! - **Time**: `scheduler` runs named one-shot alarms; `geo` computes sun
//!   times; `time_source` lets tests drive the clock
//! - **Surfaces**: `bus` speaks the assistant's JSON message bus; `config`
//!   persists and hot-reloads the display settings
//! - **Process**: `companion` wires everything together; `signals`, `lock`
//!   and `logger` cover the daemon lifecycle

// Import macros from logger module for use in all submodules
#[macro_use]
pub mod logger;

pub mod args;
pub mod backend;
pub mod bus;
pub mod commands;
pub mod companion;
pub mod config;
pub mod constants;
pub mod geo;
pub mod lock;
pub mod manager;
pub mod scheduler;
pub mod signals;
pub mod time_source;

pub use companion::DisplayCompanion;
