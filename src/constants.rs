//! Shared constants: bus topics, config keys, defaults and device paths.

use std::time::Duration;

// # Bus topics (inbound)

pub const TOPIC_GET: &str = "phal.brightness.control.get";
pub const TOPIC_SET: &str = "phal.brightness.control.set";
pub const TOPIC_SYNC: &str = "phal.brightness.control.sync";
pub const TOPIC_AUTO_DIM_CHANGED: &str = "speaker.extension.display.auto.dim.changed";
pub const TOPIC_NIGHT_MODE_CHANGED: &str = "speaker.extension.display.auto.nightmode.changed";
pub const TOPIC_RESET_REQUEST: &str = "phal.brightness.control.reset.request";

/// Topics that count as user interaction and reset the idle timer.
pub const INTERACTION_TOPICS: [&str; 4] = [
    "gui.page_interaction",
    "gui.page_gained_focus",
    "recognizer_loop:wakeword",
    "recognizer_loop:record_begin",
];

// # Bus topics (outbound)

pub const TOPIC_DIM_UPDATE: &str = "phal.brightness.control.auto.dim.update";
pub const TOPIC_GET_RESPONSE: &str = "phal.brightness.control.get.response";
pub const TOPIC_GET_ERROR: &str = "phal.brightness.control.get.error";
pub const TOPIC_SET_RESPONSE: &str = "phal.brightness.control.set.response";
pub const TOPIC_SET_ERROR: &str = "phal.brightness.control.set.error";
pub const TOPIC_NIGHT_MODE_ENABLED: &str = "phal.brightness.control.auto.night.mode.enabled";
pub const TOPIC_MAIN_VIEW_INDEX: &str = "ovos.homescreen.main_view.current_index.set";
pub const TOPIC_RESET: &str = "phal.brightness.control.reset";

// # Scheduler alarm names

pub const ALARM_AUTO_DIM: &str = "display-companion.auto.dim";
pub const ALARM_NIGHT_MODE: &str = "display-companion.night.mode";

// # Display config defaults

pub const DEFAULT_AUTO_DIM: bool = false;
pub const DEFAULT_AUTO_NIGHTMODE: bool = true;
pub const DEFAULT_AUTO_DIM_SECONDS: u64 = 60;
pub const DEFAULT_LOW_BRIGHTNESS: u32 = 20;
pub const DEFAULT_BRIGHTNESS: u32 = 100;
pub const DEFAULT_NIGHT_BRIGHTNESS: u32 = 70;

pub const MINIMUM_AUTO_DIM_SECONDS: u64 = 5;
pub const MAXIMUM_AUTO_DIM_SECONDS: u64 = 86_400;

/// Fallback sunrise when no override or location is usable (HH, MM).
pub const FALLBACK_SUNRISE: (u32, u32) = (6, 30);
/// Fallback sunset when no override or location is usable (HH, MM).
pub const FALLBACK_SUNSET: (u32, u32) = (22, 30);

// # Device

pub const MIN_BRIGHTNESS: u32 = 0;
pub const MAX_BRIGHTNESS_DSI: u32 = 255;
pub const MAX_BRIGHTNESS_HDMI: u32 = 100;

/// Fractional requests are rounded to this step before being applied.
pub const BRIGHTNESS_STEP: u32 = 10;

pub const DEFAULT_BACKLIGHT_DIR: &str = "/sys/class/backlight/rpi_backlight";
pub const BACKLIGHT_STATUS_FILE: &str = "actual_brightness";
pub const BACKLIGHT_CONTROL_FILE: &str = "brightness";

pub const VCGENCMD: &str = "vcgencmd";
pub const DDCUTIL: &str = "ddcutil";

/// Checked after `PATH` when looking up vendor tools.
pub const EXTRA_TOOL_DIRS: [&str; 2] = ["/opt/vc/bin", "/usr/bin"];

/// Sentinel outputs of `vcgencmd get_config display_default_lcd` meaning DSI.
pub const DSI_SENTINELS: [&str; 2] = ["1", "display_default_lcd=1"];

/// Upper bound for any vendor tool invocation.
pub const COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

// # Files

pub const DISPLAY_CONFIG_FILE: &str = "OvosDisplay.conf";
pub const SYSTEM_DISPLAY_CONFIG: &str = "/etc/xdg/OvosDisplay.conf";
pub const LOCATION_CONFIG_FILE: &str = "mycroft/mycroft.conf";
pub const SYSTEM_LOCATION_CONFIG: &str = "/etc/mycroft/mycroft.conf";
pub const LOCK_FILE_NAME: &str = "display-companion.lock";

// # Messagebus

pub const DEFAULT_BUS_HOST: &str = "127.0.0.1";
pub const DEFAULT_BUS_PORT: u16 = 8181;
pub const DEFAULT_BUS_ROUTE: &str = "/core";
pub const DEFAULT_BUS_URL: &str = "ws://127.0.0.1:8181/core";

// # Timing

/// Longest the scheduler thread sleeps before re-checking the clock.
pub const SCHEDULER_MAX_WAIT: Duration = Duration::from_secs(30);
pub const BUS_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const BUS_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// A messagebus write blocked longer than this drops the connection.
pub const BUS_WRITE_TIMEOUT: Duration = Duration::from_secs(2);
pub const CONFIG_WATCH_DEBOUNCE_MS: u64 = 500;

// # Exit codes

pub const EXIT_FAILURE: i32 = 1;
