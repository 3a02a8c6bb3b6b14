//! Display brightness backends.
//!
//! Two hardware paths are supported, each behind the [`BrightnessBackend`]
//! trait so the manager never branches on the display type:
//!
//! - **DSI**: the official Raspberry Pi touch display, a sysfs backlight with a
//!   native range of 0-255.
//! - **HDMI**: an external monitor driven over DDC/CI with `ddcutil`, native
//!   range 0-100. Needs the I2C bus and the VCP code of the brightness control,
//!   both found once at discovery.
//!
//! Which one is active is decided once by [`detect::discover`]. When neither
//! works the device is [`DeviceInterface::Unknown`] and brightness control is
//! disabled for the lifetime of the process.

use anyhow::Result;

use crate::constants::{BRIGHTNESS_STEP, MAX_BRIGHTNESS_DSI, MAX_BRIGHTNESS_HDMI, MIN_BRIGHTNESS};

pub mod command;
pub mod ddc;
pub mod detect;
pub mod dsi;

pub use command::{CommandRunner, SystemCommandRunner, find_tool};
pub use ddc::DdcBackend;
pub use detect::{Discovery, discover};
pub use dsi::DsiBackend;

/// Which hardware path controls the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInterface {
    Unknown,
    Dsi,
    Hdmi,
}

impl DeviceInterface {
    /// Highest native level, or `None` when brightness control is unavailable.
    pub fn max_level(&self) -> Option<u32> {
        match self {
            DeviceInterface::Unknown => None,
            DeviceInterface::Dsi => Some(MAX_BRIGHTNESS_DSI),
            DeviceInterface::Hdmi => Some(MAX_BRIGHTNESS_HDMI),
        }
    }
}

impl std::fmt::Display for DeviceInterface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceInterface::Unknown => write!(f, "unknown"),
            DeviceInterface::Dsi => write!(f, "DSI"),
            DeviceInterface::Hdmi => write!(f, "HDMI"),
        }
    }
}

/// A display whose brightness can be read and written.
///
/// Levels are always in the backend's native range; callers clamp with
/// [`clamp_level`] before calling [`set_level`](Self::set_level).
pub trait BrightnessBackend: Send {
    fn interface(&self) -> DeviceInterface;

    fn max_level(&self) -> u32 {
        self.interface().max_level().unwrap_or(MIN_BRIGHTNESS)
    }

    /// Read the level currently shown by the hardware.
    fn get_level(&mut self) -> Result<u32>;

    /// Write a level to the hardware.
    fn set_level(&mut self, level: u32) -> Result<()>;

    /// One-line description for status output.
    fn describe(&self) -> String {
        self.interface().to_string()
    }
}

/// Clamp a native level into `[0, max]`.
pub fn clamp_level(level: i64, max: u32) -> u32 {
    level.clamp(MIN_BRIGHTNESS as i64, max as i64) as u32
}

/// Convert a 0-1 fraction into a native level on a 10-step grid.
///
/// The fraction is clamped first, scaled by `max` and rounded to the nearest
/// multiple of [`BRIGHTNESS_STEP`]; the result never exceeds `max`, so a full
/// request on a 0-255 panel gives 255 rather than 260.
pub fn level_from_fraction(fraction: f64, max: u32) -> u32 {
    let fraction = if fraction.is_nan() {
        0.0
    } else {
        fraction.clamp(0.0, 1.0)
    };
    let step = BRIGHTNESS_STEP as f64;
    let stepped = ((fraction * max as f64) / step).round() * step;
    clamp_level(stepped as i64, max)
}

/// Native level as a rounded percentage of `max`.
pub fn level_to_percent(level: u32, max: u32) -> u32 {
    if max == 0 {
        return 0;
    }
    ((level.min(max) as f64 / max as f64) * 100.0).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_fraction_rounds_to_steps() {
        assert_eq!(level_from_fraction(0.0, 255), 0);
        assert_eq!(level_from_fraction(0.5, 255), 130);
        assert_eq!(level_from_fraction(0.5, 100), 50);
        assert_eq!(level_from_fraction(0.33, 100), 30);
        assert_eq!(level_from_fraction(0.36, 100), 40);
    }

    #[test]
    fn test_level_from_fraction_clamps() {
        assert_eq!(level_from_fraction(-0.5, 255), 0);
        assert_eq!(level_from_fraction(1.0, 255), 255);
        assert_eq!(level_from_fraction(7.0, 100), 100);
        assert_eq!(level_from_fraction(f64::NAN, 100), 0);
    }

    #[test]
    fn test_percent_conversion() {
        assert_eq!(level_to_percent(255, 255), 100);
        assert_eq!(level_to_percent(128, 255), 50);
        assert_eq!(level_to_percent(20, 100), 20);
        assert_eq!(level_to_percent(5, 0), 0);
    }

    #[test]
    fn test_interface_ranges() {
        assert_eq!(DeviceInterface::Dsi.max_level(), Some(255));
        assert_eq!(DeviceInterface::Hdmi.max_level(), Some(100));
        assert_eq!(DeviceInterface::Unknown.max_level(), None);
        assert_eq!(clamp_level(-3, 100), 0);
        assert_eq!(clamp_level(300, 255), 255);
    }
}
