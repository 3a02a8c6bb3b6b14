//! Configuration validation.
//!
//! Rejects values that cannot be applied to any supported display. Values that
//! are merely above the HDMI range are accepted; they are clamped per device.

use anyhow::Result;

use super::DisplayConfig;
use crate::constants::*;

pub fn validate_config(config: &DisplayConfig) -> Result<()> {
    if !(MINIMUM_AUTO_DIM_SECONDS..=MAXIMUM_AUTO_DIM_SECONDS).contains(&config.auto_dim_seconds) {
        anyhow::bail!(
            "auto_dim_seconds ({}) must be between {} and {} seconds",
            config.auto_dim_seconds,
            MINIMUM_AUTO_DIM_SECONDS,
            MAXIMUM_AUTO_DIM_SECONDS
        );
    }

    for (name, value) in [
        ("low_brightness", config.low_brightness),
        ("default_brightness", config.default_brightness),
        ("night_default_brightness", config.night_default_brightness),
    ] {
        if value > MAX_BRIGHTNESS_DSI {
            anyhow::bail!(
                "{} ({}) must be between {} and {}",
                name,
                value,
                MIN_BRIGHTNESS,
                MAX_BRIGHTNESS_DSI
            );
        }
    }

    if config.low_brightness > config.default_brightness {
        anyhow::bail!(
            "low_brightness ({}) must not exceed default_brightness ({})",
            config.low_brightness,
            config.default_brightness
        );
    }

    if config.low_brightness > config.night_default_brightness {
        anyhow::bail!(
            "low_brightness ({}) must not exceed night_default_brightness ({})",
            config.low_brightness,
            config.night_default_brightness
        );
    }

    if let (Some(sunrise), Some(sunset)) = (config.sunrise_time.fixed(), config.sunset_time.fixed())
        && sunrise == sunset
    {
        anyhow::bail!(
            "sunrise_time and sunset_time cannot be the same ({})",
            sunrise.format("%H:%M")
        );
    }

    Ok(())
}
