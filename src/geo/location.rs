//! Device location, read from the assistant's core configuration.
//!
//! The location block lives in `mycroft.conf`, owned by the assistant core:
//!
//! ```json
//! {
//!   "location": {
//!     "coordinate": {"latitude": 38.72, "longitude": -9.14},
//!     "timezone": {"code": "Europe/Lisbon"}
//!   }
//! }
//! ```
//!
//! Files are read lowest priority first; the last file with a complete
//! location block wins.

use anyhow::{Context, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::PathBuf;

/// Geographic position used for sunrise/sunset calculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// Timezone of the coordinates; picks which calendar day is "today".
    pub timezone: Option<Tz>,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ns = if self.latitude >= 0.0 { 'N' } else { 'S' };
        let ew = if self.longitude >= 0.0 { 'E' } else { 'W' };
        write!(
            f,
            "{:.4}°{ns}, {:.4}°{ew}",
            self.latitude.abs(),
            self.longitude.abs()
        )?;
        if let Some(tz) = self.timezone {
            write!(f, " ({tz})")?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct CoreConfig {
    location: Option<LocationBlock>,
}

#[derive(Debug, Deserialize)]
struct LocationBlock {
    coordinate: Option<Coordinate>,
    timezone: Option<TimezoneBlock>,
}

#[derive(Debug, Deserialize)]
struct Coordinate {
    latitude: f64,
    longitude: f64,
}

#[derive(Debug, Deserialize)]
struct TimezoneBlock {
    code: Option<String>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, timezone: Option<Tz>) -> Result<Self> {
        if !(-90.0..=90.0).contains(&latitude) {
            anyhow::bail!("latitude must be between -90 and 90 degrees (got {latitude})");
        }
        if !(-180.0..=180.0).contains(&longitude) {
            anyhow::bail!("longitude must be between -180 and 180 degrees (got {longitude})");
        }
        Ok(Self {
            latitude,
            longitude,
            timezone,
        })
    }

    /// Parse the `location` block of a core config document.
    ///
    /// Returns `Ok(None)` when the document has no coordinates. An unknown
    /// timezone code is logged and ignored rather than discarding the
    /// coordinates.
    pub fn from_core_config(content: &str) -> Result<Option<Self>> {
        let parsed: CoreConfig =
            serde_json::from_str(content).context("Failed to parse core configuration")?;

        let Some(block) = parsed.location else {
            return Ok(None);
        };
        let Some(coordinate) = block.coordinate else {
            return Ok(None);
        };

        let timezone = match block.timezone.and_then(|tz| tz.code) {
            Some(code) => match code.parse::<Tz>() {
                Ok(tz) => Some(tz),
                Err(_) => {
                    log_warning!("Unknown timezone code '{code}' in location config");
                    None
                }
            },
            None => None,
        };

        Self::new(coordinate.latitude, coordinate.longitude, timezone).map(Some)
    }

    /// Load from the given files, later files overriding earlier ones.
    ///
    /// Missing files are skipped. A file that exists but cannot be parsed is
    /// an error, so a typo is reported instead of silently using defaults.
    pub fn load(paths: &[PathBuf]) -> Result<Option<Self>> {
        let mut found = None;
        for path in paths {
            if !path.exists() {
                continue;
            }
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            if let Some(location) = Self::from_core_config(&content)
                .with_context(|| format!("Invalid location in {}", path.display()))?
            {
                found = Some(location);
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_location_block() {
        let content = r#"{
            "lang": "en-us",
            "location": {
                "city": {"name": "Lisbon"},
                "coordinate": {"latitude": 38.72, "longitude": -9.14},
                "timezone": {"code": "Europe/Lisbon", "name": "Western European Time"}
            }
        }"#;
        let location = Location::from_core_config(content).unwrap().unwrap();
        assert_eq!(location.latitude, 38.72);
        assert_eq!(location.longitude, -9.14);
        assert_eq!(location.timezone, Some(chrono_tz::Europe::Lisbon));
    }

    #[test]
    fn test_missing_coordinates_is_not_an_error() {
        assert_eq!(Location::from_core_config(r#"{"lang": "en-us"}"#).unwrap(), None);
        assert_eq!(
            Location::from_core_config(r#"{"location": {"timezone": {"code": "UTC"}}}"#).unwrap(),
            None
        );
    }

    #[test]
    fn test_unknown_timezone_keeps_coordinates() {
        crate::logger::Log::set_enabled(false);
        let content = r#"{"location": {"coordinate": {"latitude": 10.0, "longitude": 20.0},
                          "timezone": {"code": "Mars/Olympus"}}}"#;
        let location = Location::from_core_config(content).unwrap().unwrap();
        assert_eq!(location.timezone, None);
    }

    #[test]
    fn test_out_of_range_coordinates_rejected() {
        let content = r#"{"location": {"coordinate": {"latitude": 91.0, "longitude": 0.0}}}"#;
        assert!(Location::from_core_config(content).is_err());
    }

    #[test]
    fn test_display_hemispheres() {
        let location = Location::new(-33.8688, 151.2093, Some(chrono_tz::Australia::Sydney)).unwrap();
        assert_eq!(location.to_string(), "33.8688°S, 151.2093°E (Australia/Sydney)");
        let location = Location::new(38.72, -9.14, None).unwrap();
        assert_eq!(location.to_string(), "38.7200°N, 9.1400°W");
    }

    #[test]
    fn test_later_file_wins() {
        let dir = tempfile::tempdir().unwrap();
        let system = dir.path().join("system.conf");
        let user = dir.path().join("user.conf");
        std::fs::write(
            &system,
            r#"{"location": {"coordinate": {"latitude": 1.0, "longitude": 2.0}}}"#,
        )
        .unwrap();
        std::fs::write(
            &user,
            r#"{"location": {"coordinate": {"latitude": 3.0, "longitude": 4.0}}}"#,
        )
        .unwrap();

        let missing = dir.path().join("missing.conf");
        let location = Location::load(&[system, missing, user]).unwrap().unwrap();
        assert_eq!((location.latitude, location.longitude), (3.0, 4.0));
    }
}
