//! Next sunrise and sunset.
//!
//! Both instants are always the *next* occurrence strictly after the `now`
//! they were computed for. That makes the day/night question a plain
//! comparison: if the next sunrise comes before the next sunset, the last
//! event was a sunset and it is night (`last_sunset <= now < next_sunrise`).
//!
//! Each event is resolved independently, in priority order:
//! 1. a fixed `HH:MM` override from the display config,
//! 2. the astronomical event at the configured location,
//! 3. the fixed fallback times (06:30 / 22:30).

use anyhow::Result;
use chrono::{DateTime, Duration, Local, NaiveDate, NaiveTime, TimeZone};
use sunrise::{Coordinates, SolarDay, SolarEvent};

use super::Location;
use crate::config::DisplayConfig;
use crate::constants::{FALLBACK_SUNRISE, FALLBACK_SUNSET};

/// Where an event time came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SunTimeSource {
    Override,
    Astronomical,
    Fallback,
}

impl std::fmt::Display for SunTimeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SunTimeSource::Override => write!(f, "configured"),
            SunTimeSource::Astronomical => write!(f, "calculated"),
            SunTimeSource::Fallback => write!(f, "default"),
        }
    }
}

/// The next sunrise and sunset after `computed_at`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunTimes {
    pub sunrise: DateTime<Local>,
    pub sunset: DateTime<Local>,
    pub sunrise_source: SunTimeSource,
    pub sunset_source: SunTimeSource,
    pub computed_at: DateTime<Local>,
}

impl SunTimes {
    /// Night is the span between a sunset and the following sunrise.
    pub fn is_night(&self) -> bool {
        self.sunrise < self.sunset
    }

    /// The next transition and whether it is a sunset.
    pub fn next_transition(&self) -> (DateTime<Local>, bool) {
        if self.is_night() {
            (self.sunrise, false)
        } else {
            (self.sunset, true)
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Event {
    Sunrise,
    Sunset,
}

/// Compute the next sunrise and sunset strictly after `now`.
///
/// Never fails: location problems are logged once per call and the fixed
/// fallback is used instead.
pub fn get_suntimes(
    now: DateTime<Local>,
    config: &DisplayConfig,
    location: Option<&Location>,
) -> SunTimes {
    let (sunrise, sunrise_source) = resolve(
        now,
        Event::Sunrise,
        config.sunrise_time.fixed(),
        location,
    );
    let (sunset, sunset_source) = resolve(now, Event::Sunset, config.sunset_time.fixed(), location);

    SunTimes {
        sunrise,
        sunset,
        sunrise_source,
        sunset_source,
        computed_at: now,
    }
}

fn resolve(
    now: DateTime<Local>,
    event: Event,
    fixed: Option<NaiveTime>,
    location: Option<&Location>,
) -> (DateTime<Local>, SunTimeSource) {
    if let Some(time) = fixed {
        return (next_wall_clock(now, time), SunTimeSource::Override);
    }

    if let Some(location) = location {
        match next_astronomical(now, location, event) {
            Ok(time) => return (time, SunTimeSource::Astronomical),
            Err(e) => {
                log_warning!("Using default {} time: {e}", event_name(event));
            }
        }
    }

    let (hour, minute) = match event {
        Event::Sunrise => FALLBACK_SUNRISE,
        Event::Sunset => FALLBACK_SUNSET,
    };
    let time = NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN);
    (next_wall_clock(now, time), SunTimeSource::Fallback)
}

fn event_name(event: Event) -> &'static str {
    match event {
        Event::Sunrise => "sunrise",
        Event::Sunset => "sunset",
    }
}

/// Next local occurrence of a wall-clock time, strictly after `now`.
pub fn next_wall_clock(now: DateTime<Local>, time: NaiveTime) -> DateTime<Local> {
    let today = now.date_naive();
    (0..=2)
        .filter_map(|offset| {
            let date = today + Duration::days(offset);
            // A time inside a DST gap does not exist that day
            Local.from_local_datetime(&date.and_time(time)).earliest()
        })
        .find(|candidate| *candidate > now)
        .unwrap_or_else(|| now + Duration::days(1))
}

/// Next astronomical sunrise or sunset at `location`, strictly after `now`.
fn next_astronomical(
    now: DateTime<Local>,
    location: &Location,
    event: Event,
) -> Result<DateTime<Local>> {
    let coord = Coordinates::new(location.latitude, location.longitude)
        .ok_or_else(|| anyhow::anyhow!("Invalid coordinates"))?;

    // "Today" is the calendar day at the coordinates, not on this machine
    let today = match location.timezone {
        Some(tz) => now.with_timezone(&tz).date_naive(),
        None => now.date_naive(),
    };

    (-1..=2)
        .map(|offset| event_on(coord, today + Duration::days(offset), event))
        .find(|candidate| *candidate > now)
        .ok_or_else(|| {
            anyhow::anyhow!(
                "no {} within two days of {}",
                event_name(event),
                now.format("%Y-%m-%d %H:%M")
            )
        })
}

fn event_on(coord: Coordinates, date: NaiveDate, event: Event) -> DateTime<Local> {
    let solar_event = match event {
        Event::Sunrise => SolarEvent::Sunrise,
        Event::Sunset => SolarEvent::Sunset,
    };
    SolarDay::new(coord, date)
        .event_time(solar_event)
        .with_timezone(&Local)
}
