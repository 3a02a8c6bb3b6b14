//! Time source abstraction.
//!
//! The manager and the scheduler never call `Local::now()` directly; they ask
//! a [`TimeSource`]. Production uses [`RealTimeSource`]; tests use
//! [`ManualTimeSource`], which only moves when told to, so alarm deadlines and
//! sunrise/sunset decisions can be checked at exact instants.

use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, TimeZone};
use std::sync::{Arc, Mutex};

/// Trait for abstracting "what time is it".
pub trait TimeSource: Send + Sync {
    fn now(&self) -> DateTime<Local>;
}

/// The system clock.
pub struct RealTimeSource;

impl TimeSource for RealTimeSource {
    fn now(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// A clock that stands still until [`set`](Self::set) or
/// [`advance`](Self::advance) is called.
pub struct ManualTimeSource {
    current: Mutex<DateTime<Local>>,
}

impl ManualTimeSource {
    pub fn new(start: DateTime<Local>) -> Self {
        Self {
            current: Mutex::new(start),
        }
    }

    /// Convenience constructor returning the shared handle most callers want.
    pub fn shared(start: DateTime<Local>) -> Arc<Self> {
        Arc::new(Self::new(start))
    }

    pub fn set(&self, time: DateTime<Local>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = time;
    }

    pub fn advance(&self, by: ChronoDuration) -> DateTime<Local> {
        let mut guard = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *guard += by;
        *guard
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Local> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Parse a datetime string in the format "YYYY-MM-DD HH:MM:SS" as local time.
pub fn parse_datetime(s: &str) -> Result<DateTime<Local>, String> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .map_err(|e| format!("Invalid datetime format: {e}. Use YYYY-MM-DD HH:MM:SS"))
        .and_then(|naive| {
            Local
                .from_local_datetime(&naive)
                .single()
                .ok_or_else(|| "Ambiguous or invalid local time".to_string())
        })
}
