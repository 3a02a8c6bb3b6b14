//! Location and sunrise/sunset calculation for auto night mode.

pub mod location;
pub mod suntimes;

pub use location::Location;
pub use suntimes::{SunTimeSource, SunTimes, get_suntimes, next_wall_clock};
