//! Time-of-day sleep windows.
//!
//! A [`TimeWindow`] is a configured `HH:MM`(/`:SS`) range during which the
//! expensive providers are not used. Windows may cross midnight
//! (`23:00`–`06:30`); both bounds are inclusive.

use chrono::{NaiveTime, Timelike};
use serde::Deserialize;

use crate::{ArtgateError, Result};

/// A time-of-day range with inclusive bounds.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeWindow {
    /// Start of the window, `HH:MM` or `HH:MM:SS`.
    pub start_time: String,
    /// End of the window, `HH:MM` or `HH:MM:SS`.
    pub end_time: String,
}

/// What to serve while inside a sleep window.
#[derive(Debug, Clone, Deserialize)]
pub struct SleepWindow {
    pub time_range: TimeWindow,
    /// Serve the flat black placeholder instead of a pooled image.
    #[serde(default)]
    pub black_image_mode: bool,
}

impl TimeWindow {
    /// Validate both bounds parse. Called at startup so malformed config
    /// fails fast instead of on the first request.
    pub fn validate(&self) -> Result<()> {
        parse_time(&self.start_time)?;
        parse_time(&self.end_time)?;
        Ok(())
    }

    /// Whether `now` falls inside the window, bounds inclusive.
    pub fn contains(&self, now: NaiveTime) -> Result<bool> {
        let start = parse_time(&self.start_time)?;
        let end = parse_time(&self.end_time)?;
        // Compare at whole-second resolution.
        let now = now.with_nanosecond(0).unwrap_or(now);

        if start > end {
            // Window crosses midnight.
            Ok(now >= start || now <= end)
        } else {
            Ok(now >= start && now <= end)
        }
    }
}

fn parse_time(value: &str) -> Result<NaiveTime> {
    for format in ["%H:%M:%S", "%H:%M"] {
        if let Ok(t) = NaiveTime::parse_from_str(value, format) {
            return Ok(t);
        }
    }
    Err(ArtgateError::Configuration(format!(
        "invalid time-of-day: {value}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn window(start: &str, end: &str) -> TimeWindow {
        TimeWindow {
            start_time: start.to_string(),
            end_time: end.to_string(),
        }
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    #[test]
    fn bounds_are_inclusive() {
        let w = window("09:00", "17:30");
        assert!(w.contains(at(9, 0, 0)).unwrap());
        assert!(w.contains(at(17, 30, 0)).unwrap());
        assert!(w.contains(at(12, 15, 3)).unwrap());
        assert!(!w.contains(at(8, 59, 59)).unwrap());
        assert!(!w.contains(at(17, 30, 1)).unwrap());
    }

    #[test]
    fn crosses_midnight() {
        let w = window("23:00", "06:30");
        assert!(w.contains(at(23, 0, 0)).unwrap());
        assert!(w.contains(at(2, 0, 0)).unwrap());
        assert!(w.contains(at(6, 30, 0)).unwrap());
        assert!(!w.contains(at(12, 0, 0)).unwrap());
        assert!(!w.contains(at(22, 59, 59)).unwrap());
    }

    #[test]
    fn accepts_seconds_format() {
        let w = window("08:15:30", "08:15:40");
        assert!(w.contains(at(8, 15, 35)).unwrap());
        assert!(!w.contains(at(8, 15, 41)).unwrap());
    }

    #[test]
    fn rejects_malformed_times() {
        let w = window("25:00", "06:00");
        assert!(w.validate().is_err());
        assert!(w.contains(at(1, 0, 0)).is_err());

        let w = window("1am", "2am");
        assert!(matches!(
            w.validate(),
            Err(ArtgateError::Configuration(_))
        ));
    }
}
