//! Wall-clock "HH:MM" arithmetic.
//!
//! Everything here works on minute-of-day values and wraps at midnight, so
//! a planned entry ending at 00:15 after starting at 23:30 behaves.

use chrono::{Local, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

pub const MINUTES_PER_DAY: i64 = 24 * 60;

/// A local time of day with minute resolution.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    hours: u8,
    minutes: u8,
}

impl ClockTime {
    /// Returns `None` when either component is out of range.
    pub fn new(hours: u32, minutes: u32) -> Option<Self> {
        if hours < 24 && minutes < 60 {
            Some(Self {
                hours: hours as u8,
                minutes: minutes as u8,
            })
        } else {
            None
        }
    }

    /// Lenient parse: a malformed or out-of-range component becomes zero.
    pub fn parse(s: &str) -> Self {
        let mut parts = s.split(':');
        let hours = parts
            .next()
            .and_then(|p| p.trim().parse::<u8>().ok())
            .filter(|h| *h < 24)
            .unwrap_or(0);
        let minutes = parts
            .next()
            .and_then(|p| p.trim().parse::<u8>().ok())
            .filter(|m| *m < 60)
            .unwrap_or(0);
        Self { hours, minutes }
    }

    /// Normalizes any minute count, negative or past a day, into `[0, 1440)`.
    pub fn from_minute_of_day(total: i64) -> Self {
        let m = total.rem_euclid(MINUTES_PER_DAY);
        Self {
            hours: (m / 60) as u8,
            minutes: (m % 60) as u8,
        }
    }

    pub fn hours(&self) -> u32 {
        self.hours as u32
    }

    pub fn minutes(&self) -> u32 {
        self.minutes as u32
    }

    pub fn minute_of_day(&self) -> u32 {
        self.hours() * 60 + self.minutes()
    }

    pub fn add_minutes(self, delta: i64) -> Self {
        Self::from_minute_of_day(self.minute_of_day() as i64 + delta)
    }

    /// Strictly earlier within the same day. Equal times are not "before".
    pub fn is_before(&self, other: &ClockTime) -> bool {
        self.minute_of_day() < other.minute_of_day()
    }

    /// Forward distance to `end`, crossing midnight when `end` is earlier.
    /// Always in `[0, 1440)`.
    pub fn minutes_until(&self, end: &ClockTime) -> u32 {
        let diff = end.minute_of_day() as i64 - self.minute_of_day() as i64;
        diff.rem_euclid(MINUTES_PER_DAY) as u32
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hours, self.minutes)
    }
}

impl Serialize for ClockTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ClockTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s: String = Deserialize::deserialize(deserializer)?;
        Ok(ClockTime::parse(&s))
    }
}

pub fn parse_clock(time: &str) -> ClockTime {
    ClockTime::parse(time)
}

pub fn format_clock(hours: u32, minutes: u32) -> String {
    format!("{:02}:{:02}", hours, minutes)
}

pub fn add_minutes(time: &str, delta: i64) -> String {
    ClockTime::parse(time).add_minutes(delta).to_string()
}

pub fn is_before(t1: &str, t2: &str) -> bool {
    ClockTime::parse(t1).is_before(&ClockTime::parse(t2))
}

pub fn minutes_between(start: &str, end: &str) -> u32 {
    ClockTime::parse(start).minutes_until(&ClockTime::parse(end))
}

/// Source of the current local time of day.
pub trait WallClock: Send + Sync {
    fn now(&self) -> ClockTime;
}

/// The system's local time.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalClock;

impl WallClock for LocalClock {
    fn now(&self) -> ClockTime {
        let now = Local::now();
        ClockTime::from_minute_of_day((now.hour() * 60 + now.minute()) as i64)
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock {
    minute_of_day: Arc<AtomicU32>,
}

impl ManualClock {
    pub fn at(time: &str) -> Self {
        let clock = Self::default();
        clock.set(time);
        clock
    }

    pub fn set(&self, time: &str) {
        self.minute_of_day
            .store(ClockTime::parse(time).minute_of_day(), Ordering::SeqCst);
    }

    pub fn advance(&self, minutes: i64) {
        let next = self.now().add_minutes(minutes);
        self.minute_of_day
            .store(next.minute_of_day(), Ordering::SeqCst);
    }
}

impl WallClock for ManualClock {
    fn now(&self) -> ClockTime {
        ClockTime::from_minute_of_day(self.minute_of_day.load(Ordering::SeqCst) as i64)
    }
}
