//! Time-bucket granularity
//!
//! A granularity decides three things: how a timestamp is truncated to the
//! start of its window, how that window is written into a key, and how far
//! one step moves when enumerating consecutive buckets.

use crate::error::ConfigError;
use chrono::{Datelike, Months, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Timelike};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Width of one time bucket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Granularity {
    Minute,
    Hour,
    Day,
    Month,
    Year,
}

impl Granularity {
    pub const ALL: [Granularity; 5] = [
        Granularity::Minute,
        Granularity::Hour,
        Granularity::Day,
        Granularity::Month,
        Granularity::Year,
    ];

    /// strftime pattern used for the key's time component
    pub fn key_format(&self) -> &'static str {
        match self {
            Granularity::Minute => "%Y-%m-%dT%H:%M",
            Granularity::Hour => "%Y-%m-%dT%H",
            Granularity::Day => "%Y-%m-%d",
            Granularity::Month => "%Y-%m",
            Granularity::Year => "%Y",
        }
    }

    /// Adjective form used in configuration files
    pub fn name(&self) -> &'static str {
        match self {
            Granularity::Minute => "minutely",
            Granularity::Hour => "hourly",
            Granularity::Day => "daily",
            Granularity::Month => "monthly",
            Granularity::Year => "annually",
        }
    }

    /// Start of the window containing `t`
    pub fn truncate(&self, t: NaiveDateTime) -> NaiveDateTime {
        let date = t.date();
        match self {
            Granularity::Minute => date.and_time(
                NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(NaiveTime::MIN),
            ),
            Granularity::Hour => date
                .and_time(NaiveTime::from_hms_opt(t.hour(), 0, 0).unwrap_or(NaiveTime::MIN)),
            Granularity::Day => date.and_time(NaiveTime::MIN),
            Granularity::Month => first_of_month(date.year(), date.month()),
            Granularity::Year => first_of_month(date.year(), 1),
        }
    }

    /// Render the window containing `t`
    pub fn format(&self, t: NaiveDateTime) -> String {
        self.truncate(t).format(self.key_format()).to_string()
    }

    /// Start of the window `n` units after the window containing `t`
    ///
    /// Returns `None` when the result leaves chrono's representable range.
    pub fn step(&self, t: NaiveDateTime, n: u32) -> Option<NaiveDateTime> {
        let start = self.truncate(t);
        match self {
            Granularity::Minute => start.checked_add_signed(TimeDelta::try_minutes(n.into())?),
            Granularity::Hour => start.checked_add_signed(TimeDelta::try_hours(n.into())?),
            Granularity::Day => start.checked_add_signed(TimeDelta::try_days(n.into())?),
            Granularity::Month => start.checked_add_months(Months::new(n)),
            Granularity::Year => start.checked_add_months(Months::new(n.checked_mul(12)?)),
        }
    }

    /// Number of whole windows from the window of `start` to the window of `end`
    ///
    /// Negative when `end` falls in an earlier window than `start`.
    pub fn steps_between(&self, start: NaiveDateTime, end: NaiveDateTime) -> i64 {
        let (s, e) = (self.truncate(start), self.truncate(end));
        match self {
            Granularity::Minute => (e - s).num_minutes(),
            Granularity::Hour => (e - s).num_hours(),
            Granularity::Day => (e - s).num_days(),
            Granularity::Month => month_index(e) - month_index(s),
            Granularity::Year => i64::from(e.year()) - i64::from(s.year()),
        }
    }
}

fn first_of_month(year: i32, month: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(year, month, 1)
        .unwrap_or(NaiveDate::MIN)
        .and_time(NaiveTime::MIN)
}

fn month_index(t: NaiveDateTime) -> i64 {
    i64::from(t.year()) * 12 + i64::from(t.month0())
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Granularity {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "minutely" | "minute" => Ok(Granularity::Minute),
            "hourly" | "hour" => Ok(Granularity::Hour),
            "daily" | "day" => Ok(Granularity::Day),
            "monthly" | "month" => Ok(Granularity::Month),
            "annually" | "yearly" | "year" => Ok(Granularity::Year),
            _ => Err(ConfigError::InvalidGranularity(s.to_string())),
        }
    }
}

impl TryFrom<String> for Granularity {
    type Error = ConfigError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Granularity> for String {
    fn from(g: Granularity) -> Self {
        g.name().to_string()
    }
}
