//! Date parsing and range bounds
//!
//! Cell values are parsed into UTC instants. Strings without an offset are
//! read as UTC so bucketing does not depend on the server's timezone.
//! Range presets (7d, 30d, 90d, ytd) give a lower bound only; custom ranges
//! carry independent start/end bounds, and a bound that does not parse is
//! simply dropped.

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AnalyticsError, Result};
use crate::value::is_nil;

/// Loose ISO-ish layout: `YYYY[-MM[-DD]][ T]HH[:MM[:SS[.fff]]]`, with `-` or
/// `/` separators and every part after the year optional.
static LOOSE_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(\d{4})[-/]?(\d{1,2})?[-/]?(\d{0,2})[Tt\s]*(\d{1,2})?:?(\d{1,2})?:?(\d{1,2})?[.:]?(\d+)?$",
    )
    .expect("loose date pattern is valid")
});

/// Parse a cell value into a UTC instant
///
/// Numbers are epoch milliseconds. Nil, empty, and unparseable values give
/// `None`. Impossible calendar dates (`2025-02-30`) are rejected rather than
/// rolled over.
pub fn parse_date(value: Option<&Value>) -> Option<DateTime<Utc>> {
    if is_nil(value) {
        return None;
    }
    match value? {
        Value::Number(n) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f.trunc() as i64))?;
            DateTime::from_timestamp_millis(millis)
        }
        Value::String(s) => parse_date_str(s),
        _ => None,
    }
}

/// Parse a date string; see [`parse_date`]
pub fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if !s.ends_with(['z', 'Z'])
        && let Some(caps) = LOOSE_DATE.captures(s)
    {
        let part = |i: usize, default: u32| -> Option<u32> {
            match caps.get(i).map(|m| m.as_str()) {
                None | Some("") => Some(default),
                Some(text) => text.parse().ok(),
            }
        };
        let year: i32 = caps.get(1)?.as_str().parse().ok()?;
        let millis = caps
            .get(7)
            .map(|m| {
                let digits: String = m.as_str().chars().chain("000".chars()).take(3).collect();
                digits.parse::<u32>().unwrap_or(0)
            })
            .unwrap_or(0);

        return NaiveDate::from_ymd_opt(year, part(2, 1)?, part(3, 1)?)?
            .and_hms_milli_opt(part(4, 0)?, part(5, 0)?, part(6, 0)?, millis)
            .map(|dt| dt.and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%MZ"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Some(dt.and_utc());
        }
    }
    for format in ["%m/%d/%Y", "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(s, format) {
            return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
        }
    }
    None
}

/// Range preset for declarative queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum RangePreset {
    /// Last 7 days
    #[serde(rename = "7d")]
    Last7Days,
    /// Last 30 days
    #[serde(rename = "30d")]
    Last30Days,
    /// Last 90 days
    #[serde(rename = "90d")]
    Last90Days,
    /// Start of the current year
    #[serde(rename = "ytd")]
    YearToDate,
    /// No bounds
    #[default]
    #[serde(rename = "all_time")]
    AllTime,
    /// Explicit `range_start` / `range_end`
    #[serde(rename = "custom")]
    Custom,
    /// Unrecognized preset; behaves like `all_time`
    #[serde(other)]
    Unknown,
}

impl RangePreset {
    /// Parse a range preset
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "7d" => Ok(Self::Last7Days),
            "30d" => Ok(Self::Last30Days),
            "90d" => Ok(Self::Last90Days),
            "ytd" => Ok(Self::YearToDate),
            "all_time" | "all" | "alltime" => Ok(Self::AllTime),
            "custom" => Ok(Self::Custom),
            _ => Err(AnalyticsError::InvalidRange(s.to_string())),
        }
    }

    /// Wire name of this preset
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Last7Days => "7d",
            Self::Last30Days => "30d",
            Self::Last90Days => "90d",
            Self::YearToDate => "ytd",
            Self::AllTime | Self::Unknown => "all_time",
            Self::Custom => "custom",
        }
    }
}

/// Lower bound for a preset, relative to `now`
///
/// Rolling presets subtract whole days from `now` without snapping to the
/// start of the day. `all_time`, `custom`, and unknown presets have no
/// preset-derived lower bound.
pub fn range_start(preset: RangePreset, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    match preset {
        RangePreset::Last7Days => Some(now - Duration::days(7)),
        RangePreset::Last30Days => Some(now - Duration::days(30)),
        RangePreset::Last90Days => Some(now - Duration::days(90)),
        RangePreset::YearToDate => Some(start_of_year(now)),
        RangePreset::AllTime | RangePreset::Custom | RangePreset::Unknown => None,
    }
}

/// Resolved range bounds; both ends inclusive, either may be open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateBounds {
    /// Earliest accepted instant
    pub start: Option<DateTime<Utc>>,
    /// Latest accepted instant
    pub end: Option<DateTime<Utc>>,
}

impl DateBounds {
    /// Unbounded range
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Resolve bounds for a preset
    ///
    /// For `custom`, `range_start` and `range_end` are parsed independently;
    /// an invalid or missing bound leaves that side open.
    pub fn resolve(
        preset: RangePreset,
        range_start_text: Option<&str>,
        range_end_text: Option<&str>,
        now: DateTime<Utc>,
    ) -> Self {
        match preset {
            RangePreset::Custom => Self {
                start: range_start_text.and_then(parse_date_str),
                end: range_end_text.and_then(parse_date_str),
            },
            other => Self {
                start: range_start(other, now),
                end: None,
            },
        }
    }

    /// True when at least one side is bounded
    pub fn is_bounded(&self) -> bool {
        self.start.is_some() || self.end.is_some()
    }

    /// Check an instant against the bounds
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        if let Some(start) = self.start
            && at < start
        {
            return false;
        }
        if let Some(end) = self.end
            && at > end
        {
            return false;
        }
        true
    }
}

fn start_of_year(dt: DateTime<Utc>) -> DateTime<Utc> {
    NaiveDate::from_ymd_opt(dt.year(), 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .unwrap_or(dt)
}
