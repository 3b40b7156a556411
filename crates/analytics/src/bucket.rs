//! Bucketing
//!
//! Rows are partitioned into buckets before aggregation. Time buckets are
//! labelled from the UTC date so the same row lands in the same bucket on
//! every server. Formula queries can also bucket by a category column or give
//! every row its own bucket.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AnalyticsError, Result};
use crate::value::{is_nil, to_js_string};

/// Key of the single bucket used when no partitioning applies
pub const ALL_BUCKET: &str = "ALL";

/// Time bucket granularity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeBucket {
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-[W]WW`, weeks starting Sunday
    Week,
    /// `YYYY-MM`
    Month,
    /// `YYYY-Qn`
    Quarter,
    /// `YYYY`
    Year,
    /// Single `ALL` bucket
    #[default]
    #[serde(other)]
    None,
}

impl TimeBucket {
    /// Parse a time bucket
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" | "daily" => Ok(Self::Day),
            "week" | "weekly" => Ok(Self::Week),
            "month" | "monthly" => Ok(Self::Month),
            "quarter" | "quarterly" => Ok(Self::Quarter),
            "year" | "yearly" => Ok(Self::Year),
            "none" | "" => Ok(Self::None),
            _ => Err(AnalyticsError::InvalidTimeBucket(s.to_string())),
        }
    }

    /// Wire name of this bucket
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Quarter => "quarter",
            Self::Year => "year",
            Self::None => "none",
        }
    }

    /// True for every granularity except `none`
    pub fn is_time(&self) -> bool {
        !matches!(self, Self::None)
    }

    /// Bucket key for an instant
    ///
    /// `None` when a week boundary falls outside the representable date
    /// range; callers treat such an instant like an invalid date.
    pub fn key(&self, at: DateTime<Utc>) -> Option<BucketKey> {
        let date = at.date_naive();
        let key = match self {
            Self::Day => BucketKey::plain(date.format("%Y-%m-%d").to_string()),
            Self::Week => {
                let start = week_start(date)?;
                BucketKey {
                    label: format!("{}-W{:02}", start.year(), week_of_year(start)?),
                    sort_key: start.format("%Y-%m-%d").to_string(),
                }
            }
            Self::Month => BucketKey::plain(date.format("%Y-%m").to_string()),
            Self::Quarter => {
                BucketKey::plain(format!("{}-Q{}", date.year(), (date.month() - 1) / 3 + 1))
            }
            Self::Year => BucketKey::plain(date.year().to_string()),
            Self::None => BucketKey::plain(ALL_BUCKET),
        };
        Some(key)
    }

    /// Display label for an instant
    pub fn label(&self, at: DateTime<Utc>) -> Option<String> {
        self.key(at).map(|key| key.label)
    }
}

/// Sunday on or before `date`
fn week_start(date: NaiveDate) -> Option<NaiveDate> {
    date.checked_sub_signed(Duration::days(date.weekday().num_days_from_sunday() as i64))
}

/// Week number of a Sunday-start week
///
/// Week 1 is the week containing January 1st. A late-December week that
/// already contains the next January 1st is week 1 as well, while its label
/// keeps the December year; [`BucketKey::sort_key`] keeps such weeks in
/// chronological order.
fn week_of_year(start: NaiveDate) -> Option<u32> {
    if start.month() == 12 && start.day() > 25 {
        let week_end = start.checked_add_signed(Duration::days(6))?;
        if NaiveDate::from_ymd_opt(start.year() + 1, 1, 1).is_some_and(|jan1| jan1 <= week_end) {
            return Some(1);
        }
    }
    let jan1 = NaiveDate::from_ymd_opt(start.year(), 1, 1)?;
    let first_week = week_start(jan1)?;
    Some(((start - first_week).num_days() / 7 + 1) as u32)
}

/// A bucket label plus the key it sorts by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketKey {
    /// Display label, also the bucket identity
    pub label: String,
    /// Chronological sort key (equal to the label except for weeks)
    pub sort_key: String,
}

impl BucketKey {
    /// Key that sorts by its own label
    pub fn plain(label: impl Into<String>) -> Self {
        let label = label.into();
        Self {
            sort_key: label.clone(),
            label,
        }
    }
}

/// Partitioning strategy for formula queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupMode {
    /// Time buckets from a date column
    #[default]
    Time,
    /// One bucket per distinct value of a column
    Category,
    /// One bucket per row
    Row,
}

impl GroupMode {
    /// Parse a group mode
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "time" => Ok(Self::Time),
            "category" => Ok(Self::Category),
            "row" => Ok(Self::Row),
            _ => Err(AnalyticsError::InvalidGroupMode(s.to_string())),
        }
    }
}

/// Category bucket label: the raw cell text, or `"<column> <n>"` when blank
pub fn category_label(value: Option<&Value>, column_id: &str, index: usize) -> String {
    if is_nil(value) {
        format!("{} {}", column_id, index + 1)
    } else {
        to_js_string(value)
    }
}

/// Row bucket label: `#<n>`, one-based
pub fn row_label(index: usize) -> String {
    format!("#{}", index + 1)
}

/// A bucket discovered during partitioning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bucket {
    /// Bucket identity and display label
    pub key: String,
    /// Chronological sort key
    pub sort_key: String,
    /// Insertion sequence number
    pub seq: usize,
}

/// Buckets in discovery order with lookup by key
#[derive(Debug, Clone, Default)]
pub struct BucketSet {
    buckets: Vec<Bucket>,
    index: HashMap<String, usize>,
}

impl BucketSet {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a bucket if new; returns its slot
    pub fn insert(&mut self, key: BucketKey) -> usize {
        if let Some(&slot) = self.index.get(&key.label) {
            return slot;
        }
        let slot = self.buckets.len();
        self.index.insert(key.label.clone(), slot);
        self.buckets.push(Bucket {
            key: key.label,
            sort_key: key.sort_key,
            seq: slot,
        });
        slot
    }

    /// Slot of an existing bucket
    pub fn slot(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    /// Bucket at a slot
    pub fn get(&self, slot: usize) -> Option<&Bucket> {
        self.buckets.get(slot)
    }

    /// Number of buckets
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Buckets ordered by insertion sequence, ties broken by key
    pub fn in_insertion_order(&self) -> Vec<&Bucket> {
        let mut ordered: Vec<&Bucket> = self.buckets.iter().collect();
        ordered.sort_by(|a, b| a.seq.cmp(&b.seq).then_with(|| a.key.cmp(&b.key)));
        ordered
    }

    /// Buckets ordered chronologically by sort key, ties broken by key
    pub fn in_key_order(&self) -> Vec<&Bucket> {
        let mut ordered: Vec<&Bucket> = self.buckets.iter().collect();
        ordered.sort_by(|a, b| {
            a.sort_key
                .cmp(&b.sort_key)
                .then_with(|| a.key.cmp(&b.key))
        });
        ordered
    }
}
