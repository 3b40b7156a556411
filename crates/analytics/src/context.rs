//! Per-call query context

use chrono::{DateTime, Utc};

use crate::bucket::TimeBucket;
use crate::timerange::RangePreset;

/// Currency used for money columns that do not declare one
pub const DEFAULT_CURRENCY: &str = "USD";

/// Inputs that are not part of the query itself
///
/// `now` anchors relative range presets; pin it to get reproducible results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryContext {
    /// Reference instant for `7d`, `30d`, `90d`, and `ytd`
    pub now: DateTime<Utc>,
    /// Currency code for money columns without one
    pub default_currency: String,
    /// Range applied when a widget query omits `range`
    pub default_range: RangePreset,
    /// Bucket applied when a widget query omits `time_bucket`
    pub default_time_bucket: TimeBucket,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self {
            now: Utc::now(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            default_range: RangePreset::AllTime,
            default_time_bucket: TimeBucket::None,
        }
    }
}

impl QueryContext {
    /// Context anchored at a fixed instant
    pub fn at(now: DateTime<Utc>) -> Self {
        Self {
            now,
            ..Default::default()
        }
    }

    /// Set the default currency
    pub fn with_default_currency(mut self, currency: impl Into<String>) -> Self {
        self.default_currency = currency.into();
        self
    }

    /// Set the default range preset
    pub fn with_default_range(mut self, range: RangePreset) -> Self {
        self.default_range = range;
        self
    }

    /// Set the default time bucket
    pub fn with_default_time_bucket(mut self, bucket: TimeBucket) -> Self {
        self.default_time_bucket = bucket;
        self
    }
}
