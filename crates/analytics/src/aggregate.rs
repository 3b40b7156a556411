//! Aggregate accumulators
//!
//! One accumulator per bucket per metric. Null handling differs per function
//! and callers rely on the exact results:
//!
//! | function | nil / uncoercible cell | empty result |
//! |----------|------------------------|--------------|
//! | SUM      | adds 0                 | 0            |
//! | AVG      | skipped (not counted)  | 0            |
//! | COUNT    | not counted (raw nil only; no numeric check) | 0 |
//! | MIN/MAX  | skipped                | 0            |
//!
//! Function names on the wire are case-insensitive. An unrecognized name
//! still deserializes and reads 0 in every bucket.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AnalyticsError, Result};
use crate::value::{coerce_number, is_nil};

/// Aggregate function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateFn {
    /// Sum of coerced values
    Sum,
    /// Mean of coercible values
    Avg,
    /// Number of non-nil raw values
    Count,
    /// Smallest coercible value
    Min,
    /// Largest coercible value
    Max,
    /// Unrecognized function; always 0
    Unknown,
}

impl<'de> Deserialize<'de> for AggregateFn {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        Ok(Self::parse(&name).unwrap_or(Self::Unknown))
    }
}

impl AggregateFn {
    /// Parse an aggregate function name (case-insensitive)
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_uppercase().as_str() {
            "SUM" => Ok(Self::Sum),
            "AVG" | "AVERAGE" | "MEAN" => Ok(Self::Avg),
            "COUNT" => Ok(Self::Count),
            "MIN" => Ok(Self::Min),
            "MAX" => Ok(Self::Max),
            _ => Err(AnalyticsError::InvalidAggregate(s.to_string())),
        }
    }

    /// Upper-case name as written in formulas
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Count => "COUNT",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Unknown => "UNKNOWN",
        }
    }
}

impl std::fmt::Display for AggregateFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Running state for one metric in one bucket
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Accumulator {
    /// Running sum
    pub sum: f64,
    /// Contributing value count
    pub count: u64,
    /// Smallest valid value seen (`+inf` when none)
    pub min: f64,
    /// Largest valid value seen (`-inf` when none)
    pub max: f64,
}

impl Default for Accumulator {
    fn default() -> Self {
        Self {
            sum: 0.0,
            count: 0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
        }
    }
}

impl Accumulator {
    /// Create an empty accumulator
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one raw cell into the accumulator
    pub fn observe(&mut self, func: AggregateFn, raw: Option<&Value>) {
        match func {
            AggregateFn::Count => {
                if !is_nil(raw) {
                    self.count += 1;
                }
            }
            AggregateFn::Sum => {
                let num = coerce_number(raw);
                self.sum += num.unwrap_or(0.0);
                if let Some(n) = num {
                    self.track_extremes(n);
                }
            }
            AggregateFn::Avg | AggregateFn::Min | AggregateFn::Max => {
                if let Some(n) = coerce_number(raw) {
                    self.sum += n;
                    self.count += 1;
                    self.track_extremes(n);
                }
            }
            AggregateFn::Unknown => {}
        }
    }

    fn track_extremes(&mut self, n: f64) {
        self.min = self.min.min(n);
        self.max = self.max.max(n);
    }

    /// Final value for a function
    pub fn finish(&self, func: AggregateFn) -> f64 {
        match func {
            AggregateFn::Sum => self.sum,
            AggregateFn::Avg => {
                if self.count > 0 {
                    self.sum / self.count as f64
                } else {
                    0.0
                }
            }
            AggregateFn::Count => self.count as f64,
            AggregateFn::Min => finite_or_zero(self.min),
            AggregateFn::Max => finite_or_zero(self.max),
            AggregateFn::Unknown => 0.0,
        }
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() { v } else { 0.0 }
}

/// Aggregate an iterator of raw cells in one pass
pub fn aggregate<'v, I>(func: AggregateFn, cells: I) -> f64
where
    I: IntoIterator<Item = Option<&'v Value>>,
{
    let mut acc = Accumulator::new();
    for cell in cells {
        acc.observe(func, cell);
    }
    acc.finish(func)
}
