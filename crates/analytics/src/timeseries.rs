//! Query result types
//!
//! Declarative widget queries return one row per bucket plus per-metric
//! statistics. Formula queries return either a scalar or a list of points.
//! Empty results carry a `message` so callers can tell "no data" apart from
//! zero-valued data; `warnings` flag results that were silently narrowed.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Display format for a metric
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum ValueFormat {
    /// Monetary value in a currency
    Currency {
        /// ISO currency code
        currency: String,
    },
    /// Plain number
    Number,
}

impl ValueFormat {
    /// Currency format
    pub fn currency(code: impl Into<String>) -> Self {
        Self::Currency {
            currency: code.into(),
        }
    }
}

/// One bucket of a widget series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesRow {
    /// Bucket key
    pub t: String,
    /// Metric values keyed by alias
    #[serde(flatten)]
    pub values: BTreeMap<String, f64>,
}

impl SeriesRow {
    /// Create an empty row for a bucket
    pub fn new(t: impl Into<String>) -> Self {
        Self {
            t: t.into(),
            values: BTreeMap::new(),
        }
    }

    /// Value for a metric alias
    pub fn get(&self, alias: &str) -> Option<f64> {
        self.values.get(alias).copied()
    }
}

/// Per-metric statistics over a widget series
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetMeta {
    /// Sum of bucket values per alias
    pub totals: BTreeMap<String, f64>,
    /// Smallest bucket value per alias
    pub min: BTreeMap<String, f64>,
    /// Largest bucket value per alias
    pub max: BTreeMap<String, f64>,
    /// Display format per alias
    pub formats: BTreeMap<String, ValueFormat>,
    /// Rows that survived filtering
    pub row_count: usize,
    /// Buckets in the series
    pub bucket_count: usize,
}

impl WidgetMeta {
    fn observe(&mut self, alias: &str, value: f64) {
        let finite = if value.is_finite() { value } else { 0.0 };
        *self.totals.entry(alias.to_string()).or_insert(0.0) += finite;
        self.min
            .entry(alias.to_string())
            .and_modify(|m| *m = m.min(value))
            .or_insert(value);
        self.max
            .entry(alias.to_string())
            .and_modify(|m| *m = m.max(value))
            .or_insert(value);
    }
}

/// Result of a declarative widget query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetQueryOutput {
    /// One row per bucket
    pub series: Vec<SeriesRow>,
    /// Totals, extremes, formats, and counts
    pub meta: WidgetMeta,
    /// Non-fatal diagnostics
    pub warnings: Vec<String>,
    /// Empty-state explanation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WidgetQueryOutput {
    /// Empty result with an explanation
    pub fn empty(message: impl Into<String>, warnings: Vec<String>) -> Self {
        Self {
            warnings,
            message: Some(message.into()),
            ..Default::default()
        }
    }

    /// Build from series rows, computing totals and extremes
    pub fn from_series(
        series: Vec<SeriesRow>,
        formats: BTreeMap<String, ValueFormat>,
        row_count: usize,
        warnings: Vec<String>,
    ) -> Self {
        let mut meta = WidgetMeta {
            formats,
            row_count,
            bucket_count: series.len(),
            ..Default::default()
        };
        for row in &series {
            for (alias, value) in &row.values {
                meta.observe(alias, *value);
            }
        }
        Self {
            series,
            meta,
            warnings,
            message: None,
        }
    }

    /// True when the empty-state message is set
    pub fn is_empty_state(&self) -> bool {
        self.message.is_some()
    }
}

/// A single point of a formula series
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Bucket label
    pub x: String,
    /// Evaluated formula value
    pub value: f64,
}

impl SeriesPoint {
    /// Create a new point
    pub fn new(x: impl Into<String>, value: f64) -> Self {
        Self { x: x.into(), value }
    }
}

/// Result of a formula query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FormulaOutput {
    /// Single scalar
    Metric {
        /// Evaluated value
        value: f64,
    },
    /// One value per bucket
    Series {
        /// Points in bucket order
        points: Vec<SeriesPoint>,
    },
}

impl FormulaOutput {
    /// Scalar result
    pub fn metric(value: f64) -> Self {
        Self::Metric { value }
    }

    /// Scalar value, if this is a metric
    pub fn as_metric(&self) -> Option<f64> {
        match self {
            Self::Metric { value } => Some(*value),
            Self::Series { .. } => None,
        }
    }

    /// Points, if this is a series
    pub fn points(&self) -> Option<&[SeriesPoint]> {
        match self {
            Self::Metric { .. } => None,
            Self::Series { points } => Some(points),
        }
    }
}
