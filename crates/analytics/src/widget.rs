//! Declarative widget queries
//!
//! A widget query names one table, a list of `{agg, column_id, alias}`
//! metrics, an optional date column, a time bucket, a range, and filters.
//! The pipeline is: resolve columns, filter, narrow to the date range,
//! bucket, aggregate, then assemble series and statistics.
//!
//! Configuration problems produce an empty result with a `message`; data
//! problems narrow the result and add `warnings`. Nothing here fails.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::aggregate::{Accumulator, AggregateFn};
use crate::bucket::{ALL_BUCKET, BucketKey, BucketSet, TimeBucket};
use crate::context::QueryContext;
use crate::filter::Filter;
use crate::schema::{ColumnDescriptor, ColumnRef, Row, cell_value, resolve};
use crate::timerange::{DateBounds, RangePreset, parse_date};
use crate::timeseries::{SeriesRow, ValueFormat, WidgetMeta, WidgetQueryOutput};

pub const NO_METRICS: &str = "No metrics configured.";
pub const METRIC_COLUMNS_NOT_FOUND: &str = "Metric columns not found on table.";
pub const NO_DATA_IN_RANGE: &str = "No data in this time range.";

/// Field name reserved for the bucket key in series rows
const BUCKET_FIELD: &str = "t";

/// A metric to compute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WidgetMetric {
    /// Aggregate function
    pub agg: AggregateFn,
    /// Column reference (id, key, or label)
    #[serde(default)]
    pub column_id: String,
    /// Output field name
    #[serde(default)]
    pub alias: String,
}

impl WidgetMetric {
    /// Create a metric
    pub fn new(agg: AggregateFn, column_id: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            agg,
            column_id: column_id.into(),
            alias: alias.into(),
        }
    }
}

/// Declarative widget query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WidgetQuery {
    /// Table the rows come from
    #[serde(default)]
    pub table_id: String,
    /// Metrics to compute
    #[serde(default)]
    pub metrics: Vec<WidgetMetric>,
    /// Column used for range filtering and time bucketing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_column_id: Option<String>,
    /// Time bucket; context default when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_bucket: Option<TimeBucket>,
    /// Range preset; context default when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<RangePreset>,
    /// Custom range start
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_start: Option<String>,
    /// Custom range end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range_end: Option<String>,
    /// Row filters, AND-combined
    #[serde(default)]
    pub filters: Vec<Filter>,
}

impl WidgetQuery {
    /// Create a query for a table
    pub fn new(table_id: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            ..Default::default()
        }
    }

    /// Add a metric
    pub fn with_metric(mut self, metric: WidgetMetric) -> Self {
        self.metrics.push(metric);
        self
    }

    /// Set the date column
    pub fn with_date_column(mut self, column_id: impl Into<String>) -> Self {
        self.date_column_id = Some(column_id.into());
        self
    }

    /// Set the time bucket
    pub fn with_time_bucket(mut self, bucket: TimeBucket) -> Self {
        self.time_bucket = Some(bucket);
        self
    }

    /// Set a range preset
    pub fn with_range(mut self, range: RangePreset) -> Self {
        self.range = Some(range);
        self
    }

    /// Set a custom range
    pub fn with_custom_range(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        self.range = Some(RangePreset::Custom);
        self.range_start = Some(start.into());
        self.range_end = Some(end.into());
        self
    }

    /// Add a filter
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// Column references in a query that do not resolve against the schema
///
/// Covers metric columns and the date column, de-duplicated in first-seen
/// order. Callers use this to reject a query before running it.
pub fn missing_columns(schema: &[ColumnDescriptor], query: &WidgetQuery) -> Vec<String> {
    let references = query
        .metrics
        .iter()
        .map(|m| m.column_id.as_str())
        .chain(query.date_column_id.as_deref());

    let mut seen = HashSet::new();
    references
        .filter(|r| !r.trim().is_empty() && resolve(schema, r).is_none())
        .filter(|r| seen.insert(*r))
        .map(str::to_string)
        .collect()
}

/// Run a widget query with the default context
pub fn run_widget_query(
    query: &WidgetQuery,
    schema: &[ColumnDescriptor],
    rows: &[Row],
) -> WidgetQueryOutput {
    run_widget_query_with(&QueryContext::default(), query, schema, rows)
}

struct ResolvedMetric<'a> {
    metric: &'a WidgetMetric,
    column: &'a ColumnDescriptor,
}

/// Run a widget query
pub fn run_widget_query_with(
    ctx: &QueryContext,
    query: &WidgetQuery,
    schema: &[ColumnDescriptor],
    rows: &[Row],
) -> WidgetQueryOutput {
    let mut warnings = Vec::new();

    let metrics = select_metrics(query, &mut warnings);
    if metrics.is_empty() {
        return WidgetQueryOutput::empty(NO_METRICS, warnings);
    }

    let mut resolved = Vec::with_capacity(metrics.len());
    let mut unresolved = Vec::new();
    for metric in metrics {
        match resolve(schema, &metric.column_id) {
            Some(column) => resolved.push(ResolvedMetric { metric, column }),
            None => unresolved.push(metric.column_id.as_str()),
        }
    }
    if resolved.is_empty() {
        return WidgetQueryOutput::empty(METRIC_COLUMNS_NOT_FOUND, warnings);
    }
    if !unresolved.is_empty() {
        warnings.push(format!(
            "Metric column(s) not found: {}",
            unresolved.join(", ")
        ));
    }

    let date_column = query
        .date_column_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .and_then(|id| {
            let column = resolve(schema, id);
            if column.is_none() {
                warnings.push(format!("Date column not found: {}", id));
            }
            column
        });

    let formats: BTreeMap<String, ValueFormat> = resolved
        .iter()
        .map(|r| {
            (
                r.metric.alias.clone(),
                r.column.value_format(&ctx.default_currency),
            )
        })
        .collect();

    let mut filtered: Vec<&Row> = rows.iter().collect();
    for filter in &query.filters {
        match resolve(schema, &filter.column_id) {
            Some(column) => filtered = filter.apply(filtered, ColumnRef::Described(column)),
            None => warnings.push(format!(
                "Filter column not found; filter skipped: {}",
                filter.column_id
            )),
        }
    }

    let range = query.range.unwrap_or(ctx.default_range);
    let bounds = DateBounds::resolve(
        range,
        query.range_start.as_deref(),
        query.range_end.as_deref(),
        ctx.now,
    );
    if bounds.is_bounded() && date_column.is_none() {
        warnings.push(
            "Range was provided but no date column is configured; range filter was skipped."
                .to_string(),
        );
    }

    let bucket = query.time_bucket.unwrap_or(ctx.default_time_bucket);
    let dated = narrow_to_range(filtered, date_column, &bounds, bucket, &mut warnings);

    if dated.is_empty() {
        debug!(table_id = %query.table_id, "widget query matched no rows");
        return WidgetQueryOutput {
            meta: WidgetMeta {
                formats,
                ..Default::default()
            },
            warnings,
            message: Some(NO_DATA_IN_RANGE.to_string()),
            ..Default::default()
        };
    }

    let mut buckets = BucketSet::new();
    let mut accumulators: Vec<Vec<Accumulator>> = Vec::new();

    for (row, key) in &dated {
        let slot = buckets.insert(key.clone());
        if slot == accumulators.len() {
            accumulators.push(vec![Accumulator::new(); resolved.len()]);
        }
        for (acc, r) in accumulators[slot].iter_mut().zip(&resolved) {
            acc.observe(r.metric.agg, cell_value(row, r.column));
        }
    }

    if bucket.is_time() && date_column.is_none() {
        warnings.push("No date column configured; results are not time-bucketed.".to_string());
    }

    let series: Vec<SeriesRow> = buckets
        .in_key_order()
        .into_iter()
        .map(|b| {
            let mut row = SeriesRow::new(b.key.clone());
            for (acc, r) in accumulators[b.seq].iter().zip(&resolved) {
                row.values
                    .insert(r.metric.alias.clone(), acc.finish(r.metric.agg));
            }
            row
        })
        .collect();

    debug!(
        table_id = %query.table_id,
        rows = dated.len(),
        buckets = series.len(),
        warnings = warnings.len(),
        "widget query complete"
    );

    WidgetQueryOutput::from_series(series, formats, dated.len(), warnings)
}

/// Metrics with a column and alias, first occurrence of each alias only
fn select_metrics<'q>(query: &'q WidgetQuery, warnings: &mut Vec<String>) -> Vec<&'q WidgetMetric> {
    let mut seen = HashSet::new();
    let mut selected = Vec::new();
    for metric in &query.metrics {
        if metric.alias.is_empty() || metric.column_id.is_empty() {
            continue;
        }
        if metric.alias == BUCKET_FIELD {
            warnings.push(format!(
                "Metric alias '{}' is reserved for the bucket key; metric ignored.",
                BUCKET_FIELD
            ));
            continue;
        }
        if !seen.insert(metric.alias.as_str()) {
            warnings.push(format!(
                "Duplicate metric alias '{}'; only the first definition is used.",
                metric.alias
            ));
            continue;
        }
        selected.push(metric);
    }
    selected
}

/// Apply the date range, returning each surviving row with its bucket key
///
/// Without a date column every row survives in the `ALL` bucket. With one,
/// rows whose date does not parse or cannot be bucketed are dropped and
/// counted in a single warning.
fn narrow_to_range<'r>(
    rows: Vec<&'r Row>,
    date_column: Option<&ColumnDescriptor>,
    bounds: &DateBounds,
    bucket: TimeBucket,
    warnings: &mut Vec<String>,
) -> Vec<(&'r Row, BucketKey)> {
    let Some(column) = date_column else {
        return rows
            .into_iter()
            .map(|row| (row, BucketKey::plain(ALL_BUCKET)))
            .collect();
    };

    let mut missing = 0usize;
    let kept = rows
        .into_iter()
        .filter_map(|row| {
            let Some(at) = parse_date(cell_value(row, column)) else {
                missing += 1;
                return None;
            };
            if !bounds.contains(at) {
                return None;
            }
            match bucket.key(at) {
                Some(key) => Some((row, key)),
                None => {
                    missing += 1;
                    None
                }
            }
        })
        .collect();

    if missing > 0 {
        warnings.push(format!(
            "Excluded {} row(s) missing a valid date for grouping.",
            missing
        ));
    }
    kept
}
