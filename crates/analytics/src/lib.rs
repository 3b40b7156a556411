//! Tabula Analytics Engine
//!
//! Dashboard widget computation over custom tables whose rows are untyped
//! JSON objects.
//!
//! # Overview
//!
//! Two front-ends share one set of primitives:
//!
//! - **Widget queries**: one table, `{agg, column_id, alias}` metrics, an
//!   optional date column, time bucket, range, and filters. Returns a series
//!   with per-metric totals, extremes, and formats.
//! - **Formula queries**: arithmetic over aggregate references such as
//!   `SUM(deals.amount) / COUNT(leads.id)` across aliased tables, evaluated
//!   once or once per bucket.
//!
//! Primitives: column resolution, JS-compatible value coercion, filters,
//! date parsing and ranges, bucketing, accumulators, and the formula
//! evaluator.
//!
//! # Usage
//!
//! ```ignore
//! use tabula_analytics::{AggregateFn, QueryContext, TimeBucket, WidgetMetric, WidgetQuery};
//!
//! let query = WidgetQuery::new("deals")
//!     .with_metric(WidgetMetric::new(AggregateFn::Sum, "amount", "A"))
//!     .with_date_column("closed_at")
//!     .with_time_bucket(TimeBucket::Month);
//!
//! let out = run_widget_query_with(&QueryContext::default(), &query, &schema, &rows);
//! ```
//!
//! The engine holds no state between calls and never fails on bad data:
//! problems surface as `warnings` or an empty-state `message`. Only the
//! injected [`TableLoader`] can return an error.

pub mod aggregate;
pub mod bucket;
pub mod compute;
pub mod context;
pub mod error;
pub mod filter;
pub mod formula;
pub mod schema;
pub mod timerange;
pub mod timeseries;
pub mod value;
pub mod widget;

#[cfg(test)]
mod timeseries_test;
#[cfg(test)]
mod widget_test;

// Re-exports for convenience
pub use aggregate::{Accumulator, AggregateFn, aggregate};
pub use bucket::{ALL_BUCKET, BucketKey, BucketSet, GroupMode, TimeBucket};
pub use compute::{
    FormulaQuery, GroupBy, JoinSide, JoinSpec, JoinType, SourceFilter, SourceSpec, TableData,
    TableLoader, compute_formula, compute_formula_with,
};
pub use context::{DEFAULT_CURRENCY, QueryContext};
pub use error::{AnalyticsError, Result};
pub use filter::{Filter, Operator};
pub use formula::{Formula, FormulaRef};
pub use schema::{ColumnDescriptor, ColumnRef, Row, cell_value, resolve};
pub use timerange::{DateBounds, RangePreset, parse_date};
pub use timeseries::{
    FormulaOutput, SeriesPoint, SeriesRow, ValueFormat, WidgetMeta, WidgetQueryOutput,
};
pub use widget::{WidgetMetric, WidgetQuery, missing_columns, run_widget_query, run_widget_query_with};
