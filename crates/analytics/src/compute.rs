//! Formula queries across multiple tables
//!
//! A formula query binds table ids to aliases, filters each source, picks a
//! partitioning, and evaluates a [`Formula`] once per bucket. Every aggregate
//! reference reads only the rows of its own alias.
//!
//! Partitioning:
//! - no time bucket and no category/row grouping: one scalar over all rows
//! - time bucket: each alias is bucketed by its own date column; rows
//!   without a valid date are left out
//! - category or row grouping: the grouping alias is partitioned, other
//!   aliases contribute their whole filtered table to every bucket
//!
//! Loading is the only fallible step. Everything after it degrades to zero.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::aggregate::aggregate;
use crate::bucket::{BucketKey, BucketSet, GroupMode, TimeBucket, category_label, row_label};
use crate::context::QueryContext;
use crate::error::{AnalyticsError, Result};
use crate::filter::{Operator, present};
use crate::formula::Formula;
use crate::schema::{ColumnDescriptor, ColumnRef, Row};
use crate::timerange::parse_date;
use crate::timeseries::{FormulaOutput, SeriesPoint};

static DATE_KEY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(^|_)(date|created_at|created)$").expect("date key pattern is valid")
});

/// A table bound to an alias
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSpec {
    /// Table to load
    #[serde(alias = "table_id")]
    pub table_id: String,
    /// Name used in formula references
    pub alias: String,
}

impl SourceSpec {
    pub fn new(table_id: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            table_id: table_id.into(),
            alias: alias.into(),
        }
    }
}

/// One side of a join
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinSide {
    pub alias: String,
    #[serde(alias = "column_id")]
    pub column_id: String,
}

/// Join kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
}

/// Join descriptor
///
/// Accepted and round-tripped but not executed: aliases always aggregate
/// independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinSpec {
    pub left: JoinSide,
    pub right: JoinSide,
    #[serde(rename = "type", default)]
    pub join_type: JoinType,
}

/// Partitioning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupBy {
    /// Alias whose rows are partitioned
    pub alias: String,
    /// Grouping column (date column in time mode)
    #[serde(default, alias = "column_id", skip_serializing_if = "Option::is_none")]
    pub column_id: Option<String>,
    /// Partitioning strategy; time when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<GroupMode>,
}

/// Filter scoped to one source alias
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceFilter {
    /// Source alias; the first source when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Column reference
    #[serde(alias = "column_id")]
    pub column_id: String,
    /// Comparison operator
    #[serde(alias = "op")]
    pub operator: Operator,
    /// Target value
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

/// Formula query
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaQuery {
    /// Arithmetic over aggregate references
    #[serde(default)]
    pub formula: String,
    /// Tables bound to aliases
    #[serde(default)]
    pub sources: Vec<SourceSpec>,
    /// Join descriptors
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub joins: Vec<JoinSpec>,
    /// Time bucket; `none` when omitted
    #[serde(default, alias = "time_bucket", skip_serializing_if = "Option::is_none")]
    pub time_bucket: Option<TimeBucket>,
    /// Partitioning request
    #[serde(default, alias = "group_by", skip_serializing_if = "Option::is_none")]
    pub group_by: Option<GroupBy>,
    /// Per-source filters
    #[serde(default)]
    pub filters: Vec<SourceFilter>,
}

impl FormulaQuery {
    /// Create a query with a formula
    pub fn new(formula: impl Into<String>) -> Self {
        Self {
            formula: formula.into(),
            ..Default::default()
        }
    }

    /// Bind a table to an alias
    pub fn with_source(mut self, table_id: impl Into<String>, alias: impl Into<String>) -> Self {
        self.sources.push(SourceSpec::new(table_id, alias));
        self
    }

    /// Set the time bucket
    pub fn with_time_bucket(mut self, bucket: TimeBucket) -> Self {
        self.time_bucket = Some(bucket);
        self
    }

    /// Set the grouping
    pub fn with_group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = Some(group_by);
        self
    }

    /// Add a source filter
    pub fn with_filter(mut self, filter: SourceFilter) -> Self {
        self.filters.push(filter);
        self
    }
}

/// Rows and schema of one table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableData {
    #[serde(default)]
    pub schema: Vec<ColumnDescriptor>,
    #[serde(default)]
    pub rows: Vec<Row>,
}

impl TableData {
    pub fn new(schema: Vec<ColumnDescriptor>, rows: Vec<Row>) -> Self {
        Self { schema, rows }
    }
}

/// Fetches table contents by id
pub trait TableLoader {
    /// Load one table
    fn load(&self, table_id: &str) -> Result<TableData>;
}

impl TableLoader for HashMap<String, TableData> {
    fn load(&self, table_id: &str) -> Result<TableData> {
        self.get(table_id)
            .cloned()
            .ok_or_else(|| AnalyticsError::load(table_id, "table not found"))
    }
}

/// A loaded source after filtering
struct Source {
    alias: String,
    table: TableData,
    /// Indices into `table.rows` that survived filtering
    kept: Vec<usize>,
}

impl Source {
    fn kept_rows(&self) -> impl Iterator<Item = (usize, &Row)> {
        self.kept.iter().map(|&i| (i, &self.table.rows[i]))
    }
}

/// How rows are partitioned into buckets
enum Partition<'q> {
    Scalar,
    Time {
        bucket: TimeBucket,
        alias: Option<&'q str>,
        column_id: Option<&'q str>,
    },
    Category {
        alias: &'q str,
        column_id: &'q str,
    },
    Row {
        alias: &'q str,
    },
}

impl<'q> Partition<'q> {
    fn plan(query: &'q FormulaQuery) -> Self {
        let bucket = query.time_bucket.unwrap_or_default();
        let group = query.group_by.as_ref();
        let mode = group.and_then(|g| g.mode).unwrap_or_default();

        match (group, mode) {
            (Some(g), GroupMode::Row) => Self::Row { alias: &g.alias },
            (Some(g), GroupMode::Category) => match g.column_id.as_deref() {
                Some(column_id) => Self::Category {
                    alias: &g.alias,
                    column_id,
                },
                None => {
                    debug!(alias = %g.alias, "category grouping without a column is ignored");
                    Self::time_or_scalar(bucket, None)
                }
            },
            (g, _) => Self::time_or_scalar(bucket, g),
        }
    }

    fn time_or_scalar(bucket: TimeBucket, group: Option<&'q GroupBy>) -> Self {
        if !bucket.is_time() {
            return Self::Scalar;
        }
        Self::Time {
            bucket,
            alias: group.map(|g| g.alias.as_str()),
            column_id: group.and_then(|g| g.column_id.as_deref()),
        }
    }
}

/// Compute a formula query with the default context
pub fn compute_formula(query: &FormulaQuery, loader: &dyn TableLoader) -> Result<FormulaOutput> {
    compute_formula_with(&QueryContext::default(), query, loader)
}

/// Compute a formula query
///
/// Fails only when a table cannot be loaded.
pub fn compute_formula_with(
    _ctx: &QueryContext,
    query: &FormulaQuery,
    loader: &dyn TableLoader,
) -> Result<FormulaOutput> {
    if query.formula.trim().is_empty() || query.sources.is_empty() {
        return Ok(FormulaOutput::metric(0.0));
    }

    let formula = Formula::parse(&query.formula);
    if formula.malformed_refs() > 0 {
        debug!(
            malformed = formula.malformed_refs(),
            "formula references could not be decoded and read as 0"
        );
    }

    let mut sources = load_sources(query, loader)?;
    if !query.joins.is_empty() {
        debug!(
            joins = query.joins.len(),
            "join descriptors are not executed; aliases aggregate independently"
        );
    }
    apply_filters(query, &mut sources);

    let partition = Partition::plan(query);
    let output = match partition {
        Partition::Scalar => FormulaOutput::metric(scalar(&formula, &sources)),
        partition => {
            let points = series(&formula, &sources, &partition);
            if points.is_empty() {
                FormulaOutput::metric(scalar(&formula, &sources))
            } else {
                FormulaOutput::Series { points }
            }
        }
    };

    debug!(
        sources = sources.len(),
        refs = formula.refs().len(),
        points = output.points().map_or(0, <[SeriesPoint]>::len),
        "formula computed"
    );
    Ok(output)
}

fn load_sources(query: &FormulaQuery, loader: &dyn TableLoader) -> Result<Vec<Source>> {
    let mut sources: Vec<Source> = Vec::with_capacity(query.sources.len());
    for spec in &query.sources {
        if sources.iter().any(|s| s.alias == spec.alias) {
            debug!(alias = %spec.alias, "duplicate source alias ignored");
            continue;
        }
        let table = loader.load(&spec.table_id)?;
        debug!(
            alias = %spec.alias,
            table_id = %spec.table_id,
            rows = table.rows.len(),
            "source loaded"
        );
        sources.push(Source {
            alias: spec.alias.clone(),
            kept: (0..table.rows.len()).collect(),
            table,
        });
    }
    Ok(sources)
}

fn apply_filters(query: &FormulaQuery, sources: &mut [Source]) {
    let default_alias = query.sources.first().map(|s| s.alias.as_str());
    for filter in &query.filters {
        let alias = filter.alias.as_deref().or(default_alias);
        let Some(source) = sources.iter_mut().find(|s| Some(s.alias.as_str()) == alias) else {
            debug!(alias = ?alias, "filter for unknown alias ignored");
            continue;
        };
        let column = ColumnRef::lookup(&source.table.schema, &filter.column_id);
        let rows = &source.table.rows;
        source.kept.retain(|&i| {
            filter
                .operator
                .matches(column.value(&rows[i]), filter.value.as_ref())
        });
    }
}

/// Evaluate the formula once over every kept row
fn scalar(formula: &Formula, sources: &[Source]) -> f64 {
    let values = ref_values(formula, sources, |alias| {
        sources.iter().find(|s| s.alias == alias).map(|s| &s.kept)
    });
    formula.evaluate(&values)
}

/// Per-bucket row indices for one alias
type AliasBuckets = HashMap<usize, Vec<usize>>;

fn series(formula: &Formula, sources: &[Source], partition: &Partition<'_>) -> Vec<SeriesPoint> {
    let mut buckets = BucketSet::new();
    // Aliases not listed here contribute every kept row to every bucket.
    let mut partitioned: HashMap<&str, AliasBuckets> = HashMap::new();

    match partition {
        Partition::Scalar => return Vec::new(),
        Partition::Time {
            bucket,
            alias,
            column_id,
        } => {
            for source in sources {
                let explicit = column_id
                    .filter(|_| *alias == Some(source.alias.as_str()))
                    .map(|id| ColumnRef::lookup(&source.table.schema, id));
                let slots = partitioned.entry(source.alias.as_str()).or_default();
                for (i, row) in source.kept_rows() {
                    let cell = match explicit {
                        Some(column) => column.value(row),
                        None => guess_date_cell(row),
                    };
                    if let Some(at) = parse_date(cell)
                        && let Some(key) = bucket.key(at)
                    {
                        let slot = buckets.insert(key);
                        slots.entry(slot).or_default().push(i);
                    }
                }
            }
        }
        Partition::Category { alias, column_id } => {
            if let Some(source) = sources.iter().find(|s| s.alias == *alias) {
                let column = ColumnRef::lookup(&source.table.schema, column_id);
                let slots = partitioned.entry(source.alias.as_str()).or_default();
                for (i, row) in source.kept_rows() {
                    let label = category_label(column.value(row), column_id, i);
                    let slot = buckets.insert(BucketKey::plain(label));
                    slots.entry(slot).or_default().push(i);
                }
            }
        }
        Partition::Row { alias } => {
            if let Some(source) = sources.iter().find(|s| s.alias == *alias) {
                let slots = partitioned.entry(source.alias.as_str()).or_default();
                for (i, _) in source.kept_rows() {
                    let slot = buckets.insert(BucketKey::plain(row_label(i)));
                    slots.entry(slot).or_default().push(i);
                }
            }
        }
    }

    let empty: Vec<usize> = Vec::new();
    buckets
        .in_insertion_order()
        .into_iter()
        .map(|b| {
            let values = ref_values(formula, sources, |alias| {
                match partitioned.get(alias) {
                    Some(slots) => Some(slots.get(&b.seq).unwrap_or(&empty)),
                    None => sources
                        .iter()
                        .find(|s| s.alias == alias)
                        .map(|s| &s.kept),
                }
            });
            SeriesPoint::new(b.key.clone(), formula.evaluate(&values))
        })
        .filter(|p| p.value.is_finite())
        .collect()
}

/// Aggregate every formula reference over the rows `rows_for` selects
fn ref_values<'a, F>(formula: &Formula, sources: &[Source], rows_for: F) -> HashMap<String, f64>
where
    F: Fn(&str) -> Option<&'a Vec<usize>>,
{
    formula
        .refs()
        .iter()
        .map(|r| {
            let value = match (
                sources.iter().find(|s| s.alias == r.alias),
                rows_for(&r.alias),
            ) {
                (Some(source), Some(indices)) => {
                    let column = ColumnRef::lookup(&source.table.schema, &r.column);
                    aggregate(
                        r.func,
                        indices.iter().map(|&i| column.value(&source.table.rows[i])),
                    )
                }
                _ => 0.0,
            };
            trace!(
                reference = %r.token,
                alias = %r.alias,
                column = %r.column,
                value,
                "reference aggregated"
            );
            (r.token.clone(), value)
        })
        .collect()
}

/// First row field whose name looks like a date
fn guess_date_cell(row: &Row) -> Option<&Value> {
    row.iter()
        .find(|(key, _)| DATE_KEY.is_match(key))
        .map(|(_, value)| value)
}
