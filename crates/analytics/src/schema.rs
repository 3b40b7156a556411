//! Table schema and column resolution
//!
//! Custom tables have a mutable schema. A column can be addressed by its
//! stable `id`, its internal `key`, or its display `label` (older tables only
//! carry `name`). Rows written before a column had a key are stored under the
//! display label, so cell lookup falls back the same way.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::timeseries::ValueFormat;

/// A table row: untyped cell values keyed by column key or legacy label
pub type Row = Map<String, Value>;

/// Column definition as stored in a table schema
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    /// Stable identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Internal key rows are written under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    /// Display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Legacy display label
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Declared type (`number`, `money`, `date`, ...)
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub column_type: Option<String>,
    /// ISO currency code for money columns
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
}

impl ColumnDescriptor {
    /// Create a column addressed by id and key
    pub fn new(id: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            key: Some(key.into()),
            ..Default::default()
        }
    }

    /// Set the display label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the legacy name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Set the declared type
    pub fn with_type(mut self, column_type: impl Into<String>) -> Self {
        self.column_type = Some(column_type.into());
        self
    }

    /// Set the currency code
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = Some(currency.into());
        self
    }

    /// Label shown to users: `label` when non-empty, otherwise `name`
    pub fn display_label(&self) -> Option<&str> {
        non_empty(self.label.as_deref()).or_else(|| non_empty(self.name.as_deref()))
    }

    /// Output format for values aggregated from this column
    pub fn value_format(&self, default_currency: &str) -> ValueFormat {
        let column_type = self.column_type.as_deref().unwrap_or("").to_lowercase();
        if column_type == "money" || column_type == "currency" {
            let currency = non_empty(self.currency.as_deref()).unwrap_or(default_currency);
            ValueFormat::currency(currency)
        } else {
            ValueFormat::Number
        }
    }
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.is_empty())
}

/// Resolve a column reference against a schema
///
/// Tries an exact match on `id`, then `key`, then the display label, and
/// returns the first hit. No trimming or case folding is applied to the
/// schema side; the reference itself is trimmed and an empty reference never
/// resolves.
pub fn resolve<'s>(schema: &'s [ColumnDescriptor], reference: &str) -> Option<&'s ColumnDescriptor> {
    let q = reference.trim();
    if q.is_empty() {
        return None;
    }

    schema
        .iter()
        .find(|c| c.id.as_deref() == Some(q))
        .or_else(|| schema.iter().find(|c| c.key.as_deref() == Some(q)))
        .or_else(|| schema.iter().find(|c| c.display_label() == Some(q)))
}

/// Read a cell for a column: by `key` first, then display label, then `name`
///
/// A key that is present with a null value still wins over the label.
pub fn cell_value<'r>(row: &'r Row, column: &ColumnDescriptor) -> Option<&'r Value> {
    let candidates = [
        non_empty(column.key.as_deref()),
        column.display_label(),
        non_empty(column.name.as_deref()),
    ];
    candidates
        .into_iter()
        .flatten()
        .find_map(|field| row.get(field))
}

/// A column handle used when a schema may not describe every reference
///
/// Formula sources reference columns by whatever text the author typed. When
/// the source schema knows the column we read through it; otherwise the text
/// is used as a raw row key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRef<'a> {
    /// Resolved through the schema
    Described(&'a ColumnDescriptor),
    /// Raw row key
    Key(&'a str),
}

impl<'a> ColumnRef<'a> {
    /// Resolve through the schema, falling back to a raw key
    pub fn lookup(schema: &'a [ColumnDescriptor], reference: &'a str) -> Self {
        match resolve(schema, reference) {
            Some(column) => Self::Described(column),
            None => Self::Key(reference),
        }
    }

    /// Read this column from a row
    pub fn value<'r>(&self, row: &'r Row) -> Option<&'r Value> {
        match self {
            Self::Described(column) => cell_value(row, column),
            Self::Key(key) => row.get(*key),
        }
    }
}
