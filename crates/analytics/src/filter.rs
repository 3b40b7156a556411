//! Row filters
//!
//! A filter keeps the rows whose cell satisfies `operator` against `value`.
//! Filters AND-combine: each one only narrows the row set, never reorders it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{AnalyticsError, Result};
use crate::schema::{ColumnRef, Row};
use crate::value::{contains_text, strict_equals, to_number};

/// A single filter condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    /// Column reference (id, key, or label)
    pub column_id: String,
    /// Comparison operator
    #[serde(rename = "op", alias = "operator")]
    pub operator: Operator,
    /// Target value. `None` when the field was omitted, which is distinct
    /// from an explicit `null`.
    #[serde(
        default,
        deserialize_with = "present",
        skip_serializing_if = "Option::is_none"
    )]
    pub value: Option<Value>,
}

/// Deserialize a field that may hold `null` without collapsing it to `None`
pub(crate) fn present<'de, D>(deserializer: D) -> std::result::Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

impl Filter {
    /// Create a filter
    pub fn new(column_id: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            column_id: column_id.into(),
            operator,
            value: Some(value.into()),
        }
    }

    /// Create an equality filter
    pub fn eq(column_id: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(column_id, Operator::Eq, value)
    }

    /// Create an IN filter
    pub fn is_in(column_id: impl Into<String>, values: Vec<Value>) -> Self {
        Self::new(column_id, Operator::In, Value::Array(values))
    }

    /// Create a case-insensitive substring filter
    pub fn contains(column_id: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(column_id, Operator::Contains, value.into())
    }

    /// Check one row
    pub fn matches_row(&self, row: &Row, column: ColumnRef<'_>) -> bool {
        self.operator.matches(column.value(row), self.value.as_ref())
    }

    /// Keep the rows that match, preserving order
    pub fn apply<'r>(&self, rows: Vec<&'r Row>, column: ColumnRef<'_>) -> Vec<&'r Row> {
        rows.into_iter()
            .filter(|row| self.matches_row(row, column))
            .collect()
    }
}

/// Filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    /// Strict equality
    Eq,
    /// Strict inequality
    Neq,
    /// Value is in the target list
    In,
    /// Value is not in the target list
    Nin,
    /// Numeric greater than
    Gt,
    /// Numeric greater than or equal
    Gte,
    /// Numeric less than
    Lt,
    /// Numeric less than or equal
    Lte,
    /// Case-insensitive substring
    Contains,
    /// Unrecognized operator; keeps every row
    #[serde(other)]
    Unknown,
}

impl Operator {
    /// Parse operator from string
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "eq" | "=" | "==" => Ok(Self::Eq),
            "neq" | "ne" | "!=" | "<>" => Ok(Self::Neq),
            "in" => Ok(Self::In),
            "nin" | "not_in" => Ok(Self::Nin),
            "gt" | ">" => Ok(Self::Gt),
            "gte" | ">=" => Ok(Self::Gte),
            "lt" | "<" => Ok(Self::Lt),
            "lte" | "<=" => Ok(Self::Lte),
            "contains" | "like" => Ok(Self::Contains),
            _ => Err(AnalyticsError::InvalidOperator(s.to_string())),
        }
    }

    /// Evaluate the operator for a cell against a target
    ///
    /// Numeric operators convert both sides with JS `Number` semantics, so a
    /// non-numeric string becomes `NaN` and every comparison with it fails.
    /// `in` with a non-list target never matches; `nin` always does.
    pub fn matches(&self, cell: Option<&Value>, target: Option<&Value>) -> bool {
        match self {
            Self::Eq => strict_equals(cell, target),
            Self::Neq => !strict_equals(cell, target),
            Self::In => match target {
                Some(Value::Array(items)) => items.iter().any(|t| strict_equals(cell, Some(t))),
                _ => false,
            },
            Self::Nin => match target {
                Some(Value::Array(items)) => !items.iter().any(|t| strict_equals(cell, Some(t))),
                _ => true,
            },
            Self::Gt => to_number(cell) > to_number(target),
            Self::Gte => to_number(cell) >= to_number(target),
            Self::Lt => to_number(cell) < to_number(target),
            Self::Lte => to_number(cell) <= to_number(target),
            Self::Contains => contains_text(cell)
                .to_lowercase()
                .contains(&contains_text(target).to_lowercase()),
            Self::Unknown => true,
        }
    }
}
