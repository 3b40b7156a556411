//! Analytics error types
//!
//! The engine itself degrades instead of failing (empty results, `warnings`,
//! zero substitutions). These errors cover the strict parsers used by callers
//! that want to reject bad input up front, and failures of the injected
//! table loader.

use thiserror::Error;

/// Analytics errors
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// Invalid filter operator
    #[error("invalid operator: {0}")]
    InvalidOperator(String),

    /// Invalid time bucket
    #[error("invalid time bucket: {0}")]
    InvalidTimeBucket(String),

    /// Invalid range preset
    #[error("invalid range: {0}")]
    InvalidRange(String),

    /// Invalid aggregate function
    #[error("invalid aggregate function: {0}")]
    InvalidAggregate(String),

    /// Invalid grouping mode
    #[error("invalid group mode: {0}")]
    InvalidGroupMode(String),

    /// Table loader failed
    #[error("failed to load table {table_id}: {reason}")]
    Load { table_id: String, reason: String },
}

impl AnalyticsError {
    /// Create a loader error for a table
    pub fn load(table_id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        Self::Load {
            table_id: table_id.into(),
            reason: reason.to_string(),
        }
    }
}

/// Result type for analytics operations
pub type Result<T> = std::result::Result<T, AnalyticsError>;
