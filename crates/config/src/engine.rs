//! Engine defaults
//!
//! Values the engine falls back to when a query leaves them out.

use serde::Deserialize;

/// Engine configuration
///
/// # Example
///
/// ```toml
/// [engine]
/// default_currency = "EUR"
/// default_range = "90d"
/// default_time_bucket = "month"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Currency for money columns without one
    /// Default: "USD"
    pub default_currency: String,

    /// Range preset when a widget query omits `range`
    /// Default: "all_time"
    pub default_range: String,

    /// Time bucket when a widget query omits `time_bucket`
    /// Default: "none"
    pub default_time_bucket: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            default_range: "all_time".to_string(),
            default_time_bucket: "none".to_string(),
        }
    }
}
