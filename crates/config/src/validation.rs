//! Configuration validation
//!
//! Validates config consistency:
//! - Default currency is a 3-letter code
//! - Default range and time bucket are known names
//! - Table directory is set

use tabula_analytics::{RangePreset, TimeBucket};

use crate::Config;
use crate::error::{ConfigError, Result};

/// Validate the entire configuration
pub fn validate_config(config: &Config) -> Result<()> {
    validate_engine(config)?;
    validate_tables(config)?;
    Ok(())
}

fn validate_engine(config: &Config) -> Result<()> {
    let engine = &config.engine;

    let currency = &engine.default_currency;
    if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
        return Err(ConfigError::invalid_value(
            "engine",
            "default_currency",
            format!("'{}' is not a 3-letter currency code", currency),
        ));
    }

    RangePreset::parse(&engine.default_range)
        .map_err(|e| ConfigError::invalid_value("engine", "default_range", e.to_string()))?;

    TimeBucket::parse(&engine.default_time_bucket)
        .map_err(|e| ConfigError::invalid_value("engine", "default_time_bucket", e.to_string()))?;

    Ok(())
}

fn validate_tables(config: &Config) -> Result<()> {
    if config.tables.data_dir.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("tables", "data_dir"));
    }
    Ok(())
}
