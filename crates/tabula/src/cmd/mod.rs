//! CLI subcommands

pub mod formula;
pub mod widget;

use std::fs;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tabula_analytics::{QueryContext, RangePreset, TimeBucket};
use tabula_config::Config;

use crate::output::{self, OutputFormat};

/// Read a JSON query document from a file, or stdin for `-`
pub(crate) fn read_spec<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = if path == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read query from stdin")?;
        buf
    } else {
        fs::read_to_string(path)
            .with_context(|| format!("failed to read query file {}", path.display()))?
    };

    serde_json::from_str(&contents).context("invalid query document")
}

/// Build the query context from engine config and an optional pinned clock
pub(crate) fn build_context(config: &Config, now: Option<&str>) -> Result<QueryContext> {
    let engine = &config.engine;
    let now = match now {
        Some(s) => DateTime::parse_from_rfc3339(s)
            .with_context(|| format!("invalid --now timestamp '{}'", s))?
            .with_timezone(&Utc),
        None => Utc::now(),
    };

    Ok(QueryContext::at(now)
        .with_default_currency(engine.default_currency.clone())
        .with_default_range(RangePreset::parse(&engine.default_range)?)
        .with_default_time_bucket(TimeBucket::parse(&engine.default_time_bucket)?))
}

pub(crate) fn parse_format(format: &str) -> Result<OutputFormat> {
    format
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid format: {}", e))
}

/// Write a rendered result to stdout
pub(crate) fn emit(rendered: &str) {
    print!("{}", rendered);
    if !rendered.ends_with('\n') {
        println!();
    }
}

pub(crate) fn emit_json<T: serde::Serialize>(value: &T) -> Result<()> {
    emit(&output::to_json(value)?);
    Ok(())
}
