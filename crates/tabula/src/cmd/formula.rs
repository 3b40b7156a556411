//! Formula command - evaluate a formula across tables
//!
//! # Usage
//!
//! ```bash
//! tabula formula --spec attainment.json
//! tabula formula --spec per_owner.json --format table
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use tabula_analytics::{FormulaQuery, compute_formula_with};
use tabula_config::Config;

use super::{build_context, emit, emit_json, parse_format, read_spec};
use crate::loader::JsonTableLoader;
use crate::output::{OutputFormat, formula_table};

/// Formula command arguments
#[derive(Args, Debug)]
pub struct FormulaArgs {
    /// Formula query document (JSON), or `-` for stdin
    #[arg(short, long, value_name = "FILE")]
    spec: PathBuf,

    /// Output format (json, table)
    #[arg(short, long, default_value = "json")]
    format: String,

    /// Pin "now" for the query context (RFC 3339)
    #[arg(long)]
    now: Option<String>,
}

/// Run the formula command
pub fn run(args: FormulaArgs, config: &Config) -> Result<()> {
    let format = parse_format(&args.format)?;
    let query: FormulaQuery = read_spec(&args.spec)?;
    let ctx = build_context(config, args.now.as_deref())?;

    let loader = JsonTableLoader::new(config.tables.clone());
    let output =
        compute_formula_with(&ctx, &query, &loader).context("formula computation failed")?;

    match format {
        OutputFormat::Json => emit_json(&output)?,
        OutputFormat::Table => emit(&formula_table(&output)),
    }

    Ok(())
}
