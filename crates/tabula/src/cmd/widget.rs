//! Widget command - run a declarative widget query
//!
//! # Usage
//!
//! ```bash
//! tabula widget --spec revenue.json
//! cat revenue.json | tabula widget --spec - --format table
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Args;
use tabula_analytics::{TableLoader, WidgetQuery, missing_columns, run_widget_query_with};
use tabula_config::Config;

use super::{build_context, emit, emit_json, parse_format, read_spec};
use crate::loader::JsonTableLoader;
use crate::output::{OutputFormat, widget_table};

/// Widget command arguments
#[derive(Args, Debug)]
pub struct WidgetArgs {
    /// Widget query document (JSON), or `-` for stdin
    #[arg(short, long, value_name = "FILE")]
    spec: PathBuf,

    /// Output format (json, table)
    #[arg(short, long, default_value = "json")]
    format: String,

    /// Pin "now" for relative ranges (RFC 3339)
    #[arg(long)]
    now: Option<String>,
}

/// Run the widget command
pub fn run(args: WidgetArgs, config: &Config) -> Result<()> {
    let format = parse_format(&args.format)?;
    let query: WidgetQuery = read_spec(&args.spec)?;
    let ctx = build_context(config, args.now.as_deref())?;

    let loader = JsonTableLoader::new(config.tables.clone());
    let table = loader
        .load(&query.table_id)
        .context("failed to load widget table")?;

    let missing = missing_columns(&table.schema, &query);
    if !missing.is_empty() {
        bail!("unknown column(s): {}", missing.join(", "));
    }

    let output = run_widget_query_with(&ctx, &query, &table.schema, &table.rows);

    match format {
        OutputFormat::Json => emit_json(&output)?,
        OutputFormat::Table => {
            for warning in &output.warnings {
                eprintln!("warning: {}", warning);
            }
            if let Some(message) = &output.message {
                eprintln!("{}", message);
            }
            emit(&widget_table(&output));
        }
    }

    Ok(())
}
