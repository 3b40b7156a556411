//! Tabula - dashboard widget computation over JSON tables
//!
//! # Usage
//!
//! ```bash
//! # Declarative widget query
//! tabula widget --spec widget.json
//! tabula widget --spec widget.json --format table
//!
//! # Formula query across tables
//! tabula formula --spec formula.json --config tabula.toml
//! ```

mod cmd;
mod loader;
mod output;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tabula_config::{Config, LogFormat};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Tabula - dashboard widget computation over JSON tables
#[derive(Parser, Debug)]
#[command(name = "tabula")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Path to configuration file (error if specified but not found)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error). Overrides config file.
    #[arg(short, long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a declarative widget query against one table
    Widget(cmd::widget::WidgetArgs),

    /// Evaluate a formula across one or more tables
    Formula(cmd::formula::FormulaArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;
    let log_level = resolve_log_level(cli.log_level.as_deref(), &config);
    init_logging(&log_level, config.log.format)?;

    match cli.command {
        Command::Widget(args) => cmd::widget::run(args, &config),
        Command::Formula(args) => cmd::formula::run(args, &config),
    }
}

/// Load the config file, or defaults when none is given
fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) => Config::from_file(p).context("failed to load config"),
        None => {
            let default_path = Path::new("tabula.toml");
            if default_path.exists() {
                return Config::from_file(default_path).context("failed to load config");
            }
            Ok(Config::default())
        }
    }
}

/// Resolve log level: CLI flag > config file > "info"
fn resolve_log_level(cli_level: Option<&str>, config: &Config) -> String {
    config.log.directive(cli_level).to_string()
}

/// Initialize the tracing subscriber for logging
///
/// Logs are written to stderr; stdout carries query results.
fn init_logging(level: &str, format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_new(level)
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| anyhow::anyhow!("invalid log level: {}", e))?;

    match format {
        LogFormat::Console => tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .with(filter)
            .init(),
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init(),
    }

    Ok(())
}
