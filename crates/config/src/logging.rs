//! `[log]` section
//!
//! The `tabula` binary writes diagnostics to stderr only. Query results own
//! stdout, so raising the level never corrupts piped JSON.
//!
//! What each level shows:
//!
//! | level   | engine output                                   |
//! |---------|-------------------------------------------------|
//! | `trace` | every formula reference and its aggregate       |
//! | `debug` | table loads, ignored joins, per-query summaries |
//! | `info`  | nothing from the engine; the default            |
//! | `warn`  | same as info                                    |
//! | `error` | same as info                                    |
//!
//! Data-quality problems never show up here. They travel in the result's
//! `warnings` list.

use serde::Deserialize;

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// `EnvFilter` directive for this level
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Line format on stderr
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Console,
    /// One JSON object per event, for log shippers
    Json,
}

/// ```toml
/// [log]
/// level = "debug"
/// format = "json"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

impl LogConfig {
    /// Filter directive to install, with `--log-level` taking precedence
    ///
    /// The override is passed through untouched so that full `EnvFilter`
    /// directives such as `tabula_analytics=trace` keep working.
    pub fn directive<'a>(&self, cli_override: Option<&'a str>) -> &'a str {
        match cli_override {
            Some(level) if !level.trim().is_empty() => level,
            _ => self.level.as_str(),
        }
    }
}
