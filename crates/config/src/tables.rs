//! Table storage configuration

use std::path::PathBuf;

use serde::Deserialize;

/// Where table documents are read from
///
/// Each table is a JSON document `<data_dir>/<table_id>.json` holding
/// `{"schema": [...], "rows": [...]}`.
///
/// # Example
///
/// ```toml
/// [tables]
/// data_dir = "./tables"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TablesConfig {
    /// Directory containing table documents
    /// Default: "./tables"
    pub data_dir: PathBuf,
}

impl Default for TablesConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./tables"),
        }
    }
}

impl TablesConfig {
    /// Path of the document for a table id
    pub fn table_path(&self, table_id: &str) -> PathBuf {
        self.data_dir.join(format!("{}.json", table_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_data_dir() {
        let config = TablesConfig::default();
        assert_eq!(config.data_dir, PathBuf::from("./tables"));
    }

    #[test]
    fn test_table_path() {
        let config: TablesConfig = toml::from_str("data_dir = \"/srv/tables\"").unwrap();
        assert_eq!(
            config.table_path("deals"),
            PathBuf::from("/srv/tables/deals.json")
        );
    }
}
