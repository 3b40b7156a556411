//! Table documents on disk
//!
//! Each table lives at `<data_dir>/<table_id>.json`.

use std::fs;
use std::path::PathBuf;

use tabula_analytics::{AnalyticsError, Result, TableData, TableLoader};
use tabula_config::TablesConfig;
use tracing::debug;

/// Reads table documents from the configured directory
#[derive(Debug, Clone)]
pub struct JsonTableLoader {
    tables: TablesConfig,
}

impl JsonTableLoader {
    pub fn new(tables: TablesConfig) -> Self {
        Self { tables }
    }

    fn path_for(&self, table_id: &str) -> Result<PathBuf> {
        let valid = !table_id.is_empty()
            && table_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(AnalyticsError::load(table_id, "invalid table id"));
        }
        Ok(self.tables.table_path(table_id))
    }
}

impl TableLoader for JsonTableLoader {
    fn load(&self, table_id: &str) -> Result<TableData> {
        let path = self.path_for(table_id)?;
        debug!(table_id, path = %path.display(), "loading table");

        let contents = fs::read_to_string(&path)
            .map_err(|e| AnalyticsError::load(table_id, format!("{}: {}", path.display(), e)))?;
        let table: TableData = serde_json::from_str(&contents)
            .map_err(|e| AnalyticsError::load(table_id, format!("{}: {}", path.display(), e)))?;

        debug!(
            table_id,
            columns = table.schema.len(),
            rows = table.rows.len(),
            "table loaded"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loader_in(dir: &tempfile::TempDir) -> JsonTableLoader {
        JsonTableLoader::new(TablesConfig {
            data_dir: dir.path().to_path_buf(),
        })
    }

    #[test]
    fn test_load_table_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("deals.json"),
            r#"{"schema":[{"id":"amount","name":"Amount","type":"number"}],"rows":[{"amount":5}]}"#,
        )
        .unwrap();

        let table = loader_in(&dir).load("deals").unwrap();
        assert_eq!(table.schema.len(), 1);
        assert_eq!(table.rows.len(), 1);
    }

    #[test]
    fn test_missing_table() {
        let dir = tempfile::tempdir().unwrap();
        let err = loader_in(&dir).load("absent").unwrap_err();
        assert!(matches!(err, AnalyticsError::Load { ref table_id, .. } if table_id == "absent"));
    }

    #[test]
    fn test_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        assert!(loader_in(&dir).load("broken").is_err());
    }

    #[test]
    fn test_rejects_path_like_ids() {
        let dir = tempfile::tempdir().unwrap();
        let loader = loader_in(&dir);
        for id in ["../etc/passwd", "a/b", "", "x.json"] {
            assert!(loader.load(id).is_err(), "{}", id);
        }
    }
}
