//! Result rendering for the CLI

use std::fmt;
use std::str::FromStr;

use anyhow::Result;
use serde::Serialize;
use tabula_analytics::value::format_js_number;
use tabula_analytics::{FormulaOutput, WidgetQueryOutput};

/// Maximum rendered column width
const MAX_WIDTH: usize = 50;

/// How results are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Table,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "table" => Ok(Self::Table),
            other => Err(format!("unknown format '{}' (expected json or table)", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Json => write!(f, "json"),
            Self::Table => write!(f, "table"),
        }
    }
}

/// Pretty-printed JSON
pub fn to_json<T: Serialize>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Widget series as a table: `t` followed by one column per metric alias
pub fn widget_table(output: &WidgetQueryOutput) -> String {
    let mut columns = vec!["t".to_string()];
    columns.extend(output.meta.formats.keys().cloned());

    let rows: Vec<Vec<String>> = output
        .series
        .iter()
        .map(|row| {
            let mut cells = vec![row.t.clone()];
            cells.extend(
                columns[1..]
                    .iter()
                    .map(|alias| row.get(alias).map(format_js_number).unwrap_or_default()),
            );
            cells
        })
        .collect();

    render_table(&columns, &rows)
}

/// Formula result as a table
pub fn formula_table(output: &FormulaOutput) -> String {
    match output {
        FormulaOutput::Metric { value } => render_table(
            &["value".to_string()],
            &[vec![format_js_number(*value)]],
        ),
        FormulaOutput::Series { points } => {
            let rows: Vec<Vec<String>> = points
                .iter()
                .map(|p| vec![p.x.clone(), format_js_number(p.value)])
                .collect();
            render_table(&["x".to_string(), "value".to_string()], &rows)
        }
    }
}

/// ASCII table with `|` separated, width-capped columns
fn render_table(columns: &[String], rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        return "(empty result)\n".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.chars().count()).collect();
    for row in rows {
        for (i, value) in row.iter().enumerate() {
            let len = value.chars().count();
            if len > widths[i] {
                widths[i] = len;
            }
        }
    }
    for w in &mut widths {
        if *w > MAX_WIDTH {
            *w = MAX_WIDTH;
        }
    }

    let mut out = String::new();

    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| pad(c, *w))
        .collect();
    out.push_str(header.join(" | ").trim_end());
    out.push('\n');

    let sep: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
    out.push_str(&sep.join("-+-"));
    out.push('\n');

    for row in rows {
        let values: Vec<String> = row.iter().zip(&widths).map(|(v, w)| pad(v, *w)).collect();
        out.push_str(values.join(" | ").trim_end());
        out.push('\n');
    }

    out
}

fn pad(s: &str, width: usize) -> String {
    if s.chars().count() > width {
        let head: String = s.chars().take(width.saturating_sub(3)).collect();
        format!("{}...", head)
    } else {
        format!("{:width$}", s, width = width)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_analytics::{SeriesPoint, SeriesRow, ValueFormat, WidgetMeta};

    #[test]
    fn test_parse_format() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("TABLE".parse::<OutputFormat>().unwrap(), OutputFormat::Table);
        assert!("csv".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_widget_table() {
        let mut row = SeriesRow::new("2024-01");
        row.values.insert("revenue".to_string(), 1500.0);
        row.values.insert("deals".to_string(), 3.0);

        let mut meta = WidgetMeta::default();
        meta.formats.insert("deals".to_string(), ValueFormat::Number);
        meta.formats.insert("revenue".to_string(), ValueFormat::currency("USD"));

        let output = WidgetQueryOutput {
            series: vec![row],
            meta,
            warnings: vec![],
            message: None,
        };

        let rendered = widget_table(&output);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines[0], "t       | deals | revenue");
        assert_eq!(lines[1], "--------+-------+--------");
        assert_eq!(lines[2], "2024-01 | 3     | 1500");
    }

    #[test]
    fn test_empty_widget_table() {
        let output = WidgetQueryOutput::empty("No data in the selected range.", vec![]);
        assert_eq!(widget_table(&output), "(empty result)\n");
    }

    #[test]
    fn test_formula_tables() {
        assert_eq!(
            formula_table(&FormulaOutput::metric(0.75)),
            "value\n-----\n0.75\n"
        );

        let series = FormulaOutput::Series {
            points: vec![SeriesPoint::new("alice", 2.0), SeriesPoint::new("bob", 0.5)],
        };
        assert_eq!(
            formula_table(&series),
            "x     | value\n------+------\nalice | 2\nbob   | 0.5\n"
        );
    }

    #[test]
    fn test_long_values_are_truncated() {
        let long = "x".repeat(60);
        let rendered = render_table(&["c".to_string()], &[vec![long]]);
        let last = rendered.lines().last().unwrap();
        assert_eq!(last.chars().count(), MAX_WIDTH);
        assert!(last.ends_with("..."));
    }
}
