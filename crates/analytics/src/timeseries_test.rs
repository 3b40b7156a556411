//! Tests for result types

use std::collections::BTreeMap;

use serde_json::json;

use crate::timeseries::{FormulaOutput, SeriesPoint, SeriesRow, ValueFormat, WidgetQueryOutput};

fn series_row(t: &str, values: &[(&str, f64)]) -> SeriesRow {
    let mut row = SeriesRow::new(t);
    for (alias, value) in values {
        row.values.insert(alias.to_string(), *value);
    }
    row
}

#[test]
fn test_from_series_computes_meta() {
    let series = vec![
        series_row("2025-01", &[("A", 4.0), ("B", -1.0)]),
        series_row("2025-02", &[("A", 6.0), ("B", 3.0)]),
    ];
    let out = WidgetQueryOutput::from_series(series, BTreeMap::new(), 9, vec![]);

    assert_eq!(out.meta.totals["A"], 10.0);
    assert_eq!(out.meta.totals["B"], 2.0);
    assert_eq!(out.meta.min["A"], 4.0);
    assert_eq!(out.meta.max["B"], 3.0);
    assert_eq!(out.meta.row_count, 9);
    assert_eq!(out.meta.bucket_count, 2);
    assert!(!out.is_empty_state());
}

#[test]
fn test_empty_output() {
    let out = WidgetQueryOutput::empty("No metrics configured.", vec!["w".to_string()]);
    assert!(out.is_empty_state());
    assert!(out.series.is_empty());
    assert_eq!(out.meta.bucket_count, 0);
    assert_eq!(out.warnings, vec!["w"]);
}

#[test]
fn test_widget_output_roundtrip() {
    let mut formats = BTreeMap::new();
    formats.insert("A".to_string(), ValueFormat::currency("EUR"));
    let out = WidgetQueryOutput::from_series(
        vec![series_row("ALL", &[("A", 1.5)])],
        formats,
        1,
        vec![],
    );

    let text = serde_json::to_string(&out).unwrap();
    let back: WidgetQueryOutput = serde_json::from_str(&text).unwrap();
    assert_eq!(back, out);
}

#[test]
fn test_value_format_wire_shape() {
    assert_eq!(
        serde_json::to_value(ValueFormat::currency("USD")).unwrap(),
        json!({"kind": "currency", "currency": "USD"})
    );
    assert_eq!(
        serde_json::to_value(ValueFormat::Number).unwrap(),
        json!({"kind": "number"})
    );
}

#[test]
fn test_formula_output_accessors() {
    let metric = FormulaOutput::metric(3.0);
    assert_eq!(metric.as_metric(), Some(3.0));
    assert!(metric.points().is_none());

    let series = FormulaOutput::Series {
        points: vec![SeriesPoint::new("#1", 2.0)],
    };
    assert_eq!(series.as_metric(), None);
    assert_eq!(series.points().map(<[SeriesPoint]>::len), Some(1));
}
