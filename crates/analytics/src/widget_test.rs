//! Tests for declarative widget queries

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{Value, json};

use crate::aggregate::AggregateFn;
use crate::bucket::TimeBucket;
use crate::context::QueryContext;
use crate::filter::Filter;
use crate::schema::{ColumnDescriptor, Row};
use crate::timerange::RangePreset;
use crate::timeseries::ValueFormat;
use crate::widget::{
    METRIC_COLUMNS_NOT_FOUND, NO_DATA_IN_RANGE, NO_METRICS, WidgetMetric, WidgetQuery,
    missing_columns, run_widget_query_with,
};

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 0, 0, 0).unwrap()
}

fn ctx() -> QueryContext {
    QueryContext::at(now())
}

fn rows(values: Value) -> Vec<Row> {
    match values {
        Value::Array(items) => items
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                _ => panic!("row fixture must be an object"),
            })
            .collect(),
        _ => panic!("rows fixture must be an array"),
    }
}

fn schema() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("c_amt", "amount")
            .with_label("Amount")
            .with_type("money"),
        ColumnDescriptor::new("c_date", "closed_at").with_label("Closed"),
        ColumnDescriptor::new("c_stage", "stage").with_label("Stage"),
    ]
}

fn sum_amount() -> WidgetMetric {
    WidgetMetric::new(AggregateFn::Sum, "amount", "A")
}

#[test]
fn test_null_semantics_across_functions() {
    let data = rows(json!([
        {"amount": null},
        {"amount": ""},
        {"amount": 5},
        {"amount": "7"}
    ]));
    let query = WidgetQuery::new("deals")
        .with_metric(WidgetMetric::new(AggregateFn::Sum, "amount", "S"))
        .with_metric(WidgetMetric::new(AggregateFn::Avg, "amount", "V"))
        .with_metric(WidgetMetric::new(AggregateFn::Count, "amount", "C"));

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.message, None);
    assert_eq!(out.series.len(), 1);
    let row = &out.series[0];
    assert_eq!(row.t, "ALL");
    assert_eq!(row.get("S"), Some(12.0));
    assert_eq!(row.get("V"), Some(6.0));
    assert_eq!(row.get("C"), Some(2.0));
    assert_eq!(out.meta.row_count, 4);
    assert_eq!(out.meta.bucket_count, 1);
}

#[test]
fn test_month_buckets_with_missing_dates() {
    let data = rows(json!([
        {"closed_at": "2025-01-02", "amount": 10},
        {"closed_at": "2025-01-20", "amount": 5},
        {"closed_at": "2025-02-01", "amount": 7},
        {"closed_at": null, "amount": 999}
    ]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_date_column("closed_at")
        .with_time_bucket(TimeBucket::Month);

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    let series: Vec<_> = out.series.iter().map(|r| (r.t.as_str(), r.get("A"))).collect();
    assert_eq!(series, vec![("2025-01", Some(15.0)), ("2025-02", Some(7.0))]);
    assert_eq!(out.warnings.len(), 1);
    assert!(out.warnings[0].contains("missing a valid date"));
    assert!(out.warnings[0].contains('1'));
    assert_eq!(out.meta.row_count, 3);
}

#[test]
fn test_week_buckets_drop_dates_at_range_edge() {
    let earliest = chrono::NaiveDate::MIN
        .and_hms_opt(0, 0, 0)
        .unwrap()
        .and_utc()
        .timestamp_millis();
    let data = rows(json!([
        {"closed_at": earliest, "amount": 3},
        {"closed_at": "2025-01-15", "amount": 4}
    ]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_date_column("closed_at")
        .with_time_bucket(TimeBucket::Week);

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    let series: Vec<_> = out.series.iter().map(|r| (r.t.as_str(), r.get("A"))).collect();
    assert_eq!(series, vec![("2025-W03", Some(4.0))]);
    assert_eq!(out.meta.row_count, 1);
    assert!(out.warnings.iter().any(|w| w.contains("Excluded 1 row(s)")));
}

#[test]
fn test_blank_date_column_means_no_date_column() {
    let data = rows(json!([{"amount": 4}, {"amount": 6}]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_date_column("");

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.series[0].t, "ALL");
    assert_eq!(out.series[0].get("A"), Some(10.0));
    assert!(out.warnings.is_empty(), "{:?}", out.warnings);
    assert!(missing_columns(&schema(), &query).is_empty());
}

#[test]
fn test_custom_range_inclusive() {
    let data = rows(json!([
        {"closed_at": "2025-01-01", "amount": 1},
        {"closed_at": "2025-01-10", "amount": 2},
        {"closed_at": "2025-02-01", "amount": 100}
    ]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_date_column("c_date")
        .with_custom_range("2025-01-01", "2025-01-31");

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.series.len(), 1);
    assert_eq!(out.series[0].t, "ALL");
    assert_eq!(out.series[0].get("A"), Some(3.0));
    assert!(out.warnings.is_empty());
}

#[test]
fn test_rolling_range_uses_context_now() {
    let data = rows(json!([
        {"closed_at": "2025-02-25", "amount": 1},
        {"closed_at": "2025-02-01", "amount": 10}
    ]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_date_column("closed_at")
        .with_range(RangePreset::Last7Days);

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);
    assert_eq!(out.series[0].get("A"), Some(1.0));
}

#[test]
fn test_range_without_date_column_is_skipped_with_warning() {
    let data = rows(json!([{"amount": 4}, {"amount": 6}]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_custom_range("2025-01-01", "2025-01-31");

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.series[0].get("A"), Some(10.0));
    assert!(out.warnings.iter().any(|w| w.contains("range filter was skipped")));
}

#[test]
fn test_time_bucket_without_date_column() {
    let data = rows(json!([{"amount": 4}]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_time_bucket(TimeBucket::Day);

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.series[0].t, "ALL");
    assert!(out.warnings.iter().any(|w| w.contains("not time-bucketed")));
}

#[test]
fn test_no_metrics_message() {
    let query = WidgetQuery::new("deals");
    let out = run_widget_query_with(&ctx(), &query, &schema(), &[]);
    assert_eq!(out.message.as_deref(), Some(NO_METRICS));
    assert!(out.series.is_empty());
    assert!(out.is_empty_state());
}

#[test]
fn test_blank_metrics_count_as_missing() {
    let query = WidgetQuery::new("deals").with_metric(WidgetMetric::new(AggregateFn::Sum, "", "A"));
    let out = run_widget_query_with(&ctx(), &query, &schema(), &[]);
    assert_eq!(out.message.as_deref(), Some(NO_METRICS));
}

#[test]
fn test_unresolved_metric_columns_message() {
    let query = WidgetQuery::new("deals").with_metric(WidgetMetric::new(AggregateFn::Sum, "nope", "A"));
    let out = run_widget_query_with(&ctx(), &query, &schema(), &[]);
    assert_eq!(out.message.as_deref(), Some(METRIC_COLUMNS_NOT_FOUND));
}

#[test]
fn test_partially_resolved_metrics_warn() {
    let data = rows(json!([{"amount": 2}]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_metric(WidgetMetric::new(AggregateFn::Sum, "ghost", "G"));

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.series[0].get("A"), Some(2.0));
    assert_eq!(out.series[0].get("G"), None);
    assert!(out.warnings.iter().any(|w| w.contains("ghost")));
}

#[test]
fn test_empty_after_filters_message() {
    let data = rows(json!([{"amount": 2, "stage": "lost"}]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_filter(Filter::eq("Stage", "won"));

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.message.as_deref(), Some(NO_DATA_IN_RANGE));
    assert!(out.series.is_empty());
    // formats are still reported for the empty state
    assert_eq!(out.meta.formats.get("A"), Some(&ValueFormat::currency("USD")));
}

#[test]
fn test_filters_and_combine() {
    let data = rows(json!([
        {"amount": 1, "stage": "won"},
        {"amount": 20, "stage": "won"},
        {"amount": 300, "stage": "lost"}
    ]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_filter(Filter::eq("stage", "won"))
        .with_filter(Filter::new("amount", crate::filter::Operator::Gt, 5));

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);
    assert_eq!(out.series[0].get("A"), Some(20.0));
}

#[test]
fn test_unknown_filter_column_is_skipped() {
    let data = rows(json!([{"amount": 1}, {"amount": 2}]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_filter(Filter::eq("region", "west"));

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.series[0].get("A"), Some(3.0));
    assert!(out.warnings.iter().any(|w| w.contains("region")));
}

#[test]
fn test_duplicate_alias_keeps_first() {
    let data = rows(json!([{"amount": 1}, {"amount": 2}]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_metric(WidgetMetric::new(AggregateFn::Count, "amount", "A"));

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.series[0].get("A"), Some(3.0));
    assert!(out.warnings.iter().any(|w| w.contains("Duplicate metric alias")));
}

#[test]
fn test_meta_totals_min_max() {
    let data = rows(json!([
        {"closed_at": "2025-01-05", "amount": 4},
        {"closed_at": "2025-02-05", "amount": 10},
        {"closed_at": "2025-03-05", "amount": 1}
    ]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_date_column("closed_at")
        .with_time_bucket(TimeBucket::Month);

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    assert_eq!(out.meta.totals.get("A"), Some(&15.0));
    assert_eq!(out.meta.min.get("A"), Some(&1.0));
    assert_eq!(out.meta.max.get("A"), Some(&10.0));
    assert_eq!(out.meta.bucket_count, 3);
}

#[test]
fn test_formats_use_column_currency_and_context_default() {
    let schema = vec![
        ColumnDescriptor::new("c1", "price").with_type("money"),
        ColumnDescriptor::new("c2", "fee").with_type("currency").with_currency("JPY"),
        ColumnDescriptor::new("c3", "qty").with_type("number"),
    ];
    let data = rows(json!([{"price": 1, "fee": 2, "qty": 3}]));
    let query = WidgetQuery::new("orders")
        .with_metric(WidgetMetric::new(AggregateFn::Sum, "price", "P"))
        .with_metric(WidgetMetric::new(AggregateFn::Sum, "fee", "F"))
        .with_metric(WidgetMetric::new(AggregateFn::Sum, "qty", "Q"));

    let ctx = ctx().with_default_currency("EUR");
    let out = run_widget_query_with(&ctx, &query, &schema, &data);

    assert_eq!(out.meta.formats["P"], ValueFormat::currency("EUR"));
    assert_eq!(out.meta.formats["F"], ValueFormat::currency("JPY"));
    assert_eq!(out.meta.formats["Q"], ValueFormat::Number);
}

#[test]
fn test_week_buckets_sort_chronologically() {
    let data = rows(json!([
        {"closed_at": "2025-01-02", "amount": 1},
        {"closed_at": "2024-12-20", "amount": 2}
    ]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_date_column("closed_at")
        .with_time_bucket(TimeBucket::Week);

    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    let labels: Vec<_> = out.series.iter().map(|r| r.t.as_str()).collect();
    assert_eq!(labels, vec!["2024-W51", "2024-W01"]);
}

#[test]
fn test_context_defaults_apply_when_omitted() {
    let data = rows(json!([
        {"closed_at": "2025-01-05", "amount": 4},
        {"closed_at": "2025-02-05", "amount": 10}
    ]));
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_date_column("closed_at");

    let ctx = ctx().with_default_time_bucket(TimeBucket::Month);
    let out = run_widget_query_with(&ctx, &query, &schema(), &data);
    assert_eq!(out.series.len(), 2);

    // an explicit bucket wins over the default
    let query = query.with_time_bucket(TimeBucket::None);
    let out = run_widget_query_with(&ctx, &query, &schema(), &data);
    assert_eq!(out.series.len(), 1);
}

#[test]
fn test_does_not_mutate_inputs_and_is_deterministic() {
    let data = rows(json!([
        {"closed_at": "2025-01-05", "amount": "1,000"},
        {"closed_at": "bad", "amount": 3},
        {"closed_at": "2025-02-05", "amount": null}
    ]));
    let before = data.clone();
    let schema = schema();
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_metric(WidgetMetric::new(AggregateFn::Max, "amount", "M"))
        .with_date_column("closed_at")
        .with_time_bucket(TimeBucket::Month);

    let first = serde_json::to_string(&run_widget_query_with(&ctx(), &query, &schema, &data)).unwrap();
    let second = serde_json::to_string(&run_widget_query_with(&ctx(), &query, &schema, &data)).unwrap();

    assert_eq!(first, second);
    assert_eq!(data, before);
}

#[test]
fn test_series_serializes_flat() {
    let data = rows(json!([{"amount": 2}]));
    let query = WidgetQuery::new("deals").with_metric(sum_amount());
    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);

    let value = serde_json::to_value(&out).unwrap();
    assert_eq!(value["series"], json!([{"t": "ALL", "A": 2.0}]));
    assert_eq!(value["meta"]["formats"]["A"], json!({"kind": "currency", "currency": "USD"}));
    assert!(value.get("message").is_none());
}

#[test]
fn test_query_deserializes_wire_shape() {
    let query: WidgetQuery = serde_json::from_value(json!({
        "table_id": "deals",
        "metrics": [{"agg": "SUM", "column_id": "amount", "alias": "A"}],
        "date_column_id": "closed_at",
        "time_bucket": "month",
        "range": "custom",
        "range_start": "2025-01-01",
        "range_end": "2025-01-31",
        "filters": [{"column_id": "stage", "op": "eq", "value": "won"}]
    }))
    .unwrap();

    assert_eq!(query.metrics, vec![sum_amount()]);
    assert_eq!(query.time_bucket, Some(TimeBucket::Month));
    assert_eq!(query.range, Some(RangePreset::Custom));
    assert_eq!(query.filters, vec![Filter::eq("stage", "won")]);
}

#[test]
fn test_wire_agg_names_are_lenient() {
    let query: WidgetQuery = serde_json::from_value(json!({
        "table_id": "deals",
        "metrics": [
            {"agg": "sum", "column_id": "amount", "alias": "A"},
            {"agg": "median", "column_id": "amount", "alias": "M"}
        ]
    }))
    .unwrap();
    assert_eq!(query.metrics[0].agg, AggregateFn::Sum);
    assert_eq!(query.metrics[1].agg, AggregateFn::Unknown);

    let data = rows(json!([{"amount": 3}, {"amount": 4}]));
    let out = run_widget_query_with(&ctx(), &query, &schema(), &data);
    assert_eq!(out.series[0].get("A"), Some(7.0));
    assert_eq!(out.series[0].get("M"), Some(0.0));
}

#[test]
fn test_missing_columns() {
    let query = WidgetQuery::new("deals")
        .with_metric(sum_amount())
        .with_metric(WidgetMetric::new(AggregateFn::Sum, "ghost", "G"))
        .with_metric(WidgetMetric::new(AggregateFn::Avg, "ghost", "H"))
        .with_metric(WidgetMetric::new(AggregateFn::Count, "phantom", "P"))
        .with_date_column("when");

    assert_eq!(missing_columns(&schema(), &query), vec!["ghost", "phantom", "when"]);
}

#[test]
fn test_missing_columns_all_resolved() {
    let query = WidgetQuery::new("deals")
        .with_metric(WidgetMetric::new(AggregateFn::Sum, "Amount", "A"))
        .with_date_column("c_date");
    assert!(missing_columns(&schema(), &query).is_empty());
}
