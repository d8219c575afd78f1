use std::sync::Arc;

use chrono::{TimeZone, Utc};
use mql::context::IndexerMappings;
use mql::indexer::{IndexerResolver, ResolveError};
use mql::pipeline::{compile_query, CompileOptions};
use mql::query::expr::{binary_condition, column, combine_and_conditions, functions, lit_datetime};
use mql::query::{Dataset, Query};
use mql::{MqlResult, QueryProcessor};
use serde_json::{json, Value};

fn context(rollup: Value) -> Value {
    json!({
        "start": "2023-11-23T18:30:00",
        "end": "2023-11-23T22:30:00",
        "rollup": rollup,
        "scope": {"org_ids": [1], "project_ids": [11], "use_case_id": "transactions"},
        "limit": null,
        "offset": null,
        "indexer_mappings": {
            "d:transactions/duration@millisecond": 123456,
            "d:transactions/measurements.lcp@millisecond": 123457,
            "c:transactions/count@none": 123458,
            "transaction": 111111,
            "status_code": 222222
        }
    })
}

fn default_context() -> Value {
    context(json!({"granularity": 60}))
}

fn compile(body: &str, context: &Value) -> MqlResult<Query> {
    compile_query(body, context, &CompileOptions::default()).map(|output| output.query)
}

#[test]
fn test_compiled_plan() {
    let query = compile("sum(d:transactions/duration@millisecond) by transaction", &default_context()).unwrap();
    insta::assert_snapshot!(query.to_string().trim_end(), @r"
    MATCH (generic_metrics_distributions)
    SELECT sum(value) AS `aggregate_value`, tags_raw[111111] AS `transaction`
    BY tags_raw[111111]
    WHERE and(equals(metric_id, 123456), and(in(project_id, tuple(11)), and(in(org_id, tuple(1)), and(equals(use_case_id, 'transactions'), and(equals(granularity, 60), and(greaterOrEquals(timestamp, toDateTime('2023-11-23T18:30:00')), less(timestamp, toDateTime('2023-11-23T22:30:00'))))))))
    LIMIT 1000
    OFFSET 0
    ");

    let range = query.time_range.unwrap();
    assert_eq!(range.start, Utc.with_ymd_and_hms(2023, 11, 23, 18, 30, 0).unwrap());
    assert_eq!(range.end, Utc.with_ymd_and_hms(2023, 11, 23, 22, 30, 0).unwrap());
}

#[test]
fn test_single_quantile_is_unwrapped() {
    let query = compile("quantiles(0.5)(d:transactions/duration@millisecond)", &default_context()).unwrap();
    let selected = &query.selected_columns[0];
    assert_eq!(selected.name, "aggregate_value");
    assert_eq!(
        selected.expression.to_string(),
        "arrayElement(quantiles(0.5)(value), 1)"
    );
    assert_eq!(selected.expression.alias(), Some("aggregate_value"));
}

#[test]
fn test_multiple_quantiles_stay_an_array() {
    let query = compile("quantiles(0.5, 0.9)(d:transactions/duration@millisecond)", &default_context()).unwrap();
    assert_eq!(
        query.selected_columns[0].expression.to_string(),
        "quantiles(0.5, 0.9)(value)"
    );
}

#[test]
fn test_formula_compiles_to_join() {
    let query = compile(
        "(sum(d:transactions/duration@millisecond) / sum(d:transactions/measurements.lcp@millisecond)) by (transaction)",
        &context(json!({"granularity": 60, "interval": 60})),
    )
    .unwrap();

    let join = query.join_clause().unwrap();
    let keys: Vec<String> = join.keys.iter().map(|k| k.to_string()).collect();
    assert_eq!(keys, vec!["d1.transaction = d0.transaction", "d0.time = d1.time"]);

    let conditions: Vec<String> = query.top_level_conditions().iter().map(|c| c.to_string()).collect();
    assert!(conditions.contains(&"equals(d0.metric_id, 123456)".to_string()));
    assert!(conditions.contains(&"equals(d1.metric_id, 123457)".to_string()));
    assert_eq!(
        query.groupby.iter().map(|g| g.to_string()).collect::<Vec<_>>(),
        vec![
            "d0.tags_raw[111111]",
            "d1.tags_raw[111111]",
            "toStartOfInterval(d1.timestamp, toIntervalSecond(60), 'Universal')",
            "toStartOfInterval(d0.timestamp, toIntervalSecond(60), 'Universal')",
        ]
    );
}

#[test]
fn test_limit_paging() {
    let mut ctx = default_context();
    ctx["limit"] = json!(10000);
    ctx["offset"] = json!(100);
    let query = compile("sum(c:transactions/count@none)", &ctx).unwrap();
    assert_eq!(query.limit, Some(10000));
    assert_eq!(query.offset, 100);

    ctx["limit"] = json!(10001);
    let err = compile("sum(c:transactions/count@none)", &ctx).unwrap_err();
    assert!(!err.is_reportable());
}

#[test]
fn test_missing_metric_mapping() {
    let err = compile("sum(c:transactions/unknown@none)", &default_context()).unwrap_err();
    assert_eq!(err.to_string(), "No mapping found for metric c:transactions/unknown@none");
    assert!(!err.is_syntax());
}

#[test]
fn test_dry_run() {
    let options = CompileOptions::default().with_dry_run(true);
    let output = compile_query(
        "quantiles(0.5)(d:transactions/duration@millisecond)",
        &default_context(),
        &options,
    )
    .unwrap();
    let original = output.original_ast.unwrap();
    assert!(original.contains("quantiles(0.5)(value) AS `aggregate_value`"));
    assert!(!original.contains("arrayElement"));
    assert!(output.query.to_string().contains("arrayElement"));
}

#[test]
fn test_standard_dataset() {
    let options = CompileOptions::default().with_dataset(Dataset::Metrics);
    let output = compile_query(
        r#"sum(c:transactions/count@none){status_code:"200"}"#,
        &default_context(),
        &options,
    )
    .unwrap();
    assert!(output
        .query
        .top_level_conditions()
        .iter()
        .any(|c| c.to_string() == "equals(tags[222222], '200')"));
}

#[test]
fn test_compilation_is_idempotent() {
    let body = "(sum(d:transactions/duration@millisecond) * 2 - max(c:transactions/count@none)) by transaction";
    let ctx = context(json!({"granularity": 60, "interval": 3600, "with_totals": "True"}));
    let first = compile(body, &ctx).unwrap();
    let second = compile(body, &ctx).unwrap();
    assert_eq!(first, second);
    assert_eq!(first.to_string(), second.to_string());
}

/// Tightens the lower time bound to 20:00.
struct NarrowStart;

impl QueryProcessor for NarrowStart {
    fn name(&self) -> &'static str {
        "narrow_start"
    }

    fn process(&self, query: &mut Query) -> MqlResult<()> {
        query.add_condition(binary_condition(
            functions::GREATER_OR_EQUALS,
            column("timestamp"),
            lit_datetime(Utc.with_ymd_and_hms(2023, 11, 23, 20, 0, 0).unwrap()),
        ));
        Ok(())
    }
}

#[test]
fn test_custom_processor_runs_before_time_finalization() {
    let options = CompileOptions::default().with_processor(Arc::new(NarrowStart));
    let output = compile_query("sum(c:transactions/count@none)", &default_context(), &options).unwrap();
    let query = output.query;

    assert_eq!(
        query.time_range.map(|r| r.start),
        Some(Utc.with_ymd_and_hms(2023, 11, 23, 20, 0, 0).unwrap())
    );
    let lower_bounds = query
        .top_level_conditions()
        .iter()
        .filter(|c| c.is_call_to(functions::GREATER_OR_EQUALS))
        .count();
    assert_eq!(lower_bounds, 1);
}

/// Drops the org scope from the WHERE clause.
struct DropOrgScope;

impl QueryProcessor for DropOrgScope {
    fn name(&self) -> &'static str {
        "drop_org_scope"
    }

    fn process(&self, query: &mut Query) -> MqlResult<()> {
        let kept: Vec<_> = query
            .top_level_conditions()
            .into_iter()
            .filter(|c| !c.to_string().starts_with("in(org_id"))
            .cloned()
            .collect();
        query.condition = combine_and_conditions(kept);
        Ok(())
    }
}

#[test]
fn test_validators_reject_unscoped_plans() {
    let options = CompileOptions::default().with_processor(Arc::new(DropOrgScope));
    let err = compile_query("sum(d:transactions/duration@millisecond)", &default_context(), &options).unwrap_err();
    assert_eq!(
        err.to_string(),
        "missing required condition on org_id for generic_metrics_distributions"
    );
}

/// Fails with a multi-line message.
struct Unavailable;

impl IndexerResolver for Unavailable {
    fn resolve(&self, _: &mut Query, _: &IndexerMappings, _: Dataset) -> Result<(), ResolveError> {
        Err(ResolveError::InvalidCondition("indexer unavailable\nretry later".into()))
    }
}

#[test]
fn test_resolver_errors_keep_first_line() {
    let options = CompileOptions::default().with_resolver(Arc::new(Unavailable));
    let err = compile_query("sum(d:transactions/duration@millisecond)", &default_context(), &options).unwrap_err();
    assert_eq!(err.to_string(), "Invalid metric id condition: indexer unavailable");
}

#[test]
fn test_empty_time_range_is_rejected() {
    let mut ctx = default_context();
    ctx["end"] = json!("2023-11-23T18:30:00");
    let err = compile("sum(d:transactions/duration@millisecond)", &ctx).unwrap_err();
    assert_eq!(
        err.to_string(),
        "start time 2023-11-23T18:30:00 must be before end time 2023-11-23T18:30:00"
    );
}

#[test]
fn test_compiled_join_serializes_to_json() {
    let query = compile(
        r#"(sum(d:transactions/duration@millisecond){status_code:"200"} / sum(c:transactions/count@none)) by transaction"#,
        &context(json!({"granularity": 60, "interval": 3600})),
    )
    .unwrap();
    let rendered = serde_json::to_string(&query).unwrap();
    let value: Value = serde_json::from_str(&rendered).unwrap();

    assert_eq!(value["from_clause"]["kind"], "join");
    assert_eq!(value["limit"], 1000);
    assert!(rendered.contains(r#"{"kind":"literal","type":"int","value":123456}"#));
    assert!(rendered.contains(r#"{"kind":"literal","type":"int","value":60}"#));
    assert!(rendered.contains(r#"{"kind":"literal","type":"string","value":"transactions"}"#));
    assert!(rendered.contains(r#"{"kind":"literal","type":"date_time","value":"2023-11-23T18:30:00Z"}"#));
}
