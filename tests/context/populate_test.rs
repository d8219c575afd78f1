use mql::config::Settings;
use mql::context::{populate_query_from_context, MqlContext};
use mql::pipeline::parse_mql_query_body;
use mql::query::{Dataset, Query};
use mql::MqlResult;
use serde_json::{json, Value};

fn context(rollup: Value, limit: Value, offset: Value) -> Value {
    json!({
        "start": "2024-02-01T00:00:00Z",
        "end": "2024-02-02T00:00:00Z",
        "rollup": rollup,
        "scope": {"org_ids": [7], "project_ids": [70, 71], "use_case_id": "custom"},
        "limit": limit,
        "offset": offset,
        "indexer_mappings": {}
    })
}

fn populate(source: &str, context: Value) -> MqlResult<Query> {
    let mut query = parse_mql_query_body(source, Dataset::GenericMetrics)?;
    let context = MqlContext::from_value(&context)?;
    populate_query_from_context(&mut query, &context, &Settings::default())?;
    Ok(query)
}

fn rollup(value: Value) -> MqlResult<Query> {
    populate("sum(c:custom/clicks@none)", context(value, Value::Null, Value::Null))
}

fn limit(value: Value) -> MqlResult<Query> {
    populate(
        "sum(c:custom/clicks@none)",
        context(json!({"granularity": 60}), value, Value::Null),
    )
}

#[test]
fn test_every_allowed_granularity() {
    for granularity in [10, 60, 3600, 86400] {
        let query = rollup(json!({"granularity": granularity})).unwrap();
        let expected = format!("equals(granularity, {})", granularity);
        assert!(query
            .top_level_conditions()
            .iter()
            .any(|c| c.to_string() == expected));
    }
    for granularity in [0, 1, 59, 120, 604800] {
        assert!(rollup(json!({"granularity": granularity})).is_err(), "{}", granularity);
    }
}

#[test]
fn test_interval_must_cover_granularity() {
    assert!(rollup(json!({"granularity": 60, "interval": 30})).is_err());
    assert!(rollup(json!({"granularity": 60, "interval": 60})).is_ok());
    assert!(rollup(json!({"granularity": 60, "interval": 90})).is_ok());
}

#[test]
fn test_interval_and_orderby_conflict() {
    for orderby in ["ASC", "DESC"] {
        let err = rollup(json!({"granularity": 60, "interval": 3600, "orderby": orderby})).unwrap_err();
        assert_eq!(err.to_string(), "orderby is not supported when interval is specified");
    }
}

#[test]
fn test_with_totals_values() {
    assert!(rollup(json!({"granularity": 60, "interval": 60, "with_totals": "True"}))
        .unwrap()
        .totals);
    assert!(!rollup(json!({"granularity": 60, "interval": 60, "with_totals": "False"}))
        .unwrap()
        .totals);
    for invalid in [json!("true"), json!("yes"), json!(1), json!(false)] {
        let err = rollup(json!({"granularity": 60, "with_totals": invalid})).unwrap_err();
        assert_eq!(err.to_string(), "with_totals must be a string, either 'True' or 'False'");
    }
}

#[test]
fn test_limit_boundaries() {
    assert_eq!(limit(Value::Null).unwrap().limit, Some(1000));
    assert_eq!(limit(json!(1)).unwrap().limit, Some(1));
    assert_eq!(limit(json!(10000)).unwrap().limit, Some(10000));

    let err = limit(json!(10001)).unwrap_err();
    assert_eq!(err.to_string(), "queries cannot have a limit higher than 10000");
    assert!(!err.is_reportable());
}

#[test]
fn test_offset_must_not_be_negative() {
    let query = populate(
        "sum(c:custom/clicks@none)",
        context(json!({"granularity": 60}), Value::Null, json!(25)),
    )
    .unwrap();
    assert_eq!(query.offset, 25);

    let err = populate(
        "sum(c:custom/clicks@none)",
        context(json!({"granularity": 60}), Value::Null, json!(-1)),
    )
    .unwrap_err();
    assert_eq!(err.to_string(), "offset must be greater than or equal to 0");
}

#[test]
fn test_scope_conditions() {
    let query = rollup(json!({"granularity": 60})).unwrap();
    let conditions: Vec<String> = query.top_level_conditions().iter().map(|c| c.to_string()).collect();
    assert!(conditions.contains(&"in(project_id, tuple(70, 71))".to_string()));
    assert!(conditions.contains(&"in(org_id, tuple(7))".to_string()));
    assert!(conditions.contains(&"equals(use_case_id, 'custom')".to_string()));
    assert!(conditions.contains(&"greaterOrEquals(timestamp, toDateTime('2024-02-01T00:00:00'))".to_string()));
    assert!(conditions.contains(&"less(timestamp, toDateTime('2024-02-02T00:00:00'))".to_string()));
}

#[test]
fn test_two_leaf_bucketed_join_joins_on_time() {
    let query = populate(
        "sum(c:custom/a@none) / sum(c:custom/b@none)",
        context(json!({"granularity": 60, "interval": 60}), Value::Null, Value::Null),
    )
    .unwrap();
    let keys: Vec<String> = query
        .join_clause()
        .unwrap()
        .keys
        .iter()
        .map(|k| k.to_string())
        .collect();
    assert_eq!(keys, vec!["c0.time = c1.time"]);
}
