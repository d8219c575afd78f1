use mql::pipeline::parse_mql_query_body;
use mql::query::{Dataset, EntityKey, FromClause};

#[test]
fn test_aggregate_of_metric_is_single_source() {
    for (agg, mri, entity) in [
        ("sum", "c:transactions/count@none", EntityKey::GenericMetricsCounters),
        ("avg", "d:transactions/duration@millisecond", EntityKey::GenericMetricsDistributions),
        ("uniq", "s:transactions/user@none", EntityKey::GenericMetricsSets),
        ("last", "g:custom/cpu@percent", EntityKey::GenericMetricsGauges),
    ] {
        let query = parse_mql_query_body(&format!("{}({})", agg, mri), Dataset::GenericMetrics).unwrap();
        match &query.from_clause {
            FromClause::Entity(e) => assert_eq!(e.key, entity),
            other => panic!("expected entity, got {:?}", other),
        }
        assert_eq!(query.selected_columns.len(), 1);
        assert_eq!(query.selected_columns[0].expression.to_string(), format!("{}(value)", agg));
        assert_eq!(
            query.condition.as_ref().map(|c| c.to_string()),
            Some(format!("equals(metric_id, '{}')", mri))
        );
    }
}

#[test]
fn test_two_leaf_formula_conditions_per_alias() {
    let query = parse_mql_query_body(
        "sum(d:transactions/duration@millisecond) / count(d:transactions/measurements.lcp@millisecond)",
        Dataset::GenericMetrics,
    )
    .unwrap();
    assert!(query.join_clause().unwrap().keys.is_empty());
    assert_eq!(query.metric_condition_count(), 2);

    let conditions: Vec<String> = query.top_level_conditions().iter().map(|c| c.to_string()).collect();
    assert_eq!(
        conditions,
        vec![
            "equals(d0.metric_id, 'd:transactions/duration@millisecond')",
            "equals(d1.metric_id, 'd:transactions/measurements.lcp@millisecond')",
        ]
    );
}

#[test]
fn test_formula_groupby_with_shared_keys() {
    let query = parse_mql_query_body(
        "(sum(d:transactions/duration@millisecond) / count(d:transactions/measurements.lcp@millisecond)) by (transaction)",
        Dataset::GenericMetrics,
    )
    .unwrap();
    let join = query.join_clause().unwrap();
    assert_eq!(join.keys.len(), 1);
    assert_eq!(join.keys[0].to_string(), "d1.transaction = d0.transaction");

    let selected: Vec<&str> = query.selected_columns.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(selected, vec!["aggregate_value", "transaction", "transaction"]);
}

#[test]
fn test_mixed_entity_join() {
    let query = parse_mql_query_body(
        "(sum(c:transactions/count@none) * max(d:transactions/duration@millisecond)) by (a, b)",
        Dataset::GenericMetrics,
    )
    .unwrap();
    assert_eq!(
        query.join_clause().unwrap().to_string(),
        "d0: generic_metrics_distributions INNER JOIN c0: generic_metrics_counters ON d0.a = c0.a AND d0.b = c0.b"
    );
    let entities: Vec<(Option<String>, EntityKey)> =
        query.entities().into_iter().map(|(alias, e)| (alias, e.key)).collect();
    assert_eq!(
        entities,
        vec![
            (Some("d0".to_string()), EntityKey::GenericMetricsDistributions),
            (Some("c0".to_string()), EntityKey::GenericMetricsCounters),
        ]
    );
}

#[test]
fn test_four_leaf_chain() {
    let query = parse_mql_query_body(
        "(sum(c:a/w@none) + sum(c:a/x@none) + sum(c:a/y@none) + sum(c:a/z@none)) by t",
        Dataset::GenericMetrics,
    )
    .unwrap();
    let join = query.join_clause().unwrap();
    let keys: Vec<String> = std::iter::successors(Some(join), |j| match &j.left_node {
        mql::query::join::JoinNode::Join(inner) => Some(inner.as_ref()),
        mql::query::join::JoinNode::Individual(_) => None,
    })
    .flat_map(|j| j.keys.iter().map(|k| k.to_string()))
    .collect();
    assert_eq!(keys, vec!["c1.t = c0.t", "c2.t = c1.t", "c3.t = c2.t"]);
    assert_eq!(query.metric_condition_count(), 4);
}

#[test]
fn test_mismatched_groupby_is_rejected() {
    let err = parse_mql_query_body(
        "sum(d:a/x@ms) by (x) + sum(d:a/y@ms) by (y)",
        Dataset::GenericMetrics,
    )
    .unwrap_err();
    assert!(err.to_string().contains("same groupby"));
}

#[test]
fn test_standard_dataset_entities() {
    let query = parse_mql_query_body("sum(c:sessions/session@none)", Dataset::Metrics).unwrap();
    match &query.from_clause {
        FromClause::Entity(e) => assert_eq!(e.key, EntityKey::MetricsCounters),
        other => panic!("expected entity, got {:?}", other),
    }
    let err = parse_mql_query_body("last(g:custom/cpu@percent)", Dataset::Metrics).unwrap_err();
    assert_eq!(err.to_string(), "invalid metric type g");
}
