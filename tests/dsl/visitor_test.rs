use mql::dsl::intermediate::ArithmeticOperator;
use mql::dsl::{FormulaParameter, IntermediateNode, AGGREGATE_ALIAS};
use mql::pipeline::parse_intermediate;

fn formula(source: &str) -> mql::dsl::Formula {
    match parse_intermediate(source).unwrap() {
        IntermediateNode::Formula(f) => f,
        other => panic!("expected formula, got {:?}", other),
    }
}

#[test]
fn test_single_aggregate_is_a_leaf() {
    match parse_intermediate(r#"max(s:sessions/user@none){release:"1.0"} by environment"#).unwrap() {
        IntermediateNode::Timeseries(ts) => {
            assert_eq!(ts.mri, "s:sessions/user@none");
            assert_eq!(ts.table_alias, "s0");
            assert_eq!(ts.expression.name, AGGREGATE_ALIAS);
            assert_eq!(ts.conditions.len(), 1);
            assert_eq!(ts.conditions[0].to_string(), "equals(release, '1.0')");
            assert_eq!(ts.groupby[0].name, "environment");
        }
        other => panic!("expected timeseries, got {:?}", other),
    }
}

#[test]
fn test_alias_numbering_is_deterministic() {
    let source = "sum(d:a/x@ms) / (count(c:a/y@none) + sum(d:a/z@ms)) - max(c:a/w@none)";
    let first: Vec<String> = parse_intermediate(source)
        .unwrap()
        .leaves()
        .iter()
        .map(|l| l.table_alias.clone())
        .collect();
    assert_eq!(first, vec!["d0", "c0", "d1", "c1"]);

    let second = parse_intermediate(source).unwrap();
    let second: Vec<&str> = second.leaves().iter().map(|l| l.table_alias.as_str()).collect();
    assert_eq!(first, second);
}

#[test]
fn test_formula_structure_follows_precedence() {
    let f = formula("sum(d:a/x@ms) + sum(d:a/y@ms) * 2");
    assert_eq!(f.operator, ArithmeticOperator::Plus);
    match &f.parameters[1] {
        FormulaParameter::Node(IntermediateNode::Formula(inner)) => {
            assert_eq!(inner.operator, ArithmeticOperator::Multiply);
            assert_eq!(inner.parameters[1], FormulaParameter::Scalar(2.0));
        }
        other => panic!("expected nested formula, got {:?}", other),
    }
}

#[test]
fn test_formula_filter_and_groupby_push_down() {
    let f = formula(r#"(sum(d:a/x@ms){a:"1"} * sum(d:a/y@ms) by z){b:"2"} by w"#);
    let leaves = f.leaves();

    let conditions: Vec<Vec<String>> = leaves
        .iter()
        .map(|l| l.conditions.iter().map(|c| c.to_string()).collect())
        .collect();
    assert_eq!(
        conditions,
        vec![
            vec!["equals(a, '1')".to_string(), "equals(b, '2')".to_string()],
            vec!["equals(b, '2')".to_string()],
        ]
    );

    let groupby: Vec<Vec<&str>> = leaves
        .iter()
        .map(|l| l.groupby.iter().map(|g| g.name.as_str()).collect())
        .collect();
    assert_eq!(groupby, vec![vec!["w"], vec!["z", "w"]]);
}

#[test]
fn test_filter_or_compiles_to_or() {
    match parse_intermediate("sum(d:a/b@c){a:1 OR b:2}").unwrap() {
        IntermediateNode::Timeseries(ts) => {
            assert_eq!(ts.conditions[0].to_string(), "or(equals(a, '1'), equals(b, '2'))");
        }
        other => panic!("expected timeseries, got {:?}", other),
    }
}

#[test]
fn test_semantic_rejections() {
    let cases = [
        ("sum(transaction.duration)", "MQL endpoint only supports MRIs"),
        ("sum($metric)", "Variables are not supported yet"),
        ("1", "No aggregate/expression or formula specified in MQL query"),
    ];
    for (source, message) in cases {
        let err = parse_intermediate(source).unwrap_err();
        assert!(!err.is_syntax(), "{}", source);
        assert_eq!(err.to_string(), message, "{}", source);
    }
}

#[test]
fn test_filtered_tree_serializes_to_json() {
    let node = parse_intermediate(r#"(sum(d:a/x@ms){env:"prod"} * 2) by release"#).unwrap();
    let value = serde_json::to_value(&node).unwrap();

    assert_eq!(value["kind"], "formula");
    assert_eq!(value["operator"], "multiply");
    assert_eq!(value["parameters"][1], 2.0);

    let leaf = &value["parameters"][0];
    assert_eq!(leaf["kind"], "timeseries");
    assert_eq!(leaf["mri"], "d:a/x@ms");
    let condition = &leaf["conditions"][0];
    assert_eq!(condition["kind"], "function_call");
    assert_eq!(condition["function_name"], "equals");
    assert_eq!(
        condition["parameters"][1],
        serde_json::json!({"kind": "literal", "type": "string", "value": "prod"})
    );
}
