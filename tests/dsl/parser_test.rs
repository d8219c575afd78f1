use mql::dsl::{parse, BinaryOp, Expr, FilterExpr, MetricName, TagValue, TargetKind};
use mql::MqlError;

fn aggregate_metric(expr: &Expr) -> &MetricName {
    match expr {
        Expr::Target(target) => match &target.kind {
            TargetKind::Aggregate { inner, .. } | TargetKind::CurriedAggregate { inner, .. } => &inner.metric,
            other => panic!("expected aggregate, got {:?}", other),
        },
        other => panic!("expected target, got {:?}", other),
    }
}

#[test]
fn test_whitespace_is_insignificant() {
    let compact = parse("sum(d:a/b@c){env:prod}by(x,y)").unwrap();
    let spaced = parse("  sum( d:a/b@c ) { env : prod }\n  by ( x , y )  ").unwrap();
    assert_eq!(compact, spaced);
}

#[test]
fn test_quoted_and_bare_mris_name_the_same_metric() {
    let bare = parse("sum(d:transactions/duration@millisecond)").unwrap();
    let quoted = parse("sum(`d:transactions/duration@millisecond`)").unwrap();
    match (aggregate_metric(&bare), aggregate_metric(&quoted)) {
        (MetricName::Mri { value: a, quoted: false }, MetricName::Mri { value: b, quoted: true }) => {
            assert_eq!(a, b)
        }
        other => panic!("unexpected metric names {:?}", other),
    }
}

#[test]
fn test_group_by_single_and_list() {
    for (source, expected) in [
        ("sum(d:a/b@c) by transaction", vec!["transaction"]),
        ("sum(d:a/b@c) by (transaction)", vec!["transaction"]),
        ("sum(d:a/b@c) by (transaction, status_code)", vec!["transaction", "status_code"]),
    ] {
        match parse(source).unwrap() {
            Expr::Target(target) => {
                let expected: Vec<String> = expected.into_iter().map(String::from).collect();
                assert_eq!(target.group_by, Some(expected), "{}", source);
            }
            other => panic!("expected target, got {:?}", other),
        }
    }
}

#[test]
fn test_filter_list_values() {
    match parse(r#"sum(d:a/b@c){status:["200", "404"]}"#).unwrap() {
        Expr::Target(target) => assert_eq!(
            target.filter,
            Some(FilterExpr::Condition {
                negated: false,
                key: "status".into(),
                value: TagValue::List(vec!["200".into(), "404".into()]),
            })
        ),
        other => panic!("expected target, got {:?}", other),
    }
}

#[test]
fn test_scalar_arithmetic() {
    let expr = parse("sum(d:a/b@c) / 1000").unwrap();
    match expr {
        Expr::Binary { op: BinaryOp::Divide, rhs, .. } => assert_eq!(*rhs, Expr::Number("1000".into())),
        other => panic!("expected binary, got {:?}", other),
    }
}

#[test]
fn test_syntax_errors() {
    for source in [
        "sum(d:a/b@c",
        "sum(d:a/b@c) by",
        "sum(d:a/b@c){env:}",
        "sum(d:a/b@c) +",
        "(sum(d:a/b@c)",
        "sum(d:a/b@c) sum(d:a/b@c)",
    ] {
        let err = parse(source).unwrap_err();
        assert!(err.is_syntax(), "{} produced {:?}", source, err);
    }
}

#[test]
fn test_syntax_error_position() {
    match parse("sum(d:a/b@c)\nby (x,").unwrap_err() {
        MqlError::Syntax { line, column, excerpt } => {
            assert_eq!(line, 2);
            assert!(column >= 1);
            assert!(excerpt.len() <= 13, "excerpt {:?}", excerpt);
        }
        other => panic!("expected syntax error, got {:?}", other),
    }
}
