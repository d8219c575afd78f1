use std::sync::Arc;
use std::thread;

use mql::pipeline::{compile_query, CompileOptions};
use serde_json::json;

#[test]
fn test_concurrent_compilations_are_independent() {
    let context = json!({
        "start": "2024-01-01T00:00:00Z",
        "end": "2024-01-01T06:00:00Z",
        "rollup": {"granularity": 60, "interval": 3600},
        "scope": {"org_ids": [1], "project_ids": [1], "use_case_id": "transactions"},
        "indexer_mappings": {
            "d:transactions/duration@millisecond": 1,
            "c:transactions/count@none": 2,
            "s:transactions/user@none": 3
        }
    });
    let options = Arc::new(CompileOptions::default());
    let queries = [
        "sum(d:transactions/duration@millisecond)",
        "sum(d:transactions/duration@millisecond) / sum(c:transactions/count@none)",
        "(uniq(s:transactions/user@none) + max(d:transactions/duration@millisecond) * sum(c:transactions/count@none)) by env",
    ];

    let expected: Vec<String> = queries
        .iter()
        .map(|q| compile_query(q, &context, &options).unwrap().query.to_string())
        .collect();

    thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let options = Arc::clone(&options);
                let context = &context;
                let queries = &queries;
                scope.spawn(move || {
                    (0..25)
                        .map(|n| {
                            let index = (i + n) % queries.len();
                            let plan = compile_query(queries[index], context, &options).unwrap();
                            (index, plan.query.to_string())
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        for handle in handles {
            for (index, rendered) in handle.join().unwrap() {
                assert_eq!(rendered, expected[index]);
            }
        }
    });
}
