//! Post-processing of populated queries.
//!
//! Processors rewrite a query in place after population and mapping
//! resolution. Each one is a small [`QueryProcessor`] so callers can slot
//! their own processors between the built-in ones.

pub mod validators;

pub use validators::{validators, QueryValidator};

use std::collections::BTreeSet;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::error::{MqlError, MqlResult};
use crate::query::expr::{
    binary_condition, combine_and_conditions, combine_or_conditions, functions, lit_datetime, lit_int,
    qualified_column, tuple, Column, Expression, FunctionCall, Literal, SubscriptableReference,
};
use crate::query::{Query, TimeRange};

/// `name[key]` column names.
static SUBSCRIPT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([a-zA-Z_][a-zA-Z0-9_.]*)\[([a-zA-Z0-9_.:-]+)\]$").unwrap());

/// A rewrite applied to a whole query.
pub trait QueryProcessor: Send + Sync {
    fn name(&self) -> &'static str;

    fn process(&self, query: &mut Query) -> MqlResult<()>;
}

/// The processors every MQL query goes through after population.
pub fn post_processors() -> Vec<Box<dyn QueryProcessor>> {
    vec![Box::new(SubscriptableParser), Box::new(QuantilesToQuantile)]
}

// =============================================================================
// Treeify
// =============================================================================

/// Rewrites n-ary `and`/`or` calls into right-nested binary calls.
#[derive(Debug, Default)]
pub struct TreeifyConditions;

impl QueryProcessor for TreeifyConditions {
    fn name(&self) -> &'static str {
        "treeify_conditions"
    }

    fn process(&self, query: &mut Query) -> MqlResult<()> {
        query.transform_expressions(&mut |e| match e {
            Expression::FunctionCall(call)
                if call.parameters.len() > 2
                    && (call.function_name == functions::AND || call.function_name == functions::OR) =>
            {
                let combined = if call.function_name == functions::AND {
                    combine_and_conditions(call.parameters)
                } else {
                    combine_or_conditions(call.parameters)
                };
                match combined {
                    Some(expr) => expr.with_alias(call.alias),
                    None => Expression::FunctionCall(FunctionCall {
                        alias: call.alias,
                        function_name: call.function_name,
                        parameters: Vec::new(),
                    }),
                }
            }
            other => other,
        });
        Ok(())
    }
}

// =============================================================================
// Subscriptable references
// =============================================================================

/// Turns columns named `name[key]` into subscriptable references.
#[derive(Debug, Default)]
pub struct SubscriptableParser;

impl QueryProcessor for SubscriptableParser {
    fn name(&self) -> &'static str {
        "subscriptable_parser"
    }

    fn process(&self, query: &mut Query) -> MqlResult<()> {
        query.transform_expressions(&mut |e| match e {
            Expression::Column(column) => {
                let parsed = SUBSCRIPT_PATTERN
                    .captures(&column.column_name)
                    .map(|caps| (caps[1].to_string(), caps[2].to_string()));
                match parsed {
                    Some((column_name, key)) => Expression::SubscriptableReference(SubscriptableReference {
                        alias: column.alias,
                        column: Column {
                            alias: None,
                            table_name: column.table_name,
                            column_name,
                        },
                        key,
                    }),
                    None => Expression::Column(column),
                }
            }
            other => other,
        });
        Ok(())
    }
}

// =============================================================================
// Quantiles
// =============================================================================

/// Rewrites `quantiles(q)(...)` to `arrayElement(quantiles(q)(...), 1)` so a
/// single quantile is returned as a scalar instead of a one-element array.
#[derive(Debug, Default)]
pub struct QuantilesToQuantile;

impl QueryProcessor for QuantilesToQuantile {
    fn name(&self) -> &'static str {
        "quantiles_to_quantile"
    }

    fn process(&self, query: &mut Query) -> MqlResult<()> {
        query.transform_expressions(&mut |e| match e {
            Expression::CurriedFunctionCall(curried)
                if matches!(curried.internal_function.function_name.as_str(), "quantiles" | "quantilesIf")
                    && curried.internal_function.parameters.len() == 1 =>
            {
                let alias = curried.alias.clone();
                let inner = Expression::CurriedFunctionCall(curried).with_alias(None);
                Expression::FunctionCall(FunctionCall {
                    alias,
                    function_name: functions::ARRAY_ELEMENT.into(),
                    parameters: vec![inner, lit_int(1)],
                })
            }
            other => other,
        });
        Ok(())
    }
}

// =============================================================================
// Filter in select
// =============================================================================

/// Adds a WHERE filter on the metric ids that conditional aggregates
/// (`sumIf(value, equals(metric_id, 1))`) select, so storage can skip
/// unrelated rows.
#[derive(Debug, Default)]
pub struct FilterInSelectOptimizer;

impl FilterInSelectOptimizer {
    /// Metric ids pinned by a condition, or `None` if it pins something else.
    fn pinned_ids(condition: &Expression) -> Option<Vec<Literal>> {
        let call = condition.as_function()?;
        let is_metric = call
            .parameters
            .first()
            .and_then(Expression::as_column)
            .is_some_and(|c| c.column_name == "metric_id");
        if !is_metric {
            return None;
        }
        match (call.function_name.as_str(), call.parameters.get(1)?) {
            (functions::EQUALS, Expression::Literal(lit)) => Some(vec![lit.clone()]),
            (functions::IN, Expression::FunctionCall(values)) if values.function_name == functions::TUPLE => values
                .parameters
                .iter()
                .map(|p| match p {
                    Expression::Literal(lit) => Some(lit.clone()),
                    _ => None,
                })
                .collect(),
            _ => None,
        }
    }

    /// The condition argument of a conditional aggregate.
    fn aggregate_condition(expr: &Expression) -> Option<&Expression> {
        let (name, parameters) = match expr {
            Expression::FunctionCall(call) => (&call.function_name, &call.parameters),
            Expression::CurriedFunctionCall(curried) => {
                (&curried.internal_function.function_name, &curried.parameters)
            }
            _ => return None,
        };
        if name.ends_with("If") {
            parameters.last()
        } else {
            None
        }
    }
}

impl QueryProcessor for FilterInSelectOptimizer {
    fn name(&self) -> &'static str {
        "filter_in_select_optimizer"
    }

    fn process(&self, query: &mut Query) -> MqlResult<()> {
        if query.is_composite() {
            return Ok(());
        }

        let mut conditions = Vec::new();
        for selected in &query.selected_columns {
            selected.expression.walk(&mut |e| {
                if let Some(condition) = Self::aggregate_condition(e) {
                    conditions.push(condition);
                }
            });
        }
        if conditions.is_empty() {
            return Ok(());
        }

        let mut ids = Vec::new();
        for condition in conditions {
            match Self::pinned_ids(condition) {
                Some(pinned) => ids.extend(pinned),
                None => return Ok(()),
            }
        }
        let mut seen = BTreeSet::new();
        ids.retain(|lit| seen.insert(lit.to_string()));

        query.add_condition(binary_condition(
            functions::IN,
            qualified_column(None, "metric_id"),
            tuple(ids.into_iter().map(Expression::Literal).collect()),
        ));
        Ok(())
    }
}

// =============================================================================
// Time conditions
// =============================================================================

/// Collapses the time bounds of every aliased entity into one canonical
/// `>= start` / `< end` pair and records the range on the query.
#[derive(Debug, Default)]
pub struct TimeConditionFinalizer;

enum Bound {
    Lower(DateTime<Utc>),
    Upper(DateTime<Utc>),
}

fn time_bound(condition: &Expression, table: Option<&str>, time_column: &str) -> Option<Bound> {
    let call = condition.as_function()?;
    let column = call.parameters.first()?.as_column()?;
    if column.table_name.as_deref() != table || column.column_name != time_column {
        return None;
    }
    let Some(Expression::Literal(Literal::DateTime(value))) = call.parameters.get(1) else {
        return None;
    };
    match call.function_name.as_str() {
        functions::GREATER_OR_EQUALS => Some(Bound::Lower(*value)),
        functions::LESS => Some(Bound::Upper(*value)),
        _ => None,
    }
}

impl QueryProcessor for TimeConditionFinalizer {
    fn name(&self) -> &'static str {
        "time_condition_finalizer"
    }

    fn process(&self, query: &mut Query) -> MqlResult<()> {
        let entities = query.entities();
        let mut remaining: Vec<Expression> = query.top_level_conditions().into_iter().cloned().collect();
        let mut bounds = Vec::new();
        let mut range: Option<TimeRange> = None;

        for (alias, entity) in &entities {
            let table = alias.as_deref();
            let time_column = entity.required_time_column;
            let mut start: Option<DateTime<Utc>> = None;
            let mut end: Option<DateTime<Utc>> = None;

            remaining.retain(|condition| match time_bound(condition, table, time_column) {
                Some(Bound::Lower(value)) => {
                    start = Some(start.map_or(value, |s| s.max(value)));
                    false
                }
                Some(Bound::Upper(value)) => {
                    end = Some(end.map_or(value, |e| e.min(value)));
                    false
                }
                None => true,
            });

            if let (Some(s), Some(e)) = (start, end) {
                if s >= e {
                    return Err(MqlError::semantic(format!(
                        "start time {} must be before end time {}",
                        s.format("%Y-%m-%dT%H:%M:%S"),
                        e.format("%Y-%m-%dT%H:%M:%S")
                    )));
                }
                range = Some(match range {
                    Some(r) => TimeRange {
                        start: r.start.max(s),
                        end: r.end.min(e),
                    },
                    None => TimeRange { start: s, end: e },
                });
            }
            if let Some(s) = start {
                bounds.push(binary_condition(
                    functions::GREATER_OR_EQUALS,
                    qualified_column(table, time_column),
                    lit_datetime(s),
                ));
            }
            if let Some(e) = end {
                bounds.push(binary_condition(
                    functions::LESS,
                    qualified_column(table, time_column),
                    lit_datetime(e),
                ));
            }
        }

        remaining.extend(bounds);
        query.condition = combine_and_conditions(remaining);
        query.time_range = range;
        Ok(())
    }
}
