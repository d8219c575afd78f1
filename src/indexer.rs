//! Indexer mapping resolution.
//!
//! Storage addresses metrics and tags by integer ids. The context carries a
//! name to id mapping; a resolver rewrites the plan so it only references
//! ids.

use thiserror::Error;

use crate::context::IndexerMappings;
use crate::query::expr::{functions, Column, Expression, Literal};
use crate::query::{Dataset, Query};

/// Columns that are stored as-is and never looked up as tags.
const RESERVED_COLUMNS: &[&str] = &[
    "metric_id",
    "timestamp",
    "org_id",
    "project_id",
    "use_case_id",
    "granularity",
    "value",
];

/// Errors raised while resolving mappings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("No mapping found for metric {0}")]
    MissingMetric(String),

    #[error("Invalid metric id condition: {0}")]
    InvalidCondition(String),
}

/// Rewrites names in a plan into indexed ids.
pub trait IndexerResolver: Send + Sync {
    fn resolve(&self, query: &mut Query, mappings: &IndexerMappings, dataset: Dataset) -> Result<(), ResolveError>;
}

/// Resolver driven entirely by the context's mapping table.
#[derive(Debug, Clone, Copy, Default)]
pub struct MappingResolver;

impl IndexerResolver for MappingResolver {
    fn resolve(&self, query: &mut Query, mappings: &IndexerMappings, dataset: Dataset) -> Result<(), ResolveError> {
        // Values first, while tag columns still carry their names
        query.try_transform_expressions(&mut |e| resolve_values(e, mappings, dataset))?;
        query.transform_expressions(&mut |e| resolve_tag_column(e, mappings, dataset));
        Ok(())
    }
}

/// Id of the tag a column names, if it is a mapped tag.
fn tag_id(column: &Column, mappings: &IndexerMappings) -> Option<u64> {
    if RESERVED_COLUMNS.contains(&column.column_name.as_str()) {
        return None;
    }
    mappings.get(&column.column_name).copied()
}

fn is_tag(column: &Column, mappings: &IndexerMappings) -> bool {
    tag_id(column, mappings).is_some()
}

fn resolve_values(expr: Expression, mappings: &IndexerMappings, dataset: Dataset) -> Result<Expression, ResolveError> {
    let mut call = match expr {
        Expression::FunctionCall(call) if functions::CONDITIONS.contains(&call.function_name.as_str()) => call,
        other => return Ok(other),
    };
    let (on_metric, on_tag) = match call.parameters.first() {
        Some(Expression::Column(lhs)) => (
            lhs.column_name == "metric_id",
            dataset == Dataset::Metrics && is_tag(lhs, mappings),
        ),
        _ => (false, false),
    };

    if on_metric {
        for param in call.parameters.iter_mut().skip(1) {
            *param = map_metric(std::mem::replace(param, Expression::Literal(Literal::Int(0))), mappings)?;
        }
    } else if on_tag {
        for param in call.parameters.iter_mut().skip(1) {
            let value = std::mem::replace(param, Expression::Literal(Literal::Int(0)));
            *param = value.transform(&mut |e| match e {
                Expression::Literal(Literal::String(s)) => match mappings.get(&s) {
                    Some(id) => Expression::Literal(Literal::Int(*id as i64)),
                    None => Expression::Literal(Literal::String(s)),
                },
                other => other,
            });
        }
    }
    Ok(Expression::FunctionCall(call))
}

/// Map the metric name literals under `expr` to their ids.
fn map_metric(expr: Expression, mappings: &IndexerMappings) -> Result<Expression, ResolveError> {
    expr.try_transform(&mut |e| match e {
        Expression::Literal(Literal::String(mri)) => match mappings.get(&mri) {
            Some(id) => Ok(Expression::Literal(Literal::Int(*id as i64))),
            None => Err(ResolveError::MissingMetric(mri)),
        },
        Expression::Literal(Literal::Float(_)) | Expression::Literal(Literal::DateTime(_)) => {
            Err(ResolveError::InvalidCondition(e.to_string()))
        }
        other => Ok(other),
    })
}

fn resolve_tag_column(expr: Expression, mappings: &IndexerMappings, dataset: Dataset) -> Expression {
    match expr {
        Expression::Column(mut column) => {
            if let Some(id) = tag_id(&column, mappings) {
                column.column_name = format!("{}[{}]", dataset.tag_column(), id);
            }
            Expression::Column(column)
        }
        other => other,
    }
}
