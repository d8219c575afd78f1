//! Final semantic checks on a processed query.
//!
//! Validators never rewrite the query. Each rejects a plan that storage
//! could not execute correctly.

use std::collections::{HashMap, HashSet};

use crate::error::{MqlError, MqlResult};
use crate::query::expr::{functions, Column, Expression};
use crate::query::Query;

/// A read-only check on a query.
pub trait QueryValidator: Send + Sync {
    fn name(&self) -> &'static str;

    fn validate(&self, query: &Query) -> MqlResult<()>;
}

/// The validators every MQL query must pass.
pub fn validators() -> Vec<Box<dyn QueryValidator>> {
    vec![
        Box::new(NoConflictingAliases),
        Box::new(RequiredConditions),
        Box::new(QualifiedColumns),
    ]
}

/// An alias may only ever name one expression. Table qualifiers are ignored
/// when comparing, since every leaf of a join selects the same outputs.
#[derive(Debug, Default)]
pub struct NoConflictingAliases;

impl QueryValidator for NoConflictingAliases {
    fn name(&self) -> &'static str {
        "no_conflicting_aliases"
    }

    fn validate(&self, query: &Query) -> MqlResult<()> {
        let mut seen: HashMap<&str, Expression> = HashMap::new();
        let mut conflict = None;
        for root in query.expressions() {
            root.walk(&mut |e| {
                let Some(alias) = e.alias() else {
                    return;
                };
                let unqualified = e.clone().qualify(None);
                match seen.get(alias) {
                    Some(existing) if *existing != unqualified => {
                        conflict.get_or_insert_with(|| alias.to_string());
                    }
                    Some(_) => {}
                    None => {
                        seen.insert(alias, unqualified);
                    }
                }
            });
        }
        match conflict {
            Some(alias) => Err(MqlError::semantic(format!(
                "alias {} is shadowed by different expressions",
                alias
            ))),
            None => Ok(()),
        }
    }
}

/// Every entity must be constrained on its required filter columns and
/// bounded on both sides of its time column.
#[derive(Debug, Default)]
pub struct RequiredConditions;

impl QueryValidator for RequiredConditions {
    fn name(&self) -> &'static str {
        "required_conditions"
    }

    fn validate(&self, query: &Query) -> MqlResult<()> {
        let conditions = query.top_level_conditions();
        let constrains = |table: Option<&str>, column: &str, names: &[&str]| {
            conditions.iter().any(|c| {
                c.as_function().is_some_and(|call| {
                    names.contains(&call.function_name.as_str())
                        && call
                            .parameters
                            .first()
                            .and_then(Expression::as_column)
                            .is_some_and(|col| col.table_name.as_deref() == table && col.column_name == column)
                })
            })
        };

        for (alias, entity) in query.entities() {
            let table = alias.as_deref();
            for &column in entity.required_filter_columns {
                if !constrains(table, column, &[functions::EQUALS, functions::IN]) {
                    return Err(missing_condition(column, &entity.key.to_string(), table));
                }
            }
            let time = entity.required_time_column;
            if !constrains(table, time, &[functions::GREATER_OR_EQUALS])
                || !constrains(table, time, &[functions::LESS])
            {
                return Err(missing_condition(time, &entity.key.to_string(), table));
            }
        }
        Ok(())
    }
}

fn missing_condition(column: &str, entity: &str, table: Option<&str>) -> MqlError {
    match table {
        Some(alias) => MqlError::semantic(format!(
            "missing required condition on {} for {} ({})",
            column, entity, alias
        )),
        None => MqlError::semantic(format!("missing required condition on {} for {}", column, entity)),
    }
}

/// In a join every column must name its table alias, unless it refers to a
/// selected output by name.
#[derive(Debug, Default)]
pub struct QualifiedColumns;

impl QueryValidator for QualifiedColumns {
    fn name(&self) -> &'static str {
        "qualified_columns"
    }

    fn validate(&self, query: &Query) -> MqlResult<()> {
        if !query.is_composite() {
            return Ok(());
        }
        let aliases: HashSet<String> = query.entities().into_iter().filter_map(|(alias, _)| alias).collect();
        let outputs: HashSet<&str> = query.selected_columns.iter().map(|s| s.name.as_str()).collect();

        let mut invalid: Option<String> = None;
        let mut check = |column: &Column| {
            let valid = match &column.table_name {
                Some(table) => aliases.contains(table),
                None => outputs.contains(column.column_name.as_str()),
            };
            if !valid && invalid.is_none() {
                invalid = Some(column.to_string());
            }
        };
        for root in query.expressions() {
            root.walk(&mut |e| match e {
                Expression::Column(column) => check(column),
                Expression::SubscriptableReference(s) => check(&s.column),
                _ => {}
            });
        }
        match invalid {
            Some(column) => Err(MqlError::semantic(format!(
                "column {} is not qualified by a known table alias",
                column
            ))),
            None => Ok(()),
        }
    }
}
