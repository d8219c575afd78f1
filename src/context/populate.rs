//! Context population.
//!
//! Adds the time range, tenant scope, rollup and paging from an
//! [`MqlContext`] to a freshly planned query. Every aliased entity of a join
//! gets its own copy of the context conditions.

use tracing::debug;

use crate::config::Settings;
use crate::dsl::AGGREGATE_ALIAS;
use crate::error::{MqlError, MqlResult};
use crate::query::expr::{
    binary_condition, column, combine_and_conditions, func, functions, lit_datetime, lit_int, lit_str,
    qualified_column, tuple, Expression, FunctionCall,
};
use crate::query::join::{JoinCondition, JoinConditionExpression};
use crate::query::{FromClause, OrderBy, OrderByDirection, Query, SelectedExpression};

use super::{MqlContext, Rollup};

/// Output name of the time bucket.
const TIME_ALIAS: &str = "time";

/// Validated rollup options.
struct RollupPlan {
    granularity: i64,
    /// Non-zero bucket width.
    interval: Option<i64>,
    with_totals: bool,
    orderby: Option<OrderByDirection>,
}

/// Populate `query` from `context`.
pub fn populate_query_from_context(query: &mut Query, context: &MqlContext, settings: &Settings) -> MqlResult<()> {
    let (start, end) = context.time_range()?;
    let rollup = validate_rollup(&context.rollup, settings)?;
    let limit = limit_value(context, settings)?;
    let offset = offset_value(context)?;

    let entities = query.entities();
    for (alias, entity) in &entities {
        let table = alias.as_deref();
        let time_column = entity.required_time_column;

        let conditions = vec![
            binary_condition(
                functions::GREATER_OR_EQUALS,
                qualified_column(table, time_column),
                lit_datetime(start),
            ),
            binary_condition(functions::LESS, qualified_column(table, time_column), lit_datetime(end)),
            binary_condition(
                functions::IN,
                qualified_column(table, "project_id"),
                tuple(context.scope.project_ids.iter().map(|id| lit_int(*id)).collect()),
            ),
            binary_condition(
                functions::IN,
                qualified_column(table, "org_id"),
                tuple(context.scope.org_ids.iter().map(|id| lit_int(*id)).collect()),
            ),
            binary_condition(
                functions::EQUALS,
                qualified_column(table, "use_case_id"),
                lit_str(&context.scope.use_case_id),
            ),
            binary_condition(
                functions::EQUALS,
                qualified_column(table, "granularity"),
                lit_int(rollup.granularity),
            ),
        ];
        if let Some(condition) = combine_and_conditions(conditions) {
            query.add_condition(condition);
        }

        match (rollup.interval, rollup.orderby) {
            (Some(interval), _) => {
                let bucket = time_bucket(table, time_column, interval);
                query
                    .selected_columns
                    .push(SelectedExpression::new(TIME_ALIAS, bucket.clone()));
                query.groupby.push(bucket.clone());
                query.order_by = vec![OrderBy::asc(bucket)];
                query.totals = rollup.with_totals;
            }
            (None, Some(direction)) => {
                query.order_by = vec![OrderBy {
                    direction,
                    expression: column(AGGREGATE_ALIAS),
                }];
            }
            (None, None) => {}
        }
    }

    if rollup.interval.is_some() {
        add_time_join_keys(query);
    }

    query.limit = Some(limit);
    query.offset = offset;

    debug!(
        entities = entities.len(),
        limit,
        offset,
        bucketed = rollup.interval.is_some(),
        "populated query from context"
    );
    Ok(())
}

fn validate_rollup(rollup: &Rollup, settings: &Settings) -> MqlResult<RollupPlan> {
    let granularities = &settings.rollup.granularities;
    if !granularities.contains(&rollup.granularity) {
        return Err(MqlError::semantic(format!(
            "granularity '{}' is not valid, must be one of {:?}",
            rollup.granularity, granularities
        )));
    }

    let with_totals = match &rollup.with_totals {
        None => false,
        Some(value) => match value.as_str() {
            Some("True") => true,
            Some("False") => false,
            _ => {
                return Err(MqlError::semantic(
                    "with_totals must be a string, either 'True' or 'False'",
                ))
            }
        },
    };

    let orderby = match rollup.orderby.as_deref() {
        None => None,
        Some("ASC") => Some(OrderByDirection::Asc),
        Some("DESC") => Some(OrderByDirection::Desc),
        Some(_) => return Err(MqlError::semantic("orderby must be either 'ASC' or 'DESC'")),
    };

    if rollup.interval.is_some() && orderby.is_some() {
        return Err(MqlError::semantic("orderby is not supported when interval is specified"));
    }

    let interval = rollup.interval.filter(|i| *i != 0);
    if let Some(interval) = interval {
        let smallest = settings.rollup.smallest_granularity().unwrap_or(rollup.granularity);
        if interval < smallest || interval < rollup.granularity {
            return Err(MqlError::semantic(format!(
                "interval {} must be greater than or equal to granularity {}",
                interval, rollup.granularity
            )));
        }
    }

    Ok(RollupPlan {
        granularity: seconds("granularity", rollup.granularity)?,
        interval: interval.map(|i| seconds("interval", i)).transpose()?,
        with_totals,
        orderby,
    })
}

/// Rollup widths become signed literals in the plan.
fn seconds(field: &str, value: u64) -> MqlResult<i64> {
    i64::try_from(value).map_err(|_| MqlError::semantic(format!("{} {} is out of range", field, value)))
}

/// `toStartOfInterval(timestamp, toIntervalSecond(interval), 'Universal') AS time`
fn time_bucket(table: Option<&str>, time_column: &str, interval: i64) -> Expression {
    Expression::FunctionCall(FunctionCall {
        alias: Some(TIME_ALIAS.into()),
        function_name: "toStartOfInterval".into(),
        parameters: vec![
            qualified_column(table, time_column),
            func("toIntervalSecond", vec![lit_int(interval)]),
            lit_str("Universal"),
        ],
    })
}

/// Joined subqueries bucket time independently, so every alias must also be
/// joined on its bucket.
fn add_time_join_keys(query: &mut Query) {
    let FromClause::Join(join) = &mut query.from_clause else {
        return;
    };
    let base = join.right_node.alias.clone();
    let others: Vec<String> = join
        .individual_nodes()
        .into_iter()
        .map(|node| node.alias.clone())
        .filter(|alias| *alias != base)
        .collect();
    for other in others {
        join.keys.push(JoinCondition {
            left: JoinConditionExpression::new(&base, TIME_ALIAS),
            right: JoinConditionExpression::new(&other, TIME_ALIAS),
        });
    }
}

fn limit_value(context: &MqlContext, settings: &Settings) -> MqlResult<u64> {
    let max_limit = settings.limits.max_limit;
    match context.limit {
        None | Some(0) => Ok(settings.limits.default_limit),
        Some(limit) if limit < 0 => Err(MqlError::semantic("limit must be greater than or equal to 0")),
        Some(limit) if limit as u64 > max_limit => Err(MqlError::unreported(format!(
            "queries cannot have a limit higher than {}",
            max_limit
        ))),
        Some(limit) => Ok(limit as u64),
    }
}

fn offset_value(context: &MqlContext) -> MqlResult<u64> {
    match context.offset {
        None => Ok(0),
        Some(offset) if offset < 0 => Err(MqlError::semantic("offset must be greater than or equal to 0")),
        Some(offset) => Ok(offset as u64),
    }
}
