//! Single-metric query construction.

use std::sync::Arc;

use crate::dsl::Timeseries;
use crate::error::{MqlError, MqlResult};
use crate::query::entity::Entity;
use crate::query::expr::{binary_condition, column, combine_and_conditions, functions, lit_str};
use crate::query::{select_entity, Dataset, Query};

/// Build a single-source query for one metric leaf.
pub fn build_timeseries_query(leaf: &Timeseries, dataset: Dataset) -> MqlResult<Query> {
    if leaf.mri.is_empty() {
        return Err(MqlError::semantic("no MRI specified in MQL query"));
    }
    let entity = Arc::new(Entity::new(select_entity(&leaf.mri, dataset)?));
    let mut query = Query::from_entity(entity);

    query.selected_columns.push(leaf.expression.clone());
    query.selected_columns.extend(leaf.groupby.iter().cloned());

    let mut conditions = vec![binary_condition(
        functions::EQUALS,
        column("metric_id"),
        lit_str(&leaf.mri),
    )];
    conditions.extend(leaf.conditions.iter().cloned());
    query.condition = combine_and_conditions(conditions);

    query.groupby = leaf.groupby.iter().map(|g| g.expression.clone()).collect();
    Ok(query)
}
