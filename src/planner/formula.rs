//! Formula compilation.
//!
//! Every leaf of a formula becomes one aliased entity. Leaves are chained
//! into a left-deep inner join keyed on the shared group-by columns, and the
//! formula itself becomes a single selected expression over the aliased
//! aggregates.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::dsl::{Formula, FormulaParameter, IntermediateNode, Timeseries, AGGREGATE_ALIAS};
use crate::error::{MqlError, MqlResult};
use crate::query::entity::Entity;
use crate::query::expr::{
    binary_condition, combine_and_conditions, functions, lit_float, lit_str, qualified_column, Expression,
    FunctionCall,
};
use crate::query::join::{
    IndividualNode, JoinClause, JoinCondition, JoinConditionExpression, JoinNode, JoinType,
};
use crate::query::{select_entity, Dataset, EntityKey, FromClause, Query, SelectedExpression};

/// Build the query for a formula.
pub fn build_formula_query(formula: &Formula, dataset: Dataset) -> MqlResult<Query> {
    let leaves = formula.leaves();
    if leaves.is_empty() {
        return Err(MqlError::semantic("Could not parse formula"));
    }

    let groupby = groupby_names(leaves[0]);
    if leaves.iter().any(|leaf| groupby != groupby_names(leaf)) {
        return Err(MqlError::semantic("All terms in a formula must have the same groupby"));
    }

    // Same entity type across leaves shares one metadata object
    let mut entities: HashMap<EntityKey, Arc<Entity>> = HashMap::new();
    let mut resolved = Vec::with_capacity(leaves.len());
    for leaf in &leaves {
        let key = select_entity(&leaf.mri, dataset)?;
        let entity = entities.entry(key).or_insert_with(|| Arc::new(Entity::new(key)));
        resolved.push(Arc::clone(entity));
    }

    let single = leaves.len() == 1;
    let from_clause = if single {
        FromClause::Entity(Arc::clone(&resolved[0]))
    } else {
        let join = build_join_clause(&leaves, &resolved, &groupby)
            .ok_or_else(|| MqlError::semantic("Could not parse formula"))?;
        FromClause::Join(join)
    };
    let mut query = Query::new(from_clause);

    let parameters = formula
        .parameters
        .iter()
        .map(|param| extract_parameter(param, single))
        .collect();
    query.selected_columns.push(SelectedExpression::new(
        AGGREGATE_ALIAS,
        Expression::FunctionCall(FunctionCall {
            alias: Some(AGGREGATE_ALIAS.into()),
            function_name: formula.operator.function_name().into(),
            parameters,
        }),
    ));

    for leaf in &leaves {
        let table = table_alias(leaf, single);
        for selected in &leaf.groupby {
            let expression = selected.expression.clone().qualify(table);
            query
                .selected_columns
                .push(SelectedExpression::new(selected.name.clone(), expression.clone()));
            query.groupby.push(expression);
        }
    }

    let mut conditions = Vec::new();
    for leaf in &leaves {
        let table = table_alias(leaf, single);
        conditions.extend(leaf.conditions.iter().map(|c| c.clone().qualify(table)));
        conditions.push(binary_condition(
            functions::EQUALS,
            qualified_column(table, "metric_id"),
            lit_str(&leaf.mri),
        ));
    }
    query.condition = combine_and_conditions(conditions);

    debug!(leaves = leaves.len(), entities = entities.len(), "planned formula");
    Ok(query)
}

fn groupby_names(leaf: &Timeseries) -> Vec<&str> {
    leaf.groupby.iter().map(|g| g.name.as_str()).collect()
}

fn table_alias(leaf: &Timeseries, single: bool) -> Option<&str> {
    if single {
        None
    } else {
        Some(leaf.table_alias.as_str())
    }
}

/// Chain the leaves `n0..nk` into a left-deep join whose innermost left node
/// is `nk` and whose outermost right node is `n0`. Each clause joins a leaf
/// to the one immediately after it on every group-by column.
fn build_join_clause(leaves: &[&Timeseries], entities: &[Arc<Entity>], groupby: &[&str]) -> Option<JoinClause> {
    let mut nodes: Vec<IndividualNode> = leaves
        .iter()
        .zip(entities)
        .map(|(leaf, entity)| IndividualNode::new(leaf.table_alias.clone(), Arc::clone(entity)))
        .collect();

    let innermost = nodes.pop()?;
    let right_node = nodes.pop()?;
    let mut clause = JoinClause {
        keys: join_keys(&innermost.alias, &right_node.alias, groupby),
        left_node: JoinNode::Individual(innermost),
        right_node,
        join_type: JoinType::Inner,
    };
    while let Some(right_node) = nodes.pop() {
        clause = JoinClause {
            keys: join_keys(&clause.right_node.alias, &right_node.alias, groupby),
            left_node: JoinNode::Join(Box::new(clause)),
            right_node,
            join_type: JoinType::Inner,
        };
    }
    Some(clause)
}

fn join_keys(left: &str, right: &str, groupby: &[&str]) -> Vec<JoinCondition> {
    groupby
        .iter()
        .map(|col| JoinCondition {
            left: JoinConditionExpression::new(left, col),
            right: JoinConditionExpression::new(right, col),
        })
        .collect()
}

/// Lower a formula parameter into a selectable expression.
fn extract_parameter(param: &FormulaParameter, single: bool) -> Expression {
    match param {
        FormulaParameter::Scalar(value) => lit_float(*value),
        FormulaParameter::Node(IntermediateNode::Timeseries(leaf)) => leaf
            .expression
            .expression
            .clone()
            .with_alias(None)
            .qualify(table_alias(leaf, single)),
        FormulaParameter::Node(IntermediateNode::Formula(formula)) => Expression::FunctionCall(FunctionCall {
            alias: None,
            function_name: formula.operator.function_name().into(),
            parameters: formula
                .parameters
                .iter()
                .map(|p| extract_parameter(p, single))
                .collect(),
        }),
    }
}
