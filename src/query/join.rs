//! Join clauses for plans spanning several entities.
//!
//! A join is a left-deep binary tree: every clause pairs a previously
//! joined subtree (or a single aliased entity) on the left with exactly one
//! aliased entity on the right.

use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use super::entity::Entity;

/// An entity reference under a table alias.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IndividualNode {
    pub alias: String,
    pub entity: Arc<Entity>,
}

impl IndividualNode {
    pub fn new(alias: impl Into<String>, entity: Arc<Entity>) -> Self {
        Self {
            alias: alias.into(),
            entity,
        }
    }
}

/// Left side of a join clause.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum JoinNode {
    Individual(IndividualNode),
    Join(Box<JoinClause>),
}

/// One side of a join key: `alias.column`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinConditionExpression {
    pub table_alias: String,
    pub column: String,
}

impl JoinConditionExpression {
    pub fn new(table_alias: &str, column: &str) -> Self {
        Self {
            table_alias: table_alias.into(),
            column: column.into(),
        }
    }
}

/// Equality between two aliased columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinCondition {
    pub left: JoinConditionExpression,
    pub right: JoinConditionExpression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinType {
    Inner,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinClause {
    pub left_node: JoinNode,
    pub right_node: IndividualNode,
    pub keys: Vec<JoinCondition>,
    pub join_type: JoinType,
}

impl JoinClause {
    /// Every aliased entity in the join, left subtree first, then the right
    /// node.
    pub fn individual_nodes(&self) -> Vec<&IndividualNode> {
        let mut nodes = match &self.left_node {
            JoinNode::Individual(node) => vec![node],
            JoinNode::Join(clause) => clause.individual_nodes(),
        };
        nodes.push(&self.right_node);
        nodes
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} = {}.{}",
            self.left.table_alias, self.left.column, self.right.table_alias, self.right.column
        )
    }
}

impl fmt::Display for IndividualNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.alias, self.entity.key)
    }
}

impl fmt::Display for JoinClause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.left_node {
            JoinNode::Individual(node) => write!(f, "{}", node)?,
            JoinNode::Join(clause) => write!(f, "{}", clause)?,
        }
        write!(f, " INNER JOIN {}", self.right_node)?;
        if !self.keys.is_empty() {
            write!(f, " ON ")?;
            for (i, key) in self.keys.iter().enumerate() {
                if i > 0 {
                    write!(f, " AND ")?;
                }
                write!(f, "{}", key)?;
            }
        }
        Ok(())
    }
}
