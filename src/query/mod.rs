//! Logical query plans.
//!
//! A [`Query`] reads either from a single entity or from a [`JoinClause`]
//! over several aliased entities. Plans are built by the planner, enriched
//! by context population and rewritten in place by processors.

pub mod entity;
pub mod expr;
pub mod join;

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use entity::Entity;
use expr::{combine_and_conditions, first_level_and_conditions, functions, Expression};
use join::JoinClause;

pub use entity::{select_entity, Dataset, EntityKey};
pub use expr::{Column, CurriedFunctionCall, FunctionCall, Literal, SubscriptableReference};

// =============================================================================
// Select / Order
// =============================================================================

/// A select list item: expression with its output name.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SelectedExpression {
    pub name: String,
    pub expression: Expression,
}

impl SelectedExpression {
    pub fn new(name: impl Into<String>, expression: Expression) -> Self {
        Self {
            name: name.into(),
            expression,
        }
    }
}

impl fmt::Display for SelectedExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} AS `{}`", self.expression, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OrderByDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderBy {
    pub direction: OrderByDirection,
    pub expression: Expression,
}

impl OrderBy {
    pub fn asc(expression: Expression) -> Self {
        Self {
            direction: OrderByDirection::Asc,
            expression,
        }
    }

    pub fn desc(expression: Expression) -> Self {
        Self {
            direction: OrderByDirection::Desc,
            expression,
        }
    }
}

// =============================================================================
// Query
// =============================================================================

/// Where a query reads from.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FromClause {
    Entity(Arc<Entity>),
    Join(JoinClause),
}

/// Finalized `[start, end)` bounds of a query's time conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A logical query plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    pub from_clause: FromClause,
    pub selected_columns: Vec<SelectedExpression>,
    pub condition: Option<Expression>,
    pub groupby: Vec<Expression>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: u64,
    pub totals: bool,
    pub time_range: Option<TimeRange>,
}

impl Query {
    pub fn new(from_clause: FromClause) -> Self {
        Self {
            from_clause,
            selected_columns: Vec::new(),
            condition: None,
            groupby: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: 0,
            totals: false,
            time_range: None,
        }
    }

    /// Create a single-source query over one entity.
    pub fn from_entity(entity: Arc<Entity>) -> Self {
        Self::new(FromClause::Entity(entity))
    }

    pub fn is_composite(&self) -> bool {
        matches!(self.from_clause, FromClause::Join(_))
    }

    pub fn join_clause(&self) -> Option<&JoinClause> {
        match &self.from_clause {
            FromClause::Join(join) => Some(join),
            FromClause::Entity(_) => None,
        }
    }

    /// Every entity the query reads, with its table alias. Single-source
    /// queries have one unaliased entry; joins list the left subtree first.
    pub fn entities(&self) -> Vec<(Option<String>, Arc<Entity>)> {
        match &self.from_clause {
            FromClause::Entity(entity) => vec![(None, Arc::clone(entity))],
            FromClause::Join(join) => join
                .individual_nodes()
                .into_iter()
                .map(|node| (Some(node.alias.clone()), Arc::clone(&node.entity)))
                .collect(),
        }
    }

    /// AND a condition onto the existing WHERE clause.
    pub fn add_condition(&mut self, condition: Expression) {
        self.condition = match self.condition.take() {
            Some(existing) => combine_and_conditions(vec![existing, condition]),
            None => Some(condition),
        };
    }

    /// Top-level AND operands of the WHERE clause.
    pub fn top_level_conditions(&self) -> Vec<&Expression> {
        self.condition
            .as_ref()
            .map(first_level_and_conditions)
            .unwrap_or_default()
    }

    /// Apply `f` bottom-up to every expression in the query.
    pub fn transform_expressions<F>(&mut self, f: &mut F)
    where
        F: FnMut(Expression) -> Expression,
    {
        for selected in &mut self.selected_columns {
            let expression = std::mem::replace(&mut selected.expression, expr::column(""));
            selected.expression = expression.transform(f);
        }
        self.condition = self.condition.take().map(|c| c.transform(f));
        self.groupby = std::mem::take(&mut self.groupby)
            .into_iter()
            .map(|g| g.transform(f))
            .collect();
        for order in &mut self.order_by {
            let expression = std::mem::replace(&mut order.expression, expr::column(""));
            order.expression = expression.transform(f);
        }
    }

    /// Fallible version of [`Query::transform_expressions`].
    pub fn try_transform_expressions<F, E>(&mut self, f: &mut F) -> Result<(), E>
    where
        F: FnMut(Expression) -> Result<Expression, E>,
    {
        for selected in &mut self.selected_columns {
            let expression = std::mem::replace(&mut selected.expression, expr::column(""));
            selected.expression = expression.try_transform(f)?;
        }
        if let Some(condition) = self.condition.take() {
            self.condition = Some(condition.try_transform(f)?);
        }
        self.groupby = std::mem::take(&mut self.groupby)
            .into_iter()
            .map(|g| g.try_transform(f))
            .collect::<Result<Vec<_>, E>>()?;
        for order in &mut self.order_by {
            let expression = std::mem::replace(&mut order.expression, expr::column(""));
            order.expression = expression.try_transform(f)?;
        }
        Ok(())
    }

    /// Every root expression: selected columns, condition, group-by, order-by.
    pub fn expressions(&self) -> impl Iterator<Item = &Expression> {
        self.selected_columns
            .iter()
            .map(|s| &s.expression)
            .chain(self.condition.iter())
            .chain(self.groupby.iter())
            .chain(self.order_by.iter().map(|o| &o.expression))
    }

    /// Count of the metric_id conditions, i.e. the number of leaves the
    /// plan was built from.
    pub fn metric_condition_count(&self) -> usize {
        self.top_level_conditions()
            .into_iter()
            .filter(|c| {
                c.as_function().is_some_and(|f| {
                    f.function_name == functions::EQUALS
                        && f.parameters
                            .first()
                            .and_then(Expression::as_column)
                            .is_some_and(|col| col.column_name == "metric_id")
                })
            })
            .count()
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.from_clause {
            FromClause::Entity(entity) => writeln!(f, "MATCH ({})", entity.key)?,
            FromClause::Join(join) => writeln!(f, "MATCH {}", join)?,
        }

        write!(f, "SELECT ")?;
        for (i, selected) in self.selected_columns.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", selected)?;
        }
        writeln!(f)?;

        if !self.groupby.is_empty() {
            write!(f, "BY ")?;
            for (i, g) in self.groupby.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", g)?;
            }
            writeln!(f)?;
        }

        if let Some(condition) = &self.condition {
            writeln!(f, "WHERE {}", condition)?;
        }

        if !self.order_by.is_empty() {
            write!(f, "ORDER BY ")?;
            for (i, order) in self.order_by.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                let direction = match order.direction {
                    OrderByDirection::Asc => "ASC",
                    OrderByDirection::Desc => "DESC",
                };
                write!(f, "{} {}", order.expression, direction)?;
            }
            writeln!(f)?;
        }

        if let Some(limit) = self.limit {
            writeln!(f, "LIMIT {}", limit)?;
        }
        writeln!(f, "OFFSET {}", self.offset)?;
        if self.totals {
            writeln!(f, "TOTALS True")?;
        }
        Ok(())
    }
}
