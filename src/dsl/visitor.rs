//! Lowers the raw syntax tree into the intermediate tree.
//!
//! The walk is left to right, so table aliases are numbered in the order
//! metrics appear in the query text.

use std::collections::HashMap;

use crate::error::{MqlError, MqlResult};
use crate::query::expr::{
    self, binary_condition, functions, lit_float, lit_int, lit_str, tuple, Column, CurriedFunctionCall,
    Expression, FunctionCall,
};
use crate::query::SelectedExpression;

use super::ast::{BinaryOp, Expr, FilterExpr, MetricName, MetricTarget, Param, TagValue, Target, TargetKind};
use super::intermediate::{
    ArithmeticOperator, Formula, FormulaParameter, IntermediateNode, Timeseries, AGGREGATE_ALIAS,
};

/// Per-compilation visitor state.
#[derive(Debug, Default)]
pub struct MqlVisitor {
    alias_count: HashMap<char, u32>,
}

impl MqlVisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Visit a whole query. The root must contain at least one metric.
    pub fn visit(&mut self, expr: &Expr) -> MqlResult<IntermediateNode> {
        let node = match self.visit_expr(expr)? {
            FormulaParameter::Node(node) => node,
            FormulaParameter::Scalar(_) => {
                return Err(MqlError::semantic(
                    "No aggregate/expression or formula specified in MQL query",
                ))
            }
        };
        if let IntermediateNode::Formula(formula) = &node {
            if formula.leaves().is_empty() {
                return Err(MqlError::semantic("Could not parse formula"));
            }
        }
        Ok(node)
    }

    fn visit_expr(&mut self, expr: &Expr) -> MqlResult<FormulaParameter> {
        match expr {
            Expr::Number(n) => Ok(FormulaParameter::Scalar(parse_number(n)?)),
            Expr::Binary { op, lhs, rhs } => {
                let lhs = self.visit_expr(lhs)?;
                let rhs = self.visit_expr(rhs)?;
                Ok(FormulaParameter::Node(IntermediateNode::Formula(Formula {
                    operator: match op {
                        BinaryOp::Plus => ArithmeticOperator::Plus,
                        BinaryOp::Minus => ArithmeticOperator::Minus,
                        BinaryOp::Multiply => ArithmeticOperator::Multiply,
                        BinaryOp::Divide => ArithmeticOperator::Divide,
                    },
                    parameters: vec![lhs, rhs],
                })))
            }
            Expr::Negate(inner) => match self.visit_expr(inner)? {
                FormulaParameter::Scalar(v) => Ok(FormulaParameter::Scalar(-v)),
                node => Ok(FormulaParameter::Node(IntermediateNode::Formula(Formula {
                    operator: ArithmeticOperator::Negate,
                    parameters: vec![node],
                }))),
            },
            Expr::Target(target) => self.visit_target(target),
        }
    }

    fn visit_target(&mut self, target: &Target) -> MqlResult<FormulaParameter> {
        let visited = match &target.kind {
            TargetKind::Aggregate { name, inner } => {
                let aggregate = Expression::FunctionCall(FunctionCall {
                    alias: Some(AGGREGATE_ALIAS.into()),
                    function_name: name.clone(),
                    parameters: vec![expr::column("value")],
                });
                FormulaParameter::Node(IntermediateNode::Timeseries(self.visit_metric(inner, aggregate)?))
            }
            TargetKind::CurriedAggregate { name, params, inner } => {
                let aggregate = Expression::CurriedFunctionCall(CurriedFunctionCall {
                    alias: Some(AGGREGATE_ALIAS.into()),
                    internal_function: FunctionCall {
                        alias: None,
                        function_name: name.clone(),
                        parameters: params.iter().map(param_literal).collect::<MqlResult<_>>()?,
                    },
                    parameters: vec![expr::column("value")],
                });
                FormulaParameter::Node(IntermediateNode::Timeseries(self.visit_metric(inner, aggregate)?))
            }
            TargetKind::ArbitraryFunction { name, expr, params } => {
                let mut leaf = self.visit_function_argument(name, expr)?;
                let mut parameters = vec![leaf.expression.expression.with_alias(None)];
                for param in params {
                    parameters.push(param_literal(param)?);
                }
                leaf.expression.expression = Expression::FunctionCall(FunctionCall {
                    alias: Some(AGGREGATE_ALIAS.into()),
                    function_name: name.clone(),
                    parameters,
                });
                FormulaParameter::Node(IntermediateNode::Timeseries(leaf))
            }
            TargetKind::CurriedArbitraryFunction {
                name,
                curried,
                expr,
                params,
            } => {
                let mut leaf = self.visit_function_argument(name, expr)?;
                let mut parameters = vec![leaf.expression.expression.with_alias(None)];
                for param in params {
                    parameters.push(param_literal(param)?);
                }
                leaf.expression.expression = Expression::CurriedFunctionCall(CurriedFunctionCall {
                    alias: Some(AGGREGATE_ALIAS.into()),
                    internal_function: FunctionCall {
                        alias: None,
                        function_name: name.clone(),
                        parameters: curried.iter().map(param_literal).collect::<MqlResult<_>>()?,
                    },
                    parameters,
                });
                FormulaParameter::Node(IntermediateNode::Timeseries(leaf))
            }
            TargetKind::Nested(inner) => self.visit_expr(inner)?,
            TargetKind::Variable(_) => return Err(MqlError::semantic("Variables are not supported yet")),
        };

        let condition = target.filter.as_ref().map(compile_filter);
        let groupby = target.group_by.as_deref().map(groupby_columns).unwrap_or_default();
        if condition.is_none() && groupby.is_empty() {
            return Ok(visited);
        }

        // Formulas push the filter and group-by down onto every leaf
        match visited {
            FormulaParameter::Node(mut node) => {
                node.for_each_leaf_mut(&mut |leaf| {
                    if let Some(condition) = &condition {
                        leaf.conditions.push(condition.clone());
                    }
                    leaf.groupby.extend(groupby.iter().cloned());
                });
                Ok(FormulaParameter::Node(node))
            }
            FormulaParameter::Scalar(_) => Err(MqlError::semantic("Could not parse formula")),
        }
    }

    /// The first argument of an arbitrary function must be one aggregate.
    fn visit_function_argument(&mut self, function: &str, expr: &Expr) -> MqlResult<Timeseries> {
        match self.visit_expr(expr)? {
            FormulaParameter::Node(IntermediateNode::Timeseries(leaf)) => Ok(leaf),
            _ => Err(MqlError::semantic(format!(
                "the first argument of {} must be an aggregate",
                function
            ))),
        }
    }

    fn visit_metric(&mut self, inner: &MetricTarget, aggregate: Expression) -> MqlResult<Timeseries> {
        let mri = match &inner.metric {
            MetricName::Mri { value, .. } => value.clone(),
            MetricName::PublicName { .. } => return Err(MqlError::semantic("MQL endpoint only supports MRIs")),
            MetricName::Variable(_) => return Err(MqlError::semantic("Variables are not supported yet")),
        };
        let table_alias = self.generate_table_alias(&mri);
        Ok(Timeseries {
            expression: SelectedExpression::new(AGGREGATE_ALIAS, aggregate),
            mri,
            table_alias,
            conditions: inner.filter.as_ref().map(compile_filter).into_iter().collect(),
            groupby: inner.group_by.as_deref().map(groupby_columns).unwrap_or_default(),
        })
    }

    /// First character of the MRI plus a per-character counter.
    fn generate_table_alias(&mut self, mri: &str) -> String {
        let prefix = mri.chars().next().unwrap_or('_');
        let count = self.alias_count.entry(prefix).or_insert(0);
        let alias = format!("{}{}", prefix, count);
        *count += 1;
        alias
    }
}

/// Compile a tag filter into a condition expression.
pub fn compile_filter(filter: &FilterExpr) -> Expression {
    match filter {
        FilterExpr::Or(terms) => expr::func(functions::OR, terms.iter().map(compile_filter).collect()),
        FilterExpr::And(terms) => expr::func(functions::AND, terms.iter().map(compile_filter).collect()),
        FilterExpr::Condition { negated, key, value } => {
            let column = expr::column(key);
            match value {
                TagValue::Single(v) => {
                    let name = if *negated { functions::NOT_EQUALS } else { functions::EQUALS };
                    binary_condition(name, column, lit_str(v))
                }
                TagValue::List(values) => {
                    let name = if *negated { functions::NOT_IN } else { functions::IN };
                    binary_condition(name, column, tuple(values.iter().map(|v| lit_str(v)).collect()))
                }
            }
        }
    }
}

fn groupby_columns(names: &[String]) -> Vec<SelectedExpression> {
    names
        .iter()
        .map(|name| {
            SelectedExpression::new(
                name.clone(),
                Expression::Column(Column {
                    alias: Some(name.clone()),
                    table_name: None,
                    column_name: name.clone(),
                }),
            )
        })
        .collect()
}

fn parse_number(text: &str) -> MqlResult<f64> {
    text.parse::<f64>()
        .map_err(|_| MqlError::semantic(format!("invalid number {}", text)))
}

fn param_literal(param: &Param) -> MqlResult<Expression> {
    match param {
        Param::Number(n) if n.contains('.') => Ok(lit_float(parse_number(n)?)),
        Param::Number(n) => n
            .parse::<i64>()
            .map(lit_int)
            .map_err(|_| MqlError::semantic(format!("invalid number {}", n))),
        Param::String(s) => Ok(lit_str(s)),
    }
}
