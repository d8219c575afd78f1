//! Intermediate parse tree.
//!
//! The visitor lowers the raw syntax tree into a tree of metric leaves and
//! arithmetic formulas. Nothing here knows about entities yet; that is the
//! planner's job.

use std::fmt;

use serde::Serialize;

use crate::query::expr::Expression;
use crate::query::SelectedExpression;

/// Output name of every aggregate the compiler selects.
pub const AGGREGATE_ALIAS: &str = "aggregate_value";

/// Arithmetic operators that combine formula parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOperator {
    Plus,
    Minus,
    Multiply,
    Divide,
    Negate,
}

impl ArithmeticOperator {
    /// Name of the function implementing this operator.
    pub fn function_name(&self) -> &'static str {
        match self {
            ArithmeticOperator::Plus => "plus",
            ArithmeticOperator::Minus => "minus",
            ArithmeticOperator::Multiply => "multiply",
            ArithmeticOperator::Divide => "divide",
            ArithmeticOperator::Negate => "negate",
        }
    }
}

/// A single aggregated metric.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Timeseries {
    /// The aggregate, named [`AGGREGATE_ALIAS`].
    pub expression: SelectedExpression,
    pub mri: String,
    /// Alias of this occurrence of the metric, unique within the query.
    pub table_alias: String,
    pub conditions: Vec<Expression>,
    pub groupby: Vec<SelectedExpression>,
}

/// An arithmetic combination of parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Formula {
    pub operator: ArithmeticOperator,
    pub parameters: Vec<FormulaParameter>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FormulaParameter {
    Node(IntermediateNode),
    Scalar(f64),
}

/// A node of the intermediate tree: a metric leaf or a formula.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IntermediateNode {
    Timeseries(Timeseries),
    Formula(Formula),
}

impl IntermediateNode {
    /// All leaves, depth first, left to right.
    pub fn leaves(&self) -> Vec<&Timeseries> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, leaves: &mut Vec<&'a Timeseries>) {
        match self {
            IntermediateNode::Timeseries(ts) => leaves.push(ts),
            IntermediateNode::Formula(formula) => {
                for param in &formula.parameters {
                    if let FormulaParameter::Node(node) = param {
                        node.collect_leaves(leaves);
                    }
                }
            }
        }
    }

    /// Apply `f` to every leaf beneath this node.
    pub fn for_each_leaf_mut<F>(&mut self, f: &mut F)
    where
        F: FnMut(&mut Timeseries),
    {
        match self {
            IntermediateNode::Timeseries(ts) => f(ts),
            IntermediateNode::Formula(formula) => {
                for param in &mut formula.parameters {
                    if let FormulaParameter::Node(node) = param {
                        node.for_each_leaf_mut(f);
                    }
                }
            }
        }
    }
}

impl Formula {
    pub fn leaves(&self) -> Vec<&Timeseries> {
        let mut leaves = Vec::new();
        for param in &self.parameters {
            if let FormulaParameter::Node(node) = param {
                node.collect_leaves(&mut leaves);
            }
        }
        leaves
    }
}

impl fmt::Display for IntermediateNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

impl IntermediateNode {
    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            IntermediateNode::Timeseries(ts) => {
                writeln!(f, "{}{} [{}] {}", pad, ts.table_alias, ts.mri, ts.expression.expression)?;
                for condition in &ts.conditions {
                    writeln!(f, "{}  where {}", pad, condition)?;
                }
                if !ts.groupby.is_empty() {
                    let names: Vec<&str> = ts.groupby.iter().map(|g| g.name.as_str()).collect();
                    writeln!(f, "{}  by {}", pad, names.join(", "))?;
                }
                Ok(())
            }
            IntermediateNode::Formula(formula) => {
                writeln!(f, "{}{}", pad, formula.operator.function_name())?;
                for param in &formula.parameters {
                    match param {
                        FormulaParameter::Node(node) => node.fmt_indented(f, depth + 1)?,
                        FormulaParameter::Scalar(v) => writeln!(f, "{}  {:?}", pad, v)?,
                    }
                }
                Ok(())
            }
        }
    }
}
