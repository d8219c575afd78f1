//! Expression tree for compiled query plans.
//!
//! Expressions are ClickHouse-style function calls over columns and
//! literals. Conditions are plain function calls too (`equals`, `in`,
//! `and`, ...), so the same tree walkers serve selects, filters and
//! group-bys alike.

use std::convert::Infallible;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

// =============================================================================
// Function names
// =============================================================================

/// Names of the functions the compiler emits.
pub mod functions {
    pub const AND: &str = "and";
    pub const OR: &str = "or";
    pub const EQUALS: &str = "equals";
    pub const NOT_EQUALS: &str = "notEquals";
    pub const IN: &str = "in";
    pub const NOT_IN: &str = "notIn";
    pub const GREATER_OR_EQUALS: &str = "greaterOrEquals";
    pub const LESS: &str = "less";
    pub const TUPLE: &str = "tuple";
    pub const ARRAY_ELEMENT: &str = "arrayElement";

    /// Functions whose first argument is the constrained column.
    pub const CONDITIONS: &[&str] = &[EQUALS, NOT_EQUALS, IN, NOT_IN, GREATER_OR_EQUALS, LESS];
}

// =============================================================================
// Expression AST
// =============================================================================

/// A node in a query plan expression.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Expression {
    Column(Column),
    Literal(Literal),
    FunctionCall(FunctionCall),
    CurriedFunctionCall(CurriedFunctionCall),
    SubscriptableReference(SubscriptableReference),
}

/// Column reference, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub alias: Option<String>,
    pub table_name: Option<String>,
    pub column_name: String,
}

/// Literal values.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Literal {
    Int(i64),
    Float(f64),
    String(String),
    DateTime(DateTime<Utc>),
}

/// Function call: `name(parameters...)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FunctionCall {
    pub alias: Option<String>,
    pub function_name: String,
    pub parameters: Vec<Expression>,
}

/// Parameterized function call: `name(p...)(parameters...)`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurriedFunctionCall {
    pub alias: Option<String>,
    pub internal_function: FunctionCall,
    pub parameters: Vec<Expression>,
}

/// Map access on a column: `column[key]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubscriptableReference {
    pub alias: Option<String>,
    pub column: Column,
    pub key: String,
}

// =============================================================================
// Tree operations
// =============================================================================

impl Expression {
    pub fn alias(&self) -> Option<&str> {
        match self {
            Expression::Column(c) => c.alias.as_deref(),
            Expression::Literal(_) => None,
            Expression::FunctionCall(f) => f.alias.as_deref(),
            Expression::CurriedFunctionCall(c) => c.alias.as_deref(),
            Expression::SubscriptableReference(s) => s.alias.as_deref(),
        }
    }

    /// Replace the alias of this node. Literals carry no alias.
    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        match &mut self {
            Expression::Column(c) => c.alias = alias,
            Expression::Literal(_) => {}
            Expression::FunctionCall(f) => f.alias = alias,
            Expression::CurriedFunctionCall(c) => c.alias = alias,
            Expression::SubscriptableReference(s) => s.alias = alias,
        }
        self
    }

    pub fn as_column(&self) -> Option<&Column> {
        match self {
            Expression::Column(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_function(&self) -> Option<&FunctionCall> {
        match self {
            Expression::FunctionCall(f) => Some(f),
            _ => None,
        }
    }

    /// True if this is a call to `name`.
    pub fn is_call_to(&self, name: &str) -> bool {
        self.as_function().is_some_and(|f| f.function_name == name)
    }

    /// Rebuild the tree bottom-up, applying `f` to every node after its
    /// children have been rebuilt.
    pub fn transform<F>(self, f: &mut F) -> Expression
    where
        F: FnMut(Expression) -> Expression,
    {
        let result: Result<Expression, Infallible> = self.try_transform(&mut |e| Ok(f(e)));
        match result {
            Ok(expr) => expr,
            Err(never) => match never {},
        }
    }

    /// Fallible version of [`Expression::transform`]; stops at the first error.
    pub fn try_transform<F, E>(self, f: &mut F) -> Result<Expression, E>
    where
        F: FnMut(Expression) -> Result<Expression, E>,
    {
        let rebuilt = match self {
            Expression::FunctionCall(call) => Expression::FunctionCall(call.try_transform_parameters(f)?),
            Expression::CurriedFunctionCall(curried) => {
                let internal_function = curried.internal_function.try_transform_parameters(f)?;
                let parameters = curried
                    .parameters
                    .into_iter()
                    .map(|p| p.try_transform(f))
                    .collect::<Result<Vec<_>, E>>()?;
                Expression::CurriedFunctionCall(CurriedFunctionCall {
                    alias: curried.alias,
                    internal_function,
                    parameters,
                })
            }
            leaf => leaf,
        };
        f(rebuilt)
    }

    /// Visit every node, parents before children.
    pub fn walk<'a, F>(&'a self, f: &mut F)
    where
        F: FnMut(&'a Expression),
    {
        f(self);
        match self {
            Expression::FunctionCall(call) => call.parameters.iter().for_each(|p| p.walk(f)),
            Expression::CurriedFunctionCall(curried) => {
                curried.internal_function.parameters.iter().for_each(|p| p.walk(f));
                curried.parameters.iter().for_each(|p| p.walk(f));
            }
            _ => {}
        }
    }

    /// Set the table qualifier of every column in the tree.
    pub fn qualify(self, table_name: Option<&str>) -> Expression {
        self.transform(&mut |e| match e {
            Expression::Column(mut c) => {
                c.table_name = table_name.map(str::to_string);
                Expression::Column(c)
            }
            Expression::SubscriptableReference(mut s) => {
                s.column.table_name = table_name.map(str::to_string);
                Expression::SubscriptableReference(s)
            }
            other => other,
        })
    }
}

impl FunctionCall {
    fn try_transform_parameters<F, E>(self, f: &mut F) -> Result<FunctionCall, E>
    where
        F: FnMut(Expression) -> Result<Expression, E>,
    {
        let parameters = self
            .parameters
            .into_iter()
            .map(|p| p.try_transform(f))
            .collect::<Result<Vec<_>, E>>()?;
        Ok(FunctionCall {
            alias: self.alias,
            function_name: self.function_name,
            parameters,
        })
    }
}

// =============================================================================
// Expression Constructors
// =============================================================================

/// Create an unqualified column reference.
pub fn column(name: &str) -> Expression {
    Expression::Column(Column {
        alias: None,
        table_name: None,
        column_name: name.into(),
    })
}

/// Create a column reference qualified by `table` when one is given.
pub fn qualified_column(table: Option<&str>, name: &str) -> Expression {
    Expression::Column(Column {
        alias: None,
        table_name: table.map(str::to_string),
        column_name: name.into(),
    })
}

pub fn lit_int(n: i64) -> Expression {
    Expression::Literal(Literal::Int(n))
}

pub fn lit_float(f: f64) -> Expression {
    Expression::Literal(Literal::Float(f))
}

pub fn lit_str(s: &str) -> Expression {
    Expression::Literal(Literal::String(s.into()))
}

pub fn lit_datetime(dt: DateTime<Utc>) -> Expression {
    Expression::Literal(Literal::DateTime(dt))
}

/// Generic unaliased function call.
pub fn func(name: &str, parameters: Vec<Expression>) -> Expression {
    Expression::FunctionCall(FunctionCall {
        alias: None,
        function_name: name.into(),
        parameters,
    })
}

/// Two-argument condition such as `equals(lhs, rhs)`.
pub fn binary_condition(name: &str, lhs: Expression, rhs: Expression) -> Expression {
    func(name, vec![lhs, rhs])
}

/// `tuple(values...)`
pub fn tuple(values: Vec<Expression>) -> Expression {
    func(functions::TUPLE, values)
}

/// AND together a list of conditions as a right-nested chain of binary
/// `and` calls. Returns `None` for an empty list.
pub fn combine_and_conditions(conditions: Vec<Expression>) -> Option<Expression> {
    combine_conditions(conditions, functions::AND)
}

/// OR counterpart of [`combine_and_conditions`].
pub fn combine_or_conditions(conditions: Vec<Expression>) -> Option<Expression> {
    combine_conditions(conditions, functions::OR)
}

fn combine_conditions(conditions: Vec<Expression>, function: &str) -> Option<Expression> {
    conditions
        .into_iter()
        .rev()
        .reduce(|acc, condition| binary_condition(function, condition, acc))
}

/// Split a condition into its top-level AND operands, flattening nested
/// `and` calls of any arity.
pub fn first_level_and_conditions(condition: &Expression) -> Vec<&Expression> {
    match condition {
        Expression::FunctionCall(call) if call.function_name == functions::AND => call
            .parameters
            .iter()
            .flat_map(first_level_and_conditions)
            .collect(),
        other => vec![other],
    }
}

// =============================================================================
// Display
// =============================================================================

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Column(c) => write!(f, "{}", c),
            Expression::Literal(l) => write!(f, "{}", l),
            Expression::FunctionCall(call) => write!(f, "{}", call),
            Expression::CurriedFunctionCall(curried) => {
                write!(f, "{}(", curried.internal_function)?;
                write_list(f, &curried.parameters)?;
                write!(f, ")")
            }
            Expression::SubscriptableReference(s) => write!(f, "{}[{}]", s.column, s.key),
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.table_name {
            Some(table) => write!(f, "{}.{}", table, self.column_name),
            None => write!(f, "{}", self.column_name),
        }
    }
}

impl fmt::Display for FunctionCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.function_name)?;
        write_list(f, &self.parameters)?;
        write!(f, ")")
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Int(n) => write!(f, "{}", n),
            Literal::Float(v) => write!(f, "{:?}", v),
            Literal::String(s) => write!(f, "'{}'", s.replace('\'', "\\'")),
            Literal::DateTime(dt) => write!(f, "toDateTime('{}')", dt.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

fn write_list(f: &mut fmt::Formatter<'_>, items: &[Expression]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}
