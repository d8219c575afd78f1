//! Raw syntax tree produced by the MQL parser.
//!
//! One closed enum per grammar rule kind. The tree only records what was
//! written; MRI checks, alias assignment and filter compilation happen in
//! the visitor.

/// An arithmetic expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric scalar, kept as written.
    Number(String),
    /// Binary `+ - * /`.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Unary minus.
    Negate(Box<Expr>),
    Target(Target),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Plus,
    Minus,
    Multiply,
    Divide,
}

/// A target with its optional trailing filter and group-by.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub kind: TargetKind,
    pub filter: Option<FilterExpr>,
    pub group_by: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TargetKind {
    /// `agg(metric)`
    Aggregate { name: String, inner: MetricTarget },
    /// `agg(p1, ...)(metric)`
    CurriedAggregate {
        name: String,
        params: Vec<Param>,
        inner: MetricTarget,
    },
    /// `f(expr, p1, ...)`
    ArbitraryFunction {
        name: String,
        expr: Box<Expr>,
        params: Vec<Param>,
    },
    /// `f(c1, ...)(expr, p1, ...)`
    CurriedArbitraryFunction {
        name: String,
        curried: Vec<Param>,
        expr: Box<Expr>,
        params: Vec<Param>,
    },
    /// `( expr )`
    Nested(Box<Expr>),
    /// `$name`
    Variable(String),
}

/// The metric inside an aggregate, with its inner filter and group-by.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricTarget {
    pub metric: MetricName,
    pub filter: Option<FilterExpr>,
    pub group_by: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetricName {
    Mri { value: String, quoted: bool },
    PublicName { value: String, quoted: bool },
    Variable(String),
}

impl MetricName {
    /// Classify backtick-quoted text.
    pub fn from_quoted(text: &str) -> Self {
        if super::lexer::is_mri(text) {
            MetricName::Mri {
                value: text.to_string(),
                quoted: true,
            }
        } else {
            MetricName::PublicName {
                value: text.to_string(),
                quoted: true,
            }
        }
    }
}

/// A function parameter literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    /// Number as written (`5`, `0.95`).
    Number(String),
    String(String),
}

/// A boolean filter over tag comparisons.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    Or(Vec<FilterExpr>),
    And(Vec<FilterExpr>),
    Condition {
        negated: bool,
        key: String,
        value: TagValue,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum TagValue {
    Single(String),
    List(Vec<String>),
}
