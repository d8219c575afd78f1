//! Parser for MQL using chumsky.
//!
//! Transforms the lexer's token stream into the raw syntax tree in
//! [`super::ast`]. Grammar, loosest binding first:
//!
//! ```text
//! expr        := term (("+" | "-") term)*
//! term        := unary (("*" | "/") unary)*
//! unary       := "-"? coefficient
//! coefficient := number | target
//! target      := (curried_aggregate | curried_arbitrary_function | aggregate
//!                 | arbitrary_function | "(" expr ")" | variable) filter? group_by?
//! filter      := "{" filter_expr "}"
//! filter_expr := filter_term ("OR" filter_term)*
//! filter_term := filter_factor (("," | "&" | "AND")? filter_factor)*
//! group_by    := "by" (identifier | "(" identifier ("," identifier)* ")")
//! ```

use chumsky::input::ValueInput;
use chumsky::prelude::*;

use super::ast::*;
use super::lexer::Token;

/// Strip the escapes the lexer left inside a string literal.
fn unescape(s: &str) -> String {
    s.replace("\\\"", "\"")
}

/// Collapse `first` and `rest` into a single expression, wrapping them with
/// `combine` only when there is more than one.
fn flatten(first: FilterExpr, rest: Vec<FilterExpr>, combine: fn(Vec<FilterExpr>) -> FilterExpr) -> FilterExpr {
    if rest.is_empty() {
        return first;
    }
    let mut all = Vec::with_capacity(rest.len() + 1);
    all.push(first);
    all.extend(rest);
    combine(all)
}

fn binary(lhs: Expr, (op, rhs): (BinaryOp, Expr)) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}

/// Create the parser for a complete MQL query.
///
/// The parser is generic over the input type, accepting any `ValueInput`
/// that produces `Token` values with `SimpleSpan` spans.
pub fn parser<'tokens, 'src: 'tokens, I>() -> impl Parser<'tokens, I, Expr, extra::Err<Rich<'tokens, Token<'src>, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token<'src>, Span = SimpleSpan>,
{
    // ==========================================================================
    // Basic token parsers
    // ==========================================================================

    let ident = select! {
        Token::Ident(s) => s.to_string(),
    }.labelled("identifier");

    let string_lit = select! {
        Token::StringLit(s) => unescape(s),
    }.labelled("string literal");

    let number = select! {
        Token::Number(n) => n.to_string(),
    }.labelled("number");

    let metric_name = select! {
        Token::Mri(m) => MetricName::Mri { value: m.to_string(), quoted: false },
        Token::Quoted(q) => MetricName::from_quoted(q),
        Token::Ident(s) => MetricName::PublicName { value: s.to_string(), quoted: false },
        Token::Variable(v) => MetricName::Variable(v.to_string()),
    }.labelled("metric");

    let variable = select! {
        Token::Variable(v) => TargetKind::Variable(v.to_string()),
    }.labelled("variable");

    // ==========================================================================
    // Group by: by x | by (x, y)
    // ==========================================================================

    let group_by = just(Token::By)
        .ignore_then(choice((
            ident.clone()
                .separated_by(just(Token::Comma))
                .at_least(1)
                .collect::<Vec<_>>()
                .delimited_by(just(Token::LParen), just(Token::RParen)),
            ident.clone().map(|name| vec![name]),
        )))
        .labelled("group by")
        .boxed();

    // ==========================================================================
    // Filters: { tag:value, !tag:[v1, v2] OR (a = b & c != d) }
    // ==========================================================================

    let tag_value_single = choice((string_lit.clone(), ident.clone(), number.clone()));

    let tag_value = choice((
        tag_value_single.clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::LBracket), just(Token::RBracket))
            .map(TagValue::List),
        tag_value_single.map(TagValue::Single),
    ));

    // Yields whether the operator itself negates the comparison
    let comparison = choice((
        just(Token::Colon).to(false),
        just(Token::Eq).to(false),
        just(Token::NotEq).to(true),
    ));

    let filter_expr = recursive(|filter_expr| {
        let condition = just(Token::Bang)
            .or_not()
            .then(ident.clone())
            .then(comparison)
            .then(tag_value)
            .map(|(((bang, key), negated_op), value)| FilterExpr::Condition {
                negated: bang.is_some() != negated_op,
                key,
                value,
            });

        let factor = choice((
            condition,
            filter_expr.delimited_by(just(Token::LParen), just(Token::RParen)),
        ));

        let and_separator = choice((just(Token::Comma), just(Token::Amp), just(Token::And))).or_not();

        let term = factor.clone()
            .then(and_separator.ignore_then(factor).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| flatten(first, rest, FilterExpr::And));

        term.clone()
            .then(just(Token::Or).ignore_then(term).repeated().collect::<Vec<_>>())
            .map(|(first, rest)| flatten(first, rest, FilterExpr::Or))
            .boxed()
    });

    let filter = filter_expr
        .delimited_by(just(Token::LBrace), just(Token::RBrace))
        .labelled("filter")
        .boxed();

    // ==========================================================================
    // Function parameters
    // ==========================================================================

    let param = choice((
        number.clone().map(Param::Number),
        string_lit.map(Param::String),
        ident.clone().map(Param::String),
    ));

    let params = param.clone()
        .separated_by(just(Token::Comma))
        .collect::<Vec<_>>()
        .delimited_by(just(Token::LParen), just(Token::RParen));

    // ( metric {filter} by (...) )
    let metric_target = metric_name
        .then(filter.clone().or_not())
        .then(group_by.clone().or_not())
        .map(|((metric, filter), group_by)| MetricTarget { metric, filter, group_by })
        .delimited_by(just(Token::LParen), just(Token::RParen))
        .boxed();

    // ==========================================================================
    // Arithmetic over targets
    // ==========================================================================

    recursive(|expr| {
        // ( expr, p1, p2 )
        let function_args = expr.clone()
            .map(Box::new)
            .then(just(Token::Comma).ignore_then(param).repeated().collect::<Vec<_>>())
            .delimited_by(just(Token::LParen), just(Token::RParen));

        let curried_aggregate = ident.clone()
            .then(params.clone())
            .then(metric_target.clone())
            .map(|((name, params), inner)| TargetKind::CurriedAggregate { name, params, inner });

        let curried_arbitrary = ident.clone()
            .then(params)
            .then(function_args.clone())
            .map(|((name, curried), (expr, params))| TargetKind::CurriedArbitraryFunction {
                name,
                curried,
                expr,
                params,
            });

        let aggregate = ident.clone()
            .then(metric_target)
            .map(|(name, inner)| TargetKind::Aggregate { name, inner });

        let arbitrary = ident
            .then(function_args)
            .map(|(name, (expr, params))| TargetKind::ArbitraryFunction { name, expr, params });

        let nested = expr.clone()
            .delimited_by(just(Token::LParen), just(Token::RParen))
            .map(|e| TargetKind::Nested(Box::new(e)));

        let target = choice((curried_aggregate, curried_arbitrary, aggregate, arbitrary, nested, variable))
            .then(filter.or_not())
            .then(group_by.or_not())
            .map(|((kind, filter), group_by)| Target { kind, filter, group_by })
            .boxed();

        let coefficient = choice((number.map(Expr::Number), target.map(Expr::Target)));

        let unary = just(Token::Minus)
            .or_not()
            .then(coefficient)
            .map(|(minus, e)| match minus {
                Some(_) => Expr::Negate(Box::new(e)),
                None => e,
            });

        let term_op = choice((
            just(Token::Star).to(BinaryOp::Multiply),
            just(Token::Slash).to(BinaryOp::Divide),
        ));
        let term = unary.clone().foldl(term_op.then(unary).repeated(), binary).boxed();

        let expr_op = choice((
            just(Token::Plus).to(BinaryOp::Plus),
            just(Token::Minus).to(BinaryOp::Minus),
        ));
        term.clone().foldl(expr_op.then(term).repeated(), binary).boxed()
    })
    .then_ignore(end())
}
