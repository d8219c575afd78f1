//! The MQL language front end.
//!
//! Text is lexed and parsed into the raw syntax tree in [`ast`], which the
//! [`visitor`] lowers into the [`intermediate`] tree of metric leaves and
//! formulas.
//!
//! # Example
//!
//! ```ignore
//! use mql::dsl;
//!
//! let expr = dsl::parse("sum(d:transactions/duration@millisecond){env:prod} by transaction")?;
//! let tree = dsl::visitor::MqlVisitor::new().visit(&expr)?;
//! assert_eq!(tree.leaves().len(), 1);
//! ```

pub mod ast;
pub mod intermediate;
pub mod lexer;
pub mod parser;
pub mod visitor;

pub use ast::*;
pub use intermediate::{Formula, FormulaParameter, IntermediateNode, Timeseries, AGGREGATE_ALIAS};

use crate::error::{MqlError, MqlResult};

/// Parse MQL text into its raw syntax tree.
///
/// The whole input must be consumed. The first lexing or parsing failure is
/// reported with the line and a short excerpt around it.
pub fn parse(source: &str) -> MqlResult<Expr> {
    use chumsky::input::Input;
    use chumsky::span::SimpleSpan;
    use chumsky::span::Span as _;
    use chumsky::Parser as _;

    // Step 1: Lexical analysis
    let (tokens, lex_errs) = lexer::lexer().parse(source).into_output_errors();
    if let Some(err) = lex_errs.first() {
        return Err(MqlError::syntax_at(source, err.span().start()));
    }
    let tokens: Vec<(lexer::Token<'_>, SimpleSpan)> = match tokens {
        Some(t) => t,
        None => return Err(MqlError::syntax_at(source, 0)),
    };

    // Step 2: Parsing
    let len = source.len();
    let eoi: SimpleSpan = (len..len).into();
    let token_stream = tokens.as_slice().map(
        eoi,
        |(tok, span): &(lexer::Token<'_>, SimpleSpan)| (tok, span),
    );

    let (expr, parse_errs) = parser::parser().parse(token_stream).into_output_errors();
    if let Some(err) = parse_errs.first() {
        return Err(MqlError::syntax_at(source, err.span().start()));
    }
    expr.ok_or_else(|| MqlError::syntax_at(source, 0))
}
