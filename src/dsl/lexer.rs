//! Lexer for MQL.
//!
//! Converts query text into a sequence of tokens with span information.
//! Metric resource identifiers (`d:transactions/duration@millisecond`) are
//! lexed as single tokens so the parser never has to reassemble them.

use chumsky::prelude::*;

/// A token in MQL.
#[derive(Debug, Clone, PartialEq)]
pub enum Token<'src> {
    // ========================================================================
    // Keywords
    // ========================================================================
    By,
    And,
    Or,

    // ========================================================================
    // Literals
    // ========================================================================
    /// An identifier; may contain dots (`transaction.status`).
    Ident(&'src str),
    /// An unquoted metric resource identifier.
    Mri(&'src str),
    /// Backtick-quoted text (contents without backticks).
    Quoted(&'src str),
    /// A double-quoted string (contents without quotes, escapes intact).
    StringLit(&'src str),
    /// An unsigned integer or decimal.
    Number(&'src str),
    /// A `$name` variable (name without the dollar sign).
    Variable(&'src str),

    // ========================================================================
    // Symbols
    // ========================================================================
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// `:`
    Colon,
    /// `!`
    Bang,
    /// `=`
    Eq,
    /// `!=`
    NotEq,
    /// `&`
    Amp,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
}

impl<'src> std::fmt::Display for Token<'src> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::By => write!(f, "by"),
            Token::And => write!(f, "AND"),
            Token::Or => write!(f, "OR"),

            Token::Ident(s) | Token::Mri(s) | Token::Number(s) => write!(f, "{}", s),
            Token::Quoted(s) => write!(f, "`{}`", s),
            Token::StringLit(s) => write!(f, "\"{}\"", s),
            Token::Variable(s) => write!(f, "${}", s),

            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Bang => write!(f, "!"),
            Token::Eq => write!(f, "="),
            Token::NotEq => write!(f, "!="),
            Token::Amp => write!(f, "&"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
        }
    }
}

/// Map an identifier string to a keyword token or return Ident.
fn keyword_or_ident(s: &str) -> Token<'_> {
    if s == "by" {
        Token::By
    } else if s.eq_ignore_ascii_case("and") {
        Token::And
    } else if s.eq_ignore_ascii_case("or") {
        Token::Or
    } else {
        Token::Ident(s)
    }
}

/// Whether backtick-quoted text has the shape of an MRI.
pub fn is_mri(s: &str) -> bool {
    let Some((type_part, rest)) = s.split_once(':') else {
        return false;
    };
    let Some((path, unit)) = rest.rsplit_once('@') else {
        return false;
    };
    let Some((namespace, name)) = path.split_once('/') else {
        return false;
    };
    type_part.len() == 1
        && type_part.chars().all(|c| c.is_ascii_alphabetic())
        && !namespace.is_empty()
        && namespace.chars().all(is_path_char)
        && !name.is_empty()
        && name.chars().all(|c| is_path_char(c) || c == '/')
        && !unit.is_empty()
        && unit.chars().all(is_unit_char)
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

fn is_unit_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.')
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.')
}

/// Create a lexer for MQL.
///
/// Returns a parser that tokenizes the input string into a sequence of
/// tokens with span information, skipping whitespace.
pub fn lexer<'src>(
) -> impl Parser<'src, &'src str, Vec<(Token<'src>, SimpleSpan)>, extra::Err<Rich<'src, char>>> {
    // MRIs: <type>:<namespace>/<name>@<unit>
    let mri = any()
        .filter(|c: &char| c.is_ascii_alphabetic())
        .then(just(':'))
        .then(any().filter(|c: &char| is_path_char(*c)).repeated().at_least(1))
        .then(just('/'))
        .then(
            any()
                .filter(|c: &char| is_path_char(*c) || *c == '/')
                .repeated()
                .at_least(1),
        )
        .then(just('@'))
        .then(any().filter(|c: &char| is_unit_char(*c)).repeated().at_least(1))
        .to_slice()
        .map(Token::Mri);

    // Identifiers: letter or underscore, then alphanumerics, underscores and dots
    let ident = any()
        .filter(|c: &char| is_ident_start(*c))
        .then(any().filter(|c: &char| is_ident_char(*c)).repeated())
        .to_slice()
        .map(keyword_or_ident);

    let variable = just('$')
        .ignore_then(
            any()
                .filter(|c: &char| is_ident_start(*c))
                .then(any().filter(|c: &char| is_ident_char(*c)).repeated())
                .to_slice(),
        )
        .map(Token::Variable);

    // Backtick-quoted MRIs or public names: `...`
    let quoted = just('`')
        .ignore_then(none_of('`').repeated().to_slice())
        .then_ignore(just('`'))
        .map(Token::Quoted);

    // String literals: "..." with \" escapes kept in the slice
    let string_lit = just('"')
        .ignore_then(
            just('\\')
                .then(any())
                .ignored()
                .or(none_of("\\\"").ignored())
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('"'))
        .map(Token::StringLit);

    let number = text::digits(10)
        .then(just('.').then(text::digits(10)).or_not())
        .to_slice()
        .map(Token::Number);

    // Symbols (multi-char first, then single-char)
    let symbol = choice((
        just("!=").to(Token::NotEq),
        just('{').to(Token::LBrace),
        just('}').to(Token::RBrace),
        just('(').to(Token::LParen),
        just(')').to(Token::RParen),
        just('[').to(Token::LBracket),
        just(']').to(Token::RBracket),
        just(',').to(Token::Comma),
        just(':').to(Token::Colon),
        just('!').to(Token::Bang),
        just('=').to(Token::Eq),
        just('&').to(Token::Amp),
        just('+').to(Token::Plus),
        just('-').to(Token::Minus),
        just('*').to(Token::Star),
        just('/').to(Token::Slash),
    ));

    let token = choice((mri, ident, variable, quoted, string_lit, number, symbol))
        .map_with(|tok, e| (tok, e.span()));

    token
        .padded()
        .repeated()
        .collect()
        .padded()
        .then_ignore(end())
}

/// Lex a source string into tokens.
///
/// Returns Ok with the token list on success, or Err with the lex errors.
pub fn lex(source: &str) -> Result<Vec<(Token<'_>, SimpleSpan)>, Vec<Rich<'_, char>>> {
    let (tokens, errs) = lexer().parse(source).into_output_errors();
    if errs.is_empty() {
        Ok(tokens.unwrap_or_default())
    } else {
        Err(errs)
    }
}
