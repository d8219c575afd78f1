//! Errors surfaced by the MQL compiler.
//!
//! Every stage fails fast with one of two kinds of error: the text could not
//! be parsed at all ([`MqlError::Syntax`]), or it parsed but means something
//! the compiler cannot plan ([`MqlError::Semantic`]). Neither is retryable.

use thiserror::Error;

/// Errors that can occur while compiling an MQL query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MqlError {
    /// The grammar could not consume the whole input.
    #[error("Parsing error on line {line}, column {column} at '{excerpt}'")]
    Syntax {
        /// 1-based line of the first unparseable token.
        line: usize,
        /// 1-based column of the first unparseable token.
        column: usize,
        /// A few characters of text around the failure.
        excerpt: String,
    },

    /// Well-formed text with an invalid meaning.
    #[error("{message}")]
    Semantic {
        message: String,
        /// Whether the error is worth reporting to error tracking.
        reportable: bool,
    },
}

pub type MqlResult<T> = Result<T, MqlError>;

impl MqlError {
    /// Create a reportable semantic error.
    pub fn semantic(message: impl Into<String>) -> Self {
        Self::Semantic {
            message: message.into(),
            reportable: true,
        }
    }

    /// Create a semantic error that should not be sent to error tracking.
    pub fn unreported(message: impl Into<String>) -> Self {
        Self::Semantic {
            message: message.into(),
            reportable: false,
        }
    }

    /// Normalize a collaborator failure into a semantic error.
    ///
    /// Only the first line of the foreign message is kept.
    pub fn from_foreign(err: &dyn std::fmt::Display) -> Self {
        let message = err.to_string();
        let first = message.lines().next().unwrap_or_default();
        Self::semantic(first)
    }

    /// Build a syntax error for a failure at byte `offset` of `source`.
    pub fn syntax_at(source: &str, offset: usize) -> Self {
        let offset = offset.min(source.len());
        let before = &source[..floor_char_boundary(source, offset)];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        let line_text = source[line_start..].lines().next().unwrap_or_default();
        let column_chars = before[line_start..].chars().count();

        let chars: Vec<char> = line_text.chars().collect();
        let from = column_chars.saturating_sub(3);
        let to = (column_chars + 10).min(chars.len());
        let excerpt: String = chars[from.min(to)..to].iter().collect();

        Self::Syntax {
            line,
            column: column_chars + 1,
            excerpt,
        }
    }

    pub fn is_reportable(&self) -> bool {
        match self {
            MqlError::Syntax { .. } => true,
            MqlError::Semantic { reportable, .. } => *reportable,
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, MqlError::Syntax { .. })
    }
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    while index > 0 && !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}
