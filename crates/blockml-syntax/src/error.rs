//! Error types for template parsing.

use source_map::{LineIndex, Span};
use std::fmt;

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// An error that occurred during lexing or parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    /// The error message.
    pub message: String,
    /// The span where the error occurred.
    pub span: Span,
    /// The error code.
    pub code: ErrorCode,
}

impl ParseError {
    /// Create a new parse error.
    pub fn new(message: impl Into<String>, span: Span, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            span,
            code,
        }
    }

    /// Create an unexpected token error.
    pub fn unexpected_token(expected: &str, found: &str, span: Span) -> Self {
        Self::new(
            format!("Expected {}, found {}", expected, found),
            span,
            ErrorCode::UnexpectedToken,
        )
    }

    pub fn unexpected_character(found: &str, span: Span) -> Self {
        Self::new(
            format!("Unexpected character {:?}", found),
            span,
            ErrorCode::UnexpectedCharacter,
        )
    }

    pub fn unterminated_string(span: Span) -> Self {
        Self::new(
            "Unterminated string literal",
            span,
            ErrorCode::UnterminatedString,
        )
    }

    pub fn inconsistent_dedent(span: Span) -> Self {
        Self::new(
            "Unindent does not match any outer indentation level",
            span,
            ErrorCode::InconsistentDedent,
        )
    }

    /// Create an invalid assignment/loop target error.
    pub fn invalid_target(what: &str, span: Span) -> Self {
        Self::new(
            format!("Cannot assign to {}", what),
            span,
            ErrorCode::InvalidTarget,
        )
    }

    pub fn syntax(message: impl Into<String>, span: Span) -> Self {
        Self::new(message, span, ErrorCode::SyntaxError)
    }

    /// Render the message prefixed with a 1-indexed `line:col` position in `source`.
    pub fn located(&self, source: &str) -> String {
        let pos = LineIndex::new(source).line_col(self.span.start);
        format!("{}: {}", pos, self.message)
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseError {}

/// Error codes for categorizing parse errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Unexpected token encountered.
    UnexpectedToken,
    /// A character no token starts with.
    UnexpectedCharacter,
    /// String literal without a closing quote on the same line.
    UnterminatedString,
    /// Dedent to a column that was never an indentation level.
    InconsistentDedent,
    /// Assignment or loop target that cannot be bound.
    InvalidTarget,
    /// Syntax error.
    SyntaxError,
}

impl ErrorCode {
    /// Get the error code as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::UnexpectedToken => "unexpected-token",
            ErrorCode::UnexpectedCharacter => "unexpected-character",
            ErrorCode::UnterminatedString => "unterminated-string",
            ErrorCode::InconsistentDedent => "inconsistent-dedent",
            ErrorCode::InvalidTarget => "invalid-target",
            ErrorCode::SyntaxError => "syntax-error",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
