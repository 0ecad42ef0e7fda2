//! Error types for loading and executing units.

use blockml_compiler::CompileError;
use blockml_dom::RenderError;
use blockml_syntax::ParseError;
use camino::Utf8PathBuf;
use smol_str::SmolStr;
use source_map::Span;
use std::fmt;
use thiserror::Error;

/// Result type for runtime operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any failure producing a unit's output.
#[derive(Debug, Error)]
pub enum Error {
    /// No source backs the requested unit.
    #[error("unit '{unit}' not found")]
    NotFound { unit: SmolStr },
    #[error("{unit}:{location}: {error}")]
    Parse {
        unit: SmolStr,
        location: String,
        #[source]
        error: ParseError,
    },
    #[error(transparent)]
    Compile(#[from] CompileError),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
    #[error("{path}: {source}")]
    Io {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn not_found(unit: impl Into<SmolStr>) -> Self {
        Error::NotFound { unit: unit.into() }
    }

    pub fn parse(unit: impl Into<SmolStr>, source: &str, error: ParseError) -> Self {
        let location = source_map::LineIndex::new(source)
            .line_col(error.span.start)
            .to_string();
        Error::Parse {
            unit: unit.into(),
            location,
            error,
        }
    }

    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }

    /// Unwrap an error raised inside a deferred thunk.
    pub fn from_render(err: RenderError) -> Self {
        match err {
            RenderError::Deferred(inner) => match inner.downcast::<Error>() {
                Ok(err) => *err,
                Err(other) => RuntimeError::new(other.to_string(), RuntimeErrorKind::Value).into(),
            },
            RenderError::Cycle(tag) => RuntimeError::new(
                format!("element <{}> contains itself", tag),
                RuntimeErrorKind::Value,
            )
            .into(),
        }
    }
}

impl From<Error> for RenderError {
    fn from(err: Error) -> Self {
        RenderError::deferred(err)
    }
}

/// A failure in template logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeError {
    /// The error message.
    pub message: String,
    /// The error kind.
    pub kind: RuntimeErrorKind,
    /// Unit being executed, when known.
    pub unit: Option<SmolStr>,
    /// Offending expression or statement, when known.
    pub span: Option<Span>,
}

impl RuntimeError {
    pub fn new(message: impl Into<String>, kind: RuntimeErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            unit: None,
            span: None,
        }
    }

    pub fn name(name: &str) -> Self {
        Self::new(
            format!("name '{}' is not defined", name),
            RuntimeErrorKind::Name,
        )
    }

    pub fn type_error(message: impl Into<String>) -> Self {
        Self::new(message, RuntimeErrorKind::Type)
    }

    pub fn value(message: impl Into<String>) -> Self {
        Self::new(message, RuntimeErrorKind::Value)
    }

    pub fn index(message: impl Into<String>) -> Self {
        Self::new(message, RuntimeErrorKind::Index)
    }

    pub fn key(key: impl fmt::Display) -> Self {
        Self::new(key.to_string(), RuntimeErrorKind::Key)
    }

    pub fn attribute(type_name: &str, attr: &str) -> Self {
        Self::new(
            format!("'{}' object has no attribute '{}'", type_name, attr),
            RuntimeErrorKind::Attribute,
        )
    }

    pub fn zero_division() -> Self {
        Self::new("division by zero", RuntimeErrorKind::ZeroDivision)
    }

    pub fn import(message: impl Into<String>) -> Self {
        Self::new(message, RuntimeErrorKind::Import)
    }

    /// Attach a location unless one is already recorded.
    pub fn at(mut self, unit: &str, span: Span) -> Self {
        if self.unit.is_none() {
            self.unit = Some(SmolStr::new(unit));
        }
        if self.span.is_none() {
            self.span = Some(span);
        }
        self
    }

    /// Format as `unit:line:col: Kind: message` against the unit's source.
    pub fn located(&self, source: &str) -> String {
        match self.span {
            Some(span) => {
                let at = source_map::LineIndex::new(source).line_col(span.start);
                format!(
                    "{}:{}: {}",
                    self.unit.as_deref().unwrap_or("<unit>"),
                    at,
                    self.headline()
                )
            }
            None => self.to_string(),
        }
    }

    fn headline(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{}: {}", unit, self.headline()),
            None => f.write_str(&self.headline()),
        }
    }
}

impl std::error::Error for RuntimeError {}

/// Categories of runtime failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeErrorKind {
    Name,
    Type,
    Value,
    Index,
    Key,
    Attribute,
    ZeroDivision,
    Import,
    Syntax,
    Recursion,
}

impl RuntimeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Name => "NameError",
            Self::Type => "TypeError",
            Self::Value => "ValueError",
            Self::Index => "IndexError",
            Self::Key => "KeyError",
            Self::Attribute => "AttributeError",
            Self::ZeroDivision => "ZeroDivisionError",
            Self::Import => "ImportError",
            Self::Syntax => "SyntaxError",
            Self::Recursion => "RecursionError",
        }
    }
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_runtime_error_display() {
        let err = RuntimeError::name("x");
        assert_eq!(err.to_string(), "NameError: name 'x' is not defined");
        let err = err.at("page", Span::new(4, 5));
        assert_eq!(err.to_string(), "page: NameError: name 'x' is not defined");
        assert_eq!(
            err.located("y = 1\nx"),
            "page:1:5: NameError: name 'x' is not defined"
        );
    }

    #[test]
    fn test_error_round_trips_through_render_error() {
        let err = Error::from(RuntimeError::zero_division());
        let back = Error::from_render(RenderError::from(err));
        assert!(matches!(
            back,
            Error::Runtime(RuntimeError {
                kind: RuntimeErrorKind::ZeroDivision,
                ..
            })
        ));
        assert!(Error::not_found("x").is_not_found());
    }
}
