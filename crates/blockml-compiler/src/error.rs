//! Error types for template compilation.

use smol_str::SmolStr;
use source_map::Span;
use std::fmt;

/// Result type for compilation operations.
pub type CompileResult<T> = Result<T, CompileError>;

/// A template that cannot be compiled. No partial output is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    /// The error message.
    pub message: String,
    /// Name of the unit being compiled.
    pub unit: SmolStr,
    /// The span where the error occurred.
    pub span: Span,
    /// The error code.
    pub code: CompileErrorCode,
}

impl CompileError {
    pub fn new(
        message: impl Into<String>,
        unit: impl Into<SmolStr>,
        span: Span,
        code: CompileErrorCode,
    ) -> Self {
        Self {
            message: message.into(),
            unit: unit.into(),
            span,
            code,
        }
    }

    pub fn multiple_scope_targets(unit: &str, count: usize, span: Span) -> Self {
        Self::new(
            format!("Scope block has {} targets, expected exactly one", count),
            unit,
            span,
            CompileErrorCode::MultipleScopeTargets,
        )
    }

    pub fn scope_target_not_call(unit: &str, span: Span) -> Self {
        Self::new(
            "Scope block target must be a call, like `with div():`",
            unit,
            span,
            CompileErrorCode::ScopeTargetNotCall,
        )
    }

    pub fn invalid_scope_variable(unit: &str, span: Span) -> Self {
        Self::new(
            "Scope block variable must be a plain name",
            unit,
            span,
            CompileErrorCode::InvalidScopeVariable,
        )
    }

    pub fn wildcard_import(unit: &str, module: &str, span: Span) -> Self {
        Self::new(
            format!("Wildcard import from '{}' is not allowed in a template", module),
            unit,
            span,
            CompileErrorCode::WildcardImport,
        )
    }

    pub fn loop_control_outside_loop(unit: &str, keyword: &str, span: Span) -> Self {
        Self::new(
            format!(
                "'{}' outside loop; an `if` or `for` in element scope is compiled to its own function",
                keyword
            ),
            unit,
            span,
            CompileErrorCode::LoopControlOutsideLoop,
        )
    }

    pub fn return_in_block(unit: &str, span: Span) -> Self {
        Self::new(
            "'return' inside an `if` or `for` in element scope cannot leave the enclosing function",
            unit,
            span,
            CompileErrorCode::MisplacedReturn,
        )
    }

    pub fn return_outside_function(unit: &str, span: Span) -> Self {
        Self::new(
            "'return' outside function",
            unit,
            span,
            CompileErrorCode::MisplacedReturn,
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.unit, self.message)
    }
}

impl std::error::Error for CompileError {}

/// Error codes for template compilation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompileErrorCode {
    /// `with a(), b():`
    MultipleScopeTargets,
    /// `with name:`
    ScopeTargetNotCall,
    /// `with div() as (a, b):`
    InvalidScopeVariable,
    /// `from x import *`
    WildcardImport,
    /// `break`/`continue` that no loop in the same function encloses
    LoopControlOutsideLoop,
    /// `return` that would only leave a wrapped `if`/`for`
    MisplacedReturn,
}

impl CompileErrorCode {
    /// Get the error code as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MultipleScopeTargets => "multiple-scope-targets",
            Self::ScopeTargetNotCall => "scope-target-not-call",
            Self::InvalidScopeVariable => "invalid-scope-variable",
            Self::WildcardImport => "wildcard-import",
            Self::LoopControlOutsideLoop => "loop-control-outside-loop",
            Self::MisplacedReturn => "misplaced-return",
        }
    }
}

impl fmt::Display for CompileErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
