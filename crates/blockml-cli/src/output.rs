//! Reporting of render failures.
//!
//! Reports go to stderr so a template rendered to stdout stays clean.

use crate::cli::OutputFormat;
use crate::render::RenderSummary;
use blockml_runtime::Error;
use camino::{Utf8Path, Utf8PathBuf};
use source_map::{LineCol, LineIndex, Span};

/// A template that failed to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub path: Utf8PathBuf,
    /// Error code or kind, like `NameError` or `multiple-scope-targets`.
    pub kind: &'static str,
    pub message: String,
    pub location: Option<LineCol>,
    /// The template or one of its imports does not exist.
    pub missing: bool,
}

impl Failure {
    /// Describe `err` raised while rendering the unit `unit` read from `path`.
    ///
    /// Locations are resolved against `source` only when the error belongs to
    /// that unit; failures inside imported units keep their unit-prefixed message.
    pub fn new(path: &Utf8Path, unit: &str, source: Option<&str>, err: Error) -> Self {
        let locate = |span: Span| source.map(|text| LineIndex::new(text).line_col(span.start));
        let (kind, message, location) = match &err {
            Error::NotFound { .. } => ("not-found", err.to_string(), None),
            Error::Parse { unit: owner, error, .. } if owner == unit => {
                (error.code.as_str(), error.message.clone(), locate(error.span))
            }
            Error::Parse { error, .. } => (error.code.as_str(), err.to_string(), None),
            Error::Compile(error) if error.unit == unit => {
                (error.code.as_str(), error.message.clone(), locate(error.span))
            }
            Error::Compile(error) => (error.code.as_str(), err.to_string(), None),
            Error::Runtime(error) => match (&error.unit, error.span) {
                (Some(owner), Some(span)) if owner == unit => {
                    (error.kind.as_str(), error.message.clone(), locate(span))
                }
                _ => (error.kind.as_str(), error.to_string(), None),
            },
            Error::Io { .. } => ("io", err.to_string(), None),
        };
        Self {
            path: path.to_path_buf(),
            kind,
            message,
            location,
            missing: err.is_not_found(),
        }
    }
}

/// Formatter for failures and the run summary.
pub struct OutputFormatter {
    format: OutputFormat,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    pub fn print_failure(&self, failure: &Failure) {
        eprintln!("{}", self.format_failure(failure));
    }

    pub fn print_summary(&self, summary: &RenderSummary) {
        eprintln!("{}", self.format_summary(summary));
    }

    pub fn format_failure(&self, failure: &Failure) -> String {
        match self.format {
            OutputFormat::Human => {
                let location = match failure.location {
                    Some(at) => format!("{}:{}", failure.path, at),
                    None => failure.path.to_string(),
                };
                format!(
                    "{}: \x1b[31merror\x1b[0m[{}]: {}",
                    location, failure.kind, failure.message
                )
            }
            OutputFormat::Json => serde_json::json!({
                "type": "error",
                "file": failure.path,
                "kind": failure.kind,
                "message": failure.message,
                "line": failure.location.map(|at| at.line + 1),
                "column": failure.location.map(|at| at.col + 1),
            })
            .to_string(),
        }
    }

    pub fn format_summary(&self, summary: &RenderSummary) -> String {
        match self.format {
            OutputFormat::Human => {
                let failed = summary.failed();
                if failed == 0 {
                    format!(
                        "\x1b[32m✓\x1b[0m Rendered {} file{} ({}ms)",
                        summary.file_count,
                        plural(summary.file_count),
                        summary.duration_ms
                    )
                } else {
                    format!(
                        "\x1b[31m✗\x1b[0m {} of {} file{} failed ({}ms)",
                        failed,
                        summary.file_count,
                        plural(summary.file_count),
                        summary.duration_ms
                    )
                }
            }
            OutputFormat::Json => serde_json::json!({
                "type": "summary",
                "files": summary.file_count,
                "errors": summary.error_count,
                "missing": summary.missing_count,
                "duration_ms": summary.duration_ms,
            })
            .to_string(),
        }
    }
}

fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blockml_runtime::{Engine, EngineConfig, MemoryLoader};
    use pretty_assertions::assert_eq;

    fn failure_for(source: &str) -> Failure {
        let engine = Engine::with_loader(EngineConfig::default(), MemoryLoader::new());
        let err = engine
            .compile_source("page", source)
            .and_then(|unit| unit.run(&engine, Vec::new()).map(|_| ()))
            .unwrap_err();
        Failure::new(Utf8Path::new("site/page.bml"), "page", Some(source), err)
    }

    #[test]
    fn test_runtime_failure_is_located() {
        let failure = failure_for("x = 1\np(y)\n");
        assert_eq!(failure.kind, "NameError");
        assert_eq!(failure.location, Some(LineCol::new(1, 2)));
        let human = OutputFormatter::new(OutputFormat::Human).format_failure(&failure);
        assert_eq!(
            human,
            "site/page.bml:2:3: \x1b[31merror\x1b[0m[NameError]: name 'y' is not defined"
        );
    }

    #[test]
    fn test_compile_failure_json() {
        let failure = failure_for("with div() as a, span() as b:\n    pass\n");
        assert_eq!(failure.kind, "multiple-scope-targets");
        let json: serde_json::Value = serde_json::from_str(
            &OutputFormatter::new(OutputFormat::Json).format_failure(&failure),
        )
        .unwrap();
        assert_eq!(json["file"], "site/page.bml");
        assert_eq!(json["line"], 1);
        assert_eq!(json["kind"], "multiple-scope-targets");
    }

    #[test]
    fn test_missing_import() {
        let failure = failure_for("import nowhere\n");
        assert!(failure.missing);
        assert_eq!(failure.kind, "not-found");
        assert_eq!(failure.location, None);
    }

    #[test]
    fn test_summary() {
        let formatter = OutputFormatter::new(OutputFormat::Human);
        let mut summary = RenderSummary {
            file_count: 1,
            duration_ms: 4,
            ..RenderSummary::default()
        };
        assert_eq!(
            formatter.format_summary(&summary),
            "\x1b[32m✓\x1b[0m Rendered 1 file (4ms)"
        );
        summary.file_count = 3;
        summary.error_count = 1;
        summary.missing_count = 1;
        assert_eq!(
            formatter.format_summary(&summary),
            "\x1b[31m✗\x1b[0m 2 of 3 files failed (4ms)"
        );
    }
}
