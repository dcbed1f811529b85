//! Diagnostics and the session-wide diagnostic sink.
//!
//! Stages never abort on user-level problems; they append a
//! `Diagnostic` to the session's `DiagnosticSink` and keep going with
//! the next independent element. The sink is append-only: stages add
//! diagnostics, nothing removes or rewrites them.

use crate::span::Span;

/// Severity level of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

/// A labeled span used inside diagnostics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Label {
    pub span: Span,
    pub message: Option<String>,
}

/// A single diagnostic produced by some stage of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<&'static str>,
    pub message: String,
    pub primary: Label,
    pub secondary: Vec<Label>,
}

impl Diagnostic {
    /// Create a new error diagnostic with a primary span.
    pub fn error(message: impl Into<String>, primary_span: Span) -> Diagnostic {
        Diagnostic {
            severity: Severity::Error,
            code: None,
            message: message.into(),
            primary: Label {
                span: primary_span,
                message: None,
            },
            secondary: Vec::new(),
        }
    }

    /// Create a new warning diagnostic with a primary span.
    pub fn warning(message: impl Into<String>, primary_span: Span) -> Diagnostic {
        Diagnostic {
            severity: Severity::Warning,
            ..Diagnostic::error(message, primary_span)
        }
    }

    /// Attach an error code (for example, "E0001") to this diagnostic.
    pub fn with_code(mut self, code: &'static str) -> Diagnostic {
        self.code = Some(code);
        self
    }

    /// Add a secondary label pointing at a related location.
    pub fn with_secondary_label(
        mut self,
        span: Span,
        message: impl Into<Option<String>>,
    ) -> Diagnostic {
        self.secondary.push(Label {
            span,
            message: message.into(),
        });
        self
    }
}

/// Append-only collector of diagnostics for one compilation session.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> DiagnosticSink {
        DiagnosticSink::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::span::FileId;

    #[test]
    fn sink_counts_errors_and_warnings_separately() {
        let mut sink = DiagnosticSink::new();
        sink.push(Diagnostic::error("bad", Span::empty(FileId(0), 0)));
        sink.push(Diagnostic::warning("meh", Span::empty(FileId(0), 1)));
        assert_eq!(sink.len(), 2);
        assert_eq!(sink.error_count(), 1);
        assert!(sink.has_errors());
    }

    #[test]
    fn builder_attaches_code_and_labels() {
        let span = Span::new(FileId(1), 4, 9);
        let diag = Diagnostic::error("unresolved import", span)
            .with_code("E0101")
            .with_secondary_label(Span::empty(FileId(1), 0), Some("requested here".to_string()));
        assert_eq!(diag.code, Some("E0101"));
        assert_eq!(diag.secondary.len(), 1);
    }
}
