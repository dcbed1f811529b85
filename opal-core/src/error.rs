use std::path::PathBuf;

use thiserror::Error;

/// Driver-level failures.
///
/// User-visible problems in the compiled program (type errors,
/// unresolved imports, bad syntax) never surface here; those flow
/// through the [`DiagnosticSink`](crate::diagnostic::DiagnosticSink).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to read source: {0}")]
    SourceIo(#[from] std::io::Error),
    #[error("failed to write artifact at {}: {message}", path.display())]
    ArtifactWrite { path: PathBuf, message: String },
    #[error("malformed module artifact: {0}")]
    ArtifactFormat(String),
    #[error("code generation failed: {0}")]
    Codegen(String),
    #[error("compilation failed with {errors} error(s); first: {first}")]
    CompilationFailed { errors: usize, first: String },
}
