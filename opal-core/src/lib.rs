//! Core pipeline for the Opal language toolchain.
//!
//! This crate provides the compiler pipeline as a set of re-invocable
//! stage functions over shared session state. The pipeline is roughly:
//!
//!   source .opal
//!     -> lexer      (tokens)
//!     -> parser     (append-only source unit, resumable)
//!     -> name_resolve + passes + typecheck (offset-threaded)
//!     -> lower      (mid-level IR)
//!     -> codegen_wasm (wasm-encoder)
//!     -> serialize  (module artifacts)
//!
//! Interactive consumers drive the stages themselves with growing start
//! offsets; batch consumers use the wrappers in [`compiler`]. The CLI
//! and other tools should depend on this crate rather than
//! reimplementing the pipeline.

// ---------------------------------------------------------------------
// Error handling and diagnostics
// ---------------------------------------------------------------------

pub mod span;
pub mod diagnostic;
pub mod error;

// ---------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------

pub mod intern;
pub mod context;

// ---------------------------------------------------------------------
// Front-end: lexing and parsing
// ---------------------------------------------------------------------

pub mod lexer;
pub mod parser;
pub mod ast;

// ---------------------------------------------------------------------
// Semantic layers: types, name binding, rewriting passes, checking
// ---------------------------------------------------------------------

pub mod types;
pub mod name_resolve;
pub mod passes;
pub mod typecheck;

// ---------------------------------------------------------------------
// Back-end: IR, code generation, serialization, orchestration
// ---------------------------------------------------------------------

pub mod mir;
pub mod lower;
pub mod codegen_wasm;
pub mod serialize;
pub mod verify;
pub mod compiler;

// ---------------------------------------------------------------------
// Public API re-exports
// ---------------------------------------------------------------------

pub use compiler::{CompilationArtifact, compile_wasm, emit_mir};
pub use error::CoreError;
