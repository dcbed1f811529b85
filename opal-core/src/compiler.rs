//! One-shot compilation drivers.
//!
//! Library embedders with long-lived sessions call the stage functions
//! themselves; these wrappers run the whole pipeline over one buffer
//! for batch consumers like the CLI. Stage order: parse, verify, bind,
//! check, verify again, lower, generate, assemble.

use crate::codegen_wasm::{CodegenOptions, TargetIrContext, perform_codegen_module};
use crate::context::{CompilationContext, SourceUnit};
use crate::diagnostic::{Diagnostic, Severity};
use crate::error::CoreError;
use crate::lower::lower_file;
use crate::mir::MirModule;
use crate::name_resolve::{ModuleRegistry, perform_name_binding};
use crate::parser::{ParseOptions, parse_into_source_unit};
use crate::span::FileId;
use crate::typecheck::{TopLevelContext, perform_type_checking};
use crate::verify::verify_unit;

/// Everything a batch compilation produces.
#[derive(Debug)]
pub struct CompilationArtifact {
    pub wasm: Vec<u8>,
    pub mir: MirModule,
    /// Warnings that survived a clean run.
    pub diagnostics: Vec<Diagnostic>,
}

/// Compile one buffer to wasm bytes.
pub fn compile_wasm(source: &str) -> Result<CompilationArtifact, CoreError> {
    let (ctx, mir) = front_half(source, "input.opal")?;
    let mut target_ctx = TargetIrContext::new();
    let id = perform_codegen_module(CodegenOptions::default(), &mir, &mir.name, &mut target_ctx);
    let wasm = target_ctx.assemble(id)?;
    let diagnostics = ctx.diagnostics.iter().cloned().collect();
    Ok(CompilationArtifact {
        wasm,
        mir,
        diagnostics,
    })
}

/// Compile one buffer and render its mid-level IR as text.
pub fn emit_mir(source: &str) -> Result<String, CoreError> {
    let (_ctx, mir) = front_half(source, "input.opal")?;
    Ok(mir.to_string())
}

fn front_half(source: &str, name: &str) -> Result<(CompilationContext, MirModule), CoreError> {
    let mut ctx = CompilationContext::new();
    let mut unit = SourceUnit::new(FileId(0), name);

    parse_into_source_unit(
        &mut ctx,
        &mut unit,
        source,
        ParseOptions::default(),
        None,
        None,
        None,
    );
    verify_unit(&mut ctx, &unit);

    perform_name_binding(&mut ctx, &mut unit, &ModuleRegistry::new(), 0);
    let mut tlc = TopLevelContext::new();
    perform_type_checking(&mut ctx, &mut unit, &mut tlc, 0);
    verify_unit(&mut ctx, &unit);

    if ctx.diagnostics.has_errors() {
        return Err(compilation_failed(&ctx));
    }

    let mir = lower_file(&mut ctx, &unit, 0);
    if ctx.diagnostics.has_errors() {
        return Err(compilation_failed(&ctx));
    }
    Ok((ctx, mir))
}

fn compilation_failed(ctx: &CompilationContext) -> CoreError {
    let first = ctx
        .diagnostics
        .iter()
        .find(|d| d.severity == Severity::Error)
        .map(|d| d.message.clone())
        .unwrap_or_default();
    CoreError::CompilationFailed {
        errors: ctx.diagnostics.error_count(),
        first,
    }
}
