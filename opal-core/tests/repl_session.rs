//! An interactive session driving every stage incrementally, the way a
//! REPL front end would: parse one element, bind, check, lower the new
//! slice, merge it into the target module, and execute.

mod harness;

use opal_core::codegen_wasm::{CodegenOptions, TargetIrContext, perform_codegen_file};
use opal_core::context::{CompilationContext, SourceUnit};
use opal_core::lower::lower_file;
use opal_core::name_resolve::{ModuleRegistry, perform_name_binding};
use opal_core::parser::{ParseOptions, PersistentParseState, parse_into_source_unit};
use opal_core::passes::instrument::perform_instrumentation;
use opal_core::serialize::ModuleArtifact;
use opal_core::span::FileId;
use opal_core::typecheck::{TopLevelContext, perform_type_checking};
use opal_core::verify::verify_unit;

#[test]
fn incremental_session_matches_expected_output() {
    let mut ctx = CompilationContext::new();
    let mut unit = SourceUnit::new(FileId(0), "repl.opal");
    let mut state = PersistentParseState::new();
    let mut tlc = TopLevelContext::new();
    let mut registry = ModuleRegistry::new();
    registry.register(ModuleArtifact {
        link_name: "Prelude".to_string(),
        input_files: Vec::new(),
        decls: Vec::new(),
        mir: None,
    });
    let mut target_ctx = TargetIrContext::new();

    // The growing buffer, as three user inputs.
    let inputs = [
        "import Prelude\n",
        "import Prelude\nlet a = 20\n",
        "import Prelude\nlet a = 20\nprint(a + 22)\n",
    ];

    let mut processed = 0usize;
    for buffer in inputs {
        let summary = parse_into_source_unit(
            &mut ctx,
            &mut unit,
            buffer,
            ParseOptions { is_main_file: true },
            None,
            Some(&mut state),
            None,
        );
        assert!(summary.done || summary.found_side_effects);
        verify_unit(&mut ctx, &unit);

        perform_name_binding(&mut ctx, &mut unit, &registry, processed);
        perform_instrumentation(&mut ctx, &mut unit);
        perform_type_checking(&mut ctx, &mut unit, &mut tlc, processed);
        verify_unit(&mut ctx, &unit);
        assert!(!ctx.diagnostics.has_errors(), "{:?}", ctx.diagnostics);

        let mir = lower_file(&mut ctx, &unit, processed);
        perform_codegen_file(CodegenOptions::default(), &mir, "repl", &mut target_ctx, processed);
        processed = unit.len();
    }

    assert_eq!(unit.len(), 3);
    assert_eq!(unit.bound_elements, 3);
    assert_eq!(unit.checked_elements, 3);

    let id = perform_codegen_file(
        CodegenOptions::default(),
        &lower_file(&mut ctx, &unit, processed),
        "repl",
        &mut target_ctx,
        processed,
    );
    let bytes = target_ctx.assemble(id).expect("assemble");
    let host = harness::run_entries(&bytes);
    // Instrumentation wrapped the expression statement in log(...).
    assert_eq!(host.printed, vec![42]);
    assert_eq!(host.logged, vec![42]);
}

#[test]
fn reprocessing_processed_elements_changes_nothing() {
    let mut ctx = CompilationContext::new();
    let mut unit = SourceUnit::new(FileId(0), "idem.opal");
    let mut tlc = TopLevelContext::new();
    let registry = ModuleRegistry::new();
    parse_into_source_unit(
        &mut ctx,
        &mut unit,
        "let a = 1\nfn f(x: Int) -> Int { return x + a }",
        ParseOptions::default(),
        None,
        None,
        None,
    );

    perform_name_binding(&mut ctx, &mut unit, &registry, 0);
    perform_type_checking(&mut ctx, &mut unit, &mut tlc, 0);
    let diags = ctx.diagnostics.len();
    let items = unit.items.clone();

    // Offsets below the cursors are clamped, including zero.
    perform_name_binding(&mut ctx, &mut unit, &registry, 0);
    perform_type_checking(&mut ctx, &mut unit, &mut tlc, 0);
    verify_unit(&mut ctx, &unit);

    assert_eq!(ctx.diagnostics.len(), diags);
    assert_eq!(unit.items, items);
}
