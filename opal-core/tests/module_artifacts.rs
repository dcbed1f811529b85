//! Serialization round trips and the import side of the registry:
//! a library unit is compiled, serialized, read back, registered, and
//! then imported by another unit.

use opal_core::context::{CompilationContext, ModuleOrFile, SourceUnit};
use opal_core::lower::lower_file;
use opal_core::name_resolve::{ModuleRegistry, perform_name_binding};
use opal_core::parser::{ParseOptions, parse_into_source_unit};
use opal_core::serialize::{DeclKind, SerializeOptions, read_artifact, serialize};
use opal_core::span::FileId;
use opal_core::typecheck::{TopLevelContext, perform_type_checking};

const LIBRARY: &str = "pub let base = 10\n\
                       pub fn scale(x: Int) -> Int { return x * base }\n\
                       fn internal(x: Int) -> Int { return x - 1 }";

fn compile_library() -> (CompilationContext, SourceUnit, opal_core::mir::MirModule) {
    let mut ctx = CompilationContext::new();
    let mut unit = SourceUnit::new(FileId(0), "lib.opal");
    parse_into_source_unit(
        &mut ctx,
        &mut unit,
        LIBRARY,
        ParseOptions::default(),
        None,
        None,
        None,
    );
    perform_name_binding(&mut ctx, &mut unit, &ModuleRegistry::new(), 0);
    let mut tlc = TopLevelContext::new();
    perform_type_checking(&mut ctx, &mut unit, &mut tlc, 0);
    assert!(!ctx.diagnostics.has_errors());
    let mir = lower_file(&mut ctx, &unit, 0);
    (ctx, unit, mir)
}

#[test]
fn public_surface_round_trips_and_resolves_imports() {
    let (ctx, unit, mir) = compile_library();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scale.opalmod");

    serialize(
        &ctx,
        ModuleOrFile::File(&unit),
        SerializeOptions {
            output_path: &path,
            doc_output_path: None,
            mir: Some(&mir),
            serialize_all_mir: false,
            link_name: "Scale",
        },
    )
    .expect("serialize");

    let artifact = read_artifact(&path).expect("read back");
    assert_eq!(artifact.link_name, "Scale");
    assert_eq!(artifact.input_files, vec!["lib.opal".to_string()]);

    let scale = artifact.decl("scale").expect("scale");
    assert_eq!(scale.kind, DeclKind::Fn);
    assert_eq!(scale.signature, "fn(Int) -> Int");
    let base = artifact.decl("base").expect("base");
    assert_eq!(base.kind, DeclKind::Let);
    assert_eq!(base.signature, "Int");

    // Private declarations keep their metadata but not their bodies.
    assert!(artifact.decl("internal").is_some());
    let embedded = artifact.mir.as_ref().expect("embedded IR");
    assert!(embedded.function("scale").is_some());
    assert!(embedded.function("internal").is_none());
    // The synthesized entry is public so consumers can run the
    // library's top-level initialization.
    assert!(embedded.function("main").is_some());

    // A consumer unit resolves the import against the registry.
    let mut registry = ModuleRegistry::new();
    registry.register(artifact);

    let mut ctx = CompilationContext::new();
    let mut unit = SourceUnit::new(FileId(1), "app.opal");
    parse_into_source_unit(
        &mut ctx,
        &mut unit,
        "import Scale\nlet ready = 1",
        ParseOptions::default(),
        None,
        None,
        None,
    );
    perform_name_binding(&mut ctx, &mut unit, &registry, 0);
    assert!(!ctx.diagnostics.has_errors(), "import should resolve");
}

#[test]
fn serialize_all_mir_keeps_private_bodies() {
    let (ctx, unit, mir) = compile_library();
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scale-full.opalmod");

    serialize(
        &ctx,
        ModuleOrFile::File(&unit),
        SerializeOptions {
            output_path: &path,
            doc_output_path: None,
            mir: Some(&mir),
            serialize_all_mir: true,
            link_name: "Scale",
        },
    )
    .expect("serialize");

    let artifact = read_artifact(&path).expect("read back");
    let embedded = artifact.mir.expect("embedded IR");
    let internal = embedded.function("internal").expect("private body kept");
    assert_eq!(internal.body, mir.function("internal").expect("lowered").body);
}

#[test]
fn whole_modules_serialize_across_units() {
    let (mut ctx, unit_a, _) = compile_library();
    let mut unit_b = SourceUnit::new(FileId(1), "extra.opal");
    parse_into_source_unit(
        &mut ctx,
        &mut unit_b,
        "pub fn twice(x: Int) -> Int { return x + x }",
        ParseOptions::default(),
        None,
        None,
        None,
    );
    perform_name_binding(&mut ctx, &mut unit_b, &ModuleRegistry::new(), 0);
    let mut tlc = TopLevelContext::new();
    perform_type_checking(&mut ctx, &mut unit_b, &mut tlc, 0);
    assert!(!ctx.diagnostics.has_errors());

    let mut module = opal_core::context::Module::new("Scale");
    module.units.push(unit_a);
    module.units.push(unit_b);

    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("scale.opalmod");
    serialize(
        &ctx,
        ModuleOrFile::Module(&module),
        SerializeOptions {
            output_path: &path,
            doc_output_path: None,
            mir: None,
            serialize_all_mir: false,
            link_name: "Scale",
        },
    )
    .expect("serialize");

    let artifact = read_artifact(&path).expect("read back");
    assert_eq!(
        artifact.input_files,
        vec!["lib.opal".to_string(), "extra.opal".to_string()]
    );
    assert!(artifact.decl("scale").is_some());
    assert!(artifact.decl("twice").is_some());
}
