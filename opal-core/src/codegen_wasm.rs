//! WASM backend over the mid-level IR.
//!
//! Target modules live in a caller-owned [`TargetIrContext`] and are
//! addressed by [`TargetModuleId`]; nothing here writes to globals or
//! files. [`perform_codegen_module`] emits a whole IR module at once;
//! [`perform_codegen_file`] only emits functions originating at or
//! after a start offset and merges them into the already-emitted
//! target module of the same name, replacing same-named functions, so
//! a long-lived session can regenerate code slice by slice.
//!
//! [`TargetIrContext::assemble`] turns one target module into final
//! wasm bytes. All values are `i32` (booleans as 0/1, string
//! placeholders as 0); calls to functions the module does not define
//! become imports from the `env` namespace.

use std::collections::{HashMap, HashSet};

use wasm_encoder::{
    CodeSection, ConstExpr, EntityType, ExportKind, ExportSection, Function, FunctionSection,
    GlobalSection, GlobalType, ImportSection, Instruction, Module, TypeSection, ValType,
};

use crate::error::CoreError;
use crate::mir::{BinOp, MirFunction, MirInst, MirModule};

#[derive(Debug, Clone, Copy, Default)]
pub struct CodegenOptions {
    /// Recorded on the target module; optimization is the backend's
    /// business and currently a no-op.
    pub optimize: bool,
}

/// Handle to a module inside a [`TargetIrContext`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetModuleId(usize);

/// One wasm module being accumulated, as merged IR plus the options it
/// was first created with.
#[derive(Debug)]
pub struct TargetModule {
    pub name: String,
    pub optimize: bool,
    globals: Vec<String>,
    functions: Vec<MirFunction>,
}

impl TargetModule {
    pub fn function_names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.name.as_str())
    }
}

/// Caller-owned store of in-progress target modules.
#[derive(Debug, Default)]
pub struct TargetIrContext {
    modules: Vec<TargetModule>,
}

impl TargetIrContext {
    pub fn new() -> TargetIrContext {
        TargetIrContext::default()
    }

    pub fn module(&self, id: TargetModuleId) -> &TargetModule {
        &self.modules[id.0]
    }

    fn find(&self, name: &str) -> Option<TargetModuleId> {
        self.modules
            .iter()
            .position(|m| m.name == name)
            .map(TargetModuleId)
    }

    /// Assemble one target module into wasm bytes.
    pub fn assemble(&self, id: TargetModuleId) -> Result<Vec<u8>, CoreError> {
        assemble_module(self.module(id))
    }
}

/// Emit a whole IR module as a fresh target module, replacing any
/// previously emitted module of the same name.
pub fn perform_codegen_module(
    options: CodegenOptions,
    mir: &MirModule,
    name: &str,
    target_ctx: &mut TargetIrContext,
) -> TargetModuleId {
    let module = TargetModule {
        name: name.to_string(),
        optimize: options.optimize,
        globals: mir.globals.clone(),
        functions: mir.functions.clone(),
    };
    match target_ctx.find(name) {
        Some(id) => {
            target_ctx.modules[id.0] = module;
            id
        }
        None => {
            target_ctx.modules.push(module);
            TargetModuleId(target_ctx.modules.len() - 1)
        }
    }
}

/// Emit the functions of a single-file IR module that originate at or
/// after `start_elem`, merging them into the target module of the same
/// name. Functions without a source element (inline IR) always
/// qualify; merging is by name, so re-emitting is idempotent.
pub fn perform_codegen_file(
    options: CodegenOptions,
    mir: &MirModule,
    name: &str,
    target_ctx: &mut TargetIrContext,
    start_elem: usize,
) -> TargetModuleId {
    let id = match target_ctx.find(name) {
        Some(id) => id,
        None => {
            target_ctx.modules.push(TargetModule {
                name: name.to_string(),
                optimize: options.optimize,
                globals: Vec::new(),
                functions: Vec::new(),
            });
            TargetModuleId(target_ctx.modules.len() - 1)
        }
    };

    let module = &mut target_ctx.modules[id.0];
    for global in &mir.globals {
        if !module.globals.contains(global) {
            module.globals.push(global.clone());
        }
    }
    for func in &mir.functions {
        if func.source_elem.is_some_and(|elem| elem < start_elem) {
            continue;
        }
        match module.functions.iter_mut().find(|f| f.name == func.name) {
            Some(existing) => *existing = func.clone(),
            None => module.functions.push(func.clone()),
        }
    }
    id
}

fn assemble_module(target: &TargetModule) -> Result<Vec<u8>, CoreError> {
    // Calls to names the module does not define are imported from
    // `env`. First sighting fixes the arity; a later call with a
    // different arity is a codegen error.
    let defined: HashSet<&str> = target.functions.iter().map(|f| f.name.as_str()).collect();
    let mut imports: Vec<(&str, u32)> = Vec::new();
    for func in &target.functions {
        for inst in &func.body {
            let MirInst::Call { callee, args } = inst else {
                continue;
            };
            if defined.contains(callee.as_str()) {
                continue;
            }
            match imports.iter().find(|(name, _)| *name == callee) {
                Some((_, arity)) if arity != args => {
                    return Err(CoreError::Codegen(format!(
                        "imported function `{callee}` called with {args} argument(s), \
                         previously {arity}"
                    )));
                }
                Some(_) => {}
                None => imports.push((callee, *args)),
            }
        }
    }

    // One function type per distinct arity; every value is i32.
    let mut types = TypeSection::new();
    let mut type_index: HashMap<u32, u32> = HashMap::new();
    let mut arities: Vec<u32> = imports.iter().map(|(_, a)| *a).collect();
    arities.extend(target.functions.iter().map(|f| f.param_count));
    for arity in arities {
        if !type_index.contains_key(&arity) {
            let index = types.len();
            types
                .ty()
                .function(vec![ValType::I32; arity as usize], [ValType::I32]);
            type_index.insert(arity, index);
        }
    }

    let mut import_section = ImportSection::new();
    let mut func_index: HashMap<&str, u32> = HashMap::new();
    for (name, arity) in &imports {
        func_index.insert(*name, func_index.len() as u32);
        import_section.import("env", name, EntityType::Function(type_index[arity]));
    }

    let mut functions = FunctionSection::new();
    for func in &target.functions {
        let index = func_index.len() as u32;
        if func_index.insert(func.name.as_str(), index).is_some() {
            return Err(CoreError::Codegen(format!(
                "duplicate function `{}` in target module",
                func.name
            )));
        }
        functions.function(type_index[&func.param_count]);
    }

    let mut global_section = GlobalSection::new();
    let global_index: HashMap<&str, u32> = target
        .globals
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i as u32))
        .collect();
    for _ in &target.globals {
        global_section.global(
            GlobalType {
                val_type: ValType::I32,
                mutable: true,
                shared: false,
            },
            &ConstExpr::i32_const(0),
        );
    }

    let mut exports = ExportSection::new();
    for func in &target.functions {
        let is_entry = func.name == "main" || func.name.starts_with("__top_level_");
        if func.is_public || is_entry {
            exports.export(&func.name, ExportKind::Func, func_index[func.name.as_str()]);
        }
    }

    let mut code = CodeSection::new();
    for func in &target.functions {
        let mut body = Function::new([(func.local_count, ValType::I32)]);
        for inst in &func.body {
            body.instruction(&translate_inst(inst, &func_index, &global_index)?);
        }
        // The declared result is i32; a body that does not end in an
        // explicit return falls through with a zero.
        if !matches!(func.body.last(), Some(MirInst::Ret)) {
            body.instruction(&Instruction::I32Const(0));
            body.instruction(&Instruction::Return);
        }
        body.instruction(&Instruction::End);
        code.function(&body);
    }

    let mut module = Module::new();
    module.section(&types);
    module.section(&import_section);
    module.section(&functions);
    module.section(&global_section);
    module.section(&exports);
    module.section(&code);
    Ok(module.finish())
}

fn translate_inst<'a>(
    inst: &'a MirInst,
    func_index: &HashMap<&str, u32>,
    global_index: &HashMap<&str, u32>,
) -> Result<Instruction<'a>, CoreError> {
    let translated = match inst {
        MirInst::ConstInt(v) => Instruction::I32Const(*v as i32),
        MirInst::ConstBool(v) => Instruction::I32Const(*v as i32),
        // String data has no target representation yet; lowering has
        // already warned about this.
        MirInst::ConstStr(_) => Instruction::I32Const(0),
        MirInst::LocalGet(i) => Instruction::LocalGet(*i),
        MirInst::LocalSet(i) => Instruction::LocalSet(*i),
        MirInst::GlobalGet(name) => Instruction::GlobalGet(lookup_global(global_index, name)?),
        MirInst::GlobalSet(name) => Instruction::GlobalSet(lookup_global(global_index, name)?),
        MirInst::Call { callee, .. } => Instruction::Call(func_index[callee.as_str()]),
        MirInst::Bin(BinOp::Add) => Instruction::I32Add,
        MirInst::Bin(BinOp::Sub) => Instruction::I32Sub,
        MirInst::Bin(BinOp::Mul) => Instruction::I32Mul,
        MirInst::Bin(BinOp::Div) => Instruction::I32DivS,
        MirInst::Bin(BinOp::Eq) => Instruction::I32Eq,
        MirInst::Bin(BinOp::Lt) => Instruction::I32LtS,
        MirInst::Ret => Instruction::Return,
        MirInst::Drop => Instruction::Drop,
    };
    Ok(translated)
}

fn lookup_global(global_index: &HashMap<&str, u32>, name: &str) -> Result<u32, CoreError> {
    global_index
        .get(name)
        .copied()
        .ok_or_else(|| CoreError::Codegen(format!("reference to unknown global `{name}`")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{CompilationContext, SourceUnit};
    use crate::lower::lower_file;
    use crate::name_resolve::{ModuleRegistry, perform_name_binding};
    use crate::parser::{ParseOptions, parse_into_source_unit};
    use crate::span::FileId;
    use crate::typecheck::{TopLevelContext, perform_type_checking};

    fn lowered(source: &str, start_elem: usize) -> MirModule {
        let mut ctx = CompilationContext::new();
        let mut unit = SourceUnit::new(FileId(0), "codegen.opal");
        parse_into_source_unit(&mut ctx, &mut unit, source, ParseOptions::default(), None, None, None);
        perform_name_binding(&mut ctx, &mut unit, &ModuleRegistry::new(), 0);
        let mut tlc = TopLevelContext::new();
        perform_type_checking(&mut ctx, &mut unit, &mut tlc, 0);
        assert!(!ctx.diagnostics.has_errors());
        lower_file(&mut ctx, &unit, start_elem)
    }

    #[test]
    fn assembles_a_validating_module() {
        let mir = lowered("let a = 2\nprint(a + 1)", 0);
        let mut target_ctx = TargetIrContext::new();
        let id = perform_codegen_module(CodegenOptions::default(), &mir, "demo", &mut target_ctx);
        let bytes = target_ctx.assemble(id).expect("assemble");
        wasmparser::validate(&bytes).expect("generated module should validate");
    }

    #[test]
    fn unknown_callees_become_env_imports() {
        let mir = lowered("print(7)", 0);
        let mut target_ctx = TargetIrContext::new();
        let id = perform_codegen_module(CodegenOptions::default(), &mir, "demo", &mut target_ctx);
        let bytes = target_ctx.assemble(id).expect("assemble");

        let mut found = false;
        for payload in wasmparser::Parser::new(0).parse_all(&bytes) {
            if let wasmparser::Payload::ImportSection(reader) = payload.expect("payload") {
                for import in reader {
                    let import = import.expect("import");
                    if import.module == "env" && import.name == "print" {
                        found = true;
                    }
                }
            }
        }
        assert!(found, "print should be imported from env");
    }

    #[test]
    fn file_codegen_merges_later_slices_into_the_same_module() {
        let source = "fn f(x: Int) -> Int { return x + 1 }\nprint(f(1))";
        let first = lowered("fn f(x: Int) -> Int { return x + 1 }", 0);
        let second = lowered(source, 1);

        let mut target_ctx = TargetIrContext::new();
        let id = perform_codegen_file(CodegenOptions::default(), &first, "repl", &mut target_ctx, 0);
        let same = perform_codegen_file(CodegenOptions::default(), &second, "repl", &mut target_ctx, 1);
        assert_eq!(id, same);

        let names: Vec<&str> = target_ctx.module(id).function_names().collect();
        assert_eq!(names, vec!["f", "__top_level_1"]);

        // Re-emitting the same slice replaces by name instead of duplicating.
        perform_codegen_file(CodegenOptions::default(), &second, "repl", &mut target_ctx, 1);
        assert_eq!(target_ctx.module(id).function_names().count(), 2);

        let bytes = target_ctx.assemble(id).expect("assemble");
        wasmparser::validate(&bytes).expect("merged module should validate");
    }

    #[test]
    fn executes_generated_code_with_wasmi() {
        let mir = lowered("pub fn add(a: Int, b: Int) -> Int { return a + b }", 0);
        let mut target_ctx = TargetIrContext::new();
        let id = perform_codegen_module(CodegenOptions::default(), &mir, "demo", &mut target_ctx);
        let bytes = target_ctx.assemble(id).expect("assemble");

        let engine = wasmi::Engine::default();
        let module = wasmi::Module::new(&engine, &bytes).expect("module");
        let linker = wasmi::Linker::new(&engine);
        let mut store = wasmi::Store::new(&engine, ());
        let instance = linker
            .instantiate_and_start(&mut store, &module)
            .expect("instantiate");
        let add = instance
            .get_typed_func::<(i32, i32), i32>(&store, "add")
            .expect("typed func");
        assert_eq!(add.call(&mut store, (4, 7)).expect("execute"), 11);
    }

    #[test]
    fn inconsistent_import_arity_is_a_codegen_error() {
        let mut mir = MirModule::new("bad");
        mir.functions.push(MirFunction {
            name: "main".to_string(),
            param_count: 0,
            local_count: 0,
            body: vec![
                MirInst::ConstInt(1),
                MirInst::Call {
                    callee: "host".to_string(),
                    args: 1,
                },
                MirInst::Drop,
                MirInst::Call {
                    callee: "host".to_string(),
                    args: 0,
                },
                MirInst::Ret,
            ],
            is_public: true,
            source_elem: None,
        });
        let mut target_ctx = TargetIrContext::new();
        let id = perform_codegen_module(CodegenOptions::default(), &mir, "bad", &mut target_ctx);
        let err = target_ctx.assemble(id).unwrap_err();
        assert!(matches!(err, CoreError::Codegen(_)));
    }
}
