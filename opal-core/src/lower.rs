//! Lowering from the checked AST to the mid-level IR.
//!
//! Two entry points mirror the two compilation shapes: [`lower_module`]
//! lowers every unit of a module into one IR module, and [`lower_file`]
//! lowers a single unit from a start offset, tagging each emitted
//! function with its source element index so incremental code
//! generation can honor its own offset later.
//!
//! Lowering is deterministic: identical input produces an identical
//! instruction sequence, which the pipeline tests rely on.

use crate::ast::{Expr, ExprKind, FnBody, FnDecl, ItemKind, LetDecl, Stmt};
use crate::context::{CompilationContext, Module, SourceUnit};
use crate::diagnostic::Diagnostic;
use crate::intern::Symbol;
use crate::mir::{BinOp, MirFunction, MirInst, MirModule};

/// Lower every unit of a module. The synthesized entry function is
/// always named `main`.
pub fn lower_module(ctx: &mut CompilationContext, module: &Module) -> MirModule {
    let mut out = MirModule::new(module.name.clone());
    let mut entry = Vec::new();
    for unit in &module.units {
        lower_unit(ctx, unit, 0, &mut out, &mut entry);
    }
    finish_entry(&mut out, entry, "main", 0);
    out
}

/// Lower one unit from `start_elem` to its current end. With a zero
/// offset the entry function is `main`; with a nonzero offset it gets a
/// per-slice name so successive slices never collide when merged into
/// one target module.
pub fn lower_file(ctx: &mut CompilationContext, unit: &SourceUnit, start_elem: usize) -> MirModule {
    let mut out = MirModule::new(unit.name.clone());
    let mut entry = Vec::new();
    lower_unit(ctx, unit, start_elem, &mut out, &mut entry);
    let entry_name = if start_elem == 0 {
        "main".to_string()
    } else {
        format!("__top_level_{start_elem}")
    };
    finish_entry(&mut out, entry, &entry_name, start_elem);
    out
}

fn lower_unit(
    ctx: &mut CompilationContext,
    unit: &SourceUnit,
    start_elem: usize,
    out: &mut MirModule,
    entry: &mut Vec<MirInst>,
) {
    for (index, item) in unit.items.iter().enumerate().skip(start_elem) {
        match &item.kind {
            ItemKind::Let(decl) => {
                let name = ctx.interner.resolve(decl.name).to_string();
                out.globals.push(name.clone());
                let mut body = FnLowering::new(ctx, Vec::new());
                body.expr(&decl.value);
                entry.extend(body.insts);
                entry.push(MirInst::GlobalSet(name));
            }
            ItemKind::Fn(decl) => {
                if let Some(func) = lower_fn(ctx, decl, index) {
                    out.functions.push(func);
                }
            }
            ItemKind::Stmt(stmt) => {
                let mut body = FnLowering::new(ctx, Vec::new());
                body.stmt(stmt, false);
                entry.extend(body.insts);
            }
            ItemKind::Import(_) | ItemKind::Operator(_) => {}
            // Inline IR functions were emitted into their linked module
            // while parsing; nothing is left to lower here.
            ItemKind::MirFn(_) => {}
        }
    }
}

fn finish_entry(out: &mut MirModule, mut entry: Vec<MirInst>, name: &str, start_elem: usize) {
    if entry.is_empty() {
        return;
    }
    entry.push(MirInst::ConstInt(0));
    entry.push(MirInst::Ret);
    let local_count = max_local(&entry);
    out.functions.push(MirFunction {
        name: name.to_string(),
        param_count: 0,
        local_count,
        body: entry,
        is_public: true,
        source_elem: Some(start_elem),
    });
}

fn max_local(insts: &[MirInst]) -> u32 {
    insts
        .iter()
        .filter_map(|inst| match inst {
            MirInst::LocalGet(i) | MirInst::LocalSet(i) => Some(i + 1),
            _ => None,
        })
        .max()
        .unwrap_or(0)
}

fn lower_fn(ctx: &mut CompilationContext, decl: &FnDecl, index: usize) -> Option<MirFunction> {
    // Deferred bodies reaching lowering mean the caller never completed
    // delayed parsing; the verifier has a check for that. Skip quietly.
    let FnBody::Parsed(stmts) = &decl.body else {
        return None;
    };
    let params: Vec<Symbol> = decl.params.iter().map(|p| p.name).collect();
    let param_count = params.len() as u32;
    let name = ctx.interner.resolve(decl.name).to_string();
    let mut body = FnLowering::new(ctx, params);
    for (pos, stmt) in stmts.iter().enumerate() {
        body.stmt(stmt, pos + 1 == stmts.len());
    }
    if !matches!(body.insts.last(), Some(MirInst::Ret)) {
        body.insts.push(MirInst::ConstInt(0));
        body.insts.push(MirInst::Ret);
    }
    let local_count = max_local(&body.insts).saturating_sub(param_count);
    Some(MirFunction {
        name,
        param_count,
        local_count,
        body: body.insts,
        is_public: decl.is_public,
        source_elem: Some(index),
    })
}

/// Per-body lowering state: the growing instruction list and a linear
/// scope mapping names to local slots (parameters occupy the first
/// slots).
struct FnLowering<'a> {
    ctx: &'a mut CompilationContext,
    locals: Vec<Symbol>,
    insts: Vec<MirInst>,
}

impl<'a> FnLowering<'a> {
    fn new(ctx: &'a mut CompilationContext, params: Vec<Symbol>) -> FnLowering<'a> {
        FnLowering {
            ctx,
            locals: params,
            insts: Vec::new(),
        }
    }

    fn local(&self, name: Symbol) -> Option<u32> {
        self.locals
            .iter()
            .rposition(|n| *n == name)
            .map(|i| i as u32)
    }

    fn stmt(&mut self, stmt: &Stmt, is_last: bool) {
        match stmt {
            Stmt::Expr(expr) => {
                self.expr(expr);
                // The trailing expression of a body is its return value.
                if is_last {
                    self.insts.push(MirInst::Ret);
                } else {
                    self.insts.push(MirInst::Drop);
                }
            }
            Stmt::Assign { target, value, .. } => {
                self.expr(value);
                match self.local(*target) {
                    Some(slot) => self.insts.push(MirInst::LocalSet(slot)),
                    None => {
                        let name = self.ctx.interner.resolve(*target).to_string();
                        self.insts.push(MirInst::GlobalSet(name));
                    }
                }
            }
            Stmt::Let(LetDecl { name, value, .. }) => {
                self.expr(value);
                self.locals.push(*name);
                let slot = (self.locals.len() - 1) as u32;
                self.insts.push(MirInst::LocalSet(slot));
            }
            Stmt::Return { value, .. } => {
                match value {
                    Some(expr) => self.expr(expr),
                    None => self.insts.push(MirInst::ConstInt(0)),
                }
                self.insts.push(MirInst::Ret);
            }
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match &expr.kind {
            ExprKind::Int(v) => self.insts.push(MirInst::ConstInt(*v)),
            ExprKind::Bool(v) => self.insts.push(MirInst::ConstBool(*v)),
            ExprKind::Str(s) => {
                self.ctx.diagnostics.push(
                    Diagnostic::warning(
                        "string values cannot be represented in generated code yet; \
                         lowering a placeholder",
                        expr.span,
                    )
                    .with_code("W0201"),
                );
                self.insts.push(MirInst::ConstStr(s.clone()));
            }
            ExprKind::Ident(name) => match self.local(*name) {
                Some(slot) => self.insts.push(MirInst::LocalGet(slot)),
                None => {
                    let text = self.ctx.interner.resolve(*name).to_string();
                    self.insts.push(MirInst::GlobalGet(text));
                }
            },
            ExprKind::Call { callee, args } => {
                for arg in args {
                    self.expr(arg);
                }
                self.insts.push(MirInst::Call {
                    callee: self.ctx.interner.resolve(*callee).to_string(),
                    args: args.len() as u32,
                });
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.expr(lhs);
                self.expr(rhs);
                let spelling = self.ctx.interner.resolve(*op);
                let builtin = match spelling {
                    "+" => Some(BinOp::Add),
                    "-" => Some(BinOp::Sub),
                    "*" => Some(BinOp::Mul),
                    "/" => Some(BinOp::Div),
                    "==" => Some(BinOp::Eq),
                    "<" => Some(BinOp::Lt),
                    _ => None,
                };
                match builtin {
                    Some(op) => self.insts.push(MirInst::Bin(op)),
                    // Declared operators are calls to a like-named
                    // function, typically supplied as inline IR.
                    None => self.insts.push(MirInst::Call {
                        callee: spelling.to_string(),
                        args: 2,
                    }),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name_resolve::{ModuleRegistry, perform_name_binding};
    use crate::parser::{ParseOptions, parse_into_source_unit};
    use crate::span::FileId;
    use crate::typecheck::{TopLevelContext, perform_type_checking};

    fn checked(source: &str) -> (CompilationContext, SourceUnit) {
        let mut ctx = CompilationContext::new();
        let mut unit = SourceUnit::new(FileId(0), "lower.opal");
        parse_into_source_unit(&mut ctx, &mut unit, source, ParseOptions::default(), None, None, None);
        perform_name_binding(&mut ctx, &mut unit, &ModuleRegistry::new(), 0);
        let mut tlc = TopLevelContext::new();
        perform_type_checking(&mut ctx, &mut unit, &mut tlc, 0);
        assert!(!ctx.diagnostics.has_errors());
        (ctx, unit)
    }

    #[test]
    fn top_level_lets_become_globals_initialized_by_the_entry() {
        let (mut ctx, unit) = checked("let a = 2\nprint(a * 3)");
        let mir = lower_file(&mut ctx, &unit, 0);
        assert_eq!(mir.globals, vec!["a".to_string()]);
        let main = mir.function("main").expect("entry function");
        assert!(main.is_public);
        assert!(main.body.contains(&MirInst::GlobalSet("a".to_string())));
        assert!(main.body.contains(&MirInst::Call {
            callee: "print".to_string(),
            args: 1,
        }));
    }

    #[test]
    fn nonzero_offsets_get_a_distinct_entry_name() {
        let (mut ctx, unit) = checked("let a = 1\nprint(a)");
        let mir = lower_file(&mut ctx, &unit, 1);
        assert!(mir.function("main").is_none());
        let entry = mir.function("__top_level_1").expect("slice entry");
        assert_eq!(entry.source_elem, Some(1));
        assert!(mir.globals.is_empty(), "element 0 is below the offset");
    }

    #[test]
    fn function_bodies_use_locals_and_implicit_returns() {
        let (mut ctx, unit) = checked("fn f(x: Int) -> Int { let y = x + 1\ny * 2 }");
        let mir = lower_file(&mut ctx, &unit, 0);
        let f = mir.function("f").expect("f");
        assert_eq!(f.param_count, 1);
        assert_eq!(f.local_count, 1);
        assert_eq!(f.body.last(), Some(&MirInst::Ret));
        assert!(f.body.contains(&MirInst::LocalSet(1)));
    }

    #[test]
    fn declared_operators_lower_to_calls() {
        let mut ctx = CompilationContext::new();
        let custom = ctx.interner.intern("<+>");
        ctx.operators.register(custom, 55);
        let mut unit = SourceUnit::new(FileId(0), "ops.opal");
        parse_into_source_unit(
            &mut ctx,
            &mut unit,
            "fn g(a: Int, b: Int) -> Int { a <+> b }",
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
        let g = mir.function("g").expect("g");
        assert!(g.body.contains(&MirInst::Call {
            callee: "<+>".to_string(),
            args: 2,
        }));
    }

    #[test]
    fn lowering_is_deterministic() {
        let source = "let a = 1\nfn f(x: Int) -> Int { return x + a }\nprint(f(2))";
        let (mut ctx1, unit1) = checked(source);
        let (mut ctx2, unit2) = checked(source);
        let first = lower_file(&mut ctx1, &unit1, 0);
        let second = lower_file(&mut ctx2, &unit2, 0);
        assert_eq!(first, second);
    }

    #[test]
    fn string_literals_warn_and_lower_to_placeholders() {
        let (mut ctx, unit) = checked("let s = \"hi\"");
        let mir = lower_file(&mut ctx, &unit, 0);
        assert_eq!(ctx.diagnostics.len(), 1);
        assert!(!ctx.diagnostics.has_errors());
        let main = mir.function("main").expect("entry");
        assert!(main.body.contains(&MirInst::ConstStr("hi".to_string())));
    }
}
