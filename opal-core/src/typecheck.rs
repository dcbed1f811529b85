//! Type checking over a (possibly partial) source unit.
//!
//! [`perform_type_checking`] is offset-threaded like name binding: it
//! checks elements from the start offset to the current end, never
//! reprocesses elements below the unit's checking cursor, and records
//! resolved types on the declarations themselves. Before checking
//! bodies it pre-scans the whole unit's declared signatures into the
//! accumulating [`TopLevelContext`], so forward and backward
//! references within one file resolve no matter how the caller slices
//! its invocations.
//!
//! Two narrow entrypoints serve callers holding only partial context
//! (inline-IR annotations, code completion): [`resolve_type_repr`] and
//! [`resolve_generic_params`]. Both report failure as an absent or
//! false result instead of aborting, and the former can suppress
//! diagnostics for speculative probing.

use std::collections::HashMap;

use crate::ast::{Expr, ExprKind, FnBody, FnDecl, GenericParamList, ItemKind, LetDecl, Stmt, TypeRepr};
use crate::context::{CompilationContext, SourceUnit};
use crate::diagnostic::Diagnostic;
use crate::intern::Symbol;
use crate::span::Span;
use crate::types::{FnSig, Type};

/// Accumulating top-level symbol table, shared across incremental
/// invocations so later slices see what earlier slices bound.
#[derive(Debug, Default)]
pub struct TopLevelContext {
    values: HashMap<Symbol, Type>,
    functions: HashMap<Symbol, FnSig>,
}

impl TopLevelContext {
    pub fn new() -> TopLevelContext {
        TopLevelContext::default()
    }

    pub fn value(&self, name: Symbol) -> Option<Type> {
        self.values.get(&name).copied()
    }

    pub fn function(&self, name: Symbol) -> Option<&FnSig> {
        self.functions.get(&name)
    }
}

/// Resolve types and diagnose problems for all elements from
/// `start_elem` to the current end of the unit.
pub fn perform_type_checking(
    ctx: &mut CompilationContext,
    unit: &mut SourceUnit,
    tlc: &mut TopLevelContext,
    start_elem: usize,
) {
    let start = start_elem.max(unit.checked_elements);

    // Signature pre-scan over the whole unit: declared signatures are
    // visible to every body regardless of invocation slicing.
    for item in &unit.items {
        match &item.kind {
            ItemKind::Fn(decl) => {
                if let Some(sig) = resolve_signature(ctx, decl, false) {
                    tlc.functions.insert(decl.name, sig);
                }
            }
            ItemKind::Let(decl) => {
                if let Some(repr) = &decl.annotation {
                    if let Some(ty) = resolve_type_repr(ctx, repr, false) {
                        tlc.values.insert(decl.name, ty);
                    }
                }
            }
            _ => {}
        }
    }

    let mut checker = TypeChecker { ctx, tlc };
    for index in start..unit.items.len() {
        match &mut unit.items[index].kind {
            ItemKind::Let(decl) => checker.check_top_level_let(decl),
            ItemKind::Fn(decl) => checker.check_fn(decl),
            ItemKind::Stmt(stmt) => {
                let mut env = TypeEnv::new();
                checker.check_stmt(stmt, &mut env, Type::Unit);
            }
            ItemKind::Import(_) | ItemKind::Operator(_) | ItemKind::MirFn(_) => {}
        }
    }
    unit.checked_elements = unit.items.len();
}

/// Resolve a single written type reference with only partial context.
///
/// Returns `None` on failure; with `produce_diagnostics` false nothing
/// reaches the sink, so callers can probe speculatively.
pub fn resolve_type_repr(
    ctx: &mut CompilationContext,
    repr: &TypeRepr,
    produce_diagnostics: bool,
) -> Option<Type> {
    let name = ctx.interner.resolve(repr.name);
    match Type::from_name(name) {
        Some(ty) => Some(ty),
        None => {
            if produce_diagnostics {
                let message = format!("unknown type name `{name}`");
                ctx.diagnostics
                    .push(Diagnostic::error(message, repr.span).with_code("E0105"));
            }
            None
        }
    }
}

/// Decides whether a generic parameter satisfies a constraint.
/// Implementations live outside the pipeline.
pub trait ConstraintSolver {
    fn satisfy(&mut self, param: &str, constraint: Type) -> bool;
}

/// Accepts every constraint. Enough for callers that only need the
/// parameter list walked and resolved.
pub struct TrivialSolver;

impl ConstraintSolver for TrivialSolver {
    fn satisfy(&mut self, _param: &str, _constraint: Type) -> bool {
        true
    }
}

/// Resolve a generic parameter list outside the main checking pass,
/// delegating constraint decisions to the supplied solver. Returns
/// false if any constraint fails to resolve or satisfy; emits no
/// diagnostics since callers may be probing.
pub fn resolve_generic_params(
    ctx: &mut CompilationContext,
    list: &GenericParamList,
    solver: &mut dyn ConstraintSolver,
) -> bool {
    let mut ok = true;
    for param in &list.params {
        let Some(repr) = &param.constraint else {
            continue;
        };
        match resolve_type_repr(ctx, repr, false) {
            Some(ty) => {
                let name = ctx.interner.resolve(param.name).to_string();
                if !solver.satisfy(&name, ty) {
                    ok = false;
                }
            }
            None => ok = false,
        }
    }
    ok
}

fn resolve_signature(
    ctx: &mut CompilationContext,
    decl: &FnDecl,
    produce_diagnostics: bool,
) -> Option<FnSig> {
    let mut params = Vec::with_capacity(decl.params.len());
    for param in &decl.params {
        params.push(resolve_type_repr(ctx, &param.annotation, produce_diagnostics)?);
    }
    let ret = match &decl.ret {
        Some(repr) => resolve_type_repr(ctx, repr, produce_diagnostics)?,
        None => Type::Unit,
    };
    Some(FnSig { params, ret })
}

/// Local scope for function bodies and top-level statements. Linear,
/// searched newest-first so shadowing works.
#[derive(Debug, Default)]
struct TypeEnv {
    entries: Vec<(Symbol, Type)>,
}

impl TypeEnv {
    fn new() -> TypeEnv {
        TypeEnv::default()
    }

    fn insert(&mut self, name: Symbol, ty: Type) {
        self.entries.push((name, ty));
    }

    fn lookup(&self, name: Symbol) -> Option<Type> {
        self.entries
            .iter()
            .rev()
            .find_map(|(n, t)| if *n == name { Some(*t) } else { None })
    }
}

struct TypeChecker<'ctx, 'tlc> {
    ctx: &'ctx mut CompilationContext,
    tlc: &'tlc mut TopLevelContext,
}

impl TypeChecker<'_, '_> {
    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.ctx
            .diagnostics
            .push(Diagnostic::error(message, span).with_code("E0104"));
    }

    fn check_top_level_let(&mut self, decl: &mut LetDecl) {
        let value_ty = self.check_expr(&decl.value, &TypeEnv::new());
        let ty = self.apply_annotation(decl.annotation.as_ref(), value_ty, decl.value.span);
        decl.ty = Some(ty);
        self.tlc.values.insert(decl.name, ty);
    }

    fn apply_annotation(
        &mut self,
        annotation: Option<&TypeRepr>,
        value_ty: Option<Type>,
        value_span: Span,
    ) -> Type {
        match annotation {
            Some(repr) => {
                let declared = resolve_type_repr(self.ctx, repr, true);
                if let (Some(declared), Some(actual)) = (declared, value_ty) {
                    if declared != actual {
                        let message =
                            format!("expected `{declared}`, found `{actual}`");
                        self.error(value_span, message);
                    }
                }
                declared.or(value_ty).unwrap_or(Type::Unit)
            }
            None => value_ty.unwrap_or(Type::Unit),
        }
    }

    fn check_fn(&mut self, decl: &mut FnDecl) {
        if let Some(generics) = &decl.generics {
            // Constraints outside the main pass are the narrow
            // entrypoint's business; here we only confirm they resolve.
            if !resolve_generic_params(self.ctx, generics, &mut TrivialSolver) {
                self.error(generics.span, "unresolvable generic parameter constraint");
            }
        }

        let Some(sig) = resolve_signature(self.ctx, decl, true) else {
            return;
        };
        decl.sig = Some(sig.clone());
        self.tlc.functions.insert(decl.name, sig.clone());

        let FnBody::Parsed(stmts) = &decl.body else {
            // A still-deferred body is legal here; it is checked once
            // delayed parsing completes it and the caller re-invokes.
            return;
        };

        let mut env = TypeEnv::new();
        for (param, ty) in decl.params.iter().zip(sig.params.iter()) {
            env.insert(param.name, *ty);
        }
        for stmt in stmts {
            self.check_stmt(stmt, &mut env, sig.ret);
        }
    }

    fn check_stmt(&mut self, stmt: &Stmt, env: &mut TypeEnv, ret: Type) {
        match stmt {
            Stmt::Expr(expr) => {
                self.check_expr(expr, env);
            }
            Stmt::Assign {
                target,
                value,
                span,
            } => {
                let target_ty = env.lookup(*target).or_else(|| self.tlc.value(*target));
                let value_ty = self.check_expr(value, env);
                match target_ty {
                    Some(expected) => {
                        if let Some(actual) = value_ty {
                            if expected != actual {
                                let message = format!(
                                    "cannot assign `{actual}` to a binding of type `{expected}`"
                                );
                                self.error(value.span, message);
                            }
                        }
                    }
                    None => {
                        let name = self.ctx.interner.resolve(*target).to_string();
                        self.error(*span, format!("assignment to undefined binding `{name}`"));
                    }
                }
            }
            Stmt::Let(decl) => {
                let value_ty = self.check_expr(&decl.value, env);
                let ty = self.apply_annotation(decl.annotation.as_ref(), value_ty, decl.value.span);
                env.insert(decl.name, ty);
            }
            Stmt::Return { value, span } => {
                let value_ty = match value {
                    Some(expr) => self.check_expr(expr, env),
                    None => Some(Type::Unit),
                };
                if let Some(actual) = value_ty {
                    if actual != ret {
                        let message =
                            format!("return type mismatch: expected `{ret}`, found `{actual}`");
                        self.error(*span, message);
                    }
                }
            }
        }
    }

    /// Returns `None` when the expression failed to check; the failure
    /// was already diagnosed, and callers skip follow-on comparisons to
    /// avoid cascading errors.
    fn check_expr(&mut self, expr: &Expr, env: &TypeEnv) -> Option<Type> {
        match &expr.kind {
            ExprKind::Int(_) => Some(Type::Int),
            ExprKind::Bool(_) => Some(Type::Bool),
            ExprKind::Str(_) => Some(Type::Str),
            ExprKind::Ident(name) => {
                if let Some(ty) = env.lookup(*name).or_else(|| self.tlc.value(*name)) {
                    return Some(ty);
                }
                let text = self.ctx.interner.resolve(*name).to_string();
                self.error(expr.span, format!("unresolved identifier `{text}`"));
                None
            }
            ExprKind::Call { callee, args } => {
                let sig = self
                    .tlc
                    .function(*callee)
                    .cloned()
                    .or_else(|| self.ctx.builtins.get(callee).cloned());
                let Some(sig) = sig else {
                    let text = self.ctx.interner.resolve(*callee).to_string();
                    self.error(expr.span, format!("unresolved function `{text}`"));
                    return None;
                };
                if args.len() != sig.params.len() {
                    let message = format!(
                        "expected {} argument(s), found {}",
                        sig.params.len(),
                        args.len()
                    );
                    self.error(expr.span, message);
                }
                for (arg, expected) in args.iter().zip(sig.params.iter()) {
                    if let Some(actual) = self.check_expr(arg, env) {
                        if actual != *expected {
                            let message =
                                format!("expected `{expected}`, found `{actual}`");
                            self.error(arg.span, message);
                        }
                    }
                }
                Some(sig.ret)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                for side in [lhs.as_ref(), rhs.as_ref()] {
                    if let Some(actual) = self.check_expr(side, env) {
                        if actual != Type::Int {
                            let message =
                                format!("operator operands must be `Int`, found `{actual}`");
                            self.error(side.span, message);
                        }
                    }
                }
                let spelling = self.ctx.interner.resolve(*op);
                if matches!(spelling, "==" | "<") {
                    Some(Type::Bool)
                } else {
                    Some(Type::Int)
                }
            }
        }
    }
}
