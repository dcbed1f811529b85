//! Structural invariant verification.
//!
//! These checks hold for every well-formed source unit regardless of
//! what the user wrote; a violation is a compiler bug, never reachable
//! from user input. On violation a structural diagnostic is appended
//! to the sink (so embedders watching it see what happened) and the
//! process panics. Drivers run [`verify_unit`] between pipeline stages;
//! [`verify_item`] checks a single element.

use crate::ast::{Expr, ExprKind, FnBody, ItemKind, Stmt};
use crate::context::{CompilationContext, SourceUnit};
use crate::diagnostic::Diagnostic;
use crate::intern::Symbol;
use crate::span::Span;

/// Verify the whole unit: cursor ordering, binding indices, and every
/// element.
pub fn verify_unit(ctx: &mut CompilationContext, unit: &SourceUnit) {
    if unit.bound_elements > unit.items.len() {
        fail(ctx, Span::dummy(), "binding cursor points past the end of the unit");
    }
    if unit.checked_elements > unit.items.len() {
        fail(ctx, Span::dummy(), "checking cursor points past the end of the unit");
    }
    if unit.checked_elements > unit.bound_elements {
        fail(ctx, Span::dummy(), "elements were checked before being bound");
    }
    for (_, index) in &unit.bindings {
        if *index >= unit.items.len() {
            fail(ctx, Span::dummy(), "binding refers to a nonexistent element");
        }
    }
    for index in 0..unit.items.len() {
        verify_item(ctx, unit, index);
    }
}

/// Verify one element of the unit.
pub fn verify_item(ctx: &mut CompilationContext, unit: &SourceUnit, index: usize) {
    let Some(item) = unit.items.get(index) else {
        fail(ctx, Span::dummy(), "element index out of bounds");
    };
    let span = item.span;
    if span.file_id != unit.file_id && span != Span::dummy() {
        fail(ctx, span, "element span belongs to a different file");
    }
    if span.start > span.end {
        fail(ctx, span, "inverted element span");
    }

    let mut symbols = Vec::new();
    collect_item_symbols(&item.kind, &mut symbols);
    for sym in symbols {
        if !ctx.interner.is_valid(sym) {
            fail(ctx, span, "element refers to a symbol outside the session interner");
        }
    }

    // Once the checking cursor has passed an element, its type slots
    // must be filled. Only enforceable on clean runs: failed checking
    // legitimately leaves them empty.
    if index < unit.checked_elements && !ctx.diagnostics.has_errors() {
        match &item.kind {
            ItemKind::Let(decl) if decl.ty.is_none() => {
                fail(ctx, span, "checked binding has no resolved type");
            }
            ItemKind::Fn(decl) => {
                if decl.sig.is_none() {
                    fail(ctx, span, "checked function has no resolved signature");
                }
                if matches!(decl.body, FnBody::Deferred { .. }) {
                    fail(ctx, span, "checked function still has a deferred body");
                }
            }
            _ => {}
        }
    }
}

fn fail(ctx: &mut CompilationContext, span: Span, message: &str) -> ! {
    ctx.diagnostics
        .push(Diagnostic::error(format!("structural invariant violated: {message}"), span)
            .with_code("E0900"));
    panic!("structural invariant violated: {message}");
}

fn collect_item_symbols(kind: &ItemKind, out: &mut Vec<Symbol>) {
    match kind {
        ItemKind::Import(decl) => out.push(decl.module),
        ItemKind::Operator(decl) => out.push(decl.symbol),
        ItemKind::Let(decl) => {
            out.push(decl.name);
            if let Some(repr) = &decl.annotation {
                out.push(repr.name);
            }
            collect_expr_symbols(&decl.value, out);
        }
        ItemKind::Fn(decl) => {
            out.push(decl.name);
            if let Some(generics) = &decl.generics {
                for param in &generics.params {
                    out.push(param.name);
                    if let Some(repr) = &param.constraint {
                        out.push(repr.name);
                    }
                }
            }
            for param in &decl.params {
                out.push(param.name);
                out.push(param.annotation.name);
            }
            if let Some(repr) = &decl.ret {
                out.push(repr.name);
            }
            if let FnBody::Parsed(stmts) = &decl.body {
                for stmt in stmts {
                    collect_stmt_symbols(stmt, out);
                }
            }
        }
        ItemKind::Stmt(stmt) => collect_stmt_symbols(stmt, out),
        ItemKind::MirFn(name) => out.push(*name),
    }
}

fn collect_stmt_symbols(stmt: &Stmt, out: &mut Vec<Symbol>) {
    match stmt {
        Stmt::Expr(expr) => collect_expr_symbols(expr, out),
        Stmt::Assign { target, value, .. } => {
            out.push(*target);
            collect_expr_symbols(value, out);
        }
        Stmt::Let(decl) => {
            out.push(decl.name);
            if let Some(repr) = &decl.annotation {
                out.push(repr.name);
            }
            collect_expr_symbols(&decl.value, out);
        }
        Stmt::Return { value, .. } => {
            if let Some(expr) = value {
                collect_expr_symbols(expr, out);
            }
        }
    }
}

fn collect_expr_symbols(expr: &Expr, out: &mut Vec<Symbol>) {
    match &expr.kind {
        ExprKind::Int(_) | ExprKind::Bool(_) | ExprKind::Str(_) => {}
        ExprKind::Ident(name) => out.push(*name),
        ExprKind::Call { callee, args } => {
            out.push(*callee);
            for arg in args {
                collect_expr_symbols(arg, out);
            }
        }
        ExprKind::Binary { op, lhs, rhs } => {
            out.push(*op);
            collect_expr_symbols(lhs, out);
            collect_expr_symbols(rhs, out);
        }
    }
}
