//! Logging instrumentation for interactive execution.
//!
//! Rewrites a fully name-bound unit in place so that every top-level
//! expression statement reports its value through the `log` builtin.
//! Interactive front ends run this between name binding and type
//! checking; batch compilation skips it.

use crate::ast::{Expr, ExprKind, ItemKind, Stmt};
use crate::context::{CompilationContext, SourceUnit};

/// Wrap top-level expression statements in `log(...)` calls.
/// Statements already logging are left alone, so the rewrite is
/// idempotent.
pub fn perform_instrumentation(ctx: &mut CompilationContext, unit: &mut SourceUnit) {
    let log = ctx.interner.intern("log");
    for item in &mut unit.items {
        let ItemKind::Stmt(Stmt::Expr(expr)) = &mut item.kind else {
            continue;
        };
        if let ExprKind::Call { callee, .. } = &expr.kind {
            if *callee == log {
                continue;
            }
        }
        let span = expr.span;
        let inner = std::mem::replace(
            expr,
            Expr {
                kind: ExprKind::Int(0),
                span,
            },
        );
        *expr = Expr {
            kind: ExprKind::Call {
                callee: log,
                args: vec![inner],
            },
            span,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{ParseOptions, parse_into_source_unit};
    use crate::span::FileId;

    #[test]
    fn wraps_expression_statements_exactly_once() {
        let mut ctx = CompilationContext::new();
        let mut unit = SourceUnit::new(FileId(0), "repl.opal");
        parse_into_source_unit(
            &mut ctx,
            &mut unit,
            "let a = 1\nprint(a)\n1 + 2",
            ParseOptions::default(),
            None,
            None,
            None,
        );

        perform_instrumentation(&mut ctx, &mut unit);
        perform_instrumentation(&mut ctx, &mut unit);

        let log = ctx.interner.intern("log");
        let wrapped: Vec<bool> = unit
            .items
            .iter()
            .filter_map(|item| match &item.kind {
                ItemKind::Stmt(Stmt::Expr(expr)) => match &expr.kind {
                    ExprKind::Call { callee, args } => Some(*callee == log && args.len() == 1),
                    _ => Some(false),
                },
                _ => None,
            })
            .collect();
        assert_eq!(wrapped, vec![true, true]);
    }
}
