//! Top-level name binding.
//!
//! Once parsing has appended elements, this stage resolves imports
//! against the module registry, records operator declarations in the
//! session table (so later elements parse correctly), and binds
//! top-level names. It is re-invocable with a growing start offset as
//! more elements are appended; elements below the unit's binding
//! cursor are never reprocessed, which makes repeated invocation with
//! the same offset idempotent.

use std::collections::HashMap;

use crate::ast::ItemKind;
use crate::context::{CompilationContext, SourceUnit};
use crate::diagnostic::Diagnostic;
use crate::serialize::ModuleArtifact;

/// The modules visible to `import` declarations, keyed by link name.
/// Typically populated from previously serialized artifacts.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, ModuleArtifact>,
}

impl ModuleRegistry {
    pub fn new() -> ModuleRegistry {
        ModuleRegistry::default()
    }

    pub fn register(&mut self, artifact: ModuleArtifact) {
        self.modules.insert(artifact.link_name.clone(), artifact);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&ModuleArtifact> {
        self.modules.get(name)
    }
}

/// Resolve imports, record operators, and bind top-level names for all
/// elements from `start_elem` to the current end of the unit.
pub fn perform_name_binding(
    ctx: &mut CompilationContext,
    unit: &mut SourceUnit,
    registry: &ModuleRegistry,
    start_elem: usize,
) {
    let start = start_elem.max(unit.bound_elements);
    for index in start..unit.items.len() {
        let span = unit.items[index].span;
        match &mut unit.items[index].kind {
            ItemKind::Import(import) => {
                let name = ctx.interner.resolve(import.module);
                if registry.contains(name) {
                    import.resolved = true;
                } else {
                    let message = format!("unresolved import `{name}`");
                    ctx.diagnostics
                        .push(Diagnostic::error(message, span).with_code("E0101"));
                }
            }
            ItemKind::Operator(decl) => {
                if let Some(previous) = ctx.operators.register(decl.symbol, decl.precedence) {
                    if previous != decl.precedence {
                        let name = ctx.interner.resolve(decl.symbol);
                        let message = format!(
                            "operator `{name}` redeclared with precedence {} (was {previous})",
                            decl.precedence
                        );
                        ctx.diagnostics
                            .push(Diagnostic::warning(message, span).with_code("E0102"));
                    }
                }
            }
            ItemKind::Let(_) | ItemKind::Fn(_) | ItemKind::MirFn(_) | ItemKind::Stmt(_) => {}
        }

        if let Some(name) = unit.items[index].kind.name() {
            if let Some((_, first)) = unit.bindings.iter().find(|(sym, _)| *sym == name) {
                let first_span = unit.items[*first].span;
                let text = ctx.interner.resolve(name);
                let message = format!("duplicate definition of `{text}`");
                ctx.diagnostics.push(
                    Diagnostic::error(message, span)
                        .with_code("E0103")
                        .with_secondary_label(first_span, Some("first defined here".to_string())),
                );
            } else {
                unit.bindings.push((name, index));
            }
        }
    }
    unit.bound_elements = unit.items.len();
}
