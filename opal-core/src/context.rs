//! Session state: the compilation context and per-file source units.
//!
//! The [`CompilationContext`] is the single long-lived shared object of
//! a session. It owns everything interned (identifiers), the operator
//! precedence table, the builtin signature table, and the append-only
//! diagnostic sink. It is created once per compilation invocation and
//! dropped as a whole when the session ends; nothing parsed out of a
//! buffer outlives it in a meaningful way since all names point into
//! its interner.

use std::collections::HashMap;

use crate::ast::Item;
use crate::diagnostic::DiagnosticSink;
use crate::intern::{Interner, Symbol};
use crate::span::FileId;
use crate::types::{FnSig, Type};

/// Infix operator precedences for the session.
///
/// Builtin operators are preregistered; `operator` declarations add to
/// the table during name binding, which is why an operator only parses
/// in elements processed after the binding pass that registered it.
#[derive(Debug, Default)]
pub struct OperatorTable {
    entries: HashMap<Symbol, u8>,
}

impl OperatorTable {
    /// Register an operator. Re-registering with the same precedence is
    /// a no-op; callers diagnose conflicting precedences themselves.
    pub fn register(&mut self, symbol: Symbol, precedence: u8) -> Option<u8> {
        self.entries.insert(symbol, precedence)
    }

    pub fn precedence(&self, symbol: Symbol) -> Option<u8> {
        self.entries.get(&symbol).copied()
    }
}

/// Session-wide compilation state.
#[derive(Debug)]
pub struct CompilationContext {
    pub interner: Interner,
    pub operators: OperatorTable,
    pub builtins: HashMap<Symbol, FnSig>,
    pub diagnostics: DiagnosticSink,
}

impl CompilationContext {
    pub fn new() -> CompilationContext {
        let mut interner = Interner::new();
        let mut operators = OperatorTable::default();
        for (sym, prec) in [("==", 30), ("<", 30), ("+", 50), ("-", 50), ("*", 60), ("/", 60)] {
            let symbol = interner.intern(sym);
            operators.register(symbol, prec);
        }

        let mut builtins = HashMap::new();
        for name in ["print", "log"] {
            let symbol = interner.intern(name);
            builtins.insert(
                symbol,
                FnSig {
                    params: vec![Type::Int],
                    ret: Type::Int,
                },
            );
        }

        CompilationContext {
            interner,
            operators,
            builtins,
            diagnostics: DiagnosticSink::new(),
        }
    }
}

impl Default for CompilationContext {
    fn default() -> Self {
        CompilationContext::new()
    }
}

/// One file's parsed content.
///
/// `items` is append-only during parsing: once an element is pushed it
/// is never reordered or retracted, so a start offset unambiguously
/// means "everything from here to the current end". The two cursors
/// record how far name binding and type checking have progressed and
/// only ever move forward.
#[derive(Debug)]
pub struct SourceUnit {
    pub file_id: FileId,
    pub name: String,
    pub items: Vec<Item>,
    /// Elements already processed by name binding.
    pub bound_elements: usize,
    /// Elements already processed by type checking.
    pub checked_elements: usize,
    /// Top-level names bound so far, with the item index that bound them.
    pub bindings: Vec<(Symbol, usize)>,
}

impl SourceUnit {
    pub fn new(file_id: FileId, name: impl Into<String>) -> SourceUnit {
        SourceUnit {
            file_id,
            name: name.into(),
            items: Vec::new(),
            bound_elements: 0,
            checked_elements: 0,
            bindings: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A named collection of source units, for whole-module lowering,
/// code generation, and serialization.
#[derive(Debug)]
pub struct Module {
    pub name: String,
    pub units: Vec<SourceUnit>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Module {
        Module {
            name: name.into(),
            units: Vec::new(),
        }
    }
}

/// A module or a single file, the two shapes accepted by lowering,
/// code generation, and serialization.
#[derive(Debug, Clone, Copy)]
pub enum ModuleOrFile<'a> {
    Module(&'a Module),
    File(&'a SourceUnit),
}

impl<'a> ModuleOrFile<'a> {
    pub fn units(self) -> std::slice::Iter<'a, SourceUnit> {
        match self {
            ModuleOrFile::Module(module) => module.units.iter(),
            ModuleOrFile::File(unit) => std::slice::from_ref(unit).iter(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preregisters_builtin_operators_and_functions() {
        let mut ctx = CompilationContext::new();
        let plus = ctx.interner.intern("+");
        let star = ctx.interner.intern("*");
        assert!(ctx.operators.precedence(plus).unwrap() < ctx.operators.precedence(star).unwrap());
        let print = ctx.interner.intern("print");
        assert!(ctx.builtins.contains_key(&print));
    }

    #[test]
    fn module_or_file_iterates_units() {
        let mut module = Module::new("demo");
        module.units.push(SourceUnit::new(FileId(0), "a.opal"));
        module.units.push(SourceUnit::new(FileId(1), "b.opal"));
        assert_eq!(ModuleOrFile::Module(&module).units().count(), 2);
        assert_eq!(ModuleOrFile::File(&module.units[0]).units().count(), 1);
    }
}
