//! String interning for identifiers.
//!
//! All names in the AST are `Symbol`s pointing into the interner owned
//! by the [`CompilationContext`](crate::context::CompilationContext),
//! so name comparisons are integer comparisons and no AST node owns
//! identifier text of its own.

use std::collections::HashMap;

/// An interned identifier. Only meaningful together with the interner
/// that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Symbol(pub u32);

#[derive(Debug, Default)]
pub struct Interner {
    names: Vec<String>,
    indices: HashMap<String, Symbol>,
}

impl Interner {
    pub fn new() -> Interner {
        Interner::default()
    }

    /// Intern `text`, returning the existing symbol if already known.
    pub fn intern(&mut self, text: &str) -> Symbol {
        if let Some(sym) = self.indices.get(text) {
            return *sym;
        }
        let sym = Symbol(self.names.len() as u32);
        self.names.push(text.to_string());
        self.indices.insert(text.to_string(), sym);
        sym
    }

    /// Resolve a symbol back to its text.
    ///
    /// Panics if the symbol was produced by a different interner; that
    /// is a compiler bug, not a user error.
    pub fn resolve(&self, sym: Symbol) -> &str {
        &self.names[sym.0 as usize]
    }

    /// Returns true if `sym` is valid for this interner.
    pub fn is_valid(&self, sym: Symbol) -> bool {
        (sym.0 as usize) < self.names.len()
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}
