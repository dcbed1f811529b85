//! Surface AST for one source unit.
//!
//! A unit is an ordered, append-only sequence of top-level [`Item`]s.
//! Nodes carry `Symbol`s into the session interner rather than owned
//! strings, and fields filled by later stages (`ty`, `sig`, `resolved`)
//! start out empty so the verifier can check stage progress.

use crate::intern::Symbol;
use crate::span::Span;
use crate::types::{FnSig, Type};

/// One top-level element of a source unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub kind: ItemKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    Import(ImportDecl),
    Operator(OperatorDecl),
    Let(LetDecl),
    Fn(FnDecl),
    Stmt(Stmt),
    /// An inline low-level IR function. The function itself was parsed
    /// straight into the linked mid-level-IR module; only the name is
    /// kept in the AST.
    MirFn(Symbol),
}

impl ItemKind {
    /// Statement-form classification used by the main-file stopping
    /// policy: expression statements and assignments have observable
    /// side effects, declarations do not.
    pub fn has_side_effects(&self) -> bool {
        matches!(self, ItemKind::Stmt(_))
    }

    /// The declared name, for items that introduce one.
    pub fn name(&self) -> Option<Symbol> {
        match self {
            ItemKind::Let(decl) => Some(decl.name),
            ItemKind::Fn(decl) => Some(decl.name),
            ItemKind::MirFn(name) => Some(*name),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub module: Symbol,
    /// Set by name binding once the import was looked up.
    pub resolved: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OperatorDecl {
    /// The operator spelling, e.g. `<+>`.
    pub symbol: Symbol,
    pub precedence: u8,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetDecl {
    pub name: Symbol,
    pub annotation: Option<TypeRepr>,
    pub value: Expr,
    pub is_public: bool,
    /// Filled by the type checker.
    pub ty: Option<Type>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FnDecl {
    pub name: Symbol,
    pub generics: Option<GenericParamList>,
    pub params: Vec<Param>,
    pub ret: Option<TypeRepr>,
    pub body: FnBody,
    pub is_public: bool,
    /// Filled by the type checker.
    pub sig: Option<FnSig>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: Symbol,
    pub annotation: TypeRepr,
}

/// A function body is either parsed into statements or deferred: its
/// token byte range was recognized (brace matching kept the parse
/// cursor correct) but the statements inside were not parsed yet.
#[derive(Debug, Clone, PartialEq)]
pub enum FnBody {
    Parsed(Vec<Stmt>),
    Deferred { body_start: u32, body_end: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Expr(Expr),
    Assign { target: Symbol, value: Expr, span: Span },
    Let(LetDecl),
    Return { value: Option<Expr>, span: Span },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Int(i64),
    Bool(bool),
    Str(String),
    Ident(Symbol),
    Call { callee: Symbol, args: Vec<Expr> },
    Binary { op: Symbol, lhs: Box<Expr>, rhs: Box<Expr> },
}

/// A written type reference, prior to resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeRepr {
    pub name: Symbol,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericParamList {
    pub params: Vec<GenericParam>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenericParam {
    pub name: Symbol,
    pub constraint: Option<TypeRepr>,
}
