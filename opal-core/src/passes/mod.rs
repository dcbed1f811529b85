//! AST rewriting passes that run between name binding and type
//! checking.

pub mod instrument;
