//! The syntax tree and scope tree the lowering backend consumes.
//!
//! The front end (lexer/parser/binder) lives outside this system; it hands
//! over an owned tree whose identifier nodes already carry assigned
//! [`SymbolId`]s (0 meaning "never bind"), plus a [`scope::ScopeTree`] built
//! in one pass during parsing. Nothing here is mutated by lowering except
//! for artifact registration into scopes.
//!
//! [`SymbolId`]: sable_common::SymbolId

pub mod expr;
pub mod item;
pub mod pat;
pub mod scope;
pub mod ty;

pub use expr::{BinOp, Block, Expr, Literal, MatchArm, NameRef, UnOp};
pub use item::{EnumDecl, FieldDecl, FnDecl, Item, Param, RecordDecl, Stmt, Unit, VariantDecl};
pub use pat::Pattern;
pub use scope::{Modifiers, ScopeId, ScopeTree, SymbolDecl, TypeSymbol};
pub use ty::TypeExpr;
