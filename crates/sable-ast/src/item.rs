//! Statement and item nodes, plus the compilation unit root.

use sable_common::{Span, SymbolId};
use serde::{Deserialize, Serialize};

use crate::expr::{Block, Expr, MatchArm};
use crate::pat::Pattern;
use crate::scope::ScopeTree;
use crate::ty::TypeExpr;

/// Statement nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stmt {
    /// `let pattern [: ty] = init`. Destructuring bindings use the full
    /// pattern sublanguage; an irrefutable pattern is expected but not
    /// enforced at this layer.
    Let {
        pattern: Pattern,
        ty: Option<TypeExpr>,
        init: Expr,
        span: Span,
    },
    /// `target = value`, where target is a name or field projection.
    Assign {
        target: Expr,
        value: Expr,
        span: Span,
    },
    Expr(Expr),
    While {
        cond: Expr,
        body: Block,
        span: Span,
    },
    /// `for pattern in iterable { ... }`.
    For {
        pattern: Pattern,
        iterable: Expr,
        body: Block,
        span: Span,
    },
    /// A `match` in statement position (arm bodies run for effect).
    Match {
        scrutinee: Expr,
        arms: Vec<MatchArm>,
        span: Span,
    },
    /// `break upto N`: exits N enclosing loops (N >= 1).
    Break { levels: usize, span: Span },
    /// `continue upto N`.
    Continue { levels: usize, span: Span },
    Return { value: Option<Expr>, span: Span },
}

impl Stmt {
    pub fn span(&self) -> Span {
        match self {
            Stmt::Let { span, .. }
            | Stmt::Assign { span, .. }
            | Stmt::While { span, .. }
            | Stmt::For { span, .. }
            | Stmt::Match { span, .. }
            | Stmt::Break { span, .. }
            | Stmt::Continue { span, .. }
            | Stmt::Return { span, .. } => *span,
            Stmt::Expr(e) => e.span(),
        }
    }
}

/// A declared parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub symbol: SymbolId,
    pub ty: TypeExpr,
    pub span: Span,
}

/// A declared field of a record or enum variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub name: String,
    pub symbol: SymbolId,
    pub ty: TypeExpr,
    pub span: Span,
}

/// A top-level or nested function declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FnDecl {
    pub name: String,
    pub symbol: SymbolId,
    pub params: Vec<Param>,
    /// `None` means the function produces no value.
    pub ret: Option<TypeExpr>,
    pub body: Block,
    pub is_static: bool,
    pub span: Span,
}

/// A record (product) type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordDecl {
    pub name: String,
    pub symbol: SymbolId,
    pub fields: Vec<FieldDecl>,
    pub span: Span,
}

/// One variant of an enum declaration. A variant with a `raw` value doubles
/// as a constant of the enum's underlying type; its registry entry then
/// carries both a type-member artifact and the constant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantDecl {
    pub name: String,
    pub symbol: SymbolId,
    pub fields: Vec<FieldDecl>,
    pub raw: Option<i64>,
    pub span: Span,
}

/// An enum (sum) type declaration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumDecl {
    pub name: String,
    pub symbol: SymbolId,
    pub variants: Vec<VariantDecl>,
    pub span: Span,
}

/// Top-level items of a unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Item {
    Function(FnDecl),
    Record(RecordDecl),
    Enum(EnumDecl),
}

impl Item {
    pub fn span(&self) -> Span {
        match self {
            Item::Function(f) => f.span,
            Item::Record(r) => r.span,
            Item::Enum(e) => e.span,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Item::Function(f) => &f.name,
            Item::Record(r) => &r.name,
            Item::Enum(e) => &e.name,
        }
    }
}

/// A compilation unit as handed over by the front end: its items, the
/// scope tree built during parsing, and any imported units (each carrying
/// its own scope tree, processed recursively by the engine with the active
/// context swapped and restored).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
    pub name: String,
    pub items: Vec<Item>,
    pub scopes: ScopeTree,
    pub imports: Vec<Unit>,
}

impl Unit {
    pub fn new(name: impl Into<String>, items: Vec<Item>, scopes: ScopeTree) -> Self {
        Unit {
            name: name.into(),
            items,
            scopes,
            imports: Vec::new(),
        }
    }
}
