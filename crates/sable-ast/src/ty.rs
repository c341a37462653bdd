//! Source-level type expressions.
//!
//! These are what the parser records for annotations; the resolver in
//! `sable-types` turns them into target-environment types. A `Pending`
//! annotation stands for "not yet written down" (e.g. a `let` without an
//! annotation whose type the checker filled in elsewhere), never `null`.

use sable_common::Span;
use serde::{Deserialize, Serialize};

/// A type expression as written in source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// A (possibly generic) named type: `Point`, `Seq<Int>`, `Map<Str, Int>`.
    Named {
        name: String,
        args: Vec<TypeExpr>,
        span: Span,
    },
    /// A tuple type: `(Int, Str)`.
    Tuple { items: Vec<TypeExpr>, span: Span },
    /// A function type: `fn(Int, Int) -> Bool`. `ret` of `None` means the
    /// function produces no value.
    Function {
        params: Vec<TypeExpr>,
        ret: Option<Box<TypeExpr>>,
        span: Span,
    },
    /// A placeholder left by the parser where no annotation was written.
    Pending(Span),
}

impl TypeExpr {
    /// Shorthand for a non-generic named type with a synthetic span.
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args: Vec::new(),
            span: Span::synthetic(),
        }
    }

    /// Shorthand for a generic named type with a synthetic span.
    pub fn generic(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Named {
            name: name.into(),
            args,
            span: Span::synthetic(),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            TypeExpr::Named { span, .. }
            | TypeExpr::Tuple { span, .. }
            | TypeExpr::Function { span, .. }
            | TypeExpr::Pending(span) => *span,
        }
    }

    /// Whether this is still the parser's placeholder.
    pub fn is_pending(&self) -> bool {
        matches!(self, TypeExpr::Pending(_))
    }
}
