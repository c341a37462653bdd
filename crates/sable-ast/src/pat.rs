//! The pattern sublanguage.
//!
//! Patterns appear in `match` arms, destructuring `let` bindings, and
//! `for` loop targets. Children are exclusively owned by their parent;
//! a pattern never outlives the arm or binding that owns it.

use sable_common::{Span, SymbolId};
use serde::{Deserialize, Serialize};

use crate::expr::Expr;

/// A structural matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    /// `_`: matches anything, binds nothing.
    Wildcard(Span),
    /// A binding name, optionally layered over an inner pattern
    /// (`x`, or `whole @ (a, b)`). The front end assigns the symbol id.
    Ident {
        name: String,
        symbol: SymbolId,
        inner: Option<Box<Pattern>>,
        span: Span,
    },
    /// `(p1, p2, ...)`.
    Tuple { items: Vec<Pattern>, span: Span },
    /// `[p1, p2, ..]`: positional elements of a sequence, optionally
    /// followed by a rest marker that ignores the remainder.
    Collection {
        items: Vec<Pattern>,
        has_rest: bool,
        span: Span,
    },
    /// `Type(p1, ...)` or `Type { f: p, ... }`: a record or enum-variant
    /// destructuring. `type_path` is the qualified name as written.
    Destructure {
        type_path: Vec<String>,
        fields: Vec<Pattern>,
        is_enum_variant: bool,
        span: Span,
    },
    /// `key: pattern` inside a record destructuring; selects which field
    /// of the already-matched structure the inner pattern projects.
    KeyValue {
        key: String,
        value: Box<Pattern>,
        span: Span,
    },
    /// The `..` rest marker itself.
    IgnoreRest(Span),
    /// A computed pattern: ranges test containment, everything else tests
    /// structural equality against the scrutinee.
    Expr(Box<Expr>, Span),
}

impl Pattern {
    pub fn span(&self) -> Span {
        match self {
            Pattern::Wildcard(span) | Pattern::IgnoreRest(span) => *span,
            Pattern::Ident { span, .. }
            | Pattern::Tuple { span, .. }
            | Pattern::Collection { span, .. }
            | Pattern::Destructure { span, .. }
            | Pattern::KeyValue { span, .. } => *span,
            Pattern::Expr(_, span) => *span,
        }
    }

    /// Whether this pattern can never fail to match.
    pub fn is_irrefutable(&self) -> bool {
        match self {
            Pattern::Wildcard(_) | Pattern::IgnoreRest(_) => true,
            Pattern::Ident { inner, .. } => {
                inner.as_ref().map_or(true, |p| p.is_irrefutable())
            }
            Pattern::Tuple { items, .. } => items.iter().all(Pattern::is_irrefutable),
            Pattern::KeyValue { value, .. } => value.is_irrefutable(),
            Pattern::Collection { .. } | Pattern::Destructure { .. } | Pattern::Expr(..) => false,
        }
    }

    /// Collect every binding name introduced by this pattern, in
    /// left-to-right order.
    pub fn binding_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_binding_names(&mut out);
        out
    }

    fn collect_binding_names<'p>(&'p self, out: &mut Vec<&'p str>) {
        match self {
            Pattern::Wildcard(_) | Pattern::IgnoreRest(_) | Pattern::Expr(..) => {}
            Pattern::Ident { name, inner, .. } => {
                out.push(name.as_str());
                if let Some(inner) = inner {
                    inner.collect_binding_names(out);
                }
            }
            Pattern::Tuple { items, .. } | Pattern::Collection { items, .. } => {
                for item in items {
                    item.collect_binding_names(out);
                }
            }
            Pattern::Destructure { fields, .. } => {
                for field in fields {
                    field.collect_binding_names(out);
                }
            }
            Pattern::KeyValue { value, .. } => value.collect_binding_names(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_common::SymbolId;

    fn ident(name: &str, id: u32) -> Pattern {
        Pattern::Ident {
            name: name.into(),
            symbol: SymbolId(id),
            inner: None,
            span: Span::synthetic(),
        }
    }

    #[test]
    fn binding_names_are_left_to_right() {
        let pat = Pattern::Tuple {
            items: vec![
                ident("a", 1),
                Pattern::Wildcard(Span::synthetic()),
                Pattern::Collection {
                    items: vec![ident("b", 2), ident("c", 3)],
                    has_rest: true,
                    span: Span::synthetic(),
                },
            ],
            span: Span::synthetic(),
        };
        assert_eq!(pat.binding_names(), vec!["a", "b", "c"]);
    }

    #[test]
    fn tuple_of_idents_is_irrefutable() {
        let pat = Pattern::Tuple {
            items: vec![ident("a", 1), Pattern::Wildcard(Span::synthetic())],
            span: Span::synthetic(),
        };
        assert!(pat.is_irrefutable());
    }

    #[test]
    fn collection_is_refutable() {
        let pat = Pattern::Collection {
            items: vec![ident("a", 1)],
            has_rest: false,
            span: Span::synthetic(),
        };
        assert!(!pat.is_irrefutable());
    }
}
