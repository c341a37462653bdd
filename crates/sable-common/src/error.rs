use std::fmt;

use serde::Serialize;

use crate::span::Span;
use crate::symbol::SymbolId;

/// A fatal lowering error with location information.
///
/// By the time lowering runs, user-facing language errors have already been
/// reported by earlier phases; every error here signals an invariant
/// violation, so the caller is expected to abort the whole compilation unit
/// rather than attempt recovery.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LowerError {
    pub kind: LowerErrorKind,
    pub span: Span,
}

impl LowerError {
    /// Create a new lowering error.
    pub fn new(kind: LowerErrorKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// The specific kind of lowering error.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum LowerErrorKind {
    /// An id was registered twice with conflicting artifacts.
    DuplicateSymbol(SymbolId),
    /// An id had no registry entry at lowering time (an earlier-phase gap).
    SymbolNotFound(SymbolId),
    /// The reserved id 0 reached the registry. Precondition guard; id 0
    /// marks error-recovery placeholders that must never bind.
    UnboundSymbol,
    /// A type expression did not resolve against any loaded catalog.
    TypeNotFound(String),
    /// A member lookup matched more than one signature.
    AmbiguousOverload(String),
    /// `break upto N` / `continue upto N` beyond the active loop nesting.
    InvalidJumpDepth { requested: usize, active: usize },
    /// A recognized AST shape the engine cannot lower yet.
    UnsupportedConstruct(&'static str),
}

impl fmt::Display for LowerErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateSymbol(id) => write!(f, "symbol {id} registered twice"),
            Self::SymbolNotFound(id) => write!(f, "symbol {id} has no registered artifact"),
            Self::UnboundSymbol => write!(f, "the reserved unbound symbol id cannot be registered"),
            Self::TypeNotFound(name) => write!(f, "type not found: {name}"),
            Self::AmbiguousOverload(name) => write!(f, "ambiguous overload: {name}"),
            Self::InvalidJumpDepth { requested, active } => write!(
                f,
                "jump depth {requested} exceeds {active} active loop(s)"
            ),
            Self::UnsupportedConstruct(what) => write!(f, "unsupported construct: {what}"),
        }
    }
}

impl fmt::Display for LowerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for LowerError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lower_error_display() {
        let err = LowerError::new(LowerErrorKind::SymbolNotFound(SymbolId(9)), Span::new(0, 4));
        assert_eq!(err.to_string(), "symbol #9 has no registered artifact");
    }

    #[test]
    fn lower_error_kind_display_all_variants() {
        assert_eq!(
            LowerErrorKind::DuplicateSymbol(SymbolId(3)).to_string(),
            "symbol #3 registered twice"
        );
        assert_eq!(
            LowerErrorKind::TypeNotFound("core/Seq`1".into()).to_string(),
            "type not found: core/Seq`1"
        );
        assert_eq!(
            LowerErrorKind::AmbiguousOverload("push".into()).to_string(),
            "ambiguous overload: push"
        );
        assert_eq!(
            LowerErrorKind::InvalidJumpDepth { requested: 3, active: 2 }.to_string(),
            "jump depth 3 exceeds 2 active loop(s)"
        );
        assert_eq!(
            LowerErrorKind::UnsupportedConstruct("splice").to_string(),
            "unsupported construct: splice"
        );
    }
}
