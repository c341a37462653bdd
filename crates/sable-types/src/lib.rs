//! Target-environment types and the source-type resolver.
//!
//! Converts the parser's `TypeExpr` annotations to the concrete
//! [`TargetType`] used by lowering. This layer neither infers nor
//! defaults: by the time it runs, every annotation must be resolvable
//! through the fixed alias table or a loaded type catalog, and failure
//! is fatal to the enclosing lowering operation.

pub mod catalog;
pub mod resolve;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use catalog::{StaticCatalog, TypeCatalog};
pub use resolve::TypeResolver;

/// A fully resolved type of the managed target environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetType {
    Int,
    Float,
    Bool,
    Str,
    Unit,
    /// A loaded runtime type, by fully-qualified name, with its resolved
    /// type arguments. Non-generic types carry an empty argument list and
    /// a name without an arity suffix.
    Named {
        qualified: String,
        args: Vec<TargetType>,
    },
    /// A structural tuple of the target environment.
    Tuple(Vec<TargetType>),
    /// An invocable value. `ret` of `None` means "no value".
    Callable {
        params: Vec<TargetType>,
        ret: Option<Box<TargetType>>,
    },
}

impl TargetType {
    /// Shorthand for a non-generic named type.
    pub fn named(qualified: impl Into<String>) -> Self {
        TargetType::Named {
            qualified: qualified.into(),
            args: Vec::new(),
        }
    }

    /// Whether values of this type are heap objects in the target
    /// environment (everything except the unboxed primitives).
    pub fn is_reference(&self) -> bool {
        !matches!(
            self,
            TargetType::Int | TargetType::Float | TargetType::Bool | TargetType::Unit
        )
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Int => write!(f, "core/Int"),
            TargetType::Float => write!(f, "core/Float"),
            TargetType::Bool => write!(f, "core/Bool"),
            TargetType::Str => write!(f, "core/Str"),
            TargetType::Unit => write!(f, "core/Unit"),
            TargetType::Named { qualified, args } => {
                write!(f, "{qualified}")?;
                if !args.is_empty() {
                    write!(f, "<")?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{arg}")?;
                    }
                    write!(f, ">")?;
                }
                Ok(())
            }
            TargetType::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
            TargetType::Callable { params, ret } => {
                write!(f, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ")")?;
                if let Some(ret) = ret {
                    write!(f, " -> {ret}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_nests_generic_args() {
        let ty = TargetType::Named {
            qualified: "core/Map`2".into(),
            args: vec![TargetType::Str, TargetType::Int],
        };
        assert_eq!(ty.to_string(), "core/Map`2<core/Str, core/Int>");
    }

    #[test]
    fn primitives_are_not_references() {
        assert!(!TargetType::Int.is_reference());
        assert!(TargetType::Str.is_reference());
        assert!(TargetType::named("app/Point").is_reference());
    }
}
