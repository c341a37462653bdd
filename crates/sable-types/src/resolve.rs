//! Source-type resolution: `TypeExpr` -> `TargetType`.
//!
//! Primitive and container aliases go through a fixed table; user types
//! are searched across the loaded catalogs by qualified name, composing a
//! generic-arity suffix when type arguments are present. Arguments resolve
//! recursively first, so `Seq<Seq<Int>>` fails on the inner type before
//! the outer name is ever composed.

use sable_ast::ty::TypeExpr;
use sable_common::{LowerError, LowerErrorKind};

use crate::catalog::TypeCatalog;
use crate::TargetType;

/// The fixed alias table: source name -> target-environment base name.
/// Primitives additionally collapse to unboxed `TargetType` variants.
const ALIASES: &[(&str, &str)] = &[
    ("Int", "core/Int"),
    ("Float", "core/Float"),
    ("Bool", "core/Bool"),
    ("Str", "core/Str"),
    ("Unit", "core/Unit"),
    ("Seq", "core/Seq"),
    ("Map", "core/Map"),
    ("Range", "core/Range"),
];

fn alias_for(name: &str) -> Option<&'static str> {
    ALIASES
        .iter()
        .find(|(src, _)| *src == name)
        .map(|(_, target)| *target)
}

/// Collapse a primitive alias target to its unboxed variant, if it is one.
fn primitive_for(target: &str) -> Option<TargetType> {
    match target {
        "core/Int" => Some(TargetType::Int),
        "core/Float" => Some(TargetType::Float),
        "core/Bool" => Some(TargetType::Bool),
        "core/Str" => Some(TargetType::Str),
        "core/Unit" => Some(TargetType::Unit),
        _ => None,
    }
}

/// Resolves source type expressions against a stack of loaded catalogs.
///
/// The resolver holds no state of its own; resolution is a pure function
/// of the expression and the catalogs, so repeated resolution of the same
/// expression is idempotent by construction.
pub struct TypeResolver<'cat> {
    catalogs: Vec<&'cat dyn TypeCatalog>,
}

impl<'cat> TypeResolver<'cat> {
    pub fn new(catalogs: Vec<&'cat dyn TypeCatalog>) -> Self {
        Self { catalogs }
    }

    /// Resolve a source type expression to a target type.
    ///
    /// Fails with `TypeNotFound` for unknown names and for annotations the
    /// parser left pending; this layer never infers.
    pub fn resolve(&self, ty: &TypeExpr) -> Result<TargetType, LowerError> {
        match ty {
            TypeExpr::Named { name, args, span } => {
                // Arguments first, so the innermost failure wins.
                let resolved_args = args
                    .iter()
                    .map(|a| self.resolve(a))
                    .collect::<Result<Vec<_>, _>>()?;

                let base = alias_for(name).unwrap_or(name.as_str());
                if resolved_args.is_empty() {
                    if let Some(prim) = primitive_for(base) {
                        return Ok(prim);
                    }
                }

                let qualified = if resolved_args.is_empty() {
                    base.to_string()
                } else {
                    self.compose_generic(base, resolved_args.len())
                };

                match self.find(&qualified) {
                    Some(TargetType::Named { qualified, .. }) => Ok(TargetType::Named {
                        qualified,
                        args: resolved_args,
                    }),
                    Some(found) => Ok(found),
                    None => Err(LowerError::new(
                        LowerErrorKind::TypeNotFound(qualified),
                        *span,
                    )),
                }
            }

            TypeExpr::Tuple { items, span: _ } => {
                let resolved = items
                    .iter()
                    .map(|i| self.resolve(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(TargetType::Tuple(resolved))
            }

            TypeExpr::Function { params, ret, span: _ } => {
                let resolved_params = params
                    .iter()
                    .map(|p| self.resolve(p))
                    .collect::<Result<Vec<_>, _>>()?;
                let resolved_ret = match ret {
                    Some(r) => Some(Box::new(self.resolve(r)?)),
                    None => None,
                };
                Ok(TargetType::Callable {
                    params: resolved_params,
                    ret: resolved_ret,
                })
            }

            TypeExpr::Pending(span) => Err(LowerError::new(
                LowerErrorKind::TypeNotFound("<unresolved annotation>".into()),
                *span,
            )),
        }
    }

    /// Search every loaded catalog for a qualified name, in load order.
    pub fn find(&self, qualified: &str) -> Option<TargetType> {
        self.catalogs.iter().find_map(|cat| cat.find_type(qualified))
    }

    fn compose_generic(&self, base: &str, arity: usize) -> String {
        match self.catalogs.first() {
            Some(cat) => cat.generic_arity(base, arity),
            None => format!("{base}`{arity}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::StaticCatalog;
    use sable_common::Span;

    fn resolver_fixture() -> StaticCatalog {
        let mut cat = StaticCatalog::core();
        cat.insert("app/Point", TargetType::named("app/Point"));
        cat
    }

    #[test]
    fn primitive_aliases_collapse() {
        let cat = resolver_fixture();
        let resolver = TypeResolver::new(vec![&cat]);
        assert_eq!(
            resolver.resolve(&TypeExpr::named("Int")).unwrap(),
            TargetType::Int
        );
        assert_eq!(
            resolver.resolve(&TypeExpr::named("Str")).unwrap(),
            TargetType::Str
        );
    }

    #[test]
    fn container_alias_composes_arity() {
        let cat = resolver_fixture();
        let resolver = TypeResolver::new(vec![&cat]);
        let ty = resolver
            .resolve(&TypeExpr::generic("Seq", vec![TypeExpr::named("Int")]))
            .unwrap();
        assert_eq!(
            ty,
            TargetType::Named {
                qualified: "core/Seq`1".into(),
                args: vec![TargetType::Int],
            }
        );
    }

    #[test]
    fn inner_argument_failure_wins() {
        let cat = resolver_fixture();
        let resolver = TypeResolver::new(vec![&cat]);
        let err = resolver
            .resolve(&TypeExpr::generic("Seq", vec![TypeExpr::named("Bogus")]))
            .unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::TypeNotFound("Bogus".into()));
    }

    #[test]
    fn function_type_resolves_to_callable() {
        let cat = resolver_fixture();
        let resolver = TypeResolver::new(vec![&cat]);
        let ty = resolver
            .resolve(&TypeExpr::Function {
                params: vec![TypeExpr::named("Int"), TypeExpr::named("Bool")],
                ret: None,
                span: Span::synthetic(),
            })
            .unwrap();
        assert_eq!(
            ty,
            TargetType::Callable {
                params: vec![TargetType::Int, TargetType::Bool],
                ret: None,
            }
        );
    }

    #[test]
    fn pending_annotation_is_fatal() {
        let cat = resolver_fixture();
        let resolver = TypeResolver::new(vec![&cat]);
        let err = resolver
            .resolve(&TypeExpr::Pending(Span::synthetic()))
            .unwrap_err();
        assert!(matches!(err.kind, LowerErrorKind::TypeNotFound(_)));
    }

    #[test]
    fn resolution_is_idempotent() {
        let cat = resolver_fixture();
        let resolver = TypeResolver::new(vec![&cat]);
        let expr = TypeExpr::generic("Map", vec![TypeExpr::named("Str"), TypeExpr::named("Int")]);
        let first = resolver.resolve(&expr).unwrap();
        let second = resolver.resolve(&expr).unwrap();
        assert_eq!(first, second);
    }
}
