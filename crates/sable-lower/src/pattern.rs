//! The pattern compiler.
//!
//! Converts a pattern plus a scrutinee location into a boolean test and an
//! ordered list of bind actions. The engine chains the tests of a match
//! statement into an if/else-if ladder; the binds of the taken arm execute
//! before its body, and only then.
//!
//! Tests and places are symbolic: projections are by field name, element
//! index, or variant payload slot, resolved to handles only when the
//! engine emits them. This keeps compilation a pure function of the
//! pattern, the unit metadata, and the loaded catalogs.

use sable_ast::expr::Expr;
use sable_ast::pat::Pattern;
use sable_common::{LowerError, LowerErrorKind, Span, SymbolId};
use sable_emit::LocalId;
use sable_types::TargetType;

use crate::meta::UnitMeta;

/// A scrutinee location: a storage root plus a chain of projections.
#[derive(Debug, Clone, PartialEq)]
pub enum Place {
    /// A body-local slot (the materialized scrutinee, or a bound temp).
    Local(LocalId),
    /// A parameter by call-site index.
    Param(u16),
    /// A named field of the value at `base`.
    Field { base: Box<Place>, name: String },
    /// Tuple element `index` of the value at `base`.
    Elem { base: Box<Place>, index: usize },
    /// Sequence element `index` of the value at `base`.
    Index { base: Box<Place>, index: usize },
    /// Payload slot `index` of enum variant `variant` at `base`. Projects
    /// through the variant's tag field; only valid under a matching
    /// variant test.
    VariantField {
        base: Box<Place>,
        variant: String,
        index: usize,
    },
}

impl Place {
    pub fn field(self, name: impl Into<String>) -> Place {
        Place::Field {
            base: Box::new(self),
            name: name.into(),
        }
    }

    pub fn elem(self, index: usize) -> Place {
        Place::Elem {
            base: Box::new(self),
            index,
        }
    }

    pub fn index(self, index: usize) -> Place {
        Place::Index {
            base: Box::new(self),
            index,
        }
    }
}

/// A boolean test over places. `And`/`Or` evaluate left to right and
/// short-circuit when emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    /// Always true (wildcards, bare identifiers).
    Always,
    And(Vec<Test>),
    Or(Vec<Test>),
    /// Runtime type check against a named target type.
    TypeIs { place: Place, ty: TargetType },
    /// Runtime tuple-shape check: a tuple of exactly `len` elements.
    IsTuple { place: Place, len: usize },
    /// Runtime container check: the value is a sequence.
    IsSeq { place: Place },
    /// The enum value at `place` carries the given variant tag.
    VariantIs {
        place: Place,
        enum_name: String,
        variant: String,
    },
    /// The sequence at `place` has at least `len` elements (rest marker).
    LenAtLeast { place: Place, len: usize },
    /// The sequence at `place` has exactly `len` elements.
    LenEq { place: Place, len: usize },
    /// Structural equality between the place and a computed expression.
    Equals { place: Place, expr: Expr },
    /// Containment of the place's value in a range/sequence expression.
    Contains { place: Place, expr: Expr },
    /// An arm guard, evaluated with the arm's bindings in scope.
    Guard(Expr),
}

impl Test {
    /// AND two tests, flattening and dropping `Always` operands.
    fn and(self, other: Test) -> Test {
        match (self, other) {
            (Test::Always, t) | (t, Test::Always) => t,
            (Test::And(mut lhs), Test::And(rhs)) => {
                lhs.extend(rhs);
                Test::And(lhs)
            }
            (Test::And(mut lhs), rhs) => {
                lhs.push(rhs);
                Test::And(lhs)
            }
            (lhs, rhs) => Test::And(vec![lhs, rhs]),
        }
    }
}

/// Copy the scrutinee projection into a newly declared variable.
#[derive(Debug, Clone, PartialEq)]
pub struct Bind {
    pub name: String,
    pub symbol: SymbolId,
    pub place: Place,
    pub span: Span,
}

/// The result of compiling one pattern (or one whole arm).
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub test: Test,
    pub binds: Vec<Bind>,
}

impl Compiled {
    fn always() -> Self {
        Compiled {
            test: Test::Always,
            binds: Vec::new(),
        }
    }
}

/// Compiles patterns against the unit's metadata.
pub struct PatternCompiler<'a> {
    pub meta: &'a UnitMeta,
}

impl<'a> PatternCompiler<'a> {
    pub fn new(meta: &'a UnitMeta) -> Self {
        Self { meta }
    }

    /// Compile a whole arm: alternatives OR-combined, the guard ANDed on
    /// top. Every alternative must bind the same names through the same
    /// places; the arm body reads one bind list no matter which
    /// alternative matched, so a divergent alternative is rejected.
    pub fn compile_arm(
        &self,
        alternatives: &[Pattern],
        guard: Option<&Expr>,
        scrutinee: &Place,
    ) -> Result<Compiled, LowerError> {
        let mut tests = Vec::with_capacity(alternatives.len());
        let mut binds: Option<Vec<Bind>> = None;
        for alt in alternatives {
            let compiled = self.compile(alt, scrutinee)?;
            tests.push(compiled.test);
            match &binds {
                None => binds = Some(compiled.binds),
                Some(first) => {
                    let agree = first.len() == compiled.binds.len()
                        && first.iter().zip(&compiled.binds).all(|(a, b)| {
                            a.name == b.name && a.symbol == b.symbol && a.place == b.place
                        });
                    if !agree {
                        return Err(LowerError::new(
                            LowerErrorKind::UnsupportedConstruct(
                                "pattern alternatives bind different places",
                            ),
                            alt.span(),
                        ));
                    }
                }
            }
        }

        let alt_test = match tests.len() {
            0 => Test::Always,
            1 => tests.remove(0),
            _ => Test::Or(tests),
        };
        let test = match guard {
            Some(g) => alt_test.and(Test::Guard(g.clone())),
            None => alt_test,
        };
        Ok(Compiled {
            test,
            binds: binds.unwrap_or_default(),
        })
    }

    /// Compile a single pattern against a scrutinee location.
    pub fn compile(&self, pattern: &Pattern, scrutinee: &Place) -> Result<Compiled, LowerError> {
        match pattern {
            Pattern::Wildcard(_) | Pattern::IgnoreRest(_) => Ok(Compiled::always()),

            Pattern::Ident {
                name,
                symbol,
                inner,
                span,
            } => {
                let bind = Bind {
                    name: name.clone(),
                    symbol: *symbol,
                    place: scrutinee.clone(),
                    span: *span,
                };
                match inner {
                    None => Ok(Compiled {
                        test: Test::Always,
                        binds: vec![bind],
                    }),
                    Some(inner) => {
                        // Layered binding: the name takes the whole value,
                        // the inner pattern must still match it.
                        let mut compiled = self.compile(inner, scrutinee)?;
                        compiled.binds.insert(0, bind);
                        Ok(compiled)
                    }
                }
            }

            Pattern::Tuple { items, span: _ } => {
                let mut test = Test::IsTuple {
                    place: scrutinee.clone(),
                    len: items.len(),
                };
                let mut binds = Vec::new();
                for (index, item) in items.iter().enumerate() {
                    let sub = self.compile(item, &scrutinee.clone().elem(index))?;
                    test = test.and(sub.test);
                    binds.extend(sub.binds);
                }
                Ok(Compiled { test, binds })
            }

            Pattern::Collection {
                items,
                has_rest,
                span: _,
            } => self.compile_collection(items, *has_rest, scrutinee),

            Pattern::Destructure {
                type_path,
                fields,
                is_enum_variant,
                span,
            } => {
                if *is_enum_variant {
                    self.compile_variant(type_path, fields, *span, scrutinee)
                } else {
                    self.compile_record(type_path, fields, *span, scrutinee)
                }
            }

            Pattern::KeyValue { key, value, span: _ } => {
                // The key selects the field of an already-matched
                // structural value; the test is the value pattern's.
                self.compile(value, &scrutinee.clone().field(key.clone()))
            }

            Pattern::Expr(expr, _span) => {
                let test = match expr.as_ref() {
                    Expr::Range { .. } | Expr::Seq { .. } => Test::Contains {
                        place: scrutinee.clone(),
                        expr: (**expr).clone(),
                    },
                    _ => Test::Equals {
                        place: scrutinee.clone(),
                        expr: (**expr).clone(),
                    },
                };
                Ok(Compiled {
                    test,
                    binds: Vec::new(),
                })
            }
        }
    }

    fn compile_collection(
        &self,
        items: &[Pattern],
        has_rest: bool,
        scrutinee: &Place,
    ) -> Result<Compiled, LowerError> {
        // The rest marker may arrive as a flag or as a trailing item.
        let positional: Vec<&Pattern> = items
            .iter()
            .filter(|p| !matches!(p, Pattern::IgnoreRest(_)))
            .collect();
        let has_rest = has_rest || positional.len() != items.len();
        let leading = positional.len();

        let mut test = Test::IsSeq {
            place: scrutinee.clone(),
        };
        test = test.and(if has_rest {
            // Only the leading items are bound; the length guard keeps the
            // projections in range against short collections.
            Test::LenAtLeast {
                place: scrutinee.clone(),
                len: leading,
            }
        } else {
            Test::LenEq {
                place: scrutinee.clone(),
                len: leading,
            }
        });

        let mut binds = Vec::new();
        for (index, item) in positional.iter().enumerate() {
            let sub = self.compile(item, &scrutinee.clone().index(index))?;
            test = test.and(sub.test);
            binds.extend(sub.binds);
        }
        Ok(Compiled { test, binds })
    }

    fn compile_record(
        &self,
        type_path: &[String],
        fields: &[Pattern],
        span: Span,
        scrutinee: &Place,
    ) -> Result<Compiled, LowerError> {
        let name = type_path.join("/");
        let record = self.meta.records.get(&name).ok_or_else(|| {
            LowerError::new(LowerErrorKind::TypeNotFound(name.clone()), span)
        })?;

        let mut test = Test::TypeIs {
            place: scrutinee.clone(),
            ty: record.ty.clone(),
        };
        let mut binds = Vec::new();
        for (position, field_pat) in fields.iter().enumerate() {
            // Key-value children project by name; positional children
            // project through the record's declaration order.
            let sub = match field_pat {
                Pattern::KeyValue { .. } => self.compile(field_pat, scrutinee)?,
                _ => {
                    let field = record.fields.get(position).ok_or_else(|| {
                        LowerError::new(
                            LowerErrorKind::UnsupportedConstruct(
                                "destructuring has more fields than the record",
                            ),
                            field_pat.span(),
                        )
                    })?;
                    self.compile(field_pat, &scrutinee.clone().field(field.name.clone()))?
                }
            };
            test = test.and(sub.test);
            binds.extend(sub.binds);
        }
        Ok(Compiled { test, binds })
    }

    fn compile_variant(
        &self,
        type_path: &[String],
        fields: &[Pattern],
        span: Span,
        scrutinee: &Place,
    ) -> Result<Compiled, LowerError> {
        // Qualified (`Shape.Circle`) or bare (`Circle`) variant path.
        let (enum_name, variant_name) = match type_path {
            [enum_name, variant] => (enum_name.clone(), variant.as_str()),
            [variant] => match self.meta.enum_for_variant(variant) {
                Some((owner, _)) => (owner.clone(), variant.as_str()),
                None => {
                    return Err(LowerError::new(
                        LowerErrorKind::TypeNotFound(variant.clone()),
                        span,
                    ))
                }
            },
            _ => {
                return Err(LowerError::new(
                    LowerErrorKind::UnsupportedConstruct("variant path deeper than two segments"),
                    span,
                ))
            }
        };

        let info = self.meta.enums.get(&enum_name).ok_or_else(|| {
            LowerError::new(LowerErrorKind::TypeNotFound(enum_name.clone()), span)
        })?;
        let variant = info.variant(variant_name).ok_or_else(|| {
            LowerError::new(
                LowerErrorKind::TypeNotFound(format!("{enum_name}.{variant_name}")),
                span,
            )
        })?;

        // Type check, then the tag; payload projections only fire behind
        // a successful tag test.
        let mut test = Test::TypeIs {
            place: scrutinee.clone(),
            ty: info.ty.clone(),
        }
        .and(Test::VariantIs {
            place: scrutinee.clone(),
            enum_name: enum_name.clone(),
            variant: variant.name.clone(),
        });

        let mut binds = Vec::new();
        for (index, field_pat) in fields.iter().enumerate() {
            if index >= variant.payload.len() {
                return Err(LowerError::new(
                    LowerErrorKind::UnsupportedConstruct(
                        "destructuring has more fields than the variant",
                    ),
                    field_pat.span(),
                ));
            }
            let sub_place = Place::VariantField {
                base: Box::new(scrutinee.clone()),
                variant: variant.name.clone(),
                index,
            };
            let sub = self.compile(field_pat, &sub_place)?;
            test = test.and(sub.test);
            binds.extend(sub.binds);
        }
        Ok(Compiled { test, binds })
    }
}
