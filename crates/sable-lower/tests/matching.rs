//! Matching behavior of compiled patterns, checked against concrete
//! values through the test evaluator.

use sable_ast::expr::{Expr, Literal};
use sable_ast::pat::Pattern;
use sable_common::{LowerError, LowerErrorKind, Span, SymbolId};
use sable_emit::{CtorHandle, FieldHandle, LocalId, TypeHandle};
use sable_lower::testkit::{apply_binds, eval_test, select_arm, Value};
use sable_lower::{Compiled, EnumInfo, FieldInfo, PatternCompiler, Place, UnitMeta, VariantInfo};
use sable_types::TargetType;

fn ident(name: &str, id: u32) -> Pattern {
    Pattern::Ident {
        name: name.into(),
        symbol: SymbolId(id),
        inner: None,
        span: Span::synthetic(),
    }
}

fn int_pat(v: i64) -> Pattern {
    Pattern::Expr(
        Box::new(Expr::Literal(Literal::Int(v), Span::synthetic())),
        Span::synthetic(),
    )
}

fn scrutinee() -> Place {
    Place::Local(LocalId(0))
}

fn shape_meta() -> UnitMeta {
    let mut meta = UnitMeta::new();
    meta.enums.insert(
        "Shape".into(),
        EnumInfo {
            handle: TypeHandle(0),
            ty: TargetType::named("app/Shape"),
            ctor: CtorHandle(0),
            tag_field: FieldHandle(0),
            variants: vec![
                VariantInfo {
                    name: "Circle".into(),
                    symbol: SymbolId(40),
                    tag: 0,
                    raw: None,
                    payload: vec![FieldInfo {
                        name: "Circle_0".into(),
                        handle: FieldHandle(1),
                        ty: TargetType::Float,
                    }],
                },
                VariantInfo {
                    name: "Dot".into(),
                    symbol: SymbolId(41),
                    tag: 1,
                    raw: None,
                    payload: vec![],
                },
                VariantInfo {
                    name: "Square".into(),
                    symbol: SymbolId(42),
                    tag: 2,
                    raw: None,
                    payload: vec![FieldInfo {
                        name: "Square_0".into(),
                        handle: FieldHandle(2),
                        ty: TargetType::Float,
                    }],
                },
            ],
        },
    );
    meta
}

fn try_compile_arm(patterns: &[Pattern], guard: Option<&Expr>) -> Result<Compiled, LowerError> {
    let meta = shape_meta();
    PatternCompiler::new(&meta).compile_arm(patterns, guard, &scrutinee())
}

fn compile_arm(patterns: &[Pattern], guard: Option<&Expr>) -> Compiled {
    try_compile_arm(patterns, guard).unwrap()
}

fn variant_pat(variant: &str, fields: Vec<Pattern>) -> Pattern {
    Pattern::Destructure {
        type_path: vec!["Shape".into(), variant.into()],
        fields,
        is_enum_variant: true,
        span: Span::synthetic(),
    }
}

// ── structural binds ──────────────────────────────────────────────────

#[test]
fn tuple_pattern_binds_named_positions() {
    let arm = compile_arm(
        &[Pattern::Tuple {
            items: vec![
                ident("x", 1),
                ident("y", 2),
                Pattern::Wildcard(Span::synthetic()),
            ],
            span: Span::synthetic(),
        }],
        None,
    );
    let value = Value::Tuple(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

    let mut guards = 0;
    assert!(eval_test(&arm.test, &value, &mut guards));
    assert_eq!(
        apply_binds(&arm.binds, &value).unwrap(),
        vec![("x".to_string(), Value::Int(1)), ("y".to_string(), Value::Int(2))]
    );
}

#[test]
fn rest_pattern_binds_leading_elements_only() {
    let arm = compile_arm(
        &[Pattern::Collection {
            items: vec![
                int_pat(1),
                int_pat(2),
                ident("x", 1),
                Pattern::IgnoreRest(Span::synthetic()),
            ],
            has_rest: true,
            span: Span::synthetic(),
        }],
        None,
    );

    let long = Value::Seq(vec![
        Value::Int(1),
        Value::Int(2),
        Value::Int(3),
        Value::Int(4),
    ]);
    let mut guards = 0;
    assert!(eval_test(&arm.test, &long, &mut guards));
    assert_eq!(
        apply_binds(&arm.binds, &long).unwrap(),
        vec![("x".to_string(), Value::Int(3))]
    );

    // Shorter than the leading prefix: the length guard fails before any
    // projection is attempted.
    let short = Value::Seq(vec![Value::Int(1), Value::Int(2)]);
    assert!(!eval_test(&arm.test, &short, &mut guards));
}

#[test]
fn variant_pattern_binds_the_payload() {
    let arm = compile_arm(
        &[Pattern::Destructure {
            type_path: vec!["Shape".into(), "Circle".into()],
            fields: vec![ident("r", 9)],
            is_enum_variant: true,
            span: Span::synthetic(),
        }],
        None,
    );
    let circle = Value::variant("app/Shape", "Circle", vec![Value::Float(2.0)]);
    let dot = Value::variant("app/Shape", "Dot", vec![]);

    let mut guards = 0;
    assert!(eval_test(&arm.test, &circle, &mut guards));
    assert!(!eval_test(&arm.test, &dot, &mut guards));
    assert_eq!(
        apply_binds(&arm.binds, &circle).unwrap(),
        vec![("r".to_string(), Value::Float(2.0))]
    );
}

// ── arm selection ─────────────────────────────────────────────────────

#[test]
fn first_matching_arm_wins_and_later_guards_never_run() {
    let guard = Expr::Literal(Literal::Bool(true), Span::synthetic());
    let arms = vec![
        compile_arm(&[int_pat(1)], None),
        compile_arm(&[int_pat(2), int_pat(3)], Some(&guard)),
        compile_arm(&[Pattern::Wildcard(Span::synthetic())], None),
    ];

    let one = select_arm(&arms, &Value::Int(1));
    assert_eq!(one.index, Some(0));
    assert_eq!(one.guards_evaluated, 0);

    let three = select_arm(&arms, &Value::Int(3));
    assert_eq!(three.index, Some(1));
    assert_eq!(three.guards_evaluated, 1);

    // Neither alternative of the guarded arm matches, so its guard is
    // never reached on the way to the wildcard.
    let nine = select_arm(&arms, &Value::Int(9));
    assert_eq!(nine.index, Some(2));
    assert_eq!(nine.guards_evaluated, 0);
}

#[test]
fn failed_guard_falls_through_to_the_next_arm() {
    let guard = Expr::Literal(Literal::Bool(false), Span::synthetic());
    let arms = vec![
        compile_arm(&[ident("x", 1)], Some(&guard)),
        compile_arm(&[Pattern::Wildcard(Span::synthetic())], None),
    ];

    let selection = select_arm(&arms, &Value::Int(5));
    assert_eq!(selection.index, Some(1));
    assert_eq!(selection.guards_evaluated, 1);
}

#[test]
fn no_matching_arm_selects_nothing() {
    let arms = vec![compile_arm(&[int_pat(1)], None)];
    let selection = select_arm(&arms, &Value::Int(2));
    assert_eq!(selection.index, None);
}

// ── alternatives ──────────────────────────────────────────────────────

#[test]
fn alternatives_binding_different_places_are_rejected() {
    // `Circle(r) | Square(r)`: the name arrives through a different
    // payload slot depending on which side matched, so the arm body has
    // no single place to load `r` from.
    let err = try_compile_arm(
        &[
            variant_pat("Circle", vec![ident("r", 9)]),
            variant_pat("Square", vec![ident("r", 9)]),
        ],
        None,
    )
    .unwrap_err();
    assert_eq!(
        err.kind,
        LowerErrorKind::UnsupportedConstruct("pattern alternatives bind different places")
    );
}

#[test]
fn alternatives_binding_the_same_place_stay_legal() {
    // `n @ 1 | n @ 2`: both sides bind `n` to the whole scrutinee.
    let layered = |v: i64| Pattern::Ident {
        name: "n".into(),
        symbol: SymbolId(7),
        inner: Some(Box::new(int_pat(v))),
        span: Span::synthetic(),
    };
    let arm = compile_arm(&[layered(1), layered(2)], None);

    let mut guards = 0;
    assert!(eval_test(&arm.test, &Value::Int(2), &mut guards));
    assert_eq!(
        apply_binds(&arm.binds, &Value::Int(2)).unwrap(),
        vec![("n".to_string(), Value::Int(2))]
    );
}
