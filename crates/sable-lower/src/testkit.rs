//! Value-domain interpretation of compiled pattern tests.
//!
//! The pattern compiler produces symbolic `Test`/`Place`/`Bind` trees;
//! this module evaluates them against concrete values so matching
//! behavior (first-match-wins, guard evaluation order, bind placement)
//! can be checked without a target runtime. Test support only; nothing
//! here is reachable from the lowering engine.

use sable_ast::expr::{BinOp, Expr, Literal, UnOp};

use sable_types::TargetType;

use crate::pattern::{Bind, Compiled, Place, Test};

/// A concrete value of the target environment's value domain.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
    Tuple(Vec<Value>),
    Seq(Vec<Value>),
    Record {
        type_name: String,
        fields: Vec<(String, Value)>,
    },
    Enum {
        type_name: String,
        variant: String,
        payload: Vec<Value>,
    },
    /// Inclusive start, exclusive end.
    Range { start: i64, end: i64 },
}

impl Value {
    pub fn record(type_name: &str, fields: &[(&str, Value)]) -> Value {
        Value::Record {
            type_name: type_name.into(),
            fields: fields
                .iter()
                .map(|(n, v)| (n.to_string(), v.clone()))
                .collect(),
        }
    }

    pub fn variant(type_name: &str, variant: &str, payload: Vec<Value>) -> Value {
        Value::Enum {
            type_name: type_name.into(),
            variant: variant.into(),
            payload,
        }
    }
}

/// Resolve a place against the scrutinee. Every storage root (local or
/// parameter) stands for the scrutinee itself; projections walk the
/// value structurally. `None` means the projection does not apply to the
/// value's shape.
pub fn eval_place(place: &Place, scrutinee: &Value) -> Option<Value> {
    match place {
        Place::Local(_) | Place::Param(_) => Some(scrutinee.clone()),

        Place::Field { base, name } => match eval_place(base, scrutinee)? {
            Value::Record { fields, .. } => fields
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| v.clone()),
            _ => None,
        },

        Place::Elem { base, index } => match eval_place(base, scrutinee)? {
            Value::Tuple(items) => items.get(*index).cloned(),
            _ => None,
        },

        Place::Index { base, index } => match eval_place(base, scrutinee)? {
            Value::Seq(items) => items.get(*index).cloned(),
            _ => None,
        },

        Place::VariantField {
            base,
            variant,
            index,
        } => match eval_place(base, scrutinee)? {
            Value::Enum {
                variant: v,
                payload,
                ..
            } if &v == variant => payload.get(*index).cloned(),
            _ => None,
        },
    }
}

/// Evaluate a compiled test against the scrutinee. Guard evaluations are
/// counted through `guards_evaluated` so tests can pin down that guards
/// of untaken arms never run.
pub fn eval_test(test: &Test, scrutinee: &Value, guards_evaluated: &mut usize) -> bool {
    match test {
        Test::Always => true,

        Test::And(parts) => parts
            .iter()
            .all(|p| eval_test(p, scrutinee, guards_evaluated)),

        Test::Or(parts) => parts
            .iter()
            .any(|p| eval_test(p, scrutinee, guards_evaluated)),

        Test::TypeIs { place, ty } => {
            eval_place(place, scrutinee).is_some_and(|v| type_matches(ty, &v))
        }

        Test::IsTuple { place, len } => matches!(
            eval_place(place, scrutinee),
            Some(Value::Tuple(items)) if items.len() == *len
        ),

        Test::IsSeq { place } => matches!(eval_place(place, scrutinee), Some(Value::Seq(_))),

        Test::VariantIs { place, variant, .. } => matches!(
            eval_place(place, scrutinee),
            Some(Value::Enum { variant: v, .. }) if &v == variant
        ),

        Test::LenAtLeast { place, len } => matches!(
            eval_place(place, scrutinee),
            Some(Value::Seq(items)) if items.len() >= *len
        ),

        Test::LenEq { place, len } => matches!(
            eval_place(place, scrutinee),
            Some(Value::Seq(items)) if items.len() == *len
        ),

        Test::Equals { place, expr } => match (eval_place(place, scrutinee), eval_expr(expr)) {
            (Some(lhs), Some(rhs)) => lhs == rhs,
            _ => false,
        },

        Test::Contains { place, expr } => {
            let (Some(candidate), Some(container)) =
                (eval_place(place, scrutinee), eval_expr(expr))
            else {
                return false;
            };
            match (container, candidate) {
                (Value::Range { start, end }, Value::Int(v)) => start <= v && v < end,
                (Value::Seq(items), v) => items.contains(&v),
                _ => false,
            }
        }

        Test::Guard(expr) => {
            *guards_evaluated += 1;
            eval_expr(expr) == Some(Value::Bool(true))
        }
    }
}

/// Resolve every bind of an arm to `(name, value)` pairs. `None` when a
/// projection does not apply, which signals a compiler bug (binds only
/// execute behind a passing test).
pub fn apply_binds(binds: &[Bind], scrutinee: &Value) -> Option<Vec<(String, Value)>> {
    binds
        .iter()
        .map(|b| eval_place(&b.place, scrutinee).map(|v| (b.name.clone(), v)))
        .collect()
}

/// The outcome of running a match ladder over compiled arms.
#[derive(Debug, PartialEq)]
pub struct ArmSelection {
    pub index: Option<usize>,
    pub guards_evaluated: usize,
}

/// First-match-wins arm selection, exactly as the emitted ladder would
/// behave: arms are tried in order and evaluation stops at the first
/// passing test.
pub fn select_arm(arms: &[Compiled], scrutinee: &Value) -> ArmSelection {
    let mut guards_evaluated = 0;
    for (index, arm) in arms.iter().enumerate() {
        if eval_test(&arm.test, scrutinee, &mut guards_evaluated) {
            return ArmSelection {
                index: Some(index),
                guards_evaluated,
            };
        }
    }
    ArmSelection {
        index: None,
        guards_evaluated,
    }
}

fn type_matches(ty: &TargetType, value: &Value) -> bool {
    match (ty, value) {
        (TargetType::Int, Value::Int(_)) => true,
        (TargetType::Float, Value::Float(_)) => true,
        (TargetType::Bool, Value::Bool(_)) => true,
        (TargetType::Str, Value::Str(_)) => true,
        (TargetType::Unit, Value::Unit) => true,
        (TargetType::Named { qualified, .. }, Value::Record { type_name, .. }) => {
            qualified == type_name
        }
        (TargetType::Named { qualified, .. }, Value::Enum { type_name, .. }) => {
            qualified == type_name
        }
        (TargetType::Named { qualified, .. }, Value::Seq(_)) => qualified == "core/Seq`1",
        (TargetType::Named { qualified, .. }, Value::Range { .. }) => qualified == "core/Range",
        (TargetType::Tuple(items), Value::Tuple(values)) => items.len() == values.len(),
        _ => false,
    }
}

/// Evaluate a closed expression (no name references) to a value. Covers
/// the expression forms that appear in expression patterns and guards.
pub fn eval_expr(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Literal(lit, _) => Some(match lit {
            Literal::Int(v) => Value::Int(*v),
            Literal::Float(v) => Value::Float(*v),
            Literal::Bool(v) => Value::Bool(*v),
            Literal::Str(v) => Value::Str(v.clone()),
            Literal::Unit => Value::Unit,
        }),

        Expr::Binary { op, lhs, rhs, .. } => eval_binary(*op, eval_expr(lhs)?, eval_expr(rhs)?),

        Expr::Unary { op, operand, .. } => match (op, eval_expr(operand)?) {
            (UnOp::Neg, Value::Int(v)) => Some(Value::Int(-v)),
            (UnOp::Neg, Value::Float(v)) => Some(Value::Float(-v)),
            (UnOp::Not, Value::Bool(v)) => Some(Value::Bool(!v)),
            _ => None,
        },

        Expr::Tuple { items, .. } => items
            .iter()
            .map(eval_expr)
            .collect::<Option<Vec<_>>>()
            .map(Value::Tuple),

        Expr::Seq { items, .. } => items
            .iter()
            .map(eval_expr)
            .collect::<Option<Vec<_>>>()
            .map(Value::Seq),

        Expr::Range { start, end, .. } => match (eval_expr(start)?, eval_expr(end)?) {
            (Value::Int(start), Value::Int(end)) => Some(Value::Range { start, end }),
            _ => None,
        },

        _ => None,
    }
}

fn eval_binary(op: BinOp, lhs: Value, rhs: Value) -> Option<Value> {
    match op {
        BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Rem => match (lhs, rhs) {
            (Value::Int(a), Value::Int(b)) => {
                if b == 0 && matches!(op, BinOp::Div | BinOp::Rem) {
                    return None;
                }
                Some(Value::Int(match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                    _ => a % b,
                }))
            }
            (Value::Float(a), Value::Float(b)) => Some(Value::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                _ => a % b,
            })),
            _ => None,
        },

        BinOp::Eq => Some(Value::Bool(lhs == rhs)),
        BinOp::Ne => Some(Value::Bool(lhs != rhs)),

        BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => {
            let ordering = match (lhs, rhs) {
                (Value::Int(a), Value::Int(b)) => a.partial_cmp(&b),
                (Value::Float(a), Value::Float(b)) => a.partial_cmp(&b),
                _ => None,
            }?;
            Some(Value::Bool(match op {
                BinOp::Lt => ordering.is_lt(),
                BinOp::Le => ordering.is_le(),
                BinOp::Gt => ordering.is_gt(),
                _ => ordering.is_ge(),
            }))
        }

        BinOp::And | BinOp::Or => match (lhs, rhs) {
            (Value::Bool(a), Value::Bool(b)) => Some(Value::Bool(match op {
                BinOp::And => a && b,
                _ => a || b,
            })),
            _ => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_common::Span;
    use sable_emit::LocalId;

    fn root() -> Place {
        Place::Local(LocalId(0))
    }

    #[test]
    fn places_project_structurally() {
        let value = Value::Tuple(vec![
            Value::Int(1),
            Value::record("app/Point", &[("x", Value::Int(7))]),
        ]);
        assert_eq!(eval_place(&root().elem(0), &value), Some(Value::Int(1)));
        assert_eq!(
            eval_place(&root().elem(1).field("x"), &value),
            Some(Value::Int(7))
        );
        assert_eq!(eval_place(&root().elem(2), &value), None);
    }

    #[test]
    fn range_containment_is_half_open() {
        let range = Expr::Range {
            start: Box::new(Expr::Literal(Literal::Int(0), Span::synthetic())),
            end: Box::new(Expr::Literal(Literal::Int(10), Span::synthetic())),
            span: Span::synthetic(),
        };
        let test = Test::Contains {
            place: root(),
            expr: range,
        };
        let mut guards = 0;
        assert!(eval_test(&test, &Value::Int(0), &mut guards));
        assert!(eval_test(&test, &Value::Int(9), &mut guards));
        assert!(!eval_test(&test, &Value::Int(10), &mut guards));
        assert_eq!(guards, 0);
    }

    #[test]
    fn guard_evaluations_are_counted() {
        let guard = Test::Guard(Expr::Literal(Literal::Bool(false), Span::synthetic()));
        let mut guards = 0;
        assert!(!eval_test(&guard, &Value::Unit, &mut guards));
        assert_eq!(guards, 1);
    }

    #[test]
    fn and_short_circuits_before_later_guards() {
        let test = Test::And(vec![
            Test::LenEq {
                place: root(),
                len: 3,
            },
            Test::Guard(Expr::Literal(Literal::Bool(true), Span::synthetic())),
        ]);
        let mut guards = 0;
        assert!(!eval_test(&test, &Value::Seq(vec![]), &mut guards));
        assert_eq!(guards, 0);
    }

    #[test]
    fn closed_expressions_fold() {
        let expr = Expr::Binary {
            op: BinOp::Mul,
            lhs: Box::new(Expr::Literal(Literal::Int(6), Span::synthetic())),
            rhs: Box::new(Expr::Literal(Literal::Int(7), Span::synthetic())),
            span: Span::synthetic(),
        };
        assert_eq!(eval_expr(&expr), Some(Value::Int(42)));
        assert_eq!(
            eval_binary(BinOp::Div, Value::Int(1), Value::Int(0)),
            None
        );
    }
}
