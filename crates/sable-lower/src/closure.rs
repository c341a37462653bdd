//! Closure conversion.
//!
//! A closure literal becomes a synthesized nominal type holding the
//! captured state: one field per captured symbol, a constructor taking the
//! captures in order, the body as an instance method, and a callable field
//! bound to that method so the constructed value is directly invocable.
//! The capture list is determined structurally: every free variable used
//! in the body relative to the closure's own scope boundary.

use rustc_hash::{FxHashSet, FxHashMap};
use sable_ast::expr::{Block, Expr};
use sable_ast::item::{Param, Stmt};
use sable_ast::pat::Pattern;
use sable_common::{Span, SymbolId};
use sable_emit::{
    CodeSink, CtorHandle, FieldAttrs, FieldHandle, Instr, MethodAttrs, MethodHandle, TypeAttrs,
    TypeHandle,
};
use sable_types::TargetType;

/// One captured outer symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Capture {
    pub name: String,
    pub symbol: SymbolId,
    pub span: Span,
}

/// Collect the captured symbols of a closure body: names referenced in the
/// body that are neither parameters nor declared inside the body, filtered
/// through `is_capturable` (the engine admits only enclosing locals and
/// parameters; methods and types are reached directly, not captured).
///
/// Order is first use in a preorder walk, deduplicated by symbol; the
/// synthesized field order and constructor argument order both follow it.
pub fn collect_captures(
    params: &[Param],
    body: &Block,
    is_capturable: impl Fn(SymbolId) -> bool,
) -> Vec<Capture> {
    let mut scan = CaptureScan {
        declared: vec![params.iter().map(|p| p.name.clone()).collect()],
        seen: FxHashSet::default(),
        found: Vec::new(),
    };
    scan.block(body, &is_capturable);
    scan.found
}

struct CaptureScan {
    /// Names declared inside the closure, one set per nested block.
    declared: Vec<FxHashSet<String>>,
    seen: FxHashSet<SymbolId>,
    found: Vec<Capture>,
}

impl CaptureScan {
    fn is_declared(&self, name: &str) -> bool {
        self.declared.iter().any(|level| level.contains(name))
    }

    fn declare(&mut self, name: &str) {
        if let Some(level) = self.declared.last_mut() {
            level.insert(name.to_string());
        }
    }

    fn declare_pattern(&mut self, pattern: &Pattern) {
        for name in pattern.binding_names() {
            self.declare(name);
        }
    }

    fn block(&mut self, block: &Block, is_capturable: &impl Fn(SymbolId) -> bool) {
        self.declared.push(FxHashSet::default());
        for stmt in &block.stmts {
            self.stmt(stmt, is_capturable);
        }
        if let Some(tail) = &block.tail {
            self.expr(tail, is_capturable);
        }
        self.declared.pop();
    }

    fn stmt(&mut self, stmt: &Stmt, is_capturable: &impl Fn(SymbolId) -> bool) {
        match stmt {
            Stmt::Let { pattern, init, .. } => {
                // Initializer first: `let x = x` captures the outer x.
                self.expr(init, is_capturable);
                self.declare_pattern(pattern);
            }
            Stmt::Assign { target, value, .. } => {
                self.expr(target, is_capturable);
                self.expr(value, is_capturable);
            }
            Stmt::Expr(e) => self.expr(e, is_capturable),
            Stmt::While { cond, body, .. } => {
                self.expr(cond, is_capturable);
                self.block(body, is_capturable);
            }
            Stmt::For {
                pattern,
                iterable,
                body,
                ..
            } => {
                self.expr(iterable, is_capturable);
                self.declared.push(FxHashSet::default());
                self.declare_pattern(pattern);
                self.block(body, is_capturable);
                self.declared.pop();
            }
            Stmt::Match {
                scrutinee, arms, ..
            } => {
                self.expr(scrutinee, is_capturable);
                for arm in arms {
                    self.declared.push(FxHashSet::default());
                    for pattern in &arm.patterns {
                        self.declare_pattern(pattern);
                    }
                    if let Some(guard) = &arm.guard {
                        self.expr(guard, is_capturable);
                    }
                    self.block(&arm.body, is_capturable);
                    self.declared.pop();
                }
            }
            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.expr(value, is_capturable);
                }
            }
            Stmt::Break { .. } | Stmt::Continue { .. } => {}
        }
    }

    fn expr(&mut self, expr: &Expr, is_capturable: &impl Fn(SymbolId) -> bool) {
        match expr {
            Expr::Name(name) => {
                if !self.is_declared(&name.name)
                    && !name.symbol.is_unbound()
                    && is_capturable(name.symbol)
                    && self.seen.insert(name.symbol)
                {
                    self.found.push(Capture {
                        name: name.name.clone(),
                        symbol: name.symbol,
                        span: name.span,
                    });
                }
            }
            Expr::Literal(..) => {}
            Expr::Field { base, .. } => self.expr(base, is_capturable),
            Expr::Call { callee, args, .. } => {
                self.expr(callee, is_capturable);
                for arg in args {
                    self.expr(arg, is_capturable);
                }
            }
            Expr::Binary { lhs, rhs, .. } => {
                self.expr(lhs, is_capturable);
                self.expr(rhs, is_capturable);
            }
            Expr::Unary { operand, .. } => self.expr(operand, is_capturable),
            Expr::Tuple { items, .. } | Expr::Seq { items, .. } => {
                for item in items {
                    self.expr(item, is_capturable);
                }
            }
            Expr::Range { start, end, .. } => {
                self.expr(start, is_capturable);
                self.expr(end, is_capturable);
            }
            Expr::If {
                cond,
                then_block,
                else_block,
                ..
            } => {
                self.expr(cond, is_capturable);
                self.block(then_block, is_capturable);
                if let Some(else_block) = else_block {
                    self.block(else_block, is_capturable);
                }
            }
            Expr::Match {
                scrutinee, arms, ..
            } => {
                self.expr(scrutinee, is_capturable);
                for arm in arms {
                    self.declared.push(FxHashSet::default());
                    for pattern in &arm.patterns {
                        self.declare_pattern(pattern);
                    }
                    if let Some(guard) = &arm.guard {
                        self.expr(guard, is_capturable);
                    }
                    self.block(&arm.body, is_capturable);
                    self.declared.pop();
                }
            }
            Expr::Closure { params, body, .. } => {
                // A nested closure's free variables relative to *this*
                // closure are still captures of this closure.
                self.declared.push(params.iter().map(|p| p.name.clone()).collect());
                self.block(body, is_capturable);
                self.declared.pop();
            }
            Expr::Block(block) => self.block(block, is_capturable),
        }
    }
}

/// A capture field of the synthesized type.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureField {
    pub name: String,
    pub symbol: SymbolId,
    pub handle: FieldHandle,
    pub ty: TargetType,
}

/// The shape of a synthesized capturing type. Produced by
/// [`synthesize_capture_type`]; the engine lowers the closure body into
/// `invoke` afterwards and emits the construction expression at the
/// closure literal's site.
#[derive(Debug, Clone)]
pub struct ClosureShape {
    pub type_name: String,
    pub handle: TypeHandle,
    pub ctor: CtorHandle,
    pub invoke: MethodHandle,
    pub call_field: FieldHandle,
    pub fields: Vec<CaptureField>,
    /// Capture symbol -> field, for free-variable substitution while the
    /// body is lowered as an instance method.
    pub by_symbol: FxHashMap<SymbolId, FieldHandle>,
}

/// Define the capturing type through the sink: fields for the captures,
/// a constructor storing them, the (empty, to-be-filled) invoke method,
/// and the callable self field bound to it.
pub fn synthesize_capture_type(
    sink: &mut dyn CodeSink,
    type_name: &str,
    captures: &[(Capture, TargetType)],
    param_types: &[TargetType],
    ret: Option<TargetType>,
) -> ClosureShape {
    let handle = sink.define_type(
        type_name,
        TypeAttrs {
            public: false,
            sealed: true,
        },
        &[],
    );

    let mut fields = Vec::with_capacity(captures.len());
    let mut by_symbol = FxHashMap::default();
    for (capture, ty) in captures {
        let field = sink.define_field(
            handle,
            &capture.name,
            ty.clone(),
            FieldAttrs {
                public: false,
                readonly: true,
                is_static: false,
            },
        );
        by_symbol.insert(capture.symbol, field);
        fields.push(CaptureField {
            name: capture.name.clone(),
            symbol: capture.symbol,
            handle: field,
            ty: ty.clone(),
        });
    }

    let callable_ty = TargetType::Callable {
        params: param_types.to_vec(),
        ret: ret.clone().map(Box::new),
    };
    let call_field = sink.define_field(
        handle,
        "call",
        callable_ty,
        FieldAttrs {
            public: true,
            readonly: true,
            is_static: false,
        },
    );

    let invoke = sink.define_method(
        handle,
        "invoke",
        MethodAttrs {
            public: true,
            is_static: false,
        },
        ret,
        param_types,
    );

    let ctor_params: Vec<TargetType> = captures.iter().map(|(_, ty)| ty.clone()).collect();
    let ctor = sink.define_constructor(handle, &ctor_params);

    // Constructor: store each capture argument into its field, then bind
    // the invoke method to self as the callable field.
    {
        let body = sink.ctor_body(ctor);
        for (index, field) in fields.iter().enumerate() {
            body.emit(Instr::LoadSelf);
            body.emit(Instr::LoadParam(index as u16));
            body.emit(Instr::StoreField(field.handle));
        }
        body.emit(Instr::LoadSelf);
        body.emit(Instr::LoadSelf);
        body.emit(Instr::BindMethod { method: invoke });
        body.emit(Instr::StoreField(call_field));
        body.emit(Instr::Ret);
    }

    ClosureShape {
        type_name: type_name.to_string(),
        handle,
        ctor,
        invoke,
        call_field,
        fields,
        by_symbol,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_ast::expr::{BinOp, Literal, NameRef};
    use sable_ast::ty::TypeExpr;
    use sable_emit::RecordingSink;

    fn name(text: &str, id: u32) -> Expr {
        Expr::Name(NameRef {
            name: text.into(),
            symbol: SymbolId(id),
            span: Span::synthetic(),
        })
    }

    fn param(text: &str, id: u32) -> Param {
        Param {
            name: text.into(),
            symbol: SymbolId(id),
            ty: TypeExpr::named("Int"),
            span: Span::synthetic(),
        }
    }

    fn body_of(expr: Expr) -> Block {
        Block {
            stmts: Vec::new(),
            tail: Some(Box::new(expr)),
            span: Span::synthetic(),
        }
    }

    #[test]
    fn params_and_locals_are_not_captured() {
        // fn(p) { let q = p; q + outer }
        let body = Block {
            stmts: vec![Stmt::Let {
                pattern: Pattern::Ident {
                    name: "q".into(),
                    symbol: SymbolId(2),
                    inner: None,
                    span: Span::synthetic(),
                },
                ty: None,
                init: name("p", 1),
                span: Span::synthetic(),
            }],
            tail: Some(Box::new(Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(name("q", 2)),
                rhs: Box::new(name("outer", 9)),
                span: Span::synthetic(),
            })),
            span: Span::synthetic(),
        };
        let captures = collect_captures(&[param("p", 1)], &body, |_| true);
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].name, "outer");
        assert_eq!(captures[0].symbol, SymbolId(9));
    }

    #[test]
    fn capture_order_is_first_use_deduplicated() {
        // fn() { b + a + b }
        let body = body_of(Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Binary {
                op: BinOp::Add,
                lhs: Box::new(name("b", 5)),
                rhs: Box::new(name("a", 4)),
                span: Span::synthetic(),
            }),
            rhs: Box::new(name("b", 5)),
            span: Span::synthetic(),
        });
        let captures = collect_captures(&[], &body, |_| true);
        let names: Vec<_> = captures.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a"]);
    }

    #[test]
    fn uncapturable_symbols_are_skipped() {
        let body = body_of(Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(name("method", 3)),
            rhs: Box::new(name("local", 4)),
            span: Span::synthetic(),
        });
        let captures = collect_captures(&[], &body, |id| id == SymbolId(4));
        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].name, "local");
    }

    #[test]
    fn literal_only_body_captures_nothing() {
        let body = body_of(Expr::Literal(Literal::Int(1), Span::synthetic()));
        assert!(collect_captures(&[], &body, |_| true).is_empty());
    }

    #[test]
    fn synthesized_type_has_one_field_per_capture() {
        let mut sink = RecordingSink::new();
        let captures = vec![
            (
                Capture {
                    name: "a".into(),
                    symbol: SymbolId(1),
                    span: Span::synthetic(),
                },
                TargetType::Int,
            ),
            (
                Capture {
                    name: "b".into(),
                    symbol: SymbolId(2),
                    span: Span::synthetic(),
                },
                TargetType::Str,
            ),
        ];
        let shape = synthesize_capture_type(
            &mut sink,
            "app/__closure_1",
            &captures,
            &[TargetType::Int],
            Some(TargetType::Int),
        );

        let recorded = sink.type_named("app/__closure_1").unwrap();
        // Two capture fields plus the callable field.
        assert_eq!(recorded.fields.len(), 3);
        assert_eq!(recorded.field_named("a").unwrap().ty, TargetType::Int);
        assert_eq!(recorded.field_named("b").unwrap().ty, TargetType::Str);
        assert_eq!(recorded.ctors[0].params.len(), 2);

        // The constructor stores both captures and binds the callable.
        let ctor_body = sink.ctor_body_of(shape.ctor);
        assert!(ctor_body
            .instrs
            .contains(&Instr::BindMethod { method: shape.invoke }));
        let stores = ctor_body
            .instrs
            .iter()
            .filter(|i| matches!(i, Instr::StoreField(_)))
            .count();
        assert_eq!(stores, 3);
    }
}
