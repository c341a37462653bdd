//! The two-pass lowering engine.
//!
//! A unit is lowered in two traversals over the same scope tree. The
//! declare pass defines every nominal type and method signature through
//! the sink and registers the resulting handles in the global symbol
//! registry; the body pass re-descends the tree in the identical order
//! and lowers each function body against those registrations. Imports
//! are lowered recursively before the importing unit, each with its own
//! cursor over its own tree.
//!
//! Top-level functions become static methods of a synthesized module
//! container type, records and enums become sealed nominal types, and
//! closures become capture types (see `closure`).

use rustc_hash::FxHashMap;
use std::path::PathBuf;
use tracing::debug;

use sable_ast::expr::{BinOp, Block, Expr, Literal, MatchArm, UnOp};
use sable_ast::item::{EnumDecl, FnDecl, Item, RecordDecl, Stmt, Unit};
use sable_ast::pat::Pattern;
use sable_ast::scope::ScopeTree;
use sable_ast::ty::TypeExpr;
use sable_common::{LowerError, LowerErrorKind, Span, SymbolId};
use sable_emit::{
    ArithOp, BodySink, CmpOp, CodeSink, Const, CtorHandle, FieldAttrs, FieldHandle, Instr,
    LabelId, MethodAttrs, TypeAttrs, TypeHandle,
};
use sable_types::{StaticCatalog, TargetType, TypeCatalog, TypeResolver};

use crate::body::BodyBuf;
use crate::closure::{collect_captures, synthesize_capture_type, Capture};
use crate::cursor::ScopeCursor;
use crate::meta::{EnumInfo, FieldInfo, RecordInfo, UnitMeta, VariantInfo};
use crate::pattern::{Bind, Compiled, PatternCompiler, Place, Test};
use crate::registry::{Artifact, MethodSig, SymbolRegistry};

/// Optimization level requested by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BuildKind {
    #[default]
    Debug,
    Release,
}

/// The output artifact shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmitKind {
    #[default]
    Library,
    Executable,
}

/// Driver options for one compilation run.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub out_path: PathBuf,
    pub build_kind: BuildKind,
    pub emit_kind: EmitKind,
}

/// Lower a unit (imports included) into the sink. The sink is left
/// unfinalized; the driver finalizes after all units are in.
pub fn compile_unit(
    unit: &Unit,
    externals: &[&dyn TypeCatalog],
    sink: &mut dyn CodeSink,
    options: &BuildOptions,
) -> Result<(), LowerError> {
    debug!(
        unit = %unit.name,
        build = ?options.build_kind,
        emit = ?options.emit_kind,
        "lowering unit"
    );
    let mut lowerer = Lowerer::new(sink, externals);
    lowerer.lower_unit(unit)
}

/// Break/continue targets of one active loop.
#[derive(Debug, Clone, Copy)]
struct LoopFrame {
    break_to: LabelId,
    continue_to: LabelId,
}

/// The per-unit traversal state: swapped wholesale when the engine
/// recurses into an import, restored when it returns.
struct UnitCx<'a> {
    name: &'a str,
    scopes: &'a ScopeTree,
    cursor: ScopeCursor,
    module_type: TypeHandle,
}

/// The lowering engine. One per compilation run; the registry, the unit
/// catalog, and the metadata tables accumulate across every unit lowered
/// through it.
pub struct Lowerer<'a> {
    sink: &'a mut dyn CodeSink,
    externals: &'a [&'a dyn TypeCatalog],
    registry: SymbolRegistry,
    /// Types defined by lowered units, by qualified name. Searched before
    /// the external catalogs.
    unit_catalog: StaticCatalog,
    meta: UnitMeta,
    loops: Vec<LoopFrame>,
    /// Capture substitution maps, one per closure body currently being
    /// lowered (innermost last).
    capture_stack: Vec<FxHashMap<SymbolId, (FieldHandle, TargetType)>>,
    current_params: Vec<TargetType>,
    closure_counter: u32,
}

impl<'a> Lowerer<'a> {
    pub fn new(sink: &'a mut dyn CodeSink, externals: &'a [&'a dyn TypeCatalog]) -> Self {
        Lowerer {
            sink,
            externals,
            registry: SymbolRegistry::new(),
            unit_catalog: StaticCatalog::core(),
            meta: UnitMeta::new(),
            loops: Vec::new(),
            capture_stack: Vec::new(),
            current_params: Vec::new(),
            closure_counter: 0,
        }
    }

    pub fn registry(&self) -> &SymbolRegistry {
        &self.registry
    }

    /// Lower one unit and everything it imports. Imports go first so the
    /// importing unit resolves against their definitions.
    pub fn lower_unit(&mut self, unit: &'a Unit) -> Result<(), LowerError> {
        for import in &unit.imports {
            self.lower_unit(import)?;
        }

        let module_type = self.sink.define_type(
            &format!("{}/Module", unit.name),
            TypeAttrs {
                public: true,
                sealed: true,
            },
            &[],
        );
        let mut cx = UnitCx {
            name: &unit.name,
            scopes: &unit.scopes,
            cursor: ScopeCursor::at_root(),
            module_type,
        };

        debug!(unit = %unit.name, "declare pass");
        self.declare_pass(&mut cx, unit)?;

        cx.cursor = ScopeCursor::at_root();
        debug!(unit = %unit.name, "body pass");
        self.body_pass(&mut cx, unit)?;
        Ok(())
    }

    // ── declare pass ──────────────────────────────────────────────────

    /// Register every signature of the unit: type shells first (so field
    /// and parameter annotations can refer to any unit type regardless of
    /// declaration order), then members, then functions. Only function
    /// items own scopes, so the cursor moves during the function round
    /// alone.
    fn declare_pass(&mut self, cx: &mut UnitCx<'a>, unit: &'a Unit) -> Result<(), LowerError> {
        let mut shells: FxHashMap<&str, TypeHandle> = FxHashMap::default();
        for item in &unit.items {
            match item {
                Item::Record(r) => {
                    shells.insert(&r.name, self.declare_type_shell(cx, &r.name, false));
                }
                Item::Enum(e) => {
                    shells.insert(&e.name, self.declare_type_shell(cx, &e.name, true));
                }
                Item::Function(_) => {}
            }
        }

        for item in &unit.items {
            match item {
                Item::Record(r) => self.declare_record(cx, r, shells[r.name.as_str()])?,
                Item::Enum(e) => self.declare_enum(cx, e, shells[e.name.as_str()])?,
                Item::Function(_) => {}
            }
        }

        for item in &unit.items {
            if let Item::Function(f) = item {
                self.declare_function(cx, f)?;
            }
        }
        Ok(())
    }

    fn declare_type_shell(&mut self, cx: &UnitCx<'a>, name: &str, sealed: bool) -> TypeHandle {
        let qualified = format!("{}/{}", cx.name, name);
        let handle = self.sink.define_type(
            &qualified,
            TypeAttrs {
                public: true,
                sealed,
            },
            &[],
        );
        // Annotations refer to unit types by bare name; both keys resolve.
        self.unit_catalog
            .insert(name, TargetType::named(qualified.clone()));
        self.unit_catalog
            .insert(qualified.clone(), TargetType::named(qualified));
        handle
    }

    fn declare_record(
        &mut self,
        cx: &UnitCx<'a>,
        decl: &RecordDecl,
        handle: TypeHandle,
    ) -> Result<(), LowerError> {
        let ty = TargetType::named(format!("{}/{}", cx.name, decl.name));

        let mut fields = Vec::with_capacity(decl.fields.len());
        for field in &decl.fields {
            let fty = self.resolve_ty(&field.ty)?;
            let fh = self.sink.define_field(
                handle,
                &field.name,
                fty.clone(),
                FieldAttrs {
                    public: true,
                    readonly: false,
                    is_static: false,
                },
            );
            self.registry.register(
                field.symbol,
                Artifact::Field {
                    handle: fh,
                    owner: handle,
                    ty: fty.clone(),
                    is_static: false,
                },
                field.span,
            )?;
            fields.push(FieldInfo {
                name: field.name.clone(),
                handle: fh,
                ty: fty,
            });
        }

        let ctor_params: Vec<TargetType> = fields.iter().map(|f| f.ty.clone()).collect();
        let ctor = self.sink.define_constructor(handle, &ctor_params);
        {
            let body = self.sink.ctor_body(ctor);
            for (index, field) in fields.iter().enumerate() {
                body.emit(Instr::LoadSelf);
                body.emit(Instr::LoadParam(index as u16));
                body.emit(Instr::StoreField(field.handle));
            }
            body.emit(Instr::Ret);
        }

        self.registry.register(
            decl.symbol,
            Artifact::Type {
                handle,
                ty: ty.clone(),
                ctor: Some(ctor),
            },
            decl.span,
        )?;
        self.meta.records.insert(
            decl.name.clone(),
            RecordInfo {
                handle,
                ty,
                ctor,
                fields,
            },
        );
        Ok(())
    }

    /// An enum lowers to a single sealed type: an `Int` tag field, one
    /// payload field per variant slot, and a constructor taking the tag.
    /// Variants with a raw value also get a static constant field and a
    /// member artifact on their symbol.
    fn declare_enum(
        &mut self,
        cx: &UnitCx<'a>,
        decl: &EnumDecl,
        handle: TypeHandle,
    ) -> Result<(), LowerError> {
        let ty = TargetType::named(format!("{}/{}", cx.name, decl.name));

        let tag_field = self.sink.define_field(
            handle,
            "tag",
            TargetType::Int,
            FieldAttrs {
                public: true,
                readonly: true,
                is_static: false,
            },
        );
        let ctor = self.sink.define_constructor(handle, &[TargetType::Int]);
        {
            let body = self.sink.ctor_body(ctor);
            body.emit(Instr::LoadSelf);
            body.emit(Instr::LoadParam(0));
            body.emit(Instr::StoreField(tag_field));
            body.emit(Instr::Ret);
        }

        let mut variants = Vec::with_capacity(decl.variants.len());
        for (tag, vdecl) in decl.variants.iter().enumerate() {
            let mut payload = Vec::with_capacity(vdecl.fields.len());
            for (slot, field) in vdecl.fields.iter().enumerate() {
                let fty = self.resolve_ty(&field.ty)?;
                let fname = format!("{}_{}", vdecl.name, slot);
                let fh = self.sink.define_field(
                    handle,
                    &fname,
                    fty.clone(),
                    FieldAttrs {
                        public: true,
                        readonly: false,
                        is_static: false,
                    },
                );
                self.registry.register(
                    field.symbol,
                    Artifact::Field {
                        handle: fh,
                        owner: handle,
                        ty: fty.clone(),
                        is_static: false,
                    },
                    field.span,
                )?;
                payload.push(FieldInfo {
                    name: fname,
                    handle: fh,
                    ty: fty,
                });
            }

            self.registry.register(
                vdecl.symbol,
                Artifact::Type {
                    handle,
                    ty: ty.clone(),
                    ctor: Some(ctor),
                },
                vdecl.span,
            )?;
            if vdecl.raw.is_some() {
                let raw_field = self.sink.define_field(
                    handle,
                    &vdecl.name,
                    TargetType::Int,
                    FieldAttrs {
                        public: true,
                        readonly: true,
                        is_static: true,
                    },
                );
                self.registry.register_member(
                    vdecl.symbol,
                    Artifact::Field {
                        handle: raw_field,
                        owner: handle,
                        ty: TargetType::Int,
                        is_static: true,
                    },
                    vdecl.span,
                )?;
            }

            variants.push(VariantInfo {
                name: vdecl.name.clone(),
                symbol: vdecl.symbol,
                tag: tag as i64,
                raw: vdecl.raw,
                payload,
            });
        }

        self.registry.register(
            decl.symbol,
            Artifact::Type {
                handle,
                ty: ty.clone(),
                ctor: None,
            },
            decl.span,
        )?;
        self.meta.enums.insert(
            decl.name.clone(),
            EnumInfo {
                handle,
                ty,
                ctor,
                tag_field,
                variants,
            },
        );
        Ok(())
    }

    fn declare_function(&mut self, cx: &mut UnitCx<'a>, decl: &FnDecl) -> Result<(), LowerError> {
        let params = decl
            .params
            .iter()
            .map(|p| self.resolve_ty(&p.ty))
            .collect::<Result<Vec<_>, _>>()?;
        let ret = match &decl.ret {
            Some(r) => Some(self.resolve_ty(r)?),
            None => None,
        };

        // Same name plus same arity cannot be told apart at a call site.
        if let Some(sigs) = self.meta.methods.get(&decl.name) {
            if sigs.iter().any(|s| s.params.len() == params.len()) {
                return Err(LowerError::new(
                    LowerErrorKind::AmbiguousOverload(decl.name.clone()),
                    decl.span,
                ));
            }
        }

        let handle = self.sink.define_method(
            cx.module_type,
            &decl.name,
            MethodAttrs {
                public: true,
                is_static: true,
            },
            ret.clone(),
            &params,
        );
        let sig = MethodSig {
            handle,
            owner: cx.module_type,
            params: params.clone(),
            ret,
            is_static: true,
        };
        self.registry
            .register(decl.symbol, Artifact::Method(sig.clone()), decl.span)?;
        self.meta
            .methods
            .entry(decl.name.clone())
            .or_default()
            .push(sig);

        cx.cursor.descend(cx.scopes, decl.span)?;
        for (index, param) in decl.params.iter().enumerate() {
            self.registry.register(
                param.symbol,
                Artifact::Param {
                    index: index as u16,
                    ty: params[index].clone(),
                },
                param.span,
            )?;
        }
        cx.cursor.ascend(cx.scopes);
        Ok(())
    }

    // ── body pass ─────────────────────────────────────────────────────

    fn body_pass(&mut self, cx: &mut UnitCx<'a>, unit: &'a Unit) -> Result<(), LowerError> {
        for item in &unit.items {
            if let Item::Function(f) = item {
                debug!(unit = %cx.name, function = %f.name, "lowering body");
                self.lower_function(cx, f)?;
            }
        }
        Ok(())
    }

    fn lower_function(&mut self, cx: &mut UnitCx<'a>, decl: &FnDecl) -> Result<(), LowerError> {
        let sig = match &self.registry.lookup(decl.symbol, decl.span)?.primary {
            Artifact::Method(sig) => sig.clone(),
            _ => {
                return Err(LowerError::new(
                    LowerErrorKind::SymbolNotFound(decl.symbol),
                    decl.span,
                ))
            }
        };
        self.current_params = sig.params.clone();

        let mut buf = BodyBuf::new();
        let tail = self.in_child_scope(cx, decl.span, |me, cx| {
            me.lower_block(cx, &mut buf, &decl.body)
        })?;
        match tail {
            Some(_) => buf.emit(Instr::Ret),
            None => {
                if buf.instrs().last() != Some(&Instr::Ret) {
                    buf.emit(Instr::Ret);
                }
            }
        }
        buf.flush_into(self.sink.method_body(sig.handle));
        Ok(())
    }

    /// Descend into the next child scope for the duration of `f`. The
    /// ascend runs on every exit path, errors included, keeping the two
    /// traversals in lockstep.
    fn in_child_scope<T>(
        &mut self,
        cx: &mut UnitCx<'a>,
        span: Span,
        f: impl FnOnce(&mut Self, &mut UnitCx<'a>) -> Result<T, LowerError>,
    ) -> Result<T, LowerError> {
        cx.cursor.descend(cx.scopes, span)?;
        let out = f(self, cx);
        cx.cursor.ascend(cx.scopes);
        out
    }

    // ── statements ────────────────────────────────────────────────────

    fn lower_block(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        block: &Block,
    ) -> Result<Option<TargetType>, LowerError> {
        for stmt in &block.stmts {
            self.lower_stmt(cx, body, stmt)?;
        }
        match &block.tail {
            Some(tail) => self.lower_expr(cx, body, tail),
            None => Ok(None),
        }
    }

    fn lower_stmt(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        stmt: &Stmt,
    ) -> Result<(), LowerError> {
        match stmt {
            Stmt::Let {
                pattern,
                ty,
                init,
                span,
            } => self.lower_let(cx, body, pattern, ty.as_ref(), init, *span),

            Stmt::Assign {
                target,
                value,
                span,
            } => self.lower_assign(cx, body, target, value, *span),

            Stmt::Expr(expr) => {
                if self.lower_expr(cx, body, expr)?.is_some() {
                    body.emit(Instr::Pop);
                }
                Ok(())
            }

            Stmt::While { cond, body: wbody, span } => {
                let check = body.fresh_label();
                let done = body.fresh_label();
                body.emit(Instr::Label(check));
                self.lower_value(cx, body, cond)?;
                body.emit(Instr::Branch {
                    when: false,
                    to: done,
                });
                self.loops.push(LoopFrame {
                    break_to: done,
                    continue_to: check,
                });
                let val = self.in_child_scope(cx, *span, |me, cx| {
                    me.lower_block(cx, body, wbody)
                });
                self.loops.pop();
                if val?.is_some() {
                    body.emit(Instr::Pop);
                }
                body.emit(Instr::Jump(check));
                body.emit(Instr::Label(done));
                Ok(())
            }

            Stmt::For {
                pattern,
                iterable,
                body: fbody,
                span,
            } => {
                if let Expr::Range { start, end, .. } = iterable {
                    self.lower_for_range(cx, body, pattern, start, end, fbody, *span)
                } else {
                    self.lower_for_enumerable(cx, body, pattern, iterable, fbody, *span)
                }
            }

            Stmt::Match {
                scrutinee,
                arms,
                span,
            } => self
                .lower_match(cx, body, scrutinee, arms, false, *span)
                .map(|_| ()),

            Stmt::Break { levels, span } => {
                let frame = self.jump_target(*levels, *span)?;
                body.emit(Instr::Jump(frame.break_to));
                Ok(())
            }

            Stmt::Continue { levels, span } => {
                let frame = self.jump_target(*levels, *span)?;
                body.emit(Instr::Jump(frame.continue_to));
                Ok(())
            }

            Stmt::Return { value, .. } => {
                if let Some(value) = value {
                    self.lower_value(cx, body, value)?;
                }
                body.emit(Instr::Ret);
                Ok(())
            }
        }
    }

    fn lower_let(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        pattern: &Pattern,
        annotation: Option<&TypeExpr>,
        init: &Expr,
        _span: Span,
    ) -> Result<(), LowerError> {
        let annotated = match annotation.filter(|t| !t.is_pending()) {
            Some(t) => Some(self.resolve_ty(t)?),
            None => None,
        };

        if let Pattern::Ident {
            symbol,
            inner: None,
            span,
            ..
        } = pattern
        {
            let ity = self.lower_value(cx, body, init)?;
            let ty = annotated.unwrap_or(ity);
            let slot = body.declare_local(ty.clone());
            body.emit(Instr::StoreLocal(slot));
            self.registry.register(
                *symbol,
                Artifact::Local {
                    slot,
                    ty,
                    defined: true,
                },
                *span,
            )?;
            return Ok(());
        }

        if !pattern.is_irrefutable() {
            return Err(LowerError::new(
                LowerErrorKind::UnsupportedConstruct("refutable pattern in a let binding"),
                pattern.span(),
            ));
        }

        // Destructuring: materialize the initializer once, then copy each
        // projection out. Refutability was rejected above, so the shape
        // tests the compiler produces hold by typing and are not emitted.
        let ity = self.lower_value(cx, body, init)?;
        let temp = body.declare_local(annotated.unwrap_or(ity));
        body.emit(Instr::StoreLocal(temp));
        let compiled = self.compile_patterns(std::slice::from_ref(pattern), &Place::Local(temp))?;
        for bind in &compiled.binds {
            self.emit_bind(body, bind)?;
        }
        Ok(())
    }

    fn lower_assign(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        target: &Expr,
        value: &Expr,
        span: Span,
    ) -> Result<(), LowerError> {
        match target {
            Expr::Name(n) => {
                if self
                    .capture_stack
                    .last()
                    .is_some_and(|f| f.contains_key(&n.symbol))
                {
                    return Err(LowerError::new(
                        LowerErrorKind::UnsupportedConstruct("assignment to a captured value"),
                        n.span,
                    ));
                }
                let slot = match &self.registry.lookup(n.symbol, n.span)?.primary {
                    Artifact::Local { slot, .. } => *slot,
                    _ => {
                        return Err(LowerError::new(
                            LowerErrorKind::UnsupportedConstruct(
                                "assignment target is not a local",
                            ),
                            n.span,
                        ))
                    }
                };
                self.lower_value(cx, body, value)?;
                body.emit(Instr::StoreLocal(slot));
                self.registry.mark_local_defined(n.symbol);
                Ok(())
            }

            Expr::Field { base, field, span } => {
                let bty = self.lower_value(cx, body, base)?;
                let finfo = self
                    .meta
                    .record_by_type(&bty)
                    .and_then(|r| r.field(field))
                    .cloned()
                    .ok_or_else(|| {
                        LowerError::new(
                            LowerErrorKind::TypeNotFound(format!("{bty}.{field}")),
                            *span,
                        )
                    })?;
                self.lower_value(cx, body, value)?;
                body.emit(Instr::StoreField(finfo.handle));
                Ok(())
            }

            _ => Err(LowerError::new(
                LowerErrorKind::UnsupportedConstruct("unsupported assignment target"),
                span,
            )),
        }
    }

    // ── loops ─────────────────────────────────────────────────────────

    /// A literal-range loop avoids the enumerator entirely: counter and
    /// limit locals with an increment at the continue label.
    #[allow(clippy::too_many_arguments)]
    fn lower_for_range(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        pattern: &Pattern,
        start: &Expr,
        end: &Expr,
        fbody: &Block,
        span: Span,
    ) -> Result<(), LowerError> {
        let cur = body.declare_local(TargetType::Int);
        let limit = body.declare_local(TargetType::Int);
        self.lower_value(cx, body, start)?;
        body.emit(Instr::StoreLocal(cur));
        self.lower_value(cx, body, end)?;
        body.emit(Instr::StoreLocal(limit));

        let check = body.fresh_label();
        let advance = body.fresh_label();
        let done = body.fresh_label();

        body.emit(Instr::Label(check));
        body.emit(Instr::LoadLocal(cur));
        body.emit(Instr::LoadLocal(limit));
        body.emit(Instr::Cmp(CmpOp::Lt));
        body.emit(Instr::Branch {
            when: false,
            to: done,
        });

        let Compiled { test, binds } =
            self.compile_patterns(std::slice::from_ref(pattern), &Place::Local(cur))?;
        let frame = LoopFrame {
            break_to: done,
            continue_to: advance,
        };
        self.in_child_scope(cx, span, |me, cx| {
            if test != Test::Always {
                me.emit_test(cx, body, test, span)?;
                body.emit(Instr::Branch {
                    when: false,
                    to: advance,
                });
            }
            for bind in &binds {
                me.emit_bind(body, bind)?;
            }
            me.loops.push(frame);
            let val = me.lower_block(cx, body, fbody);
            me.loops.pop();
            if val?.is_some() {
                body.emit(Instr::Pop);
            }
            Ok(())
        })?;

        body.emit(Instr::Label(advance));
        body.emit(Instr::LoadLocal(cur));
        body.emit(Instr::Const(Const::Int(1)));
        body.emit(Instr::Arith(ArithOp::Add));
        body.emit(Instr::StoreLocal(cur));
        body.emit(Instr::Jump(check));
        body.emit(Instr::Label(done));
        Ok(())
    }

    /// The general strategy: acquire an enumerator over the iterable and
    /// advance it each round. Map iteration comes back as key/value
    /// tuples, so a tuple pattern projects both sides.
    fn lower_for_enumerable(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        pattern: &Pattern,
        iterable: &Expr,
        fbody: &Block,
        span: Span,
    ) -> Result<(), LowerError> {
        let ity = self.lower_value(cx, body, iterable)?;
        let elem = element_type(&ity, span)?;
        body.emit(Instr::IterInit);
        let en = body.declare_local(TargetType::Named {
            qualified: "core/Enumerator`1".into(),
            args: vec![elem.clone()],
        });
        body.emit(Instr::StoreLocal(en));

        let check = body.fresh_label();
        let done = body.fresh_label();

        body.emit(Instr::Label(check));
        body.emit(Instr::LoadLocal(en));
        body.emit(Instr::IterAdvance);
        body.emit(Instr::Branch {
            when: false,
            to: done,
        });
        body.emit(Instr::LoadLocal(en));
        body.emit(Instr::IterCurrent);
        let cur = body.declare_local(elem);
        body.emit(Instr::StoreLocal(cur));

        let Compiled { test, binds } =
            self.compile_patterns(std::slice::from_ref(pattern), &Place::Local(cur))?;
        let frame = LoopFrame {
            break_to: done,
            continue_to: check,
        };
        self.in_child_scope(cx, span, |me, cx| {
            if test != Test::Always {
                me.emit_test(cx, body, test, span)?;
                body.emit(Instr::Branch {
                    when: false,
                    to: check,
                });
            }
            for bind in &binds {
                me.emit_bind(body, bind)?;
            }
            me.loops.push(frame);
            let val = me.lower_block(cx, body, fbody);
            me.loops.pop();
            if val?.is_some() {
                body.emit(Instr::Pop);
            }
            Ok(())
        })?;

        body.emit(Instr::Jump(check));
        body.emit(Instr::Label(done));
        Ok(())
    }

    fn jump_target(&self, levels: usize, span: Span) -> Result<LoopFrame, LowerError> {
        if levels == 0 || levels > self.loops.len() {
            return Err(LowerError::new(
                LowerErrorKind::InvalidJumpDepth {
                    requested: levels,
                    active: self.loops.len(),
                },
                span,
            ));
        }
        Ok(self.loops[self.loops.len() - levels])
    }

    // ── match ─────────────────────────────────────────────────────────

    /// Lower a match as a first-match-wins if/else-if ladder. The
    /// scrutinee is materialized once; each arm's test branches to the
    /// next arm on failure, its binds execute before the guard, and the
    /// guard branches to the next arm on failure. A match in value
    /// position stores every arm value into a shared result local.
    fn lower_match(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        scrutinee: &Expr,
        arms: &[MatchArm],
        as_value: bool,
        _span: Span,
    ) -> Result<Option<TargetType>, LowerError> {
        let sty = self.lower_value(cx, body, scrutinee)?;
        let scrut = body.declare_local(sty);
        body.emit(Instr::StoreLocal(scrut));

        let end = body.fresh_label();
        let mut result: Option<(sable_emit::LocalId, TargetType)> = None;

        for arm in arms {
            let next = body.fresh_label();
            let Compiled { test, binds } =
                self.compile_patterns(&arm.patterns, &Place::Local(scrut))?;
            if test != Test::Always {
                self.emit_test(cx, body, test, arm.span)?;
                body.emit(Instr::Branch {
                    when: false,
                    to: next,
                });
            }

            self.in_child_scope(cx, arm.span, |me, cx| {
                for bind in &binds {
                    me.emit_bind(body, bind)?;
                }
                if let Some(guard) = &arm.guard {
                    me.lower_value(cx, body, guard)?;
                    body.emit(Instr::Branch {
                        when: false,
                        to: next,
                    });
                }
                let val = me.lower_block(cx, body, &arm.body)?;
                match (as_value, val) {
                    (true, Some(ty)) => {
                        let slot = match &result {
                            Some((slot, _)) => *slot,
                            None => {
                                let slot = body.declare_local(ty.clone());
                                result = Some((slot, ty));
                                slot
                            }
                        };
                        body.emit(Instr::StoreLocal(slot));
                    }
                    (false, Some(_)) => body.emit(Instr::Pop),
                    (_, None) => {}
                }
                Ok(())
            })?;

            body.emit(Instr::Jump(end));
            body.emit(Instr::Label(next));
        }

        body.emit(Instr::Label(end));
        match result {
            Some((slot, ty)) if as_value => {
                body.emit(Instr::LoadLocal(slot));
                Ok(Some(ty))
            }
            _ => Ok(None),
        }
    }

    // ── expressions ───────────────────────────────────────────────────

    /// Lower an expression that must leave a value on the stack.
    fn lower_value(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        expr: &Expr,
    ) -> Result<TargetType, LowerError> {
        self.lower_expr(cx, body, expr)?.ok_or_else(|| {
            LowerError::new(
                LowerErrorKind::UnsupportedConstruct("a value is required here"),
                expr.span(),
            )
        })
    }

    /// Lower an expression. `None` means nothing was pushed (a call to a
    /// method without a return value).
    fn lower_expr(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        expr: &Expr,
    ) -> Result<Option<TargetType>, LowerError> {
        match expr {
            Expr::Literal(lit, _) => {
                let (instr, ty) = match lit {
                    Literal::Int(v) => (Const::Int(*v), TargetType::Int),
                    Literal::Float(v) => (Const::Float(*v), TargetType::Float),
                    Literal::Bool(v) => (Const::Bool(*v), TargetType::Bool),
                    Literal::Str(v) => (Const::Str(v.clone()), TargetType::Str),
                    Literal::Unit => (Const::Unit, TargetType::Unit),
                };
                body.emit(Instr::Const(instr));
                Ok(Some(ty))
            }

            Expr::Name(n) => self.lower_name(cx, body, n.symbol, n.span),

            Expr::Field { base, field, span } => {
                if let Some((ety, ctor, variant)) = self.qualified_variant(base, field) {
                    return self.lower_variant_ctor(cx, body, ety, ctor, variant, &[], *span);
                }
                let bty = self.lower_value(cx, body, base)?;
                let finfo = self.field_of(&bty, field, *span)?;
                body.emit(Instr::LoadField(finfo.handle));
                Ok(Some(finfo.ty))
            }

            Expr::Call { callee, args, span } => self.lower_call(cx, body, callee, args, *span),

            Expr::Binary { op, lhs, rhs, span } => {
                self.lower_binary(cx, body, *op, lhs, rhs, *span)
            }

            Expr::Unary { op, operand, .. } => {
                let ty = self.lower_value(cx, body, operand)?;
                match op {
                    UnOp::Neg => {
                        body.emit(Instr::Neg);
                        Ok(Some(ty))
                    }
                    UnOp::Not => {
                        body.emit(Instr::Not);
                        Ok(Some(TargetType::Bool))
                    }
                }
            }

            Expr::Tuple { items, .. } => {
                let mut types = Vec::with_capacity(items.len());
                for item in items {
                    types.push(self.lower_value(cx, body, item)?);
                }
                body.emit(Instr::TupleNew { len: items.len() });
                Ok(Some(TargetType::Tuple(types)))
            }

            Expr::Seq { items, .. } => {
                let mut elem = TargetType::Unit;
                for (index, item) in items.iter().enumerate() {
                    let ty = self.lower_value(cx, body, item)?;
                    if index == 0 {
                        elem = ty;
                    }
                }
                body.emit(Instr::SeqNew { len: items.len() });
                Ok(Some(TargetType::Named {
                    qualified: "core/Seq`1".into(),
                    args: vec![elem],
                }))
            }

            Expr::Range { start, end, .. } => {
                self.lower_value(cx, body, start)?;
                self.lower_value(cx, body, end)?;
                body.emit(Instr::RangeNew);
                Ok(Some(TargetType::named("core/Range")))
            }

            Expr::If {
                cond,
                then_block,
                else_block,
                span,
            } => self.lower_if(cx, body, cond, then_block, else_block.as_ref(), *span),

            Expr::Match {
                scrutinee, arms, span,
            } => self.lower_match(cx, body, scrutinee, arms, true, *span),

            Expr::Closure {
                params,
                ret,
                body: cbody,
                span,
            } => self.lower_closure(cx, body, params, ret.as_ref(), cbody, *span),

            Expr::Block(block) => {
                self.in_child_scope(cx, block.span, |me, cx| me.lower_block(cx, body, block))
            }
        }
    }

    fn lower_name(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        symbol: SymbolId,
        span: Span,
    ) -> Result<Option<TargetType>, LowerError> {
        // Captured symbols resolve through the synthesized type's fields,
        // not the enclosing body's slots.
        if let Some((handle, ty)) = self
            .capture_stack
            .last()
            .and_then(|f| f.get(&symbol))
            .map(|(h, t)| (*h, t.clone()))
        {
            body.emit(Instr::LoadSelf);
            body.emit(Instr::LoadField(handle));
            return Ok(Some(ty));
        }

        let entry = self.registry.lookup(symbol, span)?.clone();
        match entry.primary {
            Artifact::Local { slot, ty, .. } => {
                body.emit(Instr::LoadLocal(slot));
                Ok(Some(ty))
            }
            Artifact::Param { index, ty } => {
                body.emit(Instr::LoadParam(index));
                Ok(Some(ty))
            }
            Artifact::Type { .. } => {
                let bits = self
                    .meta
                    .variant_by_symbol(symbol)
                    .map(|(info, v)| (info.ty.clone(), info.ctor, v.clone()));
                match bits {
                    Some((ety, ctor, variant)) => {
                        self.lower_variant_ctor(cx, body, ety, ctor, variant, &[], span)
                    }
                    None => Err(LowerError::new(
                        LowerErrorKind::UnsupportedConstruct("type name used as a value"),
                        span,
                    )),
                }
            }
            Artifact::Method(_) => Err(LowerError::new(
                LowerErrorKind::UnsupportedConstruct("function reference without a call"),
                span,
            )),
            Artifact::Field { .. } => Err(LowerError::new(
                LowerErrorKind::UnsupportedConstruct("field reference without a receiver"),
                span,
            )),
        }
    }

    fn lower_call(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        callee: &Expr,
        args: &[Expr],
        span: Span,
    ) -> Result<Option<TargetType>, LowerError> {
        match callee {
            Expr::Name(n) => {
                let entry = self.registry.lookup(n.symbol, n.span)?.clone();
                match entry.primary {
                    Artifact::Method(sig) => {
                        for arg in args {
                            self.lower_value(cx, body, arg)?;
                        }
                        body.emit(Instr::Call {
                            method: sig.handle,
                            argc: args.len(),
                        });
                        Ok(sig.ret)
                    }
                    Artifact::Type {
                        ty,
                        ctor: Some(ctor),
                        ..
                    } => {
                        let bits = self
                            .meta
                            .variant_by_symbol(n.symbol)
                            .map(|(info, v)| (info.ty.clone(), info.ctor, v.clone()));
                        match bits {
                            Some((ety, ec, variant)) => {
                                self.lower_variant_ctor(cx, body, ety, ec, variant, args, span)
                            }
                            None => {
                                for arg in args {
                                    self.lower_value(cx, body, arg)?;
                                }
                                body.emit(Instr::New {
                                    ctor,
                                    argc: args.len(),
                                });
                                Ok(Some(ty))
                            }
                        }
                    }
                    Artifact::Local { .. } | Artifact::Param { .. } => {
                        self.lower_value_call(cx, body, callee, args, span)
                    }
                    _ => Err(LowerError::new(
                        LowerErrorKind::UnsupportedConstruct("call target is not callable"),
                        span,
                    )),
                }
            }

            Expr::Field { base, field, .. } => {
                if let Some((ety, ctor, variant)) = self.qualified_variant(base, field) {
                    return self.lower_variant_ctor(cx, body, ety, ctor, variant, args, span);
                }
                let bty = self.lower_value(cx, body, base)?;
                let finfo = self.field_of(&bty, field, span)?;
                body.emit(Instr::LoadField(finfo.handle));
                match finfo.ty {
                    TargetType::Callable { ret, .. } => {
                        for arg in args {
                            self.lower_value(cx, body, arg)?;
                        }
                        body.emit(Instr::CallValue { argc: args.len() });
                        Ok(ret.map(|b| *b))
                    }
                    _ => Err(LowerError::new(
                        LowerErrorKind::UnsupportedConstruct("called field is not callable"),
                        span,
                    )),
                }
            }

            _ => self.lower_value_call(cx, body, callee, args, span),
        }
    }

    /// Call through a callable value: push it, push the arguments, invoke.
    fn lower_value_call(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        callee: &Expr,
        args: &[Expr],
        span: Span,
    ) -> Result<Option<TargetType>, LowerError> {
        let cty = self.lower_value(cx, body, callee)?;
        let TargetType::Callable { ret, .. } = cty else {
            return Err(LowerError::new(
                LowerErrorKind::UnsupportedConstruct("call target is not callable"),
                span,
            ));
        };
        for arg in args {
            self.lower_value(cx, body, arg)?;
        }
        body.emit(Instr::CallValue { argc: args.len() });
        Ok(ret.map(|b| *b))
    }

    fn lower_binary(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        _span: Span,
    ) -> Result<Option<TargetType>, LowerError> {
        // Logical operators short-circuit: the left value doubles as the
        // result when it decides the outcome.
        if matches!(op, BinOp::And | BinOp::Or) {
            let end = body.fresh_label();
            self.lower_value(cx, body, lhs)?;
            body.emit(Instr::Dup);
            body.emit(Instr::Branch {
                when: matches!(op, BinOp::Or),
                to: end,
            });
            body.emit(Instr::Pop);
            self.lower_value(cx, body, rhs)?;
            body.emit(Instr::Label(end));
            return Ok(Some(TargetType::Bool));
        }

        let lty = self.lower_value(cx, body, lhs)?;
        self.lower_value(cx, body, rhs)?;
        let result = match op {
            BinOp::Add => {
                body.emit(Instr::Arith(ArithOp::Add));
                lty
            }
            BinOp::Sub => {
                body.emit(Instr::Arith(ArithOp::Sub));
                lty
            }
            BinOp::Mul => {
                body.emit(Instr::Arith(ArithOp::Mul));
                lty
            }
            BinOp::Div => {
                body.emit(Instr::Arith(ArithOp::Div));
                lty
            }
            BinOp::Rem => {
                body.emit(Instr::Arith(ArithOp::Rem));
                lty
            }
            BinOp::Eq => {
                body.emit(Instr::Cmp(CmpOp::Eq));
                TargetType::Bool
            }
            BinOp::Ne => {
                body.emit(Instr::Cmp(CmpOp::Ne));
                TargetType::Bool
            }
            BinOp::Lt => {
                body.emit(Instr::Cmp(CmpOp::Lt));
                TargetType::Bool
            }
            BinOp::Le => {
                body.emit(Instr::Cmp(CmpOp::Le));
                TargetType::Bool
            }
            BinOp::Gt => {
                body.emit(Instr::Cmp(CmpOp::Gt));
                TargetType::Bool
            }
            BinOp::Ge => {
                body.emit(Instr::Cmp(CmpOp::Ge));
                TargetType::Bool
            }
            BinOp::And | BinOp::Or => unreachable!("handled above"),
        };
        Ok(Some(result))
    }

    fn lower_if(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        cond: &Expr,
        then_block: &Block,
        else_block: Option<&Block>,
        span: Span,
    ) -> Result<Option<TargetType>, LowerError> {
        self.lower_value(cx, body, cond)?;
        match else_block {
            None => {
                let end = body.fresh_label();
                body.emit(Instr::Branch {
                    when: false,
                    to: end,
                });
                self.in_child_scope(cx, then_block.span, |me, cx| {
                    if me.lower_block(cx, body, then_block)?.is_some() {
                        body.emit(Instr::Pop);
                    }
                    Ok(())
                })?;
                body.emit(Instr::Label(end));
                Ok(None)
            }
            Some(else_block) => {
                let else_l = body.fresh_label();
                let end = body.fresh_label();
                body.emit(Instr::Branch {
                    when: false,
                    to: else_l,
                });
                let then_val = self.in_child_scope(cx, then_block.span, |me, cx| {
                    me.lower_block(cx, body, then_block)
                })?;
                body.emit(Instr::Jump(end));
                body.emit(Instr::Label(else_l));
                let else_val = self.in_child_scope(cx, else_block.span, |me, cx| {
                    me.lower_block(cx, body, else_block)
                })?;
                body.emit(Instr::Label(end));
                if then_val.is_some() != else_val.is_some() {
                    return Err(LowerError::new(
                        LowerErrorKind::UnsupportedConstruct(
                            "if branches disagree on producing a value",
                        ),
                        span,
                    ));
                }
                Ok(then_val)
            }
        }
    }

    // ── closures ──────────────────────────────────────────────────────

    fn lower_closure(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        params: &[sable_ast::item::Param],
        ret: Option<&TypeExpr>,
        cbody: &Block,
        span: Span,
    ) -> Result<Option<TargetType>, LowerError> {
        let param_tys = params
            .iter()
            .map(|p| self.resolve_ty(&p.ty))
            .collect::<Result<Vec<_>, _>>()?;
        let ret_ty = match ret {
            Some(r) => Some(self.resolve_ty(r)?),
            None => None,
        };

        // Only enclosing locals, parameters, and captures of an enclosing
        // closure are capturable; types and methods are reached directly.
        let captures = collect_captures(params, cbody, |id| {
            if self
                .capture_stack
                .last()
                .is_some_and(|f| f.contains_key(&id))
            {
                return true;
            }
            matches!(
                self.registry.get(id).map(|e| &e.primary),
                Some(Artifact::Local { .. }) | Some(Artifact::Param { .. })
            )
        });

        let mut typed: Vec<(Capture, TargetType)> = Vec::with_capacity(captures.len());
        for capture in captures {
            let from_frame = self
                .capture_stack
                .last()
                .and_then(|f| f.get(&capture.symbol))
                .map(|(_, t)| t.clone());
            let ty = match from_frame {
                Some(ty) => ty,
                None => {
                    let entry = self.registry.lookup(capture.symbol, capture.span)?;
                    entry.primary.value_type().cloned().ok_or_else(|| {
                        LowerError::new(
                            LowerErrorKind::UnsupportedConstruct("captured symbol has no value"),
                            capture.span,
                        )
                    })?
                }
            };
            typed.push((capture, ty));
        }

        self.closure_counter += 1;
        let type_name = format!("{}/__closure_{}", cx.name, self.closure_counter);
        let shape = synthesize_capture_type(
            &mut *self.sink,
            &type_name,
            &typed,
            &param_tys,
            ret_ty.clone(),
        );

        for (index, param) in params.iter().enumerate() {
            self.registry.register(
                param.symbol,
                Artifact::Param {
                    index: index as u16,
                    ty: param_tys[index].clone(),
                },
                param.span,
            )?;
        }

        // Lower the body as the invoke method, with free variables
        // substituted through the capture fields. Loop context does not
        // cross the closure boundary.
        let mut frame = FxHashMap::default();
        for field in &shape.fields {
            frame.insert(field.symbol, (field.handle, field.ty.clone()));
        }
        self.capture_stack.push(frame);
        let saved_loops = std::mem::take(&mut self.loops);
        let saved_params = std::mem::replace(&mut self.current_params, param_tys.clone());

        let mut buf = BodyBuf::new();
        let lowered = self.in_child_scope(cx, span, |me, cx| me.lower_block(cx, &mut buf, cbody));

        self.capture_stack.pop();
        self.loops = saved_loops;
        self.current_params = saved_params;

        match lowered? {
            Some(_) => buf.emit(Instr::Ret),
            None => {
                if buf.instrs().last() != Some(&Instr::Ret) {
                    buf.emit(Instr::Ret);
                }
            }
        }
        buf.flush_into(self.sink.method_body(shape.invoke));

        // Construction at the closure site: current capture values as
        // constructor arguments, then the bound callable field.
        for (capture, _) in &typed {
            self.load_captured(body, capture)?;
        }
        body.emit(Instr::New {
            ctor: shape.ctor,
            argc: typed.len(),
        });
        body.emit(Instr::LoadField(shape.call_field));
        Ok(Some(TargetType::Callable {
            params: param_tys,
            ret: ret_ty.map(Box::new),
        }))
    }

    /// Push the current value of a captured symbol in the enclosing body.
    fn load_captured(&mut self, body: &mut BodyBuf, capture: &Capture) -> Result<(), LowerError> {
        if let Some((handle, _)) = self
            .capture_stack
            .last()
            .and_then(|f| f.get(&capture.symbol))
        {
            body.emit(Instr::LoadSelf);
            body.emit(Instr::LoadField(*handle));
            return Ok(());
        }
        match &self.registry.lookup(capture.symbol, capture.span)?.primary {
            Artifact::Local { slot, .. } => body.emit(Instr::LoadLocal(*slot)),
            Artifact::Param { index, .. } => body.emit(Instr::LoadParam(*index)),
            _ => {
                return Err(LowerError::new(
                    LowerErrorKind::UnsupportedConstruct("captured symbol has no storage"),
                    capture.span,
                ))
            }
        }
        Ok(())
    }

    // ── pattern emission ──────────────────────────────────────────────

    fn compile_patterns(
        &self,
        patterns: &[Pattern],
        scrutinee: &Place,
    ) -> Result<Compiled, LowerError> {
        PatternCompiler::new(&self.meta).compile_arm(patterns, None, scrutinee)
    }

    /// Emit a compiled test, leaving a single bool on the stack.
    fn emit_test(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        test: Test,
        span: Span,
    ) -> Result<(), LowerError> {
        match test {
            Test::Always => body.emit(Instr::Const(Const::Bool(true))),

            Test::And(parts) => {
                let fail = body.fresh_label();
                let end = body.fresh_label();
                for part in parts {
                    self.emit_test(cx, body, part, span)?;
                    body.emit(Instr::Branch {
                        when: false,
                        to: fail,
                    });
                }
                body.emit(Instr::Const(Const::Bool(true)));
                body.emit(Instr::Jump(end));
                body.emit(Instr::Label(fail));
                body.emit(Instr::Const(Const::Bool(false)));
                body.emit(Instr::Label(end));
            }

            Test::Or(parts) => {
                let ok = body.fresh_label();
                let end = body.fresh_label();
                for part in parts {
                    self.emit_test(cx, body, part, span)?;
                    body.emit(Instr::Branch { when: true, to: ok });
                }
                body.emit(Instr::Const(Const::Bool(false)));
                body.emit(Instr::Jump(end));
                body.emit(Instr::Label(ok));
                body.emit(Instr::Const(Const::Bool(true)));
                body.emit(Instr::Label(end));
            }

            Test::TypeIs { place, ty } => {
                self.emit_place(body, &place, span)?;
                body.emit(Instr::TypeIs(ty));
            }

            Test::IsTuple { place, len } => {
                self.emit_place(body, &place, span)?;
                body.emit(Instr::IsTuple { len });
            }

            Test::IsSeq { place } => {
                self.emit_place(body, &place, span)?;
                body.emit(Instr::IsSeq);
            }

            Test::VariantIs {
                place,
                enum_name,
                variant,
            } => {
                let (tag_field, tag) = {
                    let info = self.meta.enums.get(&enum_name).ok_or_else(|| {
                        LowerError::new(LowerErrorKind::TypeNotFound(enum_name.clone()), span)
                    })?;
                    let v = info.variant(&variant).ok_or_else(|| {
                        LowerError::new(
                            LowerErrorKind::TypeNotFound(format!("{enum_name}.{variant}")),
                            span,
                        )
                    })?;
                    (info.tag_field, v.tag)
                };
                self.emit_place(body, &place, span)?;
                body.emit(Instr::LoadField(tag_field));
                body.emit(Instr::Const(Const::Int(tag)));
                body.emit(Instr::Cmp(CmpOp::Eq));
            }

            Test::LenAtLeast { place, len } => {
                self.emit_place(body, &place, span)?;
                body.emit(Instr::SeqLen);
                body.emit(Instr::Const(Const::Int(len as i64)));
                body.emit(Instr::Cmp(CmpOp::Ge));
            }

            Test::LenEq { place, len } => {
                self.emit_place(body, &place, span)?;
                body.emit(Instr::SeqLen);
                body.emit(Instr::Const(Const::Int(len as i64)));
                body.emit(Instr::Cmp(CmpOp::Eq));
            }

            Test::Equals { place, expr } => {
                self.emit_place(body, &place, span)?;
                self.lower_value(cx, body, &expr)?;
                body.emit(Instr::Cmp(CmpOp::Eq));
            }

            Test::Contains { place, expr } => {
                self.lower_value(cx, body, &expr)?;
                self.emit_place(body, &place, span)?;
                body.emit(Instr::Contains);
            }

            Test::Guard(expr) => {
                self.lower_value(cx, body, &expr)?;
            }
        }
        Ok(())
    }

    /// Copy a bind's projection into a fresh local and register the
    /// symbol so the arm body resolves it.
    fn emit_bind(&mut self, body: &mut BodyBuf, bind: &Bind) -> Result<(), LowerError> {
        let ty = self.emit_place(body, &bind.place, bind.span)?;
        let slot = body.declare_local(ty.clone());
        body.emit(Instr::StoreLocal(slot));
        self.registry.register(
            bind.symbol,
            Artifact::Local {
                slot,
                ty,
                defined: true,
            },
            bind.span,
        )?;
        Ok(())
    }

    /// Push the value at a symbolic place, resolving projections to
    /// handles, and report its type.
    fn emit_place(
        &self,
        body: &mut BodyBuf,
        place: &Place,
        span: Span,
    ) -> Result<TargetType, LowerError> {
        match place {
            Place::Local(id) => {
                let ty = body.local_ty(*id).cloned().ok_or_else(|| {
                    LowerError::new(
                        LowerErrorKind::UnsupportedConstruct("place names an undeclared local"),
                        span,
                    )
                })?;
                body.emit(Instr::LoadLocal(*id));
                Ok(ty)
            }

            Place::Param(index) => {
                let ty = self
                    .current_params
                    .get(*index as usize)
                    .cloned()
                    .ok_or_else(|| {
                        LowerError::new(
                            LowerErrorKind::UnsupportedConstruct(
                                "place names a parameter out of range",
                            ),
                            span,
                        )
                    })?;
                body.emit(Instr::LoadParam(*index));
                Ok(ty)
            }

            Place::Field { base, name } => {
                let bty = self.emit_place(body, base, span)?;
                let finfo = self.field_of(&bty, name, span)?;
                body.emit(Instr::LoadField(finfo.handle));
                Ok(finfo.ty)
            }

            Place::Elem { base, index } => {
                let bty = self.emit_place(body, base, span)?;
                let TargetType::Tuple(items) = bty else {
                    return Err(LowerError::new(
                        LowerErrorKind::UnsupportedConstruct("element projection on a non-tuple"),
                        span,
                    ));
                };
                let ty = items.get(*index).cloned().ok_or_else(|| {
                    LowerError::new(
                        LowerErrorKind::UnsupportedConstruct("tuple projection out of range"),
                        span,
                    )
                })?;
                body.emit(Instr::TupleGet { index: *index });
                Ok(ty)
            }

            Place::Index { base, index } => {
                let bty = self.emit_place(body, base, span)?;
                let elem = element_type(&bty, span)?;
                body.emit(Instr::Const(Const::Int(*index as i64)));
                body.emit(Instr::SeqGet);
                Ok(elem)
            }

            Place::VariantField {
                base,
                variant,
                index,
            } => {
                let bty = self.emit_place(body, base, span)?;
                let info = self.meta.enum_by_type(&bty).ok_or_else(|| {
                    LowerError::new(LowerErrorKind::TypeNotFound(bty.to_string()), span)
                })?;
                let v = info.variant(variant).ok_or_else(|| {
                    LowerError::new(LowerErrorKind::TypeNotFound(variant.clone()), span)
                })?;
                let field = v.payload.get(*index).cloned().ok_or_else(|| {
                    LowerError::new(
                        LowerErrorKind::UnsupportedConstruct("variant projection out of range"),
                        span,
                    )
                })?;
                body.emit(Instr::LoadField(field.handle));
                Ok(field.ty)
            }
        }
    }

    // ── shared helpers ────────────────────────────────────────────────

    /// Construct an enum variant value: tag through the constructor, then
    /// each payload argument stored into its slot.
    fn lower_variant_ctor(
        &mut self,
        cx: &mut UnitCx<'a>,
        body: &mut BodyBuf,
        enum_ty: TargetType,
        ctor: CtorHandle,
        variant: VariantInfo,
        args: &[Expr],
        span: Span,
    ) -> Result<Option<TargetType>, LowerError> {
        if args.len() != variant.payload.len() {
            return Err(LowerError::new(
                LowerErrorKind::UnsupportedConstruct("variant argument count mismatch"),
                span,
            ));
        }
        body.emit(Instr::Const(Const::Int(variant.tag)));
        body.emit(Instr::New { ctor, argc: 1 });
        for (arg, field) in args.iter().zip(&variant.payload) {
            body.emit(Instr::Dup);
            self.lower_value(cx, body, arg)?;
            body.emit(Instr::StoreField(field.handle));
        }
        Ok(Some(enum_ty))
    }

    /// A qualified variant reference `Enum.Variant`, when `base` names an
    /// enum type of the unit.
    fn qualified_variant(
        &self,
        base: &Expr,
        field: &str,
    ) -> Option<(TargetType, CtorHandle, VariantInfo)> {
        let Expr::Name(bn) = base else { return None };
        let entry = self.registry.get(bn.symbol)?;
        let Artifact::Type { ty, .. } = &entry.primary else {
            return None;
        };
        let info = self.meta.enum_by_type(ty)?;
        let variant = info.variant(field)?;
        Some((info.ty.clone(), info.ctor, variant.clone()))
    }

    fn field_of(&self, ty: &TargetType, name: &str, span: Span) -> Result<FieldInfo, LowerError> {
        self.meta
            .record_by_type(ty)
            .and_then(|r| r.field(name))
            .cloned()
            .ok_or_else(|| {
                LowerError::new(LowerErrorKind::TypeNotFound(format!("{ty}.{name}")), span)
            })
    }

    fn resolve_ty(&self, ty: &TypeExpr) -> Result<TargetType, LowerError> {
        self.resolver().resolve(ty)
    }

    fn resolver(&self) -> TypeResolver<'_> {
        let mut catalogs: Vec<&dyn TypeCatalog> = Vec::with_capacity(self.externals.len() + 1);
        catalogs.push(&self.unit_catalog);
        catalogs.extend(self.externals.iter().copied());
        TypeResolver::new(catalogs)
    }
}

/// The element type produced by enumerating a value of `ty`. Map
/// enumeration yields key/value tuples.
fn element_type(ty: &TargetType, span: Span) -> Result<TargetType, LowerError> {
    match ty {
        TargetType::Named { qualified, args } if qualified == "core/Seq`1" && args.len() == 1 => {
            Ok(args[0].clone())
        }
        TargetType::Named { qualified, args } if qualified == "core/Map`2" && args.len() == 2 => {
            Ok(TargetType::Tuple(args.clone()))
        }
        TargetType::Named { qualified, .. } if qualified == "core/Range" => Ok(TargetType::Int),
        TargetType::Named { args, .. } if args.len() == 1 => Ok(args[0].clone()),
        _ => Err(LowerError::new(
            LowerErrorKind::UnsupportedConstruct("for over a non-enumerable value"),
            span,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_ast::expr::NameRef;
    use sable_ast::item::{FieldDecl, Param};
    use sable_ast::scope::ScopeId;
    use sable_emit::RecordingSink;

    fn lit(v: i64) -> Expr {
        Expr::Literal(Literal::Int(v), Span::synthetic())
    }

    fn name(text: &str, id: u32) -> Expr {
        Expr::Name(NameRef {
            name: text.into(),
            symbol: SymbolId(id),
            span: Span::synthetic(),
        })
    }

    fn func(name: &str, id: u32, ret: Option<TypeExpr>, body: Block) -> Item {
        Item::Function(FnDecl {
            name: name.into(),
            symbol: SymbolId(id),
            params: Vec::new(),
            ret,
            body,
            is_static: true,
            span: Span::synthetic(),
        })
    }

    fn tail_block(expr: Expr) -> Block {
        Block {
            stmts: Vec::new(),
            tail: Some(Box::new(expr)),
            span: Span::synthetic(),
        }
    }

    /// One root scope with one child per function item.
    fn unit_of(items: Vec<Item>) -> Unit {
        let mut scopes = ScopeTree::new("app");
        for item in &items {
            if let Item::Function(f) = item {
                scopes.add_child(ScopeId::ROOT, f.name.clone());
            }
        }
        Unit::new("app", items, scopes)
    }

    fn lower(unit: &Unit) -> Result<RecordingSink, LowerError> {
        let mut sink = RecordingSink::new();
        let core = StaticCatalog::core();
        let externals: [&dyn TypeCatalog; 1] = [&core];
        Lowerer::new(&mut sink, &externals).lower_unit(unit)?;
        Ok(sink)
    }

    #[test]
    fn tail_expression_compiles_to_value_and_ret() {
        let body = tail_block(Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(lit(41)),
            rhs: Box::new(lit(1)),
            span: Span::synthetic(),
        });
        let unit = unit_of(vec![func("answer", 1, Some(TypeExpr::named("Int")), body)]);
        let sink = lower(&unit).unwrap();

        let module = sink.type_named("app/Module").unwrap();
        let answer = module.method_named("answer").unwrap();
        assert_eq!(answer.ret, Some(TargetType::Int));
        assert_eq!(
            sink.body_of(answer.handle).instrs,
            vec![
                Instr::Const(Const::Int(41)),
                Instr::Const(Const::Int(1)),
                Instr::Arith(ArithOp::Add),
                Instr::Ret,
            ]
        );
    }

    #[test]
    fn let_then_use_loads_the_declared_slot() {
        let body = Block {
            stmts: vec![Stmt::Let {
                pattern: Pattern::Ident {
                    name: "x".into(),
                    symbol: SymbolId(2),
                    inner: None,
                    span: Span::synthetic(),
                },
                ty: None,
                init: lit(3),
                span: Span::synthetic(),
            }],
            tail: Some(Box::new(name("x", 2))),
            span: Span::synthetic(),
        };
        let unit = unit_of(vec![func("f", 1, Some(TypeExpr::named("Int")), body)]);
        let sink = lower(&unit).unwrap();

        let handle = sink
            .type_named("app/Module")
            .unwrap()
            .method_named("f")
            .unwrap()
            .handle;
        let recorded = sink.body_of(handle);
        assert_eq!(recorded.locals, vec![TargetType::Int]);
        assert_eq!(
            recorded.instrs,
            vec![
                Instr::Const(Const::Int(3)),
                Instr::StoreLocal(sable_emit::LocalId(0)),
                Instr::LoadLocal(sable_emit::LocalId(0)),
                Instr::Ret,
            ]
        );
    }

    #[test]
    fn same_name_same_arity_is_ambiguous() {
        let unit = unit_of(vec![
            func("f", 1, None, Block::empty()),
            func("f", 2, None, Block::empty()),
        ]);
        let err = lower(&unit).unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::AmbiguousOverload("f".into()));
    }

    #[test]
    fn same_name_different_arity_coexists() {
        let one_param = FnDecl {
            name: "f".into(),
            symbol: SymbolId(2),
            params: vec![Param {
                name: "a".into(),
                symbol: SymbolId(3),
                ty: TypeExpr::named("Int"),
                span: Span::synthetic(),
            }],
            ret: None,
            body: Block::empty(),
            is_static: true,
            span: Span::synthetic(),
        };
        let unit = unit_of(vec![
            func("f", 1, None, Block::empty()),
            Item::Function(one_param),
        ]);
        assert!(lower(&unit).is_ok());
    }

    #[test]
    fn break_beyond_nesting_is_invalid_jump_depth() {
        let body = Block {
            stmts: vec![Stmt::While {
                cond: Expr::Literal(Literal::Bool(true), Span::synthetic()),
                body: Block {
                    stmts: vec![Stmt::Break {
                        levels: 2,
                        span: Span::synthetic(),
                    }],
                    tail: None,
                    span: Span::synthetic(),
                },
                span: Span::synthetic(),
            }],
            tail: None,
            span: Span::synthetic(),
        };
        let mut scopes = ScopeTree::new("app");
        let f = scopes.add_child(ScopeId::ROOT, "f");
        scopes.add_child(f, "while0");
        let unit = Unit::new("app", vec![func("f", 1, None, body)], scopes);
        let err = lower(&unit).unwrap_err();
        assert_eq!(
            err.kind,
            LowerErrorKind::InvalidJumpDepth {
                requested: 2,
                active: 1
            }
        );
    }

    #[test]
    fn record_call_constructs_through_its_ctor() {
        let record = Item::Record(RecordDecl {
            name: "Point".into(),
            symbol: SymbolId(10),
            fields: vec![
                FieldDecl {
                    name: "x".into(),
                    symbol: SymbolId(11),
                    ty: TypeExpr::named("Int"),
                    span: Span::synthetic(),
                },
                FieldDecl {
                    name: "y".into(),
                    symbol: SymbolId(12),
                    ty: TypeExpr::named("Int"),
                    span: Span::synthetic(),
                },
            ],
            span: Span::synthetic(),
        });
        let body = tail_block(Expr::Call {
            callee: Box::new(name("Point", 10)),
            args: vec![lit(1), lit(2)],
            span: Span::synthetic(),
        });
        let unit = unit_of(vec![
            record,
            func("make", 1, Some(TypeExpr::named("Point")), body),
        ]);
        let sink = lower(&unit).unwrap();

        let point = sink.type_named("app/Point").unwrap();
        assert_eq!(point.ctors[0].params.len(), 2);
        let make = sink
            .type_named("app/Module")
            .unwrap()
            .method_named("make")
            .unwrap()
            .handle;
        let instrs = &sink.body_of(make).instrs;
        assert!(instrs.contains(&Instr::New {
            ctor: point.ctors[0].handle,
            argc: 2
        }));
    }

    #[test]
    fn two_passes_descend_in_the_same_order() {
        // Two functions: the declare pass visits both scopes in item
        // order, and the body pass must do the same for parameter and
        // local registrations to line up.
        let unit = unit_of(vec![
            func("first", 1, None, Block::empty()),
            func("second", 2, None, Block::empty()),
        ]);
        assert!(lower(&unit).is_ok());
    }
}
