//! The abstract instruction vocabulary.
//!
//! The lowering contract leaves the real encoding to the external
//! serializer; this is the stack-machine vocabulary the engine emits and
//! the recording sink captures. One value stack per body, locals and
//! labels allocated through the body sink.

use serde::Serialize;

use sable_types::TargetType;

use crate::sink::{CtorHandle, FieldHandle, MethodHandle};

/// A body-local variable slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LocalId(pub u32);

/// A body-local branch target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct LabelId(pub u32);

/// A pushable constant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Const {
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Unit,
}

/// Arithmetic operators (pop two, push one).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Comparison operators (pop two, push a bool).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// One abstract instruction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum Instr {
    Const(Const),
    LoadLocal(LocalId),
    StoreLocal(LocalId),
    /// Load a parameter by call-site index (0-based; instance methods see
    /// the receiver as a separate `LoadSelf`).
    LoadParam(u16),
    LoadSelf,
    LoadField(FieldHandle),
    StoreField(FieldHandle),
    /// Pop `argc` arguments and construct a new object.
    New { ctor: CtorHandle, argc: usize },
    /// Pop `argc` arguments (plus the receiver for instance methods) and
    /// call.
    Call { method: MethodHandle, argc: usize },
    /// Pop `argc` arguments plus a callable value and invoke it.
    CallValue { argc: usize },
    /// Pop a receiver, push a callable bound to `method` on it.
    BindMethod { method: MethodHandle },
    Arith(ArithOp),
    Cmp(CmpOp),
    Not,
    Neg,
    /// Pop `len` values and build a tuple.
    TupleNew { len: usize },
    /// Pop a tuple, push its element `index`.
    TupleGet { index: usize },
    /// Pop `len` values and build a sequence.
    SeqNew { len: usize },
    /// Pop an index and a sequence, push the element.
    SeqGet,
    /// Pop a sequence, push its length.
    SeqLen,
    /// Pop two ints, push a range value.
    RangeNew,
    /// Pop an enumerable value, push an enumerator over it.
    IterInit,
    /// Pop an enumerator, push whether it advanced to another element.
    IterAdvance,
    /// Pop an enumerator, push its current element (key/value pairs come
    /// back as two-element tuples).
    IterCurrent,
    /// Pop a candidate and a range/sequence, push whether it is contained.
    Contains,
    /// Pop a value, push whether its runtime type is `ty` (the value is
    /// consumed; emitters duplicate first when they need it again).
    TypeIs(TargetType),
    /// Pop a value, push whether it is a tuple of exactly `len` elements.
    IsTuple { len: usize },
    /// Pop a value, push whether it is a sequence.
    IsSeq,
    Label(LabelId),
    Jump(LabelId),
    /// Pop a bool; jump when it equals `when`.
    Branch { when: bool, to: LabelId },
    Ret,
    Pop,
    Dup,
}
