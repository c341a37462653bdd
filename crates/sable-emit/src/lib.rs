//! The target-code sink.
//!
//! The lowering engine talks to the managed runtime's emission layer only
//! through the [`CodeSink`] trait: define a type, define its members, fill
//! method bodies through a per-body instruction sink, finalize the unit.
//! The real serializer lives outside this system; the in-memory
//! [`RecordingSink`] stands in for it in tests and in the driver.

pub mod instr;
pub mod record;
pub mod sink;

pub use instr::{ArithOp, CmpOp, Const, Instr, LabelId, LocalId};
pub use record::{RecordedBody, RecordedCtor, RecordedField, RecordedMethod, RecordedType, RecordingSink};
pub use sink::{
    BodySink, CodeSink, CtorHandle, FieldAttrs, FieldHandle, MethodAttrs, MethodHandle, TypeAttrs,
    TypeHandle,
};
