//! The code-sink interface proper.

use std::io;
use std::path::Path;

use serde::Serialize;

use sable_types::TargetType;

use crate::instr::{Instr, LabelId, LocalId};

/// Handle to a defined type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TypeHandle(pub u32);

/// Handle to a defined method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct MethodHandle(pub u32);

/// Handle to a defined field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct FieldHandle(pub u32);

/// Handle to a defined constructor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CtorHandle(pub u32);

/// Attributes of a defined type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct TypeAttrs {
    pub public: bool,
    pub sealed: bool,
}

/// Attributes of a defined method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct MethodAttrs {
    pub public: bool,
    pub is_static: bool,
}

/// Attributes of a defined field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FieldAttrs {
    pub public: bool,
    pub readonly: bool,
    pub is_static: bool,
}

/// The per-method-body instruction sink.
///
/// Locals and labels are body-scoped; a fresh body starts with none of
/// either. The sink does not validate stack discipline; that is the
/// external serializer's concern.
pub trait BodySink {
    fn emit(&mut self, instr: Instr);
    fn declare_local(&mut self, ty: TargetType) -> LocalId;
    fn fresh_label(&mut self) -> LabelId;
}

/// The external emission surface of the managed target environment.
///
/// Definition handles are opaque and stable for the lifetime of the sink;
/// the engine stores them in the global symbol registry. `finalize`
/// persists the completed unit and must be called exactly once, last.
pub trait CodeSink {
    fn define_type(
        &mut self,
        name: &str,
        attrs: TypeAttrs,
        base_types: &[TargetType],
    ) -> TypeHandle;

    fn define_method(
        &mut self,
        owner: TypeHandle,
        name: &str,
        attrs: MethodAttrs,
        ret: Option<TargetType>,
        params: &[TargetType],
    ) -> MethodHandle;

    fn define_field(
        &mut self,
        owner: TypeHandle,
        name: &str,
        ty: TargetType,
        attrs: FieldAttrs,
    ) -> FieldHandle;

    fn define_constructor(&mut self, owner: TypeHandle, params: &[TargetType]) -> CtorHandle;

    /// The instruction sink for a method body. Repeated calls for the same
    /// handle return the same body.
    fn method_body(&mut self, method: MethodHandle) -> &mut dyn BodySink;

    /// The instruction sink for a constructor body.
    fn ctor_body(&mut self, ctor: CtorHandle) -> &mut dyn BodySink;

    /// Persist the completed unit.
    fn finalize(&mut self, assembly_name: &str, out_path: &Path) -> io::Result<()>;
}
