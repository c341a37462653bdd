//! An in-memory `CodeSink` that records everything it is handed.
//!
//! Tests assert against the recorded definitions and instruction streams;
//! the driver serializes the recording as the unit listing on `finalize`.

use std::io;
use std::path::Path;

use serde::Serialize;

use sable_types::TargetType;

use crate::instr::{Instr, LabelId, LocalId};
use crate::sink::{
    BodySink, CodeSink, CtorHandle, FieldAttrs, FieldHandle, MethodAttrs, MethodHandle, TypeAttrs,
    TypeHandle,
};

/// A recorded field definition.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedField {
    pub handle: FieldHandle,
    pub name: String,
    pub ty: TargetType,
    pub attrs: FieldAttrs,
}

/// A recorded method definition.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedMethod {
    pub handle: MethodHandle,
    pub name: String,
    pub attrs: MethodAttrs,
    pub ret: Option<TargetType>,
    pub params: Vec<TargetType>,
}

/// A recorded constructor definition.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedCtor {
    pub handle: CtorHandle,
    pub params: Vec<TargetType>,
}

/// A recorded type definition with its members.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedType {
    pub handle: TypeHandle,
    pub name: String,
    pub attrs: TypeAttrs,
    pub base_types: Vec<TargetType>,
    pub fields: Vec<RecordedField>,
    pub methods: Vec<RecordedMethod>,
    pub ctors: Vec<RecordedCtor>,
}

impl RecordedType {
    pub fn field_named(&self, name: &str) -> Option<&RecordedField> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn method_named(&self, name: &str) -> Option<&RecordedMethod> {
        self.methods.iter().find(|m| m.name == name)
    }
}

/// A recorded method or constructor body.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RecordedBody {
    pub locals: Vec<TargetType>,
    pub instrs: Vec<Instr>,
    next_label: u32,
}

impl BodySink for RecordedBody {
    fn emit(&mut self, instr: Instr) {
        self.instrs.push(instr);
    }

    fn declare_local(&mut self, ty: TargetType) -> LocalId {
        let id = LocalId(self.locals.len() as u32);
        self.locals.push(ty);
        id
    }

    fn fresh_label(&mut self) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        id
    }
}

/// The serialized listing written by `finalize`.
#[derive(Debug, Serialize)]
struct Listing<'a> {
    assembly: &'a str,
    types: &'a [RecordedType],
    method_bodies: &'a [RecordedBody],
    ctor_bodies: &'a [RecordedBody],
}

/// The in-memory sink.
#[derive(Debug, Default)]
pub struct RecordingSink {
    pub types: Vec<RecordedType>,
    /// Bodies indexed by method handle; allocated at definition time.
    method_bodies: Vec<RecordedBody>,
    ctor_bodies: Vec<RecordedBody>,
    next_field: u32,
    pub finalized_as: Option<String>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn type_named(&self, name: &str) -> Option<&RecordedType> {
        self.types.iter().find(|t| t.name == name)
    }

    pub fn body_of(&self, method: MethodHandle) -> &RecordedBody {
        &self.method_bodies[method.0 as usize]
    }

    pub fn ctor_body_of(&self, ctor: CtorHandle) -> &RecordedBody {
        &self.ctor_bodies[ctor.0 as usize]
    }

    /// The owning type of a method handle.
    pub fn owner_of(&self, method: MethodHandle) -> Option<&RecordedType> {
        self.types
            .iter()
            .find(|t| t.methods.iter().any(|m| m.handle == method))
    }
}

impl CodeSink for RecordingSink {
    fn define_type(
        &mut self,
        name: &str,
        attrs: TypeAttrs,
        base_types: &[TargetType],
    ) -> TypeHandle {
        let handle = TypeHandle(self.types.len() as u32);
        self.types.push(RecordedType {
            handle,
            name: name.to_string(),
            attrs,
            base_types: base_types.to_vec(),
            fields: Vec::new(),
            methods: Vec::new(),
            ctors: Vec::new(),
        });
        handle
    }

    fn define_method(
        &mut self,
        owner: TypeHandle,
        name: &str,
        attrs: MethodAttrs,
        ret: Option<TargetType>,
        params: &[TargetType],
    ) -> MethodHandle {
        let handle = MethodHandle(self.method_bodies.len() as u32);
        self.method_bodies.push(RecordedBody::default());
        self.types[owner.0 as usize].methods.push(RecordedMethod {
            handle,
            name: name.to_string(),
            attrs,
            ret,
            params: params.to_vec(),
        });
        handle
    }

    fn define_field(
        &mut self,
        owner: TypeHandle,
        name: &str,
        ty: TargetType,
        attrs: FieldAttrs,
    ) -> FieldHandle {
        let handle = FieldHandle(self.next_field);
        self.next_field += 1;
        self.types[owner.0 as usize].fields.push(RecordedField {
            handle,
            name: name.to_string(),
            ty,
            attrs,
        });
        handle
    }

    fn define_constructor(&mut self, owner: TypeHandle, params: &[TargetType]) -> CtorHandle {
        let handle = CtorHandle(self.ctor_bodies.len() as u32);
        self.ctor_bodies.push(RecordedBody::default());
        self.types[owner.0 as usize].ctors.push(RecordedCtor {
            handle,
            params: params.to_vec(),
        });
        handle
    }

    fn method_body(&mut self, method: MethodHandle) -> &mut dyn BodySink {
        &mut self.method_bodies[method.0 as usize]
    }

    fn ctor_body(&mut self, ctor: CtorHandle) -> &mut dyn BodySink {
        &mut self.ctor_bodies[ctor.0 as usize]
    }

    fn finalize(&mut self, assembly_name: &str, out_path: &Path) -> io::Result<()> {
        let listing = Listing {
            assembly: assembly_name,
            types: &self.types,
            method_bodies: &self.method_bodies,
            ctor_bodies: &self.ctor_bodies,
        };
        let json = serde_json::to_string_pretty(&listing)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        std::fs::write(out_path, json)?;
        self.finalized_as = Some(assembly_name.to_string());
        Ok(())
    }
}
