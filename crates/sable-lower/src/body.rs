//! An owned instruction buffer for one method or constructor body.
//!
//! The engine lowers into a `BodyBuf` and flushes the result into the
//! external sink once the body is complete. Buffering keeps the sink free
//! for type/member definitions that happen mid-body (closure conversion
//! synthesizes whole types while a body is being lowered).

use sable_emit::{BodySink, Instr, LabelId, LocalId};
use sable_types::TargetType;

#[derive(Debug, Default)]
pub struct BodyBuf {
    locals: Vec<TargetType>,
    instrs: Vec<Instr>,
    next_label: u32,
}

impl BodyBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn instrs(&self) -> &[Instr] {
        &self.instrs
    }

    /// The declared type of a local slot.
    pub fn local_ty(&self, id: LocalId) -> Option<&TargetType> {
        self.locals.get(id.0 as usize)
    }

    /// Replay the buffered body into a real sink body. Local and label ids
    /// are allocated densely from zero on both sides, so instructions
    /// carry over verbatim.
    pub fn flush_into(self, sink: &mut dyn BodySink) {
        for ty in self.locals {
            sink.declare_local(ty);
        }
        for _ in 0..self.next_label {
            sink.fresh_label();
        }
        for instr in self.instrs {
            sink.emit(instr);
        }
    }
}

impl BodySink for BodyBuf {
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
