//! The global symbol registry.
//!
//! A flat map from unique identifier id to the resolved, lowered artifact
//! for that identifier: written once per id during the signature pre-pass
//! or at first declaration, read by every later reference. Re-registration
//! is an error rather than a silent overwrite; the only in-place update
//! allowed is the narrow declared-to-defined transition of a local slot.

use rustc_hash::FxHashMap;
use sable_common::{LowerError, LowerErrorKind, Span, SymbolId};
use sable_emit::{CtorHandle, FieldHandle, LocalId, MethodHandle, TypeHandle};
use sable_types::TargetType;

/// A resolved method signature.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodSig {
    pub handle: MethodHandle,
    pub owner: TypeHandle,
    pub params: Vec<TargetType>,
    pub ret: Option<TargetType>,
    pub is_static: bool,
}

/// The compiled artifact an identifier resolved to.
#[derive(Debug, Clone, PartialEq)]
pub enum Artifact {
    /// A body-local variable slot. `defined` flips once the slot has
    /// received its first store.
    Local {
        slot: LocalId,
        ty: TargetType,
        defined: bool,
    },
    /// A parameter with its call-site index.
    Param { index: u16, ty: TargetType },
    Field {
        handle: FieldHandle,
        owner: TypeHandle,
        ty: TargetType,
        is_static: bool,
    },
    Method(MethodSig),
    Type {
        handle: TypeHandle,
        ty: TargetType,
        ctor: Option<CtorHandle>,
    },
}

impl Artifact {
    /// The variant discriminant, used for the conflicting-kind check.
    fn kind(&self) -> &'static str {
        match self {
            Artifact::Local { .. } => "local",
            Artifact::Param { .. } => "param",
            Artifact::Field { .. } => "field",
            Artifact::Method(_) => "method",
            Artifact::Type { .. } => "type",
        }
    }

    /// The target type of a value named by this artifact, where one exists.
    pub fn value_type(&self) -> Option<&TargetType> {
        match self {
            Artifact::Local { ty, .. } | Artifact::Param { ty, .. } | Artifact::Field { ty, .. } => {
                Some(ty)
            }
            Artifact::Method(_) | Artifact::Type { .. } => None,
        }
    }
}

/// One registry entry: exactly one primary artifact, plus an optional
/// member slot for symbols that double as both a type and a constant
/// (enum variants with raw values).
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryEntry {
    pub primary: Artifact,
    pub member: Option<Artifact>,
}

/// The registry itself. One per compilation run, shared across every unit
/// the engine processes (imports included); the ids are process-wide.
#[derive(Debug, Default)]
pub struct SymbolRegistry {
    entries: FxHashMap<SymbolId, RegistryEntry>,
}

impl SymbolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the artifact for an id. Fails with `UnboundSymbol` for the
    /// reserved id 0 and `DuplicateSymbol` if the id already has an entry.
    pub fn register(
        &mut self,
        id: SymbolId,
        artifact: Artifact,
        span: Span,
    ) -> Result<(), LowerError> {
        if id.is_unbound() {
            return Err(LowerError::new(LowerErrorKind::UnboundSymbol, span));
        }
        if self.entries.contains_key(&id) {
            return Err(LowerError::new(LowerErrorKind::DuplicateSymbol(id), span));
        }
        self.entries.insert(
            id,
            RegistryEntry {
                primary: artifact,
                member: None,
            },
        );
        Ok(())
    }

    /// Attach the member artifact to an already-registered id. The member
    /// must differ in kind from the primary (a type doubling as a
    /// constant), and at most one member is allowed.
    pub fn register_member(
        &mut self,
        id: SymbolId,
        artifact: Artifact,
        span: Span,
    ) -> Result<(), LowerError> {
        if id.is_unbound() {
            return Err(LowerError::new(LowerErrorKind::UnboundSymbol, span));
        }
        let entry = self
            .entries
            .get_mut(&id)
            .ok_or_else(|| LowerError::new(LowerErrorKind::SymbolNotFound(id), span))?;
        if entry.member.is_some() || entry.primary.kind() == artifact.kind() {
            return Err(LowerError::new(LowerErrorKind::DuplicateSymbol(id), span));
        }
        entry.member = Some(artifact);
        Ok(())
    }

    /// Look an id up. `SymbolNotFound` here signals an earlier-phase gap,
    /// fatal to the unit.
    pub fn lookup(&self, id: SymbolId, span: Span) -> Result<&RegistryEntry, LowerError> {
        if id.is_unbound() {
            return Err(LowerError::new(LowerErrorKind::UnboundSymbol, span));
        }
        self.entries
            .get(&id)
            .ok_or_else(|| LowerError::new(LowerErrorKind::SymbolNotFound(id), span))
    }

    pub fn get(&self, id: SymbolId) -> Option<&RegistryEntry> {
        self.entries.get(&id)
    }

    /// The narrow declared-to-defined transition of a local slot. Any
    /// other artifact kind is left untouched.
    pub fn mark_local_defined(&mut self, id: SymbolId) {
        if let Some(entry) = self.entries.get_mut(&id) {
            if let Artifact::Local { defined, .. } = &mut entry.primary {
                *defined = true;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn local(slot: u32) -> Artifact {
        Artifact::Local {
            slot: LocalId(slot),
            ty: TargetType::Int,
            defined: false,
        }
    }

    #[test]
    fn register_then_lookup() {
        let mut reg = SymbolRegistry::new();
        reg.register(SymbolId(1), local(0), Span::synthetic()).unwrap();
        let entry = reg.lookup(SymbolId(1), Span::synthetic()).unwrap();
        assert_eq!(entry.primary, local(0));
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut reg = SymbolRegistry::new();
        reg.register(SymbolId(1), local(0), Span::synthetic()).unwrap();
        let err = reg
            .register(SymbolId(1), local(1), Span::synthetic())
            .unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::DuplicateSymbol(SymbolId(1)));
    }

    #[test]
    fn unbound_id_is_rejected_everywhere() {
        let mut reg = SymbolRegistry::new();
        let err = reg
            .register(SymbolId::UNBOUND, local(0), Span::synthetic())
            .unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::UnboundSymbol);
        let err = reg.lookup(SymbolId::UNBOUND, Span::synthetic()).unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::UnboundSymbol);
    }

    #[test]
    fn missing_id_reports_symbol_not_found() {
        let reg = SymbolRegistry::new();
        let err = reg.lookup(SymbolId(42), Span::synthetic()).unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::SymbolNotFound(SymbolId(42)));
    }

    #[test]
    fn member_slot_takes_one_artifact_of_a_different_kind() {
        let mut reg = SymbolRegistry::new();
        let ty = Artifact::Type {
            handle: TypeHandle(0),
            ty: TargetType::named("app/Color"),
            ctor: None,
        };
        let raw = Artifact::Field {
            handle: FieldHandle(0),
            owner: TypeHandle(0),
            ty: TargetType::Int,
            is_static: true,
        };
        reg.register(SymbolId(5), ty.clone(), Span::synthetic()).unwrap();
        reg.register_member(SymbolId(5), raw.clone(), Span::synthetic())
            .unwrap();

        // A second member, or a member of the same kind, is a duplicate.
        let err = reg
            .register_member(SymbolId(5), raw, Span::synthetic())
            .unwrap_err();
        assert_eq!(err.kind, LowerErrorKind::DuplicateSymbol(SymbolId(5)));
    }

    #[test]
    fn local_defined_transition_updates_in_place() {
        let mut reg = SymbolRegistry::new();
        reg.register(SymbolId(1), local(0), Span::synthetic()).unwrap();
        reg.mark_local_defined(SymbolId(1));
        match &reg.lookup(SymbolId(1), Span::synthetic()).unwrap().primary {
            Artifact::Local { defined, .. } => assert!(defined),
            other => panic!("expected local, got {other:?}"),
        }
    }
}
