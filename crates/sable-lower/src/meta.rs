//! Per-unit metadata accumulated by the signature pre-pass.
//!
//! Lowering of bodies needs to answer structural questions (which fields
//! a record has and in what order, which enum a bare variant name belongs
//! to, which methods exist under a name) without going back to the sink.
//! The declare pass fills these tables; the body pass and the pattern
//! compiler read them.

use rustc_hash::FxHashMap;
use sable_common::SymbolId;
use sable_emit::{CtorHandle, FieldHandle, TypeHandle};
use sable_types::TargetType;

use crate::registry::MethodSig;

/// A defined field with its resolved type.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldInfo {
    pub name: String,
    pub handle: FieldHandle,
    pub ty: TargetType,
}

/// A record (product) type of the unit.
#[derive(Debug, Clone)]
pub struct RecordInfo {
    pub handle: TypeHandle,
    pub ty: TargetType,
    pub ctor: CtorHandle,
    /// Declaration order; positional destructuring projects through this.
    pub fields: Vec<FieldInfo>,
}

impl RecordInfo {
    pub fn field(&self, name: &str) -> Option<&FieldInfo> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One variant of an enum.
#[derive(Debug, Clone)]
pub struct VariantInfo {
    pub name: String,
    pub symbol: SymbolId,
    /// Position in declaration order; stored in the enum's tag field.
    pub tag: i64,
    pub raw: Option<i64>,
    pub payload: Vec<FieldInfo>,
}

/// An enum (sum) type of the unit. Lowered as a single type with a tag
/// field plus per-variant payload fields.
#[derive(Debug, Clone)]
pub struct EnumInfo {
    pub handle: TypeHandle,
    pub ty: TargetType,
    pub ctor: CtorHandle,
    pub tag_field: FieldHandle,
    pub variants: Vec<VariantInfo>,
}

impl EnumInfo {
    pub fn variant(&self, name: &str) -> Option<&VariantInfo> {
        self.variants.iter().find(|v| v.name == name)
    }
}

/// The tables themselves, keyed by source-level type name.
#[derive(Debug, Default)]
pub struct UnitMeta {
    pub records: FxHashMap<String, RecordInfo>,
    pub enums: FxHashMap<String, EnumInfo>,
    /// Unit-level functions by name; more than one entry with the same
    /// arity makes a call by that name ambiguous.
    pub methods: FxHashMap<String, Vec<MethodSig>>,
}

impl UnitMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// Find the enum a bare variant name belongs to, as used by
    /// unqualified constructor patterns.
    pub fn enum_for_variant(&self, variant: &str) -> Option<(&String, &EnumInfo)> {
        self.enums
            .iter()
            .find(|(_, info)| info.variant(variant).is_some())
    }

    /// Find the record whose resolved target type equals `ty`.
    pub fn record_by_type(&self, ty: &TargetType) -> Option<&RecordInfo> {
        self.records.values().find(|r| &r.ty == ty)
    }

    /// Find the enum whose resolved target type equals `ty`.
    pub fn enum_by_type(&self, ty: &TargetType) -> Option<&EnumInfo> {
        self.enums.values().find(|e| &e.ty == ty)
    }

    /// Find the variant a symbol id names, with its owning enum.
    pub fn variant_by_symbol(&self, id: SymbolId) -> Option<(&EnumInfo, &VariantInfo)> {
        self.enums.values().find_map(|info| {
            info.variants
                .iter()
                .find(|v| v.symbol == id)
                .map(|v| (info, v))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sable_emit::{CtorHandle, FieldHandle, TypeHandle};

    fn color_enum() -> EnumInfo {
        EnumInfo {
            handle: TypeHandle(0),
            ty: TargetType::named("app/Color"),
            ctor: CtorHandle(0),
            tag_field: FieldHandle(0),
            variants: vec![
                VariantInfo {
                    name: "Red".into(),
                    symbol: SymbolId(10),
                    tag: 0,
                    raw: Some(1),
                    payload: vec![],
                },
                VariantInfo {
                    name: "Green".into(),
                    symbol: SymbolId(11),
                    tag: 1,
                    raw: Some(2),
                    payload: vec![],
                },
            ],
        }
    }

    #[test]
    fn enum_for_variant_finds_the_owner() {
        let mut meta = UnitMeta::new();
        meta.enums.insert("Color".into(), color_enum());
        let (name, info) = meta.enum_for_variant("Green").unwrap();
        assert_eq!(name, "Color");
        assert_eq!(info.variant("Green").unwrap().tag, 1);
        assert!(meta.enum_for_variant("Blue").is_none());
    }
}
