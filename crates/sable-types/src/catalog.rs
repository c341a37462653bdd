//! Loaded type catalogs.
//!
//! A catalog answers "is this qualified name a loaded type" for one source
//! of types: the core runtime library, a referenced assembly, or the unit
//! being compiled. Catalogs are built once per compilation and queried by
//! key; there is no scanning or reflection-style search.

use rustc_hash::FxHashMap;

use crate::TargetType;

/// One source of loaded target types.
pub trait TypeCatalog {
    /// Look up a type by fully-qualified name.
    fn find_type(&self, qualified: &str) -> Option<TargetType>;

    /// Compose the qualified name of a generic type from its base name and
    /// arity. The target environment encodes arity into the name itself.
    fn generic_arity(&self, name: &str, arity: usize) -> String {
        format!("{name}`{arity}")
    }
}

/// An in-memory catalog keyed by qualified name.
///
/// The unit under compilation gets one of these, appended to as each
/// record/enum is defined; tests build them directly.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    entries: FxHashMap<String, TargetType>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A catalog preloaded with the core runtime containers the alias
    /// table refers to.
    pub fn core() -> Self {
        let mut cat = Self::new();
        for name in ["core/Seq`1", "core/Map`2", "core/Range", "core/Enumerator`1"] {
            cat.insert(name, TargetType::named(name));
        }
        cat
    }

    pub fn insert(&mut self, qualified: impl Into<String>, ty: TargetType) {
        self.entries.insert(qualified.into(), ty);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl TypeCatalog for StaticCatalog {
    fn find_type(&self, qualified: &str) -> Option<TargetType> {
        self.entries.get(qualified).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_catalog_round_trips() {
        let mut cat = StaticCatalog::new();
        cat.insert("app/Point", TargetType::named("app/Point"));
        assert_eq!(
            cat.find_type("app/Point"),
            Some(TargetType::named("app/Point"))
        );
        assert_eq!(cat.find_type("app/Missing"), None);
    }

    #[test]
    fn generic_arity_appends_backtick_count() {
        let cat = StaticCatalog::new();
        assert_eq!(cat.generic_arity("core/Seq", 1), "core/Seq`1");
        assert_eq!(cat.generic_arity("core/Map", 2), "core/Map`2");
    }
}
