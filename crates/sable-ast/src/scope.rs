//! The lexical scope tree.
//!
//! Built once by the front end, in source order, during its single parsing
//! pass, and carried into lowering as part of the serialized unit. Lowering
//! reads the tree without mutating it: the engine locates scopes purely by
//! sibling position, so structure (child order in particular) must stay
//! exactly as parsed. Names lowering synthesizes itself (pattern
//! temporaries, capture fields) live in its own registry, not here.

use rustc_hash::FxHashMap;
use sable_common::{Span, SymbolId};
use serde::{Deserialize, Serialize};

use crate::ty::TypeExpr;

/// Index of a scope inside its [`ScopeTree`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeId(pub u32);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Declaration modifiers carried on a symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Modifiers {
    pub public: bool,
    pub mutable: bool,
    pub is_static: bool,
}

/// A declared value symbol: a variable, parameter, field, or function name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolDecl {
    pub name: String,
    pub id: SymbolId,
    /// The declared type; may still be [`TypeExpr::Pending`] at parse time.
    pub ty: TypeExpr,
    pub modifiers: Modifiers,
    pub span: Span,
}

/// A declared type symbol, kept in a map separate from value symbols so a
/// type and a value may share a name in one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeSymbol {
    pub name: String,
    pub id: SymbolId,
    pub span: Span,
}

/// One lexical scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scope {
    pub name: String,
    pub parent: Option<ScopeId>,
    /// Children in creation order. Fixed once parsing completes.
    pub children: Vec<ScopeId>,
    symbols: FxHashMap<String, SymbolDecl>,
    types: FxHashMap<String, TypeSymbol>,
}

/// The arena holding every scope of one unit. Index 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeTree {
    scopes: Vec<Scope>,
}

impl ScopeTree {
    /// A fresh tree containing only a root scope with the given name.
    pub fn new(root_name: impl Into<String>) -> Self {
        ScopeTree {
            scopes: vec![Scope {
                name: root_name.into(),
                parent: None,
                children: Vec::new(),
                symbols: FxHashMap::default(),
                types: FxHashMap::default(),
            }],
        }
    }

    /// Append a child scope under `parent`, preserving creation order.
    pub fn add_child(&mut self, parent: ScopeId, name: impl Into<String>) -> ScopeId {
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(Scope {
            name: name.into(),
            parent: Some(parent),
            children: Vec::new(),
            symbols: FxHashMap::default(),
            types: FxHashMap::default(),
        });
        self.scopes[parent.index()].children.push(id);
        id
    }

    pub fn scope(&self, id: ScopeId) -> &Scope {
        &self.scopes[id.index()]
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    /// Declare a value symbol in `scope`. Later declarations of the same
    /// name shadow earlier ones, matching source semantics.
    pub fn declare(&mut self, scope: ScopeId, decl: SymbolDecl) {
        self.scopes[scope.index()]
            .symbols
            .insert(decl.name.clone(), decl);
    }

    /// Declare a type symbol in `scope`.
    pub fn declare_type(&mut self, scope: ScopeId, decl: TypeSymbol) {
        self.scopes[scope.index()]
            .types
            .insert(decl.name.clone(), decl);
    }

    /// Look a value symbol up in `scope` only (no parent walk).
    pub fn symbol_in(&self, scope: ScopeId, name: &str) -> Option<&SymbolDecl> {
        self.scopes[scope.index()].symbols.get(name)
    }

    /// Look a value symbol up in `scope` and its ancestors, innermost
    /// first. Returns the declaration plus the scope it was found in.
    pub fn resolve(&self, scope: ScopeId, name: &str) -> Option<(&SymbolDecl, ScopeId)> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(decl) = self.scopes[id.index()].symbols.get(name) {
                return Some((decl, id));
            }
            current = self.scopes[id.index()].parent;
        }
        None
    }

    /// Look a type symbol up in `scope` and its ancestors.
    pub fn resolve_type(&self, scope: ScopeId, name: &str) -> Option<&TypeSymbol> {
        let mut current = Some(scope);
        while let Some(id) = current {
            if let Some(decl) = self.scopes[id.index()].types.get(name) {
                return Some(decl);
            }
            current = self.scopes[id.index()].parent;
        }
        None
    }

    /// The chain of scope names from the root down to `scope`.
    pub fn path(&self, scope: ScopeId) -> Vec<&str> {
        let mut names = Vec::new();
        let mut current = Some(scope);
        while let Some(id) = current {
            names.push(self.scopes[id.index()].name.as_str());
            current = self.scopes[id.index()].parent;
        }
        names.reverse();
        names
    }
}

impl Scope {
    pub fn symbols(&self) -> impl Iterator<Item = &SymbolDecl> {
        self.symbols.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ty::TypeExpr;

    fn decl(name: &str, id: u32) -> SymbolDecl {
        SymbolDecl {
            name: name.into(),
            id: SymbolId(id),
            ty: TypeExpr::named("Int"),
            modifiers: Modifiers::default(),
            span: Span::synthetic(),
        }
    }

    #[test]
    fn child_order_is_creation_order() {
        let mut tree = ScopeTree::new("unit");
        let a = tree.add_child(ScopeId::ROOT, "a");
        let b = tree.add_child(ScopeId::ROOT, "b");
        let c = tree.add_child(ScopeId::ROOT, "c");
        assert_eq!(tree.scope(ScopeId::ROOT).children, vec![a, b, c]);
    }

    #[test]
    fn resolve_walks_ancestors_innermost_first() {
        let mut tree = ScopeTree::new("unit");
        let inner = tree.add_child(ScopeId::ROOT, "fn");
        tree.declare(ScopeId::ROOT, decl("x", 1));
        tree.declare(inner, decl("x", 2));

        let (found, scope) = tree.resolve(inner, "x").unwrap();
        assert_eq!(found.id, SymbolId(2));
        assert_eq!(scope, inner);

        let (outer, scope) = tree.resolve(ScopeId::ROOT, "x").unwrap();
        assert_eq!(outer.id, SymbolId(1));
        assert_eq!(scope, ScopeId::ROOT);
    }

    #[test]
    fn value_and_type_namespaces_are_separate() {
        let mut tree = ScopeTree::new("unit");
        tree.declare(ScopeId::ROOT, decl("Point", 1));
        tree.declare_type(
            ScopeId::ROOT,
            TypeSymbol {
                name: "Point".into(),
                id: SymbolId(2),
                span: Span::synthetic(),
            },
        );
        assert_eq!(tree.resolve(ScopeId::ROOT, "Point").unwrap().0.id, SymbolId(1));
        assert_eq!(tree.resolve_type(ScopeId::ROOT, "Point").unwrap().id, SymbolId(2));
    }

    #[test]
    fn path_names_root_to_leaf() {
        let mut tree = ScopeTree::new("unit");
        let f = tree.add_child(ScopeId::ROOT, "outer");
        let b = tree.add_child(f, "block0");
        assert_eq!(tree.path(b), vec!["unit", "outer", "block0"]);
    }
}
