//! The scope-descent cursor.
//!
//! The front end built the scope tree in source order; lowering locates
//! scopes purely by sibling position, so both traversals (signature
//! pre-pass and body pass) must descend in exactly the order the tree was
//! populated. The cursor is an explicit value, one child counter per
//! active level, rather than ambient per-scope state, so a mis-paired
//! descend/ascend shows up immediately as a desynchronized position
//! instead of silently corrupting later lookups.

use sable_ast::scope::{ScopeId, ScopeTree};
use sable_common::{LowerError, LowerErrorKind, Span};

/// The current position of a traversal over one scope tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeCursor {
    current: ScopeId,
    /// One counter per level, root first; the last entry counts how many
    /// children of `current` have already been visited.
    counters: Vec<usize>,
}

impl ScopeCursor {
    /// A cursor positioned at the root with no children visited.
    pub fn at_root() -> Self {
        ScopeCursor {
            current: ScopeId::ROOT,
            counters: vec![0],
        }
    }

    pub fn current(&self) -> ScopeId {
        self.current
    }

    /// Depth of the cursor (root = 1).
    pub fn depth(&self) -> usize {
        self.counters.len()
    }

    /// Enter the next unvisited child of the current scope.
    ///
    /// Running out of children means the traversal no longer mirrors the
    /// order the front end created scopes in, an invariant violation that
    /// is fatal to the unit.
    pub fn descend(&mut self, tree: &ScopeTree, span: Span) -> Result<ScopeId, LowerError> {
        let visited = *self.counters.last().unwrap_or(&0);
        let children = &tree.scope(self.current).children;
        let child = children.get(visited).copied().ok_or_else(|| {
            LowerError::new(
                LowerErrorKind::UnsupportedConstruct("scope descent out of order"),
                span,
            )
        })?;
        self.current = child;
        self.counters.push(0);
        Ok(child)
    }

    /// Return to the parent and advance its child counter by one, exactly
    /// mirroring how the scope was populated.
    pub fn ascend(&mut self, tree: &ScopeTree) {
        if let Some(parent) = tree.scope(self.current).parent {
            self.current = parent;
            self.counters.pop();
            if let Some(counter) = self.counters.last_mut() {
                *counter += 1;
            }
        }
    }

    /// The sequence of child indices taken from the root to the current
    /// position. Two traversals agree iff their trails agree at every
    /// descend; tests use this to pin traversal determinism.
    pub fn trail(&self) -> &[usize] {
        &self.counters
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// root ── a ── a0
    ///      └─ b
    fn sample_tree() -> ScopeTree {
        let mut tree = ScopeTree::new("unit");
        let a = tree.add_child(ScopeId::ROOT, "a");
        tree.add_child(a, "a0");
        tree.add_child(ScopeId::ROOT, "b");
        tree
    }

    #[test]
    fn descend_visits_children_in_creation_order() {
        let tree = sample_tree();
        let mut cur = ScopeCursor::at_root();

        let a = cur.descend(&tree, Span::synthetic()).unwrap();
        assert_eq!(tree.scope(a).name, "a");
        let a0 = cur.descend(&tree, Span::synthetic()).unwrap();
        assert_eq!(tree.scope(a0).name, "a0");
        cur.ascend(&tree);
        cur.ascend(&tree);

        let b = cur.descend(&tree, Span::synthetic()).unwrap();
        assert_eq!(tree.scope(b).name, "b");
    }

    #[test]
    fn ascend_advances_the_parent_counter() {
        let tree = sample_tree();
        let mut cur = ScopeCursor::at_root();
        cur.descend(&tree, Span::synthetic()).unwrap();
        cur.ascend(&tree);
        assert_eq!(cur.trail(), &[1]);
    }

    #[test]
    fn exhausted_children_is_a_fatal_desync() {
        let tree = sample_tree();
        let mut cur = ScopeCursor::at_root();
        cur.descend(&tree, Span::synthetic()).unwrap();
        cur.ascend(&tree);
        cur.descend(&tree, Span::synthetic()).unwrap();
        cur.ascend(&tree);
        let err = cur.descend(&tree, Span::synthetic()).unwrap_err();
        assert_eq!(
            err.kind,
            LowerErrorKind::UnsupportedConstruct("scope descent out of order")
        );
    }
}
