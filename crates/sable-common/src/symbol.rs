use std::fmt;

use serde::{Deserialize, Serialize};

/// A process-wide unique identifier assigned by the front end to every
/// declared name.
///
/// Id 0 is reserved for "unbound": error-recovery placeholders the parser
/// hands out when it could not bind a name. Unbound ids must never reach
/// the global symbol registry; both `register` and `lookup` guard against
/// them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    /// The reserved never-bind id.
    pub const UNBOUND: SymbolId = SymbolId(0);

    pub fn is_unbound(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SymbolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_unbound() {
        assert!(SymbolId::UNBOUND.is_unbound());
        assert!(!SymbolId(1).is_unbound());
    }
}
