use std::fmt;

use serde::{Deserialize, Serialize};

/// A half-open byte range into the original source text.
///
/// Spans are produced by the front end and carried through lowering
/// unchanged; the backend only ever reads them for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Create a new span from byte offsets.
    pub fn new(start: u32, end: u32) -> Self {
        Self { start, end }
    }

    /// The zero-width span used for synthesized nodes with no source text.
    pub fn synthetic() -> Self {
        Self { start: 0, end: 0 }
    }

    /// The smallest span covering both `self` and `other`.
    pub fn join(self, other: Span) -> Span {
        Span {
            start: self.start.min(other.start),
            end: self.end.max(other.end),
        }
    }

    pub fn len(self) -> u32 {
        self.end - self.start
    }

    pub fn is_empty(self) -> bool {
        self.start == self.end
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_join_covers_both() {
        let a = Span::new(4, 10);
        let b = Span::new(8, 20);
        assert_eq!(a.join(b), Span::new(4, 20));
        assert_eq!(b.join(a), Span::new(4, 20));
    }

    #[test]
    fn synthetic_span_is_empty() {
        assert!(Span::synthetic().is_empty());
        assert_eq!(Span::new(3, 7).len(), 4);
    }
}
