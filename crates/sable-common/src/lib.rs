//! Shared leaf types for the Sable lowering backend.
//!
//! Everything here is consumed by every other crate in the workspace:
//! source spans, process-wide unique symbol ids, and the fatal error
//! taxonomy of the lowering engine.

pub mod error;
pub mod span;
pub mod symbol;

pub use error::{LowerError, LowerErrorKind};
pub use span::Span;
pub use symbol::SymbolId;
