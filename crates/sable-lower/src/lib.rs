//! Semantic lowering: scope-aware symbol resolution, pattern
//! compilation, closure conversion, and statement/expression lowering
//! into an external code sink.
//!
//! The engine consumes the front end's output (`sable-ast`), resolves
//! source types through `sable-types`, and drives definitions and
//! instruction streams through the `sable-emit` sink interface. All
//! errors are fatal to the unit being lowered; earlier phases have
//! already reported user-facing diagnostics.

pub mod body;
pub mod closure;
pub mod cursor;
pub mod engine;
pub mod meta;
pub mod pattern;
pub mod registry;
pub mod testkit;

pub use body::BodyBuf;
pub use closure::{collect_captures, synthesize_capture_type, Capture, ClosureShape};
pub use cursor::ScopeCursor;
pub use engine::{compile_unit, BuildKind, BuildOptions, EmitKind, Lowerer};
pub use meta::{EnumInfo, FieldInfo, RecordInfo, UnitMeta, VariantInfo};
pub use pattern::{Bind, Compiled, PatternCompiler, Place, Test};
pub use registry::{Artifact, MethodSig, RegistryEntry, SymbolRegistry};
