//! Quill compiler library
//!
//! The crate is organized around two layers:
//!
//! - [`tast`] - the typed AST: ID types, the type table, and the node
//!   definitions an earlier type-checking phase produces.
//! - [`trace`] - the ownership and lifetime analysis that walks the typed
//!   AST, tracking which allocations each reference may point at and
//!   reporting lifetime and use-after-move violations.

pub mod logging;
pub mod tast;
pub mod trace;

pub use tast::{TypedModule, TypeTable};
pub use trace::{MemoryVisitor, TraceDiagnostic, TraceDiagnosticKind};
