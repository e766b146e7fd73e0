//! Ownership and lifetime trace analysis
//!
//! This pass walks a fully typed module and tracks, for every reference,
//! the set of allocations it may point at. It reports three classes of
//! violation: references that would outlive the data they depend on, reads
//! of moved-from allocations, and loops whose aliasing state never
//! stabilizes.
//!
//! The analysis is interprocedural but summary-based: each function body
//! is walked once (per concrete blessing of its function-typed parameters)
//! and the resulting [`FunctionDelta`] is replayed at every call site.
//!
//! Entry points are [`MemoryVisitor::check_module`] and
//! [`MemoryVisitor::check_function`].

pub mod attribute;
pub mod blessing;
pub mod call;
pub mod conditional;
pub mod delta;
pub mod entanglement;
pub mod entity;
pub mod lval;
pub mod memory;
pub mod shadow;
pub mod state;
pub mod validate;
pub mod visitor;

#[cfg(test)]
mod trace_test;

pub use blessing::{blessing_combinations, Blessing, BlessingRow};
pub use delta::{DbSummary, FunctionDb, FunctionDelta};
pub use entanglement::Entanglement;
pub use entity::{Entity, EntityKind, Trait};
pub use lval::Lval;
pub use memory::{FunctionSet, Impression, ImpressionSet, Memory, RemapIndex, RemapTarget};
pub use shadow::{Personality, Shadow};
pub use state::{ContextArena, Env};
pub use validate::{TraceDiagnostic, TraceDiagnosticKind, Validate};
pub use visitor::{FunctionCheck, MemoryVisitor, Value};

use std::error::Error;
use std::fmt;

/// Internal analysis failure
///
/// These indicate malformed input (a module that did not pass type
/// checking) or a bug in the analysis itself; user-facing violations are
/// reported as [`TraceDiagnostic`]s instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceFault {
    /// A name was read that no scope in the chain defines
    UnknownReference { name: String, line: usize },
    /// An entity was referenced whose shadow is not in scope
    UnknownShadow { entity: String, line: usize },
    /// A construction initialized a target that aliases more than one
    /// allocation
    AmbiguousConstruction { line: usize },
    /// A first-class function value was called without a unique concrete
    /// identity
    NoFunctionInstance { line: usize },
    /// An angel's owner could not be projected into caller terms
    UnresolvedAngel { name: String, line: usize },
}

impl fmt::Display for TraceFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceFault::UnknownReference { name, line } => {
                write!(f, "line {}: unknown reference '{}'", line, name)
            }
            TraceFault::UnknownShadow { entity, line } => {
                write!(f, "line {}: no shadow in scope for entity '{}'", line, entity)
            }
            TraceFault::AmbiguousConstruction { line } => {
                write!(f, "line {}: construction target aliases more than one allocation", line)
            }
            TraceFault::NoFunctionInstance { line } => {
                write!(f, "line {}: callee has no unique concrete function instance", line)
            }
            TraceFault::UnresolvedAngel { name, line } => {
                write!(f, "line {}: could not resolve angel '{}' at call site", line, name)
            }
        }
    }
}

impl Error for TraceFault {}
