//! Dependency validation
//!
//! Checks run at every point where an aliasing fact is recorded: a memory
//! may not depend on an allocation that is more deeply nested than the
//! reference, attribute state may not depend on allocations that outlive
//! their holder, and moved-from allocations may not be read. Violations
//! are recorded as [`TraceDiagnostic`]s and the offending state is then
//! healed so analysis continues.

use crate::tast::EntityId;
use crate::trace::memory::Memory;
use crate::trace::shadow::Shadow;
use diagnostics::trace::TraceDiagnostics;
use diagnostics::Diagnostic;
use fxhash::FxHashSet;

/// Classifies trace diagnostics independently of their message text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceDiagnosticKind {
    /// A reference would outlive the data it depends on
    ObjectLifetime,
    /// A moved-from allocation was read
    UseAfterMove,
    /// A while loop's aliasing state did not stabilize
    NonConvergence,
}

/// One recorded violation, carrying the rendered diagnostic
#[derive(Debug, Clone)]
pub struct TraceDiagnostic {
    pub kind: TraceDiagnosticKind,
    pub diagnostic: Diagnostic,
}

impl TraceDiagnostic {
    pub fn object_lifetime(line: usize, reference: &str, dependency: &str) -> Self {
        Self {
            kind: TraceDiagnosticKind::ObjectLifetime,
            diagnostic: TraceDiagnostics::object_lifetime(line, reference, dependency),
        }
    }

    pub fn use_after_move(line: usize, reference: &str, moved: &str) -> Self {
        Self {
            kind: TraceDiagnosticKind::UseAfterMove,
            diagnostic: TraceDiagnostics::use_after_move(line, reference, moved),
        }
    }

    pub fn non_convergence(line: usize, iterations: usize) -> Self {
        Self {
            kind: TraceDiagnosticKind::NonConvergence,
            diagnostic: TraceDiagnostics::non_convergence(line, iterations),
        }
    }

    pub fn line(&self) -> usize {
        self.diagnostic.line
    }

    pub fn message(&self) -> &str {
        &self.diagnostic.message
    }
}

// Two records of the same violation at the same line are duplicates, which
// matters when while-loop iterations are replayed.
impl PartialEq for TraceDiagnostic {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.diagnostic.line == other.diagnostic.line
            && self.diagnostic.message == other.diagnostic.message
    }
}

impl Eq for TraceDiagnostic {}

/// Validation entry points shared by the trace visitor
pub struct Validate;

impl Validate {
    /// Check that no impression of `memory` refers to an allocation nested
    /// deeper than the reference. Returns false (after recording
    /// diagnostics) if the memory must be healed.
    pub fn dependencies_outlive_memory(
        diags: &mut Vec<TraceDiagnostic>,
        line: usize,
        memory: &Memory,
    ) -> bool {
        let unhealthy = memory.unhealthy_impressions();
        for impression in &unhealthy {
            diags.push(TraceDiagnostic::object_lifetime(
                line,
                &memory.name,
                &impression.shadow.entity.name,
            ));
        }
        unhealthy.is_empty()
    }

    /// Check that no attribute of `shadow` depends on an allocation nested
    /// deeper than the shadowed entity lives.
    pub fn dependencies_outlive_shadow(
        diags: &mut Vec<TraceDiagnostic>,
        line: usize,
        shadow: &Shadow,
    ) -> bool {
        let depth = shadow.entity.depth;
        let mut healthy = true;
        for (trait_, memory) in shadow.unhealthy_traits() {
            for impression in memory.impressions.iter() {
                if impression.shadow.entity.depth > depth {
                    healthy = false;
                    diags.push(TraceDiagnostic::object_lifetime(
                        line,
                        &format!("{}.{}", shadow.entity.name, trait_),
                        &impression.shadow.entity.name,
                    ));
                }
            }
        }
        healthy
    }

    /// Check that no impression of `memory` refers to a moved-from
    /// allocation.
    pub fn dependencies_not_moved(
        diags: &mut Vec<TraceDiagnostic>,
        line: usize,
        memory: &Memory,
        moved: &FxHashSet<EntityId>,
    ) -> bool {
        let mut clean = true;
        for impression in memory.impressions.iter() {
            if moved.contains(&impression.entity_id()) {
                clean = false;
                diags.push(TraceDiagnostic::use_after_move(
                    line,
                    &memory.name,
                    &impression.shadow.entity.name,
                ));
            }
        }
        clean
    }
}
