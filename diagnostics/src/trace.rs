//! Memory-safety diagnostic builders
//!
//! The trace analysis records violations as plain `(kind, message, line)`
//! records; these helpers turn them into rich [`Diagnostic`]s with stable
//! codes and help text.

use crate::{Diagnostic, DiagnosticBuilder};

/// Builders for the diagnostics emitted by the ownership/lifetime analysis
pub struct TraceDiagnostics;

impl TraceDiagnostics {
    /// A reference would outlive the data it depends on
    pub fn object_lifetime(line: usize, reference: &str, dependency: &str) -> Diagnostic {
        DiagnosticBuilder::error(
            format!(
                "'{}' may depend on '{}', which does not live long enough",
                reference, dependency
            ),
            line,
        )
        .code("Q0501")
        .note(format!(
            "'{}' is declared in a more deeply nested scope than '{}'",
            dependency, reference
        ))
        .help("assign a value that lives at least as long as the reference")
        .build()
    }

    /// A value was read after its backing allocation was moved away
    pub fn use_after_move(line: usize, reference: &str, moved: &str) -> Diagnostic {
        DiagnosticBuilder::error(
            format!("'{}' is used after '{}' was moved", reference, moved),
            line,
        )
        .code("Q0502")
        .help("moved allocations cannot be read; rebind the reference first")
        .build()
    }

    /// A while loop's aliasing state failed to stabilize within the cap
    pub fn non_convergence(line: usize, iterations: usize) -> Diagnostic {
        DiagnosticBuilder::error(
            format!(
                "aliasing analysis of this loop did not stabilize after {} iterations",
                iterations
            ),
            line,
        )
        .code("Q0503")
        .note("the loop body keeps producing new aliasing states")
        .help("simplify the aliasing pattern inside the loop")
        .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Severity;

    #[test]
    fn test_object_lifetime_shape() {
        let d = TraceDiagnostics::object_lifetime(7, "r", "tmp");
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.code.as_deref(), Some("Q0501"));
        assert_eq!(d.line, 7);
        assert!(d.message.contains("'r'"));
        assert!(d.message.contains("'tmp'"));
    }

    #[test]
    fn test_use_after_move_shape() {
        let d = TraceDiagnostics::use_after_move(3, "r", "obj");
        assert_eq!(d.code.as_deref(), Some("Q0502"));
        assert!(d.message.contains("moved"));
    }

    #[test]
    fn test_non_convergence_shape() {
        let d = TraceDiagnostics::non_convergence(20, 64);
        assert_eq!(d.code.as_deref(), Some("Q0503"));
        assert!(d.message.contains("64"));
    }
}
