//! Diagnostics library for the Quill compiler
//!
//! Provides:
//! - Severity levels (Error, Warning, Info, Hint)
//! - Line-anchored diagnostic records with notes and help text
//! - A terminal formatter that prints the offending source line with two
//!   lines of context above and below
//! - Machine-readable JSON reports
//!
//! Analysis passes record diagnostics as `(kind, message, line)`; the
//! [`trace`] module holds the builders for the memory-safety kinds.

use serde::Serialize;
use std::fmt;

pub use source_map::{ContextLine, FileId, SourceFile, SourceMap, SourcePosition, SourceSpan};

/// Number of context lines shown above and below the offending line
pub const CONTEXT_RADIUS: usize = 2;

/// Severity level for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
    Hint,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
            Severity::Hint => write!(f, "hint"),
        }
    }
}

/// A diagnostic message anchored to a source line
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: Option<String>,
    pub message: String,
    pub line: usize,
    pub file_id: Option<FileId>,
    pub notes: Vec<String>,
    pub help: Vec<String>,
}

/// Ordered collection of diagnostics for one compilation unit
#[derive(Debug, Clone, Default)]
pub struct Diagnostics {
    pub diagnostics: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.diagnostics.extend(other.diagnostics);
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    /// Serialize all diagnostics as a JSON array for tooling
    pub fn to_json(&self) -> serde_json::Result<String> {
        let reports: Vec<DiagnosticReport<'_>> = self
            .diagnostics
            .iter()
            .map(DiagnosticReport::from)
            .collect();
        serde_json::to_string_pretty(&reports)
    }
}

/// Flat, serializable view of a [`Diagnostic`]
#[derive(Debug, Serialize)]
pub struct DiagnosticReport<'a> {
    pub severity: Severity,
    pub code: Option<&'a str>,
    pub message: &'a str,
    pub line: usize,
}

impl<'a> From<&'a Diagnostic> for DiagnosticReport<'a> {
    fn from(d: &'a Diagnostic) -> Self {
        Self {
            severity: d.severity,
            code: d.code.as_deref(),
            message: &d.message,
            line: d.line,
        }
    }
}

/// Builder for creating diagnostics
pub struct DiagnosticBuilder {
    severity: Severity,
    code: Option<String>,
    message: String,
    line: usize,
    file_id: Option<FileId>,
    notes: Vec<String>,
    help: Vec<String>,
}

impl DiagnosticBuilder {
    fn new(severity: Severity, message: impl Into<String>, line: usize) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            line,
            file_id: None,
            notes: vec![],
            help: vec![],
        }
    }

    pub fn error(message: impl Into<String>, line: usize) -> Self {
        Self::new(Severity::Error, message, line)
    }

    pub fn warning(message: impl Into<String>, line: usize) -> Self {
        Self::new(Severity::Warning, message, line)
    }

    pub fn info(message: impl Into<String>, line: usize) -> Self {
        Self::new(Severity::Info, message, line)
    }

    pub fn code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn file(mut self, file_id: FileId) -> Self {
        self.file_id = Some(file_id);
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }

    pub fn help(mut self, help_msg: impl Into<String>) -> Self {
        self.help.push(help_msg.into());
        self
    }

    pub fn build(self) -> Diagnostic {
        Diagnostic {
            severity: self.severity,
            code: self.code,
            message: self.message,
            line: self.line,
            file_id: self.file_id,
            notes: self.notes,
            help: self.help,
        }
    }
}

/// Formatter for displaying diagnostics in the terminal
pub struct ErrorFormatter {
    use_colors: bool,
}

impl ErrorFormatter {
    pub fn new() -> Self {
        Self { use_colors: false }
    }

    pub fn with_colors() -> Self {
        Self { use_colors: true }
    }

    pub fn format_diagnostics(&self, diagnostics: &Diagnostics, source_map: &SourceMap) -> String {
        let mut output = String::new();
        for (i, diagnostic) in diagnostics.diagnostics.iter().enumerate() {
            if i > 0 {
                output.push('\n');
            }
            output.push_str(&self.format_diagnostic(diagnostic, source_map));
        }
        output
    }

    pub fn format_diagnostic(&self, diagnostic: &Diagnostic, source_map: &SourceMap) -> String {
        let mut output = String::new();

        // Header: severity[code]: message
        if self.use_colors {
            let color = match diagnostic.severity {
                Severity::Error => "\x1b[31m",
                Severity::Warning => "\x1b[33m",
                Severity::Info => "\x1b[36m",
                Severity::Hint => "\x1b[32m",
            };
            output.push_str(color);
        }
        output.push_str(&format!("{}", diagnostic.severity));
        if let Some(code) = &diagnostic.code {
            output.push_str(&format!("[{}]", code));
        }
        if self.use_colors {
            output.push_str("\x1b[0m: \x1b[1m");
            output.push_str(&diagnostic.message);
            output.push_str("\x1b[0m\n");
        } else {
            output.push_str(&format!(": {}\n", diagnostic.message));
        }

        // Offending line with two lines of context above and below
        if let Some(file) = diagnostic.file_id.and_then(|id| source_map.file(id)) {
            output.push_str(&format!("  --> {}:{}\n", file.name, diagnostic.line));

            let context = file.context_lines(diagnostic.line, CONTEXT_RADIUS);
            let width = context
                .iter()
                .map(|l| l.number.to_string().len())
                .max()
                .unwrap_or(1);

            for line in &context {
                let marker = if line.is_focus { ">" } else { " " };
                if self.use_colors && line.is_focus {
                    output.push_str(&format!(
                        "\x1b[31m{} {:>width$} |\x1b[0m {}\n",
                        marker, line.number, line.text
                    ));
                } else {
                    output.push_str(&format!(
                        "{} {:>width$} | {}\n",
                        marker, line.number, line.text
                    ));
                }
            }
        }

        for note in &diagnostic.notes {
            output.push_str("note: ");
            output.push_str(note);
            output.push('\n');
        }
        for help_msg in &diagnostic.help {
            output.push_str("help: ");
            output.push_str(help_msg);
            output.push('\n');
        }

        output
    }
}

impl Default for ErrorFormatter {
    fn default() -> Self {
        Self::new()
    }
}

// Memory-safety (trace) diagnostics
pub mod trace;
