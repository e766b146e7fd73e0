//! Source file tracking for the Quill compiler
//!
//! This library manages file identifiers, source text storage, and line
//! lookups for diagnostics. The trace analysis reports violations by line
//! number; the diagnostics renderer asks this crate for the offending line
//! plus a window of surrounding context.

use std::fmt;

/// Unique identifier for a source file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(u32);

impl FileId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.0)
    }
}

/// A position in source code (1-based line and column)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    pub line: usize,
    pub column: usize,
}

impl SourcePosition {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A span of source code within a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceSpan {
    pub start: SourcePosition,
    pub end: SourcePosition,
    pub file_id: FileId,
}

impl SourceSpan {
    pub fn new(start: SourcePosition, end: SourcePosition, file_id: FileId) -> Self {
        Self {
            start,
            end,
            file_id,
        }
    }

    /// Span covering a whole line, for diagnostics that only carry a line number
    pub fn whole_line(line: usize, file_id: FileId) -> Self {
        Self {
            start: SourcePosition::new(line, 1),
            end: SourcePosition::new(line, 1),
            file_id,
        }
    }
}

/// One line of surrounding context returned by [`SourceFile::context_lines`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLine {
    pub number: usize,
    pub text: String,
    /// True for the line the diagnostic points at
    pub is_focus: bool,
}

/// A registered source file with precomputed line boundaries
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub name: String,
    pub content: String,
    line_starts: Vec<usize>,
}

impl SourceFile {
    pub fn new(name: String, content: String) -> Self {
        let mut line_starts = vec![0];
        for (i, ch) in content.char_indices() {
            if ch == '\n' {
                line_starts.push(i + 1);
            }
        }
        Self {
            name,
            content,
            line_starts,
        }
    }

    pub fn line_count(&self) -> usize {
        self.line_starts.len()
    }

    /// Get a line by 1-based number, without its trailing newline
    pub fn line(&self, number: usize) -> Option<&str> {
        if number == 0 || number > self.line_starts.len() {
            return None;
        }
        let start = self.line_starts[number - 1];
        let end = self
            .line_starts
            .get(number)
            .copied()
            .unwrap_or(self.content.len());
        Some(self.content[start..end].trim_end_matches(['\n', '\r']))
    }

    /// The focus line plus up to `radius` lines above and below it
    pub fn context_lines(&self, focus: usize, radius: usize) -> Vec<ContextLine> {
        let first = focus.saturating_sub(radius).max(1);
        let last = (focus + radius).min(self.line_count());
        (first..=last)
            .filter_map(|number| {
                self.line(number).map(|text| ContextLine {
                    number,
                    text: text.to_string(),
                    is_focus: number == focus,
                })
            })
            .collect()
    }
}

/// Registry of all source files in a compilation unit
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    files: Vec<SourceFile>,
}

impl SourceMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&mut self, name: impl Into<String>, content: impl Into<String>) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(name.into(), content.into()));
        id
    }

    pub fn file(&self, id: FileId) -> Option<&SourceFile> {
        self.files.get(id.0 as usize)
    }

    pub fn line(&self, id: FileId, number: usize) -> Option<&str> {
        self.file(id)?.line(number)
    }

    pub fn context_lines(&self, id: FileId, focus: usize, radius: usize) -> Vec<ContextLine> {
        self.file(id)
            .map(|f| f.context_lines(focus, radius))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_lookup() {
        let file = SourceFile::new("main.ql".to_string(), "one\ntwo\nthree".to_string());
        assert_eq!(file.line(1), Some("one"));
        assert_eq!(file.line(2), Some("two"));
        assert_eq!(file.line(3), Some("three"));
        assert_eq!(file.line(4), None);
        assert_eq!(file.line(0), None);
    }

    #[test]
    fn test_crlf_trimmed() {
        let file = SourceFile::new("main.ql".to_string(), "a\r\nb\r\n".to_string());
        assert_eq!(file.line(1), Some("a"));
        assert_eq!(file.line(2), Some("b"));
    }

    #[test]
    fn test_context_window() {
        let content = (1..=7).map(|i| format!("line {i}")).collect::<Vec<_>>().join("\n");
        let file = SourceFile::new("main.ql".to_string(), content);

        let ctx = file.context_lines(4, 2);
        assert_eq!(ctx.len(), 5);
        assert_eq!(ctx[0].number, 2);
        assert_eq!(ctx[4].number, 6);
        assert!(ctx[2].is_focus);
        assert_eq!(ctx[2].text, "line 4");
    }

    #[test]
    fn test_context_clamped_at_edges() {
        let file = SourceFile::new("main.ql".to_string(), "a\nb\nc".to_string());
        let ctx = file.context_lines(1, 2);
        assert_eq!(ctx.len(), 3);
        assert_eq!(ctx[0].number, 1);
        assert!(ctx[0].is_focus);
    }

    #[test]
    fn test_source_map_registry() {
        let mut map = SourceMap::new();
        let a = map.add_file("a.ql", "alpha");
        let b = map.add_file("b.ql", "beta");
        assert_ne!(a, b);
        assert_eq!(map.len(), 2);
        assert_eq!(map.line(a, 1), Some("alpha"));
        assert_eq!(map.line(b, 1), Some("beta"));
    }
}
