//! Immutable per-revision view of a document's text.
//!
//! A [`DocumentSnapshot`] is rebuilt on every edit and never mutated. All
//! positions in this crate are 0-based and count columns in `char`s.

use serde::{Deserialize, Serialize};

/// A line/column position in a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub character: usize,
}

impl Position {
    pub fn new(line: usize, character: usize) -> Self {
        Self { line, character }
    }
}

/// A half-open `start..end` span of positions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// A span covering `start..end` columns of a single line.
    pub fn on_line(line: usize, start: usize, end: usize) -> Self {
        Self::new(Position::new(line, start), Position::new(line, end))
    }

    /// The zero-width span at the start of the document.
    pub fn document_start() -> Self {
        Self::default()
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start.line <= line && line <= self.end.line
    }
}

/// One revision of a document, split into lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentSnapshot {
    lines: Vec<String>,
    revision: u64,
}

impl DocumentSnapshot {
    /// Split `text` into lines. Both `\n` and `\r\n` terminators are accepted.
    pub fn new(text: &str, revision: u64) -> Self {
        let lines = text.lines().map(str::to_owned).collect();
        Self { lines, revision }
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn line(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    pub fn lines(&self) -> impl Iterator<Item = (usize, &str)> {
        self.lines.iter().enumerate().map(|(i, l)| (i, l.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|l| l.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_crlf_and_lf() {
        let doc = DocumentSnapshot::new("a: 1\r\nb: 2\nc: 3", 7);
        assert_eq!(doc.line_count(), 3);
        assert_eq!(doc.line(1), Some("b: 2"));
        assert_eq!(doc.line(3), None);
        assert_eq!(doc.revision(), 7);
    }

    #[test]
    fn span_line_containment() {
        let span = Span::new(Position::new(2, 0), Position::new(5, 3));
        assert!(span.contains_line(2));
        assert!(span.contains_line(5));
        assert!(!span.contains_line(6));
    }
}
