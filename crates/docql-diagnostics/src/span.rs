//! Source positions attached to expression nodes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte range `[start, end)` of a node in the expression text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Empty span where input ended
    pub const fn point(at: usize) -> Self {
        Self::new(at, at)
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.end <= self.start
    }

    /// From the start of `self` to the end of `last`
    pub const fn to(self, last: Span) -> Span {
        Span::new(self.start, last.end)
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A span resolved to 1-based line and column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    /// Byte offset of the span start
    pub offset: usize,
    pub length: usize,
}

impl SourceLocation {
    /// Columns count characters, not bytes
    pub fn from_span(span: Span, source: &str) -> Self {
        let start = span.start.min(source.len());
        let before = source.get(..start).unwrap_or(source);
        let line_start = before.rfind('\n').map_or(0, |nl| nl + 1);
        Self {
            line: before.matches('\n').count() + 1,
            column: before[line_start..].chars().count() + 1,
            offset: span.start,
            length: span.len(),
        }
    }

    pub const fn span(&self) -> Span {
        Span::new(self.offset, self.offset + self.length)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_to() {
        let joined = Span::new(2, 3).to(Span::new(8, 11));
        assert_eq!(joined, Span::new(2, 11));
        assert_eq!(joined.len(), 9);
        assert!(Span::point(4).is_empty());
    }

    #[test]
    fn test_location_from_span() {
        let source = "a = 1\nand b IN [1, 2]";
        let loc = SourceLocation::from_span(Span::new(10, 12), source);
        assert_eq!((loc.line, loc.column), (2, 5));
        assert_eq!(loc.length, 2);
        assert_eq!(loc.span(), Span::new(10, 12));
    }

    #[test]
    fn test_location_past_end() {
        let loc = SourceLocation::from_span(Span::point(3), "a +");
        assert_eq!((loc.line, loc.column), (1, 4));
    }
}
