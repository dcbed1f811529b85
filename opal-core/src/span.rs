//! Source location primitives.
//!
//! Every token, AST node, and diagnostic carries a byte-range span so
//! later stages can point back into the original buffer. Positions are
//! byte offsets, not character or line/column positions; line/column
//! rendering is a presentation concern left to consumers.

/// Identifier for one source buffer within a compilation session.
///
/// The mapping from a `FileId` to a path or to the buffer contents is
/// maintained by the caller; the pipeline only threads the id through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId(pub u32);

/// A half-open byte range `[start, end)` within a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub file_id: FileId,
    pub start: u32,
    pub end: u32,
}

impl Span {
    pub fn new(file_id: FileId, start: u32, end: u32) -> Span {
        Span { file_id, start, end }
    }

    /// An empty span at the given position.
    pub fn empty(file_id: FileId, pos: u32) -> Span {
        Span {
            file_id,
            start: pos,
            end: pos,
        }
    }

    /// The smallest span covering both `self` and `other`, if they are
    /// in the same file.
    pub fn join(self, other: Span) -> Option<Span> {
        if self.file_id != other.file_id {
            return None;
        }
        Some(Span::new(
            self.file_id,
            self.start.min(other.start),
            self.end.max(other.end),
        ))
    }

    /// Returns true if `pos` falls inside this span.
    pub fn contains(&self, pos: u32) -> bool {
        self.start <= pos && pos < self.end
    }

    /// Placeholder for synthesized nodes with no precise location.
    pub fn dummy() -> Span {
        Span {
            file_id: FileId(0),
            start: 0,
            end: 0,
        }
    }
}
