use std::ops::Range;

/// Lines a parsed task occupied in its source (0-indexed, exclusive end)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpan {
    pub line_range: Range<usize>,
}

impl SourceSpan {
    pub fn new(start: usize, end: usize) -> Self {
        SourceSpan {
            line_range: start..end,
        }
    }

    /// 1-based number of the first line, as editors show it
    pub fn first_line_number(&self) -> usize {
        self.line_range.start + 1
    }
}
