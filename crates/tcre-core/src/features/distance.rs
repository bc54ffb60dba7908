//! Per-token distance features relative to an entity span.

/// Token span `[start, end)` in a marked sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Signed distance from token `i` to the span: negative before it,
    /// positive after it, zero inside.
    pub fn distance(&self, i: usize) -> i64 {
        if i < self.start {
            i as i64 - self.start as i64
        } else if i >= self.end {
            i as i64 - (self.end.max(self.start + 1) - 1) as i64
        } else {
            0
        }
    }
}

/// Distance of every token in a sequence of length `len` to `span`.
pub fn distances(len: usize, span: Span) -> Vec<i64> {
    (0..len).map(|i| span.distance(i)).collect()
}
