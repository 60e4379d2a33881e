//! A module provide `RowBuffer`.

use crate::types::{estimate_row_size, Row};

/// An ordered, append-only in-memory collection of normalized rows plus a
/// running estimate of their serialized byte size.
///
/// The buffer is owned by exactly one writer instance. It is reset only by
/// the commit coordinator, after the commit's chunks have been durably
/// written.
#[derive(Debug, Default)]
pub struct RowBuffer {
    rows: Vec<Row>,
    byte_estimate: usize,
}

impl RowBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a normalized row and account for its estimated serialized
    /// size. Never suspends.
    pub fn append(&mut self, row: Row) {
        self.byte_estimate += estimate_row_size(&row);
        self.rows.push(row);
    }

    /// Estimated serialized size of all buffered rows, in bytes.
    pub fn size(&self) -> usize {
        self.byte_estimate
    }

    /// Number of buffered rows.
    pub fn count(&self) -> usize {
        self.rows.len()
    }

    /// Clone the buffered rows in insertion order. The buffer itself stays
    /// untouched so callers keep observing the pending rows until the
    /// commit finishes.
    pub fn snapshot(&self) -> Vec<Row> {
        self.rows.clone()
    }

    /// Clear the rows and zero the size estimate. Only the commit
    /// coordinator calls this, once a commit has fully completed.
    pub(crate) fn reset(&mut self) {
        self.rows.clear();
        self.byte_estimate = 0;
    }
}
