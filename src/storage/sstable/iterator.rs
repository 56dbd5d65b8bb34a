//! SSTable Iterator
//!
//! Sequential iteration over a slice of an SSTable's entries.

use std::sync::Arc;

use super::reader::SSTable;
use crate::entry::Entry;
use crate::error::Result;

/// Iterator over SSTable entries in sorted key order.
///
/// Holds the table alive for as long as the scan runs. Stops after the
/// first read error.
pub struct SSTableIterator {
    table: Arc<SSTable>,
    /// Next entry to read
    pos: usize,
    /// One past the last entry to read
    end: usize,
}

impl SSTableIterator {
    pub(super) fn new(table: Arc<SSTable>, pos: usize, end: usize) -> Self {
        Self { table, pos, end }
    }

    /// Entries left to yield
    pub fn remaining(&self) -> usize {
        self.end.saturating_sub(self.pos)
    }
}

impl Iterator for SSTableIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.pos >= self.end {
            return None;
        }
        let result = self.table.entry_at(self.pos);
        self.pos = if result.is_ok() { self.pos + 1 } else { self.end };
        Some(result)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, Some(self.remaining()))
    }
}
