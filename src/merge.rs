//! Merge Iterator
//!
//! K-way merge over sorted sources of different recency.
//!
//! ## Ordering
//! Sources are given newest first: index 0 is the active memtable, then the
//! flushing memtable, then SSTables from newest to oldest generation. The
//! heap pops the smallest key, and for equal keys the lowest source index.
//! Only that entry survives; the same key in older sources is consumed and
//! dropped. Tombstones win the same way and are then hidden from the output.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::entry::Entry;
use crate::error::Result;

/// One input of a merge, already sorted by key with unique keys
pub type MergeSource = Box<dyn Iterator<Item = Result<Entry>> + Send>;

struct HeapItem {
    entry: Entry,
    /// Position in the source list; lower is newer
    source: usize,
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapItem {
    // BinaryHeap is a max-heap; reverse so the smallest (key, source) is on top.
    fn cmp(&self, other: &Self) -> Ordering {
        self.entry
            .key
            .cmp(&other.entry.key)
            .then(self.source.cmp(&other.source))
            .reverse()
    }
}

/// Sorted, deduplicated, tombstone-free view over several sources.
///
/// Yields `Err` at most once; the iterator is finished after that.
pub struct MergeIterator {
    sources: Vec<MergeSource>,
    heap: BinaryHeap<HeapItem>,
    failed: bool,
}

impl MergeIterator {
    /// Build the merge, pulling the first entry of every source.
    ///
    /// Sources that are empty from the start never enter the heap.
    pub fn new(sources: Vec<MergeSource>) -> Result<Self> {
        let mut merge = Self {
            heap: BinaryHeap::with_capacity(sources.len()),
            sources,
            failed: false,
        };
        for source in 0..merge.sources.len() {
            merge.advance(source)?;
        }
        Ok(merge)
    }

    /// A merge with nothing to yield
    pub fn empty() -> Self {
        Self {
            sources: Vec::new(),
            heap: BinaryHeap::new(),
            failed: false,
        }
    }

    /// Pull the next entry of `source` into the heap
    fn advance(&mut self, source: usize) -> Result<()> {
        if let Some(next) = self.sources[source].next() {
            self.heap.push(HeapItem {
                entry: next?,
                source,
            });
        }
        Ok(())
    }

    /// Pop the winning entry for the smallest key, discarding older versions
    fn next_version(&mut self) -> Result<Option<Entry>> {
        let Some(top) = self.heap.pop() else {
            return Ok(None);
        };
        self.advance(top.source)?;

        while let Some(shadowed) = self.heap.peek() {
            if shadowed.entry.key != top.entry.key {
                break;
            }
            let source = shadowed.source;
            self.heap.pop();
            self.advance(source)?;
        }
        Ok(Some(top.entry))
    }
}

impl Iterator for MergeIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        loop {
            match self.next_version() {
                Ok(Some(entry)) if entry.is_tombstone() => continue,
                Ok(Some(entry)) => return Some(Ok(entry)),
                Ok(None) => return None,
                Err(e) => {
                    self.failed = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
