//! MemTable implementation
//!
//! SkipMap-based memtable with an atomic size counter.

use std::ops::Bound;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_skiplist::SkipMap;

use crate::entry::Entry;

/// Fixed bytes charged per insert on top of key and value lengths
pub const ENTRY_OVERHEAD: usize = 16;

/// In-memory table for recent writes
pub struct MemTable {
    /// Generation this table becomes when flushed (also its WAL segment id)
    generation: u64,
    /// Size at which `put` starts reporting the table as full
    size_limit: usize,
    data: SkipMap<Bytes, Option<Bytes>>,
    /// Approximate size in bytes, grows on every insert
    size: AtomicUsize,
}

impl MemTable {
    /// Create a new empty MemTable
    pub fn new(generation: u64, size_limit: usize) -> Self {
        Self {
            generation,
            size_limit,
            data: SkipMap::new(),
            size: AtomicUsize::new(0),
        }
    }

    /// Get the entry for a key. A tombstone comes back as an entry with no value.
    pub fn get(&self, key: &[u8]) -> Option<Entry> {
        self.data.get(key).map(|e| Entry {
            key: e.key().clone(),
            value: e.value().clone(),
        })
    }

    /// Insert or overwrite an entry.
    ///
    /// Returns true when the table is now at or over its size limit.
    pub fn put(&self, entry: Entry) -> bool {
        let charged = entry.key.len() + entry.value.as_ref().map_or(0, |v| v.len()) + ENTRY_OVERHEAD;
        self.data.insert(entry.key, entry.value);
        let new_size = self.size.fetch_add(charged, Ordering::AcqRel) + charged;
        new_size >= self.size_limit
    }

    /// Get approximate size in bytes
    pub fn size(&self) -> usize {
        self.size.load(Ordering::Acquire)
    }

    /// Get entry count (distinct keys)
    pub fn entry_count(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Check if should flush (size >= limit)
    pub fn should_flush(&self) -> bool {
        self.size() >= self.size_limit
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn size_limit(&self) -> usize {
        self.size_limit
    }

    /// Iterate over every entry, tombstones included, in key order
    pub fn iter(self: &Arc<Self>) -> MemTableIterator {
        self.range(None, None)
    }

    /// Lazy ascending iterator over `[from, to)`. `None` leaves that side open.
    pub fn range(self: &Arc<Self>, from: Option<&[u8]>, to: Option<&[u8]>) -> MemTableIterator {
        let exhausted = matches!((from, to), (Some(f), Some(t)) if f >= t);
        MemTableIterator {
            memtable: Arc::clone(self),
            lower: from.map(Bytes::copy_from_slice),
            upper: to.map(Bytes::copy_from_slice),
            cursor: None,
            exhausted,
        }
    }
}

/// Iterator over MemTable entries.
///
/// Holds the table alive and re-seeks past the last returned key on every
/// step, so it never borrows the skip list across calls.
pub struct MemTableIterator {
    memtable: Arc<MemTable>,
    lower: Option<Bytes>,
    upper: Option<Bytes>,
    cursor: Option<Bytes>,
    exhausted: bool,
}

impl Iterator for MemTableIterator {
    type Item = Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.exhausted {
            return None;
        }

        let start: Bound<&[u8]> = match (&self.cursor, &self.lower) {
            (Some(last), _) => Bound::Excluded(last.as_ref()),
            (None, Some(lower)) => Bound::Included(lower.as_ref()),
            (None, None) => Bound::Unbounded,
        };
        let end: Bound<&[u8]> = match &self.upper {
            Some(upper) => Bound::Excluded(upper.as_ref()),
            None => Bound::Unbounded,
        };

        let next = self
            .memtable
            .data
            .range::<[u8], _>((start, end))
            .next()
            .map(|e| Entry {
                key: e.key().clone(),
                value: e.value().clone(),
            });

        match next {
            Some(entry) => {
                self.cursor = Some(entry.key.clone());
                Some(entry)
            }
            None => {
                self.exhausted = true;
                None
            }
        }
    }
}
