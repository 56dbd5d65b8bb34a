//! MemTable Module
//!
//! In-memory data structure for recent writes.
//!
//! ## Responsibilities
//! - Fast reads and writes in memory
//! - Concurrent inserts and reads without an outer lock
//! - Track approximate size for flush triggers
//! - Ordered iteration for SSTable creation and range scans
//!
//! ## Data Structure Choice
//! `crossbeam_skiplist::SkipMap` keyed by `Bytes`:
//! - Ordered keys (required for SSTable generation)
//! - Lock-free inserts and lookups
//! - Values are `Option<Bytes>`, `None` being a tombstone
//!
//! ## Lifecycle
//! Active (accepts writes) → flushing (read-only, being written to an
//! SSTable) → dropped once the SSTable is published.

mod table;

pub use table::{MemTable, MemTableIterator, ENTRY_OVERHEAD};
