//! Storage Module
//!
//! Persistent storage layer: immutable SSTables on disk.
//!
//! ## Responsibilities
//! - Persist flushed and compacted runs in sorted order
//! - Point lookups and range scans by binary search over an offset index
//! - Crash-safe publication (temp files, fsync, rename)
//! - Cleanup of leftovers from interrupted flushes and compactions
//!
//! ## File Format
//! Each table is a pair of files sharing a stem.
//! ```text
//! sstable_000007.data              sstable_000007.index
//! ┌──────────────────────────┐     ┌──────────────────┐
//! │ Entry 0                  │◄────│ Offset 0 (u64 LE)│
//! │ [KeyLen][Key][ValLen][V] │     ├──────────────────┤
//! ├──────────────────────────┤◄────│ Offset 1 (u64 LE)│
//! │ Entry 1                  │     ├──────────────────┤
//! │ ...                      │     │ ...              │
//! └──────────────────────────┘     └──────────────────┘
//! ValLen = u32::MAX marks a tombstone. No header, no footer.
//! ```
//! Compaction output is named `sstable_{base:06}_{generation:06}` where
//! `base..=generation` is the range of generations it replaced.

mod manager;
mod source;
mod sstable;

pub(crate) use manager::newest_first;
pub use manager::StorageManager;
pub use source::{open_source, ByteSource, FileSource, MmapSource};
pub use sstable::{SSTable, SSTableBuilder, SSTableIterator, TableId, TableKind};
