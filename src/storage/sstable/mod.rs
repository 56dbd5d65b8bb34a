//! SSTable Module
//!
//! Sorted String Table - immutable on-disk sorted key-value storage.
//!
//! ## Naming
//! ```text
//! sstable_{gen:06}.data / .index             flushed from a memtable
//! sstable_{base:06}_{gen:06}.data / .index   compaction of base..=gen
//! *.tmp                                      not yet published
//! ```

mod builder;
mod iterator;
mod reader;

use std::fmt;
use std::path::{Path, PathBuf};

pub use builder::SSTableBuilder;
pub use iterator::SSTableIterator;
pub use reader::SSTable;

// =============================================================================
// Shared Constants (used by builder, reader, manager)
// =============================================================================

pub(crate) const FILE_PREFIX: &str = "sstable_";
pub(crate) const DATA_EXT: &str = "data";
pub(crate) const INDEX_EXT: &str = "index";
pub(crate) const TMP_EXT: &str = "tmp";

/// Width of one index slot
pub(crate) const OFFSET_SIZE: u64 = 8;

// =============================================================================
// Table identity
// =============================================================================

/// How a table came to exist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableKind {
    Flushed,
    Compacted,
}

/// Identity of a table, encoded in its file names.
///
/// `generation` fixes recency: higher shadows lower. A compacted table
/// carries the highest generation it replaced and remembers the lowest as
/// `base`, so a table flushed while it ran still outranks it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableId {
    pub base: u64,
    pub generation: u64,
    pub kind: TableKind,
}

/// Which file of a table a directory entry is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum FileRole {
    Data,
    Index,
}

impl TableId {
    pub fn flushed(generation: u64) -> Self {
        Self {
            base: generation,
            generation,
            kind: TableKind::Flushed,
        }
    }

    pub fn compacted(base: u64, generation: u64) -> Self {
        Self {
            base,
            generation,
            kind: TableKind::Compacted,
        }
    }

    pub fn is_compacted(&self) -> bool {
        self.kind == TableKind::Compacted
    }

    /// True if `other` is an input this compacted table already replaced
    pub fn covers(&self, other: &TableId) -> bool {
        self.is_compacted()
            && self != other
            && self.base <= other.base
            && other.generation <= self.generation
    }

    pub fn file_stem(&self) -> String {
        match self.kind {
            TableKind::Flushed => format!("{}{:06}", FILE_PREFIX, self.generation),
            TableKind::Compacted => {
                format!("{}{:06}_{:06}", FILE_PREFIX, self.base, self.generation)
            }
        }
    }

    pub fn data_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.file_stem(), DATA_EXT))
    }

    pub fn index_path(&self, dir: &Path) -> PathBuf {
        dir.join(format!("{}.{}", self.file_stem(), INDEX_EXT))
    }

    /// Parse a published file name such as `sstable_000003_000009.index`
    pub(crate) fn parse_file_name(name: &str) -> Option<(TableId, FileRole)> {
        let (stem, ext) = name.rsplit_once('.')?;
        let role = match ext {
            DATA_EXT => FileRole::Data,
            INDEX_EXT => FileRole::Index,
            _ => return None,
        };
        let numbers = stem.strip_prefix(FILE_PREFIX)?;
        let id = match numbers.split_once('_') {
            None => TableId::flushed(numbers.parse().ok()?),
            Some((base, generation)) => {
                let base: u64 = base.parse().ok()?;
                let generation: u64 = generation.parse().ok()?;
                if base > generation {
                    return None;
                }
                TableId::compacted(base, generation)
            }
        };
        Some((id, role))
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TableKind::Flushed => write!(f, "{}", self.generation),
            TableKind::Compacted => write!(f, "{}..={}", self.base, self.generation),
        }
    }
}

/// Temporary path a file is written under before its rename
pub(crate) fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".");
    name.push(TMP_EXT);
    PathBuf::from(name)
}
