//! Storage Manager
//!
//! Owns the `sstables/` directory.
//!
//! ## Responsibilities
//! - Discover existing SSTables on startup
//! - Clean up leftovers of interrupted flushes and compactions
//! - Write new SSTables from flushed memtables and compaction output
//!
//! The live table list itself belongs to the engine state; the manager only
//! turns files into `SSTable` handles and back.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::sstable::{FileRole, TableId, TMP_EXT};
use super::{SSTable, SSTableBuilder};
use crate::config::ReadBackend;
use crate::entry::Entry;
use crate::error::{Result, TierError};
use crate::io_util;

/// Manages the storage layer
#[derive(Debug, Clone)]
pub struct StorageManager {
    /// Directory where SSTables are stored
    dir: PathBuf,
    backend: ReadBackend,
}

impl StorageManager {
    /// Open or create storage in the given directory
    pub fn open(dir: &Path, backend: ReadBackend) -> Result<Self> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            backend,
        })
    }

    /// Get the data directory path
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn backend(&self) -> ReadBackend {
        self.backend
    }

    /// Open every published table, newest first
    ///
    /// On startup:
    /// 1. Remove `.tmp` files from unfinished writes
    /// 2. Remove index files with no data file (rename interrupted)
    /// 3. Remove tables already replaced by a compaction output
    /// 4. Open the rest, ordered by generation descending
    pub fn open_all(&self) -> Result<Vec<Arc<SSTable>>> {
        let mut files: HashMap<TableId, HashSet<FileRole>> = HashMap::new();
        let mut removed = 0usize;

        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if path.extension().is_some_and(|ext| ext == TMP_EXT) {
                tracing::info!(path = %path.display(), "removing unfinished SSTable file");
                io_util::remove_if_exists(&path)?;
                removed += 1;
                continue;
            }
            if let Some((id, role)) = TableId::parse_file_name(name) {
                files.entry(id).or_default().insert(role);
            }
        }

        let mut live = Vec::new();
        for (id, roles) in &files {
            match (roles.contains(&FileRole::Data), roles.contains(&FileRole::Index)) {
                (true, true) => live.push(*id),
                (false, _) => {
                    tracing::info!(table = %id, "removing index without data file");
                    io_util::remove_if_exists(&id.index_path(&self.dir))?;
                    removed += 1;
                }
                (true, false) => {
                    return Err(TierError::Corruption(format!(
                        "SSTable {} has a data file but no index",
                        id
                    )));
                }
            }
        }

        let superseded: Vec<TableId> = live
            .iter()
            .filter(|id| live.iter().any(|other| other.covers(id)))
            .copied()
            .collect();
        for id in &superseded {
            tracing::info!(table = %id, "removing SSTable replaced by compaction");
            self.remove_files(id)?;
            removed += 1;
        }
        live.retain(|id| !superseded.contains(id));

        if removed > 0 {
            io_util::sync_dir(&self.dir)?;
        }

        live.sort_by(newest_first);
        let tables = live
            .into_iter()
            .map(|id| self.open_table(id))
            .collect::<Result<Vec<_>>>()?;

        tracing::info!(
            dir = %self.dir.display(),
            tables = tables.len(),
            removed,
            "opened SSTables"
        );
        Ok(tables)
    }

    /// Open a single published table
    pub fn open_table(&self, id: TableId) -> Result<Arc<SSTable>> {
        Ok(Arc::new(SSTable::open(&self.dir, id, self.backend)?))
    }

    /// Write `entries` (strictly ascending) as table `id` and open it
    pub fn write_table<I>(&self, id: TableId, entries: I) -> Result<Arc<SSTable>>
    where
        I: IntoIterator<Item = Result<Entry>>,
    {
        let mut builder = SSTableBuilder::new(&self.dir, id)?;
        for entry in entries {
            builder.add(&entry?)?;
        }
        let id = builder.finish()?;
        self.open_table(id)
    }

    fn remove_files(&self, id: &TableId) -> Result<()> {
        io_util::remove_if_exists(&id.data_path(&self.dir))?;
        io_util::remove_if_exists(&id.index_path(&self.dir))?;
        Ok(())
    }
}

/// Recency order: higher generation first, then the narrower range
pub(crate) fn newest_first(a: &TableId, b: &TableId) -> Ordering {
    b.generation.cmp(&a.generation).then(b.base.cmp(&a.base))
}
