//! SSTable Reader
//!
//! Opens a published table and answers lookups by binary search over the
//! offset index. Nothing but the two file handles is held in memory.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::{Buf, Bytes};

use super::iterator::SSTableIterator;
use super::{TableId, OFFSET_SIZE};
use crate::config::ReadBackend;
use crate::entry::Entry;
use crate::error::{Result, TierError};
use crate::io_util;
use crate::storage::source::{open_source, ByteSource};

/// An open, immutable SSTable
pub struct SSTable {
    id: TableId,
    data_path: PathBuf,
    index_path: PathBuf,
    data: Arc<dyn ByteSource>,
    index: Arc<dyn ByteSource>,
    entry_count: usize,
    /// Set once a compaction output has replaced this table; the files go
    /// away when the last reader lets go.
    obsolete: AtomicBool,
}

impl SSTable {
    /// Open the table `id` stored in `dir`
    pub fn open(dir: &Path, id: TableId, backend: ReadBackend) -> Result<Self> {
        let data_path = id.data_path(dir);
        let index_path = id.index_path(dir);
        let data = open_source(&data_path, backend)?;
        let index = open_source(&index_path, backend)?;

        if index.len() % OFFSET_SIZE != 0 {
            return Err(TierError::Corruption(format!(
                "SSTable {} index length {} is not a multiple of {}",
                id,
                index.len(),
                OFFSET_SIZE
            )));
        }
        let entry_count = (index.len() / OFFSET_SIZE) as usize;

        let table = Self {
            id,
            data_path,
            index_path,
            data,
            index,
            entry_count,
            obsolete: AtomicBool::new(false),
        };
        if entry_count > 0 {
            let last = table.offset(entry_count - 1)?;
            if last >= table.data.len() {
                return Err(TierError::Corruption(format!(
                    "SSTable {} last offset {} beyond data length {}",
                    id,
                    last,
                    table.data.len()
                )));
            }
        }
        Ok(table)
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    pub fn generation(&self) -> u64 {
        self.id.generation
    }

    pub fn entry_count(&self) -> usize {
        self.entry_count
    }

    pub fn is_empty(&self) -> bool {
        self.entry_count == 0
    }

    /// Size of the data file in bytes
    pub fn data_size(&self) -> u64 {
        self.data.len()
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    /// Look up `key`. A tombstone comes back as an entry with no value.
    pub fn get(&self, key: &[u8]) -> Result<Option<Entry>> {
        let pos = self.lower_bound(key)?;
        if pos == self.entry_count {
            return Ok(None);
        }
        let entry = self.entry_at(pos)?;
        Ok((entry.key.as_ref() == key).then_some(entry))
    }

    /// Lazy ascending scan over `[from, to)`; an absent bound is open
    pub fn range(self: &Arc<Self>, from: Option<&[u8]>, to: Option<&[u8]>) -> Result<SSTableIterator> {
        if let (Some(from), Some(to)) = (from, to) {
            if from >= to {
                return Ok(SSTableIterator::new(Arc::clone(self), 0, 0));
            }
        }
        let start = match from {
            Some(key) => self.lower_bound(key)?,
            None => 0,
        };
        let end = match to {
            Some(key) => self.lower_bound(key)?,
            None => self.entry_count,
        };
        Ok(SSTableIterator::new(Arc::clone(self), start, end))
    }

    /// Full scan in key order
    pub fn iter(self: &Arc<Self>) -> SSTableIterator {
        SSTableIterator::new(Arc::clone(self), 0, self.entry_count)
    }

    /// Position of the first entry whose key is `>= key`
    pub fn lower_bound(&self, key: &[u8]) -> Result<usize> {
        let (mut lo, mut hi) = (0, self.entry_count);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid)?.as_ref() < key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        Ok(lo)
    }

    /// Flag this table for deletion once no snapshot references it
    pub fn mark_obsolete(&self) {
        self.obsolete.store(true, Ordering::Release);
    }

    pub fn is_obsolete(&self) -> bool {
        self.obsolete.load(Ordering::Acquire)
    }

    // =========================================================================
    // Positional access
    // =========================================================================

    fn offset(&self, pos: usize) -> Result<u64> {
        let mut slot = self.index.read_at(pos as u64 * OFFSET_SIZE, OFFSET_SIZE as usize)?;
        Ok(slot.get_u64_le())
    }

    fn key_at(&self, pos: usize) -> Result<Bytes> {
        let offset = self.offset(pos)?;
        let mut len = self.data.read_at(offset, 4)?;
        let key_len = len.get_u32_le() as usize;
        self.data.read_at(offset + 4, key_len)
    }

    pub(super) fn entry_at(&self, pos: usize) -> Result<Entry> {
        let start = self.offset(pos)?;
        let end = if pos + 1 < self.entry_count {
            self.offset(pos + 1)?
        } else {
            self.data.len()
        };
        if end < start {
            return Err(TierError::Corruption(format!(
                "SSTable {} offsets decrease at entry {}",
                self.id, pos
            )));
        }

        let mut buf = self.data.read_at(start, (end - start) as usize)?;
        let entry = Entry::decode(&mut buf)?;
        if buf.has_remaining() {
            return Err(TierError::Corruption(format!(
                "SSTable {} entry {} has {} stray bytes",
                self.id,
                pos,
                buf.remaining()
            )));
        }
        Ok(entry)
    }
}

impl Drop for SSTable {
    fn drop(&mut self) {
        if !self.is_obsolete() {
            return;
        }
        // Data first: without it the index is an orphan that open() removes.
        for path in [&self.data_path, &self.index_path] {
            if let Err(e) = io_util::remove_if_exists(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to delete obsolete SSTable file");
            }
        }
        tracing::debug!(table = %self.id, "deleted obsolete SSTable");
    }
}

impl std::fmt::Debug for SSTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SSTable")
            .field("id", &self.id)
            .field("entry_count", &self.entry_count)
            .field("data_size", &self.data.len())
            .finish()
    }
}
