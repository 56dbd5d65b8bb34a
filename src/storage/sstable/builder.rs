//! SSTable Builder
//!
//! Writes sorted entries to a new data + index file pair.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use bytes::Bytes;

use super::{tmp_path, TableId};
use crate::entry::Entry;
use crate::error::{Result, TierError};
use crate::io_util;

/// Builder for creating new SSTables from sorted entries
///
/// Both files are written under `.tmp` names. `finish()` fsyncs them and
/// renames the index first and the data file last, so a data file on disk
/// always has a complete index next to it. Dropping an unfinished builder
/// removes the temporary files.
pub struct SSTableBuilder {
    id: TableId,
    dir: PathBuf,
    /// Buffered writers for performance
    data: BufWriter<File>,
    index: BufWriter<File>,
    data_tmp: PathBuf,
    index_tmp: PathBuf,
    /// Number of entries written
    entry_count: u64,
    /// Current write position in the data file
    current_offset: u64,
    /// Last key written, to enforce strictly ascending input
    last_key: Option<Bytes>,
    finished: bool,
}

impl SSTableBuilder {
    /// Create a new SSTable builder in `dir`
    pub fn new(dir: &Path, id: TableId) -> Result<Self> {
        let data_tmp = tmp_path(&id.data_path(dir));
        let index_tmp = tmp_path(&id.index_path(dir));

        let data = create_truncated(&data_tmp)?;
        let index = create_truncated(&index_tmp)?;

        Ok(Self {
            id,
            dir: dir.to_path_buf(),
            data: BufWriter::new(data),
            index: BufWriter::new(index),
            data_tmp,
            index_tmp,
            entry_count: 0,
            current_offset: 0,
            last_key: None,
            finished: false,
        })
    }

    /// Add an entry (must be called in strictly ascending key order)
    pub fn add(&mut self, entry: &Entry) -> Result<()> {
        if let Some(last) = &self.last_key {
            if entry.key <= *last {
                return Err(TierError::Storage(format!(
                    "SSTable {} input out of order: {:?} after {:?}",
                    self.id, entry.key, last
                )));
            }
        }

        self.index.write_all(&self.current_offset.to_le_bytes())?;
        let encoded = entry.encode();
        self.data.write_all(&encoded)?;

        self.current_offset += encoded.len() as u64;
        self.entry_count += 1;
        self.last_key = Some(entry.key.clone());
        Ok(())
    }

    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn id(&self) -> TableId {
        self.id
    }

    /// Make both files durable and publish them under their final names
    pub fn finish(mut self) -> Result<TableId> {
        self.data.flush()?;
        self.data.get_ref().sync_all()?;
        self.index.flush()?;
        self.index.get_ref().sync_all()?;

        // Data last: its appearance is what makes the table exist.
        fs::rename(&self.index_tmp, self.id.index_path(&self.dir))?;
        fs::rename(&self.data_tmp, self.id.data_path(&self.dir))?;
        io_util::sync_dir(&self.dir)?;
        self.finished = true;

        tracing::debug!(
            table = %self.id,
            entries = self.entry_count,
            bytes = self.current_offset,
            "SSTable written"
        );
        Ok(self.id)
    }
}

impl Drop for SSTableBuilder {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        for path in [&self.data_tmp, &self.index_tmp] {
            if let Err(e) = io_util::remove_if_exists(path) {
                tracing::warn!(path = %path.display(), error = %e, "failed to remove temp file");
            }
        }
    }
}

fn create_truncated(path: &Path) -> Result<File> {
    Ok(OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?)
}
