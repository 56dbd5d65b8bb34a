//! WAL segment directory
//!
//! One segment file per memtable generation (`{generation:06}.log`). A
//! segment is deleted by `checkpoint` once the SSTable of its generation is
//! durable.

use std::fs;
use std::path::{Path, PathBuf};

use super::{RecoveryResult, WalEntry, WalRecovery, WalWriter};
use crate::config::WalSyncStrategy;
use crate::error::Result;
use crate::io_util;

const SEGMENT_EXT: &str = "log";

/// The `wal/` directory and the segments in it
#[derive(Debug, Clone)]
pub struct WalDirectory {
    dir: PathBuf,
}

impl WalDirectory {
    /// Open the directory, creating it if needed
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        &self.dir
    }

    pub fn segment_path(&self, generation: u64) -> PathBuf {
        self.dir.join(format!("{:06}.{}", generation, SEGMENT_EXT))
    }

    /// Generations of all segments on disk, ascending
    pub fn segments(&self) -> Result<Vec<u64>> {
        let mut generations = Vec::new();
        for dirent in fs::read_dir(&self.dir)? {
            let path = dirent?.path();
            if let Some(generation) = parse_segment_name(&path) {
                generations.push(generation);
            }
        }
        generations.sort_unstable();
        Ok(generations)
    }

    /// Create (or reopen) the segment for `generation`
    pub fn create_segment(
        &self,
        generation: u64,
        sync_strategy: WalSyncStrategy,
    ) -> Result<WalWriter> {
        let writer = WalWriter::open(&self.segment_path(generation), sync_strategy)?;
        io_util::sync_dir(&self.dir)?;
        Ok(writer)
    }

    /// Replay one segment in LSN order, skipping corrupted records
    pub fn replay(&self, generation: u64) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        WalRecovery::recover(&self.segment_path(generation))
    }

    /// Discard every segment whose generation is at or below `generation`.
    ///
    /// Returns the number of segments removed.
    pub fn checkpoint(&self, generation: u64) -> Result<usize> {
        let mut removed = 0;
        for segment in self.segments()? {
            if segment > generation {
                break;
            }
            if io_util::remove_if_exists(&self.segment_path(segment))? {
                removed += 1;
            }
        }
        if removed > 0 {
            io_util::sync_dir(&self.dir)?;
            tracing::debug!(generation, removed, "WAL checkpoint");
        }
        Ok(removed)
    }
}

fn parse_segment_name(path: &Path) -> Option<u64> {
    if path.extension()? != SEGMENT_EXT {
        return None;
    }
    path.file_stem()?.to_str()?.parse().ok()
}
