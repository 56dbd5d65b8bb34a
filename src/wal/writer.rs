//! WAL Writer
//!
//! Handles appending entries to the WAL file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::reader::{RecordRead, WalReader};
use super::WalEntry;
use crate::config::WalSyncStrategy;
use crate::entry::Entry;
use crate::error::{Result, TierError};

/// Writes entries to the WAL file
///
/// A failed append or sync rolls the file back to the last successful sync,
/// so a record whose append returned an error never reaches the log.
pub struct WalWriter {
    path: PathBuf,
    /// `None` once a rollback itself failed; the segment takes no more writes
    writer: Option<BufWriter<File>>,
    /// LSN handed to the next appended record
    next_lsn: u64,
    sync_strategy: WalSyncStrategy,
    /// Records written since the last fsync
    uncommitted: usize,
    /// Bytes written since the last fsync
    unsynced_bytes: u64,
    /// File length as of the last successful sync
    synced_len: u64,
    /// `next_lsn` as of the last successful sync
    synced_lsn: u64,
    #[cfg(test)]
    fail_next_sync: bool,
}

impl WalWriter {
    /// Open or create a WAL file.
    ///
    /// An existing file keeps its records. Invalid bytes after the last valid
    /// record are cut off so new records start on a record boundary, and the
    /// LSN sequence continues after the last valid record.
    pub fn open(path: &Path, sync_strategy: WalSyncStrategy) -> Result<Self> {
        let (next_lsn, valid_end) = if path.exists() {
            scan_tail(path)?
        } else {
            (1, 0)
        };

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;
        if file.metadata()?.len() > valid_end {
            tracing::warn!(
                path = %path.display(),
                valid_end,
                "cutting invalid tail off WAL segment"
            );
            file.set_len(valid_end)?;
            file.sync_all()?;
        }
        file.seek(SeekFrom::End(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Some(BufWriter::new(file)),
            next_lsn,
            sync_strategy,
            uncommitted: 0,
            unsynced_bytes: 0,
            synced_len: valid_end,
            synced_lsn: next_lsn,
            #[cfg(test)]
            fail_next_sync: false,
        })
    }

    /// Append an entry to the WAL, returning its LSN.
    ///
    /// With `EveryWrite` the record is on disk when this returns; with
    /// `EveryNEntries` it is on disk once the group is synced. On error the
    /// log is rolled back to the last sync.
    pub fn append(&mut self, entry: &Entry) -> Result<u64> {
        let lsn = self.next_lsn;
        let record = WalEntry::new(lsn, entry.clone()).serialize()?;
        if let Err(e) = self.write_record(&record) {
            self.rollback();
            return Err(e);
        }
        Ok(lsn)
    }

    fn write_record(&mut self, record: &[u8]) -> Result<()> {
        self.buffer()?.write_all(record)?;
        self.next_lsn += 1;
        self.uncommitted += 1;
        self.unsynced_bytes += record.len() as u64;

        let due = match self.sync_strategy {
            WalSyncStrategy::EveryWrite => true,
            WalSyncStrategy::EveryNEntries { count } => self.uncommitted >= count,
        };
        if due {
            self.sync_buffered()?;
        }
        Ok(())
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        if let Err(e) = self.sync_buffered() {
            self.rollback();
            return Err(e);
        }
        Ok(())
    }

    fn sync_buffered(&mut self) -> Result<()> {
        let writer = self.buffer()?;
        writer.flush()?;
        self.injected_sync_failure()?;
        let writer = self.buffer()?;
        writer.get_ref().sync_data()?;

        self.synced_len += self.unsynced_bytes;
        self.synced_lsn = self.next_lsn;
        self.unsynced_bytes = 0;
        self.uncommitted = 0;
        Ok(())
    }

    #[cfg(test)]
    fn injected_sync_failure(&mut self) -> std::io::Result<()> {
        if std::mem::take(&mut self.fail_next_sync) {
            return Err(std::io::Error::new(std::io::ErrorKind::Other, "sync failed"));
        }
        Ok(())
    }

    #[cfg(not(test))]
    fn injected_sync_failure(&mut self) -> std::io::Result<()> {
        Ok(())
    }

    /// Discard everything written since the last successful sync.
    ///
    /// Buffered bytes are dropped without being written and the file is cut
    /// back to the synced length. If that fails too the segment is closed
    /// for writes.
    fn rollback(&mut self) {
        let discarded = self.next_lsn - self.synced_lsn;
        self.next_lsn = self.synced_lsn;
        self.uncommitted = 0;
        self.unsynced_bytes = 0;

        let Some(writer) = self.writer.take() else {
            return;
        };
        let (mut file, _unwritten) = writer.into_parts();
        let restored = file
            .set_len(self.synced_len)
            .and_then(|()| file.seek(SeekFrom::Start(self.synced_len)));
        match restored {
            Ok(_) => {
                tracing::warn!(
                    path = %self.path.display(),
                    discarded,
                    synced_len = self.synced_len,
                    "rolled WAL back to last sync after failed write"
                );
                self.writer = Some(BufWriter::new(file));
            }
            Err(e) => {
                tracing::error!(
                    path = %self.path.display(),
                    error = %e,
                    "WAL rollback failed, segment closed for writes"
                );
            }
        }
    }

    fn buffer(&mut self) -> Result<&mut BufWriter<File>> {
        let path = &self.path;
        self.writer.as_mut().ok_or_else(|| {
            TierError::WalCorruption(format!(
                "WAL segment {} is unusable after a failed rollback",
                path.display()
            ))
        })
    }

    /// Drop every record and restart the LSN sequence
    pub fn truncate(&mut self) -> Result<()> {
        let writer = self.buffer()?;
        writer.flush()?;
        let file = writer.get_mut();
        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        file.sync_all()?;
        self.next_lsn = 1;
        self.uncommitted = 0;
        self.unsynced_bytes = 0;
        self.synced_len = 0;
        self.synced_lsn = 1;
        Ok(())
    }

    /// LSN the next append will receive
    pub fn current_lsn(&self) -> u64 {
        self.next_lsn
    }

    pub fn uncommitted_count(&self) -> usize {
        self.uncommitted
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Find the next LSN and the end of the last valid record.
fn scan_tail(path: &Path) -> Result<(u64, u64)> {
    let mut reader = WalReader::open(path)?;
    let mut last_lsn = 0;
    let mut valid_end = 0;
    loop {
        match reader.read_record()? {
            Some(RecordRead::Valid(entry)) => {
                last_lsn = entry.lsn;
                valid_end = reader.position();
            }
            Some(RecordRead::Corrupted { .. }) => {}
            Some(RecordRead::Torn) | None => break,
        }
    }
    Ok((last_lsn + 1, valid_end))
}
