//! WAL Recovery
//!
//! Handles crash recovery by replaying the WAL.

use std::fs::OpenOptions;
use std::path::Path;

use super::reader::{RecordRead, WalReader};
use super::WalEntry;
use crate::error::Result;

/// Handles WAL recovery after crash
pub struct WalRecovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Number of corrupted entries skipped
    pub entries_corrupted: u64,

    /// Corrupted entries that had valid entries after them. These were
    /// acknowledged writes, not a torn tail.
    pub entries_lost: u64,

    /// Last valid LSN
    pub last_lsn: u64,

    /// Whether invalid bytes follow the last valid entry. Damage with a
    /// valid record after it never counts here.
    pub was_truncated: bool,

    /// Byte offset just past the last valid entry
    pub valid_len: u64,
}

impl RecoveryResult {
    /// True when corruption sits in the middle of the log
    pub fn has_data_loss(&self) -> bool {
        self.entries_lost > 0
    }
}

impl WalRecovery {
    /// Recover entries from a WAL file
    ///
    /// This will:
    /// 1. Read all valid entries
    /// 2. Detect and skip corrupted entries
    /// 3. Truncate partial writes at end
    /// 4. Return all valid entries in order
    ///
    /// The file is only shortened when everything after the last valid entry
    /// is garbage. Mid-log corruption is left in place for inspection.
    pub fn recover(path: &Path) -> Result<(Vec<WalEntry>, RecoveryResult)> {
        let mut entries = Vec::new();
        let result = scan(path, |entry| entries.push(entry))?;

        if result.was_truncated {
            let file = OpenOptions::new().write(true).open(path)?;
            file.set_len(result.valid_len)?;
            file.sync_all()?;
            tracing::info!(
                path = %path.display(),
                valid_len = result.valid_len,
                "truncated invalid WAL tail"
            );
        }

        tracing::debug!(
            path = %path.display(),
            recovered = result.entries_recovered,
            corrupted = result.entries_corrupted,
            lost = result.entries_lost,
            last_lsn = result.last_lsn,
            "WAL recovery finished"
        );
        Ok((entries, result))
    }

    /// Verify integrity of a WAL file without modifying it
    pub fn verify(path: &Path) -> Result<RecoveryResult> {
        scan(path, |_| {})
    }
}

fn scan(path: &Path, mut on_entry: impl FnMut(WalEntry)) -> Result<RecoveryResult> {
    let file_len = std::fs::metadata(path)?.len();
    let mut reader = WalReader::open(path)?;
    let mut result = RecoveryResult::default();
    // Corrupted records seen since the last valid one
    let mut pending_corrupt: u64 = 0;

    loop {
        match reader.read_record()? {
            Some(RecordRead::Valid(entry)) => {
                if pending_corrupt > 0 {
                    // One damaged region can swallow several records; the
                    // LSN gap says how many.
                    let gap = entry.lsn.saturating_sub(result.last_lsn + 1);
                    result.entries_lost += pending_corrupt.max(gap);
                    pending_corrupt = 0;
                }
                result.entries_recovered += 1;
                result.last_lsn = entry.lsn;
                result.valid_len = reader.position();
                on_entry(entry);
            }
            Some(RecordRead::Corrupted { lsn, error }) => {
                tracing::warn!(
                    path = %path.display(),
                    lsn,
                    error = %error,
                    "skipping corrupted WAL record"
                );
                result.entries_corrupted += 1;
                pending_corrupt += 1;
            }
            Some(RecordRead::Torn) => {
                tracing::warn!(
                    path = %path.display(),
                    offset = reader.position(),
                    "WAL ends in a partial record"
                );
                break;
            }
            None => break,
        }
    }

    result.was_truncated = result.valid_len < file_len;
    Ok(result)
}
