//! Tests for WAL Recovery
//!
//! These tests verify:
//! - Recovery from a clean WAL (no corruption)
//! - Recovery from an empty WAL
//! - Recovery with partial writes (truncated tail)
//! - Corrupted records are skipped, not fatal
//! - Corruption followed by valid records is reported as data loss
//! - Verify mode (stats only, file untouched)
//! - Segment directory checkpointing

use std::fs::{self, File};
use std::io::Write;
use std::path::PathBuf;

use tierkv::config::WalSyncStrategy;
use tierkv::wal::{WalDirectory, WalEntry, WalRecovery, WalWriter};
use tierkv::Entry;
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.log");
    (temp_dir, wal_path)
}

fn record(lsn: u64, key: &str) -> WalEntry {
    WalEntry::new(lsn, Entry::from_slices(key.as_bytes(), Some(&b"value"[..])))
}

/// Write serialized records, corrupting the ones listed in `corrupt`
fn write_raw(path: &PathBuf, records: &[WalEntry], corrupt: &[u64]) {
    let mut file = File::create(path).unwrap();
    for rec in records {
        let mut bytes = rec.serialize().unwrap();
        if corrupt.contains(&rec.lsn) {
            let last = bytes.len() - 1;
            bytes[last] ^= 0xFF;
        }
        file.write_all(&bytes).unwrap();
    }
    file.sync_all().unwrap();
}

// =============================================================================
// Recover: Clean WAL Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert!(entries.is_empty());
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.entries_corrupted, 0);
    assert_eq!(result.last_lsn, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        for i in 0..10 {
            writer
                .append(&Entry::from_slices(format!("key{}", i).as_bytes(), Some(&b"v"[..])))
                .unwrap();
        }
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.last_lsn, 10);
    assert!(!result.was_truncated);
    assert!(!result.has_data_loss());
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.lsn, (i + 1) as u64);
    }
}

// =============================================================================
// Recover: Partial Write Tests
// =============================================================================

#[test]
fn test_recover_partial_tail_is_truncated() {
    let (_temp, wal_path) = setup_temp_wal();
    let good = record(1, "k").serialize().unwrap();
    let torn = record(2, "k2").serialize().unwrap();
    {
        let mut file = File::create(&wal_path).unwrap();
        file.write_all(&good).unwrap();
        file.write_all(&torn[..torn.len() / 2]).unwrap();
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
    assert!(!result.has_data_loss());
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), good.len() as u64);

    // A second pass finds a clean file
    let (_, again) = WalRecovery::recover(&wal_path).unwrap();
    assert!(!again.was_truncated);
}

// =============================================================================
// Recover: Corruption Tests
// =============================================================================

#[test]
fn test_recover_corrupted_last_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_raw(&wal_path, &[record(1, "a"), record(2, "b")], &[2]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.last_lsn, 1);
    assert!(result.was_truncated);
    assert!(!result.has_data_loss());
}

#[test]
fn test_recover_skips_mid_log_corruption() {
    let (_temp, wal_path) = setup_temp_wal();
    let records = [record(1, "a"), record(2, "b"), record(3, "c"), record(4, "d")];
    write_raw(&wal_path, &records, &[2]);
    let len_before = fs::metadata(&wal_path).unwrap().len();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(
        entries.iter().map(|e| e.lsn).collect::<Vec<_>>(),
        vec![1, 3, 4]
    );
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.entries_lost, 1);
    assert!(result.has_data_loss());
    assert!(!result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len_before);
}

#[test]
fn test_recover_corruption_at_first_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    write_raw(&wal_path, &[record(1, "a"), record(2, "b")], &[1]);

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].lsn, 2);
    assert!(result.has_data_loss());
}

#[test]
fn test_recover_resyncs_after_damaged_length() {
    let (_temp, wal_path) = setup_temp_wal();
    write_raw(&wal_path, &[record(1, "a"), record(2, "b"), record(3, "c")], &[]);
    let mut bytes = fs::read(&wal_path).unwrap();
    let record_len = bytes.len() / 3;
    // Length field sits at bytes 12..16 of the header
    bytes[record_len + 15] ^= 0x40;
    fs::write(&wal_path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(
        entries.iter().map(|e| e.lsn).collect::<Vec<_>>(),
        vec![1, 3]
    );
    assert_eq!(result.entries_corrupted, 1);
    assert_eq!(result.entries_lost, 1);
    assert!(!result.was_truncated);
    assert_eq!(fs::read(&wal_path).unwrap(), bytes);
}

#[test]
fn test_recover_oversized_length_at_tail_is_torn() {
    let (_temp, wal_path) = setup_temp_wal();
    write_raw(&wal_path, &[record(1, "a"), record(2, "b")], &[]);
    let mut bytes = fs::read(&wal_path).unwrap();
    let record_len = bytes.len() / 2;
    bytes[record_len + 15] ^= 0x40;
    fs::write(&wal_path, &bytes).unwrap();

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();

    assert_eq!(entries.len(), 1);
    assert!(result.was_truncated);
    assert!(!result.has_data_loss());
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), record_len as u64);
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, wal_path) = setup_temp_wal();
    write_raw(&wal_path, &[record(1, "a"), record(2, "b")], &[2]);
    let len_before = fs::metadata(&wal_path).unwrap().len();

    let result = WalRecovery::verify(&wal_path).unwrap();

    assert_eq!(result.entries_recovered, 1);
    assert_eq!(result.entries_corrupted, 1);
    assert!(result.was_truncated);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), len_before);
}

#[test]
fn test_recover_and_verify_agree() {
    let (_temp, wal_path) = setup_temp_wal();
    write_raw(&wal_path, &[record(1, "a"), record(2, "b"), record(3, "c")], &[2]);

    let verified = WalRecovery::verify(&wal_path).unwrap();
    let (_, recovered) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(verified, recovered);
}

// =============================================================================
// Segment Directory Tests
// =============================================================================

#[test]
fn test_segments_listed_in_order_and_checkpointed() {
    let temp = TempDir::new().unwrap();
    let dir = WalDirectory::open(temp.path().join("wal")).unwrap();

    for generation in [3, 1, 2] {
        let mut writer = dir
            .create_segment(generation, WalSyncStrategy::EveryWrite)
            .unwrap();
        writer
            .append(&Entry::from_slices(b"k", Some(&[generation as u8][..])))
            .unwrap();
    }
    assert_eq!(dir.segments().unwrap(), vec![1, 2, 3]);

    assert_eq!(dir.checkpoint(2).unwrap(), 2);
    assert_eq!(dir.segments().unwrap(), vec![3]);

    let (entries, _) = dir.replay(3).unwrap();
    assert_eq!(entries[0].entry.value.as_deref(), Some(&[3u8][..]));
}
