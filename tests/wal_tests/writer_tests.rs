//! Tests for WAL Writer
//!
//! These tests verify:
//! - Writing entries to WAL
//! - LSN generation and sequencing
//! - Sync strategies (EveryWrite, EveryNEntries)
//! - Truncation
//! - Reopening an existing segment
//! - Integration with reader

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tierkv::config::WalSyncStrategy;
use tierkv::wal::{WalReader, WalWriter};
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

fn put(key: &str, value: &str) -> Entry {
    Entry::from_slices(key.as_bytes(), Some(value.as_bytes()))
}

fn read_all(path: &PathBuf) -> Vec<tierkv::wal::WalEntry> {
    WalReader::open(path)
        .unwrap()
        .entries()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_write_single_entry() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    let lsn = writer.append(&put("key1", "value1")).unwrap();

    assert_eq!(lsn, 1);
    assert_eq!(writer.current_lsn(), 2);
}

#[test]
fn test_lsn_sequential() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    for i in 0..100u64 {
        let lsn = writer
            .append(&put(&format!("key{}", i), &format!("val{}", i)))
            .unwrap();
        assert_eq!(lsn, i + 1);
    }
    assert_eq!(writer.current_lsn(), 101);
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_sync_every_write() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    writer.append(&put("a", "1")).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    // Already on disk without an explicit sync
    assert_eq!(read_all(&wal_path).len(), 1);
}

#[test]
fn test_sync_every_n_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 3 }).unwrap();

    writer.append(&put("a", "1")).unwrap();
    writer.append(&put("b", "2")).unwrap();
    assert_eq!(writer.uncommitted_count(), 2);

    writer.append(&put("c", "3")).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
    assert_eq!(read_all(&wal_path).len(), 3);
}

#[test]
fn test_manual_sync() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 100 }).unwrap();

    writer.append(&put("a", "1")).unwrap();
    writer.append(&put("b", "2")).unwrap();
    writer.sync().unwrap();

    assert_eq!(writer.uncommitted_count(), 0);
    assert_eq!(read_all(&wal_path).len(), 2);
}

// =============================================================================
// Write + Read Integration
// =============================================================================

#[test]
fn test_write_then_read() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(&put("k1", "v1")).unwrap();
        writer.append(&Entry::from_slices(b"k1", None)).unwrap();
        writer.append(&put("k2", "v2")).unwrap();
    }

    let entries = read_all(&wal_path);
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].entry, put("k1", "v1"));
    assert!(entries[1].entry.is_tombstone());
    assert_eq!(entries[2].entry, put("k2", "v2"));
    assert_eq!(
        entries.iter().map(|e| e.lsn).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
}

#[test]
fn test_large_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    let value = "x".repeat(512 * 1024);
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(&put("big", &value)).unwrap();
    }

    let entries = read_all(&wal_path);
    assert_eq!(entries[0].entry.value.as_ref().unwrap().len(), value.len());
}

// =============================================================================
// Truncate Tests
// =============================================================================

#[test]
fn test_truncate_resets_lsn_and_clears_file() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    writer.append(&put("a", "1")).unwrap();
    writer.append(&put("b", "2")).unwrap();
    writer.truncate().unwrap();

    assert_eq!(writer.current_lsn(), 1);
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), 0);

    assert_eq!(writer.append(&put("c", "3")).unwrap(), 1);
    let entries = read_all(&wal_path);
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].entry, put("c", "3"));
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(&put("a", "1")).unwrap();
        writer.append(&put("b", "2")).unwrap();
    }

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 3);
    assert_eq!(writer.append(&put("c", "3")).unwrap(), 3);
    assert_eq!(read_all(&wal_path).len(), 3);
}

#[test]
fn test_reopen_cuts_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(&put("a", "1")).unwrap();
    }
    let good_len = fs::metadata(&wal_path).unwrap().len();
    {
        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&[0xEE; 11]).unwrap();
    }

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(fs::metadata(&wal_path).unwrap().len(), good_len);
    writer.append(&put("b", "2")).unwrap();

    let entries = read_all(&wal_path);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].lsn, 2);
}
