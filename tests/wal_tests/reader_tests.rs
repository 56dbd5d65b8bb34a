//! Tests for WAL Reader
//!
//! These tests verify:
//! - Reading entries written by WalWriter
//! - Iterator behaviour
//! - Partial records at the tail read as end of log
//! - Checksum failures surface as errors

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use tierkv::config::WalSyncStrategy;
use tierkv::wal::{WalEntry, WalReader, WalWriter};
use tierkv::{Entry, TierError};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.log");
    (temp_dir, wal_path)
}

fn write_entries(path: &PathBuf, count: usize) {
    let mut writer = WalWriter::open(path, WalSyncStrategy::EveryWrite).unwrap();
    for i in 0..count {
        let key = format!("key{}", i);
        let value = format!("value{}", i);
        writer
            .append(&Entry::from_slices(key.as_bytes(), Some(value.as_bytes())))
            .unwrap();
    }
}

// =============================================================================
// Basic Reading Tests
// =============================================================================

#[test]
fn test_read_empty_file() {
    let (_temp, wal_path) = setup_temp_wal();
    File::create(&wal_path).unwrap();

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_read_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 5);

    let mut reader = WalReader::open(&wal_path).unwrap();
    for i in 0..5u64 {
        let entry = reader.next_entry().unwrap().unwrap();
        assert_eq!(entry.lsn, i + 1);
        assert_eq!(entry.entry.key, format!("key{}", i).into_bytes());
    }
    assert!(reader.next_entry().unwrap().is_none());
    assert_eq!(reader.position(), fs::metadata(&wal_path).unwrap().len());
}

#[test]
fn test_missing_file_is_error() {
    let (_temp, wal_path) = setup_temp_wal();
    assert!(matches!(WalReader::open(&wal_path), Err(TierError::Io(_))));
}

// =============================================================================
// Iterator Tests
// =============================================================================

#[test]
fn test_iterator_multiple_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 10);

    let lsns: Vec<u64> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .map(|e| e.unwrap().lsn)
        .collect();
    assert_eq!(lsns, (1..=10).collect::<Vec<_>>());
}

#[test]
fn test_iterator_stops_after_corruption() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 3);

    // Flip a payload byte of the second record
    let mut bytes = fs::read(&wal_path).unwrap();
    let first_len = bytes.len() / 3;
    bytes[first_len + 20] ^= 0xFF;
    fs::write(&wal_path, &bytes).unwrap();

    let results: Vec<_> = WalReader::open(&wal_path).unwrap().entries().collect();
    assert_eq!(results.len(), 2);
    assert!(results[0].is_ok());
    assert!(matches!(results[1], Err(TierError::WalCorruption(_))));
}

// =============================================================================
// Partial Write Tests
// =============================================================================

#[test]
fn test_partial_header() {
    let (_temp, wal_path) = setup_temp_wal();
    write_entries(&wal_path, 1);
    {
        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(&[1, 2, 3, 4, 5]).unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert!(reader.next_entry().unwrap().is_some());
    assert!(reader.next_entry().unwrap().is_none());
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_partial_payload() {
    let (_temp, wal_path) = setup_temp_wal();

    let first = WalEntry::new(1, Entry::from_slices(b"a", Some(&b"1"[..])));
    let second = WalEntry::new(2, Entry::from_slices(b"b", Some(&b"a longer value"[..])));
    let second_bytes = second.serialize().unwrap();

    let mut file = File::create(&wal_path).unwrap();
    file.write_all(&first.serialize().unwrap()).unwrap();
    file.write_all(&second_bytes[..second_bytes.len() - 4]).unwrap();
    file.sync_all().unwrap();

    let entries: Vec<_> = WalReader::open(&wal_path)
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries, vec![first]);
}
