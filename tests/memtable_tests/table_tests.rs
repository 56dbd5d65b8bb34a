//! MemTable Tests
//!
//! Tests verify:
//! - Basic put/get operations
//! - Size tracking and the flush threshold
//! - Tombstone handling
//! - Sorted iteration and half-open ranges
//! - Concurrent access patterns

use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use tierkv::memtable::{MemTable, ENTRY_OVERHEAD};
use tierkv::Entry;

// =============================================================================
// Helper Functions
// =============================================================================

const LIMIT: usize = 1024 * 1024;

fn put(key: &str, value: &str) -> Entry {
    Entry::from_slices(key.as_bytes(), Some(value.as_bytes()))
}

fn tombstone(key: &str) -> Entry {
    Entry::from_slices(key.as_bytes(), None)
}

fn keys(entries: impl Iterator<Item = Entry>) -> Vec<String> {
    entries
        .map(|e| String::from_utf8(e.key.to_vec()).unwrap())
        .collect()
}

// =============================================================================
// Basic Operations Tests
// =============================================================================

#[test]
fn test_new_memtable_is_empty() {
    let memtable = MemTable::new(1, LIMIT);
    assert_eq!(memtable.entry_count(), 0);
    assert_eq!(memtable.size(), 0);
    assert!(memtable.is_empty());
    assert_eq!(memtable.generation(), 1);
}

#[test]
fn test_put_and_get() {
    let memtable = MemTable::new(1, LIMIT);
    memtable.put(put("key1", "value1"));

    assert_eq!(memtable.get(b"key1"), Some(put("key1", "value1")));
    assert_eq!(memtable.get(b"missing"), None);
}

#[test]
fn test_put_overwrites_existing() {
    let memtable = MemTable::new(1, LIMIT);
    memtable.put(put("key1", "value1"));
    memtable.put(put("key1", "value2"));

    assert_eq!(memtable.entry_count(), 1);
    assert_eq!(
        memtable.get(b"key1").unwrap().value,
        Some(Bytes::from_static(b"value2"))
    );
}

// =============================================================================
// Tombstone Tests
// =============================================================================

#[test]
fn test_tombstone_shadows_value() {
    let memtable = MemTable::new(1, LIMIT);
    memtable.put(put("key1", "value1"));
    memtable.put(tombstone("key1"));

    let entry = memtable.get(b"key1").unwrap();
    assert!(entry.is_tombstone());
    assert_eq!(memtable.entry_count(), 1);
}

#[test]
fn test_put_after_delete() {
    let memtable = MemTable::new(1, LIMIT);
    memtable.put(tombstone("key1"));
    memtable.put(put("key1", "back"));

    assert_eq!(memtable.get(b"key1"), Some(put("key1", "back")));
}

// =============================================================================
// Size Tracking Tests
// =============================================================================

#[test]
fn test_size_charges_key_value_and_overhead() {
    let memtable = MemTable::new(1, LIMIT);
    memtable.put(put("key", "value"));
    assert_eq!(memtable.size(), 3 + 5 + ENTRY_OVERHEAD);

    memtable.put(tombstone("gone"));
    assert_eq!(memtable.size(), 3 + 5 + ENTRY_OVERHEAD + 4 + ENTRY_OVERHEAD);
}

#[test]
fn test_size_grows_on_overwrite() {
    let memtable = MemTable::new(1, LIMIT);
    memtable.put(put("k", "a"));
    let first = memtable.size();
    memtable.put(put("k", "b"));
    assert_eq!(memtable.size(), first * 2);
}

#[test]
fn test_put_reports_threshold() {
    let entry_size = 2 + 2 + ENTRY_OVERHEAD;
    let memtable = MemTable::new(1, entry_size * 3);

    assert!(!memtable.put(put("k1", "v1")));
    assert!(!memtable.put(put("k2", "v2")));
    assert!(!memtable.should_flush());
    // Exactly at the limit counts as full
    assert!(memtable.put(put("k3", "v3")));
    assert!(memtable.should_flush());
}

// =============================================================================
// Iteration Tests
// =============================================================================

#[test]
fn test_iter_sorted_order_with_tombstones() {
    let memtable = Arc::new(MemTable::new(1, LIMIT));
    memtable.put(put("c", "3"));
    memtable.put(put("a", "1"));
    memtable.put(tombstone("b"));

    let entries: Vec<Entry> = memtable.iter().collect();
    assert_eq!(entries, vec![put("a", "1"), tombstone("b"), put("c", "3")]);
}

#[test]
fn test_range_is_half_open() {
    let memtable = Arc::new(MemTable::new(1, LIMIT));
    for i in 1..=9 {
        memtable.put(put(&i.to_string(), "v"));
    }

    assert_eq!(
        keys(memtable.range(Some(&b"3"[..]), Some(&b"7"[..]))),
        vec!["3", "4", "5", "6"]
    );
    assert_eq!(keys(memtable.range(None, Some(&b"3"[..]))), vec!["1", "2"]);
    assert_eq!(keys(memtable.range(Some(&b"8"[..]), None)), vec!["8", "9"]);
}

#[test]
fn test_range_empty_when_from_not_below_to() {
    let memtable = Arc::new(MemTable::new(1, LIMIT));
    memtable.put(put("a", "1"));
    memtable.put(put("b", "2"));

    assert_eq!(memtable.range(Some(&b"b"[..]), Some(&b"b"[..])).count(), 0);
    assert_eq!(memtable.range(Some(&b"b"[..]), Some(&b"a"[..])).count(), 0);
}

#[test]
fn test_iterator_sees_inserts_past_cursor() {
    let memtable = Arc::new(MemTable::new(1, LIMIT));
    memtable.put(put("a", "1"));
    memtable.put(put("c", "3"));

    let mut iter = memtable.iter();
    assert_eq!(iter.next().unwrap().key, Bytes::from_static(b"a"));
    memtable.put(put("b", "2"));
    assert_eq!(keys(iter), vec!["b", "c"]);
}

// =============================================================================
// Concurrent Access Tests
// =============================================================================

#[test]
fn test_concurrent_reads_and_writes() {
    let memtable = Arc::new(MemTable::new(1, LIMIT));
    memtable.put(put("key", "value"));

    let mut handles = vec![];
    for i in 0..8 {
        let mt = Arc::clone(&memtable);
        handles.push(thread::spawn(move || {
            for j in 0..50 {
                mt.put(put(&format!("key{}_{:02}", i, j), "v"));
                assert_eq!(mt.get(b"key"), Some(put("key", "value")));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(memtable.entry_count(), 401);
    let all = keys(memtable.iter());
    let mut sorted = all.clone();
    sorted.sort();
    assert_eq!(all, sorted);
}
