//! Tests for WAL Writer
//!
//! These tests verify:
//! - Writing entries to WAL
//! - LSN generation and sequencing
//! - Sync strategies (EveryWrite, EveryNEntries)
//! - Batch records
//! - Truncation
//! - Leftover bytes from a failed append never hide later records
//! - Integration with reader

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tradestore::config::WalSyncStrategy;
use tradestore::wal::{Operation, WalReader, WalRecovery, WalWriter};

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_wal() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let wal_path = temp_dir.path().join("test.wal");
    (temp_dir, wal_path)
}

fn put(key: &str, value: &str) -> Operation {
    Operation::Put {
        key: key.as_bytes().to_vec(),
        value: value.as_bytes().to_vec(),
    }
}

/// Append bytes behind the writer's back, like a write that failed halfway
fn append_garbage(path: &Path, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
}

fn del(key: &str) -> Operation {
    Operation::Delete { key: key.as_bytes().to_vec() }
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_write_single_entry() {
    let (_temp, wal_path) = setup_temp_wal();

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    let lsn = writer.append(put("key1", "value1")).unwrap();

    assert_eq!(lsn, 1);
    assert_eq!(writer.current_lsn(), 2);
    assert_eq!(writer.path(), wal_path.as_path());
}

#[test]
fn test_lsn_sequential() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    for i in 0..100u64 {
        let lsn = writer.append(put(&format!("key{}", i), "v")).unwrap();
        assert_eq!(lsn, i + 1);
    }
}

#[test]
fn test_reopen_continues_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(put("a", "1")).unwrap();
        writer.append(put("b", "2")).unwrap();
    }

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 3);
    assert_eq!(writer.append(put("c", "3")).unwrap(), 3);
}

// =============================================================================
// Batch Tests
// =============================================================================

#[test]
fn test_batch_is_one_record() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(put("before", "x")).unwrap();
        let lsn = writer
            .append_batch(&[put("acct:1", "100"), del("order:9"), put("acct:2", "50")])
            .unwrap();
        assert_eq!(lsn, 2);
    }

    let reader = WalReader::open(&wal_path).unwrap();
    let entries: Vec<_> = reader.entries().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(
        entries[1].operations,
        vec![put("acct:1", "100"), del("order:9"), put("acct:2", "50")]
    );
}

// =============================================================================
// Sync Strategy Tests
// =============================================================================

#[test]
fn test_sync_every_write() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    writer.append(put("k1", "v1")).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(put("k2", "v2")).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

#[test]
fn test_sync_every_n_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 5 }).unwrap();

    // Write 4 entries - should not sync yet
    for i in 0..4 {
        writer.append(put(&format!("k{}", i), "v")).unwrap();
    }
    assert_eq!(writer.uncommitted_count(), 4);

    // 5th entry should trigger sync
    writer.append(put("k5", "v")).unwrap();
    assert_eq!(writer.uncommitted_count(), 0);

    writer.append(put("k6", "v")).unwrap();
    assert_eq!(writer.uncommitted_count(), 1);
}

#[test]
fn test_manual_sync() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer =
        WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 100 }).unwrap();

    for i in 0..10 {
        writer.append(put(&format!("k{}", i), "v")).unwrap();
    }
    assert_eq!(writer.uncommitted_count(), 10);

    writer.sync().unwrap();
    assert_eq!(writer.uncommitted_count(), 0);
}

// =============================================================================
// Write + Read Integration Tests
// =============================================================================

#[test]
fn test_write_then_read() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(put("key1", "value1")).unwrap();
        writer.append(put("key2", "value2")).unwrap();
        writer.append(del("key1")).unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();

    let entry1 = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry1.lsn, 1);
    assert_eq!(entry1.operations, vec![put("key1", "value1")]);

    let entry2 = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry2.lsn, 2);

    let entry3 = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry3.lsn, 3);
    assert_eq!(entry3.operations, vec![del("key1")]);

    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_write_read_many_entries() {
    let (_temp, wal_path) = setup_temp_wal();
    let entry_count = 1000;
    {
        let mut writer =
            WalWriter::open(&wal_path, WalSyncStrategy::EveryNEntries { count: 100 }).unwrap();
        for i in 0..entry_count {
            writer
                .append(put(&format!("key{}", i), &format!("value{}", i)))
                .unwrap();
        }
        writer.sync().unwrap();
    }

    let reader = WalReader::open(&wal_path).unwrap();
    let entries: Vec<_> = reader.entries().collect::<Result<Vec<_>, _>>().unwrap();

    assert_eq!(entries.len(), entry_count);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.lsn, (i + 1) as u64);
    }
}

// =============================================================================
// Truncate Tests
// =============================================================================

#[test]
fn test_truncate_resets_lsn() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();

    writer.append(put("k1", "v1")).unwrap();
    writer.append(put("k2", "v2")).unwrap();
    assert_eq!(writer.current_lsn(), 3);

    writer.truncate().unwrap();
    assert_eq!(writer.current_lsn(), 1);
    assert_eq!(writer.uncommitted_count(), 0);

    assert_eq!(writer.append(put("k3", "v3")).unwrap(), 1);
}

#[test]
fn test_truncate_then_write() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(put("old", "data")).unwrap();
        writer.truncate().unwrap();
        writer.append(put("new", "data")).unwrap();
    }

    // Read should only see new entry
    let mut reader = WalReader::open(&wal_path).unwrap();
    let entry = reader.next_entry().unwrap().unwrap();
    assert_eq!(entry.operations, vec![put("new", "data")]);
    assert!(reader.next_entry().unwrap().is_none());
}

// =============================================================================
// Partial Record Tests
// =============================================================================

#[test]
fn test_partial_record_is_cut_before_next_append() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(put("a", "1")).unwrap();
        let len_after_a = writer.len();

        append_garbage(&wal_path, &[0xAB; 10]);

        writer.append(put("b", "2")).unwrap();
        assert!(writer.len() > len_after_a);
        assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), writer.len());
    }

    let (entries, result) = WalRecovery::recover(&wal_path).unwrap();
    assert_eq!(result.entries_recovered, 2);
    assert_eq!(result.entries_corrupted, 0);
    assert!(!result.was_truncated);
    assert_eq!(entries[1].operations, vec![put("b", "2")]);
}

#[test]
fn test_open_cuts_torn_tail() {
    let (_temp, wal_path) = setup_temp_wal();
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer.append(put("a", "1")).unwrap();
    }
    append_garbage(&wal_path, &[0x01; 7]);

    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert_eq!(writer.current_lsn(), 2);
    writer.append(put("b", "2")).unwrap();
    drop(writer);

    let mut reader = WalReader::open(&wal_path).unwrap();
    assert_eq!(reader.next_entry().unwrap().unwrap().operations, vec![put("a", "1")]);
    assert_eq!(reader.next_entry().unwrap().unwrap().operations, vec![put("b", "2")]);
    assert!(reader.next_entry().unwrap().is_none());
}

#[test]
fn test_len_tracks_acknowledged_records() {
    let (_temp, wal_path) = setup_temp_wal();
    let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
    assert!(writer.is_empty());

    writer.append(put("a", "1")).unwrap();
    assert!(!writer.is_empty());
    assert_eq!(std::fs::metadata(&wal_path).unwrap().len(), writer.len());

    writer.truncate().unwrap();
    assert!(writer.is_empty());
}

// =============================================================================
// Edge Cases
// =============================================================================

#[test]
fn test_large_entry() {
    let (_temp, wal_path) = setup_temp_wal();
    let large_value = vec![0xAB; 1024 * 1024];
    {
        let mut writer = WalWriter::open(&wal_path, WalSyncStrategy::EveryWrite).unwrap();
        writer
            .append(Operation::Put {
                key: b"big_key".to_vec(),
                value: large_value.clone(),
            })
            .unwrap();
    }

    let mut reader = WalReader::open(&wal_path).unwrap();
    let entry = reader.next_entry().unwrap().unwrap();

    match &entry.operations[..] {
        [Operation::Put { value, .. }] => assert_eq!(value, &large_value),
        other => panic!("Expected one Put operation, got {} ops", other.len()),
    }
}
