//! Tests for Log Recovery
//!
//! These tests verify:
//! - Recovery from a clean log (no damage)
//! - Recovery from an empty log
//! - Recovery with a torn trailing frame
//! - Recovery with garbage or out-of-order frames
//! - Verify mode (stats only, no entries returned)
//! - Read-only replay leaves the file untouched

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use provlog::index::MemoryIndex;
use provlog::log::{codec, LogReader, LogWriter, Recovery};
use provlog::{Entry, EntryReference, LineageResolver, LogError, OffsetIndex};
use tempfile::TempDir;

const MAX: u32 = 1024 * 1024;

// =============================================================================
// Helper Functions
// =============================================================================

fn setup_temp_log() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let log_path = temp_dir.path().join("test.log");
    (temp_dir, log_path)
}

/// Write entries using LogWriter (produces a well-formed log)
fn write_entries_via_writer(path: &PathBuf, count: u64) -> u64 {
    let mut writer = LogWriter::open(path, MAX).unwrap();
    for i in 0..count {
        let mut entry = Entry::new(i).with_payload(format!("value{}", i).into_bytes());
        writer.append(&mut entry).unwrap();
    }
    writer.end_offset()
}

/// Write raw encoded frames directly to a file (for crafting damage)
fn write_raw_entries(path: &PathBuf, entries: &[Entry]) {
    let mut file = File::create(path).unwrap();
    for entry in entries {
        file.write_all(&codec::encode(entry, MAX).unwrap()).unwrap();
    }
    file.sync_all().unwrap();
}

fn append_raw(path: &PathBuf, bytes: &[u8]) {
    let mut file = OpenOptions::new().append(true).open(path).unwrap();
    file.write_all(bytes).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// Recover: Clean Log Tests
// =============================================================================

#[test]
fn test_recover_empty_file() {
    let (_temp, log_path) = setup_temp_log();
    File::create(&log_path).unwrap();

    let (entries, result) = Recovery::replay(&log_path, MAX).unwrap();

    assert_eq!(entries.len(), 0);
    assert_eq!(result.entries_recovered, 0);
    assert_eq!(result.last_sequence, None);
    assert_eq!(result.durable_len, 0);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_multiple_entries() {
    let (_temp, log_path) = setup_temp_log();
    let end = write_entries_via_writer(&log_path, 10);

    let (entries, result) = Recovery::replay(&log_path, MAX).unwrap();

    assert_eq!(entries.len(), 10);
    assert_eq!(result.entries_recovered, 10);
    assert_eq!(result.last_sequence, Some(9));
    assert_eq!(result.durable_len, end);
    assert_eq!(result.file_len, end);
    assert!(!result.was_truncated);

    // Verify entries are in order with strictly increasing offsets
    let mut previous_offset = None;
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.sequence_number(), i as u64);
        assert!(entry.offset() > previous_offset);
        previous_offset = entry.offset();
    }
}

#[test]
fn test_recover_preserves_references() {
    let (_temp, log_path) = setup_temp_log();

    let mut a = Entry::new(0);
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();
    writer.append(&mut a).unwrap();

    let mut b = Entry::new(1);
    b.add_reference_to(&a, "parent").unwrap();
    b.add_reference_to(&a, "witness").unwrap();
    writer.append(&mut b).unwrap();
    drop(writer);

    let (entries, _) = Recovery::replay(&log_path, MAX).unwrap();

    assert_eq!(entries[1].references(), b.references());
    assert_eq!(entries[1].references()[1].relation_type, "witness");
}

// =============================================================================
// Recover: Torn Tail Tests (was_truncated = true)
// =============================================================================

#[test]
fn test_recover_partial_length_prefix_at_tail() {
    let (_temp, log_path) = setup_temp_log();
    let end = write_entries_via_writer(&log_path, 3);
    append_raw(&log_path, &[0, 0]);

    let (entries, result) = Recovery::replay(&log_path, MAX).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.durable_len, end);
    assert_eq!(result.discarded_bytes(), 2);
    assert!(result.was_truncated);
}

#[test]
fn test_recover_partial_frame_at_tail() {
    let (_temp, log_path) = setup_temp_log();
    let end = write_entries_via_writer(&log_path, 3);

    let torn = codec::encode(&Entry::new(3).with_payload(vec![9u8; 50]), MAX).unwrap();
    append_raw(&log_path, &torn[..torn.len() - 10]);

    let (entries, result) = Recovery::replay(&log_path, MAX).unwrap();

    assert_eq!(entries.len(), 3);
    assert_eq!(result.last_sequence, Some(2));
    assert_eq!(result.durable_len, end);
    assert!(result.was_truncated);
}

#[test]
fn test_recover_garbage_length_at_tail() {
    let (_temp, log_path) = setup_temp_log();
    write_entries_via_writer(&log_path, 2);

    // Length field below the minimum frame size
    append_raw(&log_path, &[0, 0, 0, 3, 0xAA, 0xBB, 0xCC, 0xDD]);

    let (entries, result) = Recovery::replay(&log_path, MAX).unwrap();

    assert_eq!(entries.len(), 2);
    assert!(result.was_truncated);
    assert_eq!(result.discarded_bytes(), 8);
}

#[test]
fn test_recover_stops_at_out_of_order_frame() {
    let (_temp, log_path) = setup_temp_log();
    write_raw_entries(
        &log_path,
        &[Entry::new(0), Entry::new(1), Entry::new(1), Entry::new(2)],
    );

    let (entries, result) = Recovery::replay(&log_path, MAX).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(result.last_sequence, Some(1));
    assert!(result.was_truncated);
}

#[test]
fn test_recover_keeps_raw_forward_reference() {
    // Data written by some other producer may break the backward-only rule;
    // the frame itself is well formed, so recovery keeps it.
    let (_temp, log_path) = setup_temp_log();

    let mut bytes = codec::encode(&Entry::new(0), MAX).unwrap().to_vec();
    let mut forward = Entry::new(5);
    forward.add_reference(EntryReference::new(0, 4, "foo")).unwrap();
    let mut frame = codec::encode(&forward, MAX).unwrap().to_vec();
    // Rewrite the target sequence number (bytes 24..32) to point forward
    frame[24..32].copy_from_slice(&9u64.to_be_bytes());
    bytes.extend_from_slice(&frame);
    fs::write(&log_path, &bytes).unwrap();

    let (entries, result) = Recovery::replay(&log_path, MAX).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(entries[1].references()[0].target_sequence_number, 9);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_stops_at_damage_mid_file() {
    let (_temp, log_path) = setup_temp_log();
    write_entries_via_writer(&log_path, 3);

    let mut bytes = fs::read(&log_path).unwrap();
    let file_len = bytes.len() as u64;
    let second = codec::encoded_len(&Entry::new(0).with_payload(&b"value0"[..])) as usize;

    // Damage the length prefix of frame 1; frame 2 after it is intact
    bytes[second..second + 4].copy_from_slice(&3u32.to_be_bytes());
    fs::write(&log_path, &bytes).unwrap();

    let (entries, result) = Recovery::replay(&log_path, MAX).unwrap();

    assert_eq!(entries.len(), 1);
    assert_eq!(result.last_sequence, Some(0));
    assert_eq!(result.durable_len, second as u64);
    assert_eq!(result.discarded_bytes(), file_len - second as u64);
    assert!(result.was_truncated);
}

// =============================================================================
// Frame Size Limit Tests
// =============================================================================

#[test]
fn test_recover_refuses_complete_frame_over_limit() {
    let (_temp, log_path) = setup_temp_log();

    let mut writer = LogWriter::open(&log_path, MAX).unwrap();
    writer.append(&mut Entry::new(0).with_payload(vec![1u8; 10])).unwrap();
    writer.append(&mut Entry::new(1).with_payload(vec![2u8; 4000])).unwrap();
    drop(writer);
    let before = fs::read(&log_path).unwrap();

    assert!(matches!(
        Recovery::replay(&log_path, 1024),
        Err(LogError::FrameTooLarge { size: 4020, limit: 1024 })
    ));
    assert!(matches!(
        LogWriter::open(&log_path, 1024),
        Err(LogError::FrameTooLarge { .. })
    ));
    assert_eq!(fs::read(&log_path).unwrap(), before);

    let result = Recovery::verify(&log_path, MAX).unwrap();
    assert_eq!(result.entries_recovered, 2);
    assert!(!result.was_truncated);
}

#[test]
fn test_recover_length_over_limit_past_end_is_torn() {
    let (_temp, log_path) = setup_temp_log();
    let end = write_entries_via_writer(&log_path, 2);

    // Declares 4000 bytes but the file ends after 8
    append_raw(&log_path, &[0, 0, 0x0F, 0xA0, 0, 0, 0, 0]);

    let (entries, result) = Recovery::replay(&log_path, 1024).unwrap();

    assert_eq!(entries.len(), 2);
    assert_eq!(result.durable_len, end);
    assert!(result.was_truncated);
}

// =============================================================================
// Verify Tests
// =============================================================================

#[test]
fn test_verify_matches_replay() {
    let (_temp, log_path) = setup_temp_log();
    write_entries_via_writer(&log_path, 5);
    append_raw(&log_path, &[0, 0, 0]);

    let (_, replayed) = Recovery::replay(&log_path, MAX).unwrap();
    let verified = Recovery::verify(&log_path, MAX).unwrap();

    assert_eq!(replayed, verified);
}

#[test]
fn test_verify_does_not_modify_file() {
    let (_temp, log_path) = setup_temp_log();
    write_entries_via_writer(&log_path, 2);
    append_raw(&log_path, &[1, 2, 3]);
    let before = fs::read(&log_path).unwrap();

    let result = Recovery::verify(&log_path, MAX).unwrap();

    assert!(result.was_truncated);
    assert_eq!(fs::read(&log_path).unwrap(), before);
}

#[test]
fn test_replay_then_read_leaves_torn_tail() {
    let (_temp, log_path) = setup_temp_log();

    let mut writer = LogWriter::open(&log_path, MAX).unwrap();
    let mut root = Entry::new(0);
    writer.append(&mut root).unwrap();
    let mut child = Entry::new(1);
    child.add_reference_to(&root, "parent").unwrap();
    writer.append(&mut child).unwrap();
    drop(writer);
    append_raw(&log_path, &[0, 0, 0, 40, 1]);
    let before = fs::read(&log_path).unwrap();

    let (entries, result) = Recovery::replay(&log_path, MAX).unwrap();
    let index = MemoryIndex::new();
    for entry in &entries {
        index.put(entry.sequence_number(), entry.offset().unwrap()).unwrap();
    }

    let reader = LogReader::open(&log_path, MAX).unwrap().with_limit(result.durable_len);
    let mut resolver = LineageResolver::new(&index, reader, 100);
    assert_eq!(resolver.lineage(1).unwrap(), vec![0]);

    let mut reader = LogReader::open(&log_path, MAX).unwrap().with_limit(result.durable_len);
    assert_eq!(reader.read_entry_at(child.offset().unwrap()).unwrap(), child);

    assert!(result.was_truncated);
    assert_eq!(fs::read(&log_path).unwrap(), before);
}

#[test]
fn test_recover_missing_file_is_error() {
    let (_temp, log_path) = setup_temp_log();
    assert!(Recovery::replay(&log_path, MAX).is_err());
}
