//! Tests for the Log Writer
//!
//! These tests verify:
//! - Offsets equal the byte position of each frame
//! - Ordering and already-written checks
//! - Batch appends are all-or-nothing
//! - Reopening resumes at the durable end and cuts torn tails

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use provlog::log::{codec, LogReader, LogWriter, Recovery};
use provlog::{Entry, EntryReference, LogError};
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

fn payload_entry(sequence_number: u64) -> Entry {
    Entry::new(sequence_number).with_payload(format!("payload-{}", sequence_number).into_bytes())
}

// =============================================================================
// Basic Writing Tests
// =============================================================================

#[test]
fn test_first_entry_at_offset_zero() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    let mut entry = payload_entry(0);
    let offset = writer.append(&mut entry).unwrap();

    assert_eq!(offset, 0);
    assert_eq!(entry.offset(), Some(0));
    assert_eq!(writer.end_offset(), codec::encoded_len(&entry));
    assert_eq!(writer.last_sequence(), Some(0));
}

#[test]
fn test_offsets_are_byte_exact() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    let mut expected_offset = 0;
    for i in 0..20 {
        let mut entry = payload_entry(i);
        let len = codec::encoded_len(&entry);
        let offset = writer.append(&mut entry).unwrap();
        assert_eq!(offset, expected_offset);
        expected_offset += len;
    }

    assert_eq!(fs::metadata(&log_path).unwrap().len(), expected_offset);
}

#[test]
fn test_written_frames_decode_at_their_offsets() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    let mut root = payload_entry(0);
    writer.append(&mut root).unwrap();

    let mut child = payload_entry(1);
    child.add_reference_to(&root, "foo").unwrap();
    let child_offset = writer.append(&mut child).unwrap();

    let mut reader = LogReader::open(&log_path, MAX).unwrap();
    let read_back = reader.read_entry_at(child_offset).unwrap();

    assert_eq!(read_back.sequence_number(), 1);
    assert_eq!(read_back.references(), child.references());
    assert_eq!(read_back.payload(), child.payload());
}

// =============================================================================
// Append Precondition Tests
// =============================================================================

#[test]
fn test_append_twice_rejected() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    let mut entry = payload_entry(0);
    writer.append(&mut entry).unwrap();

    assert!(matches!(
        writer.append(&mut entry),
        Err(LogError::AlreadyWritten(0))
    ));
}

#[test]
fn test_out_of_order_append_rejected() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    writer.append(&mut payload_entry(5)).unwrap();
    let end = writer.end_offset();

    let mut stale = payload_entry(3);
    assert!(matches!(
        writer.append(&mut stale),
        Err(LogError::OutOfOrderAppend {
            sequence_number: 3,
            last_durable: 5
        })
    ));
    assert!(stale.offset().is_none());
    assert_eq!(writer.end_offset(), end);
}

#[test]
fn test_gaps_in_sequence_allowed() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    writer.append(&mut payload_entry(0)).unwrap();
    writer.append(&mut payload_entry(4)).unwrap();

    assert_eq!(writer.last_sequence(), Some(4));
}

#[test]
fn test_reference_beyond_durable_end_rejected() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    writer.append(&mut payload_entry(0)).unwrap();

    let mut entry = payload_entry(1);
    entry
        .add_reference(EntryReference::new(10_000, 0, "foo"))
        .unwrap();

    assert!(matches!(
        writer.append(&mut entry),
        Err(LogError::InvalidReference { entry: 1, target: 0, .. })
    ));
}

#[test]
fn test_oversized_entry_rejected_without_writing() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, 64).unwrap();

    let mut entry = Entry::new(0).with_payload(vec![7u8; 100]);
    assert!(matches!(
        writer.append(&mut entry),
        Err(LogError::FrameTooLarge { .. })
    ));
    assert_eq!(writer.end_offset(), 0);
    assert_eq!(fs::metadata(&log_path).unwrap().len(), 0);
}

// =============================================================================
// Batch Tests
// =============================================================================

#[test]
fn test_append_batch_offsets() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    let mut batch: Vec<Entry> = (0..5).map(payload_entry).collect();
    let lengths: Vec<u64> = batch.iter().map(codec::encoded_len).collect();

    let offsets = writer.append_batch(&mut batch).unwrap();

    let mut expected = 0;
    for (i, offset) in offsets.iter().enumerate() {
        assert_eq!(*offset, expected);
        assert_eq!(batch[i].offset(), Some(expected));
        expected += lengths[i];
    }
    assert_eq!(writer.end_offset(), expected);
    assert_eq!(writer.last_sequence(), Some(4));
}

#[test]
fn test_append_batch_all_or_nothing() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    // Third entry breaks ordering
    let mut batch = vec![payload_entry(0), payload_entry(1), payload_entry(1)];
    assert!(matches!(
        writer.append_batch(&mut batch),
        Err(LogError::OutOfOrderAppend { .. })
    ));

    assert!(batch.iter().all(|e| e.offset().is_none()));
    assert_eq!(writer.end_offset(), 0);
    assert_eq!(fs::metadata(&log_path).unwrap().len(), 0);
}

#[test]
fn test_append_empty_batch() {
    let (_temp, log_path) = setup_temp_log();
    let mut writer = LogWriter::open(&log_path, MAX).unwrap();

    assert!(writer.append_batch(&mut []).unwrap().is_empty());
    assert_eq!(writer.end_offset(), 0);
}

// =============================================================================
// Reopen Tests
// =============================================================================

#[test]
fn test_reopen_resumes_at_end() {
    let (_temp, log_path) = setup_temp_log();

    let end = {
        let mut writer = LogWriter::open(&log_path, MAX).unwrap();
        for i in 0..3 {
            writer.append(&mut payload_entry(i)).unwrap();
        }
        writer.end_offset()
    };

    let mut writer = LogWriter::open(&log_path, MAX).unwrap();
    assert_eq!(writer.end_offset(), end);
    assert_eq!(writer.last_sequence(), Some(2));

    let offset = writer.append(&mut payload_entry(3)).unwrap();
    assert_eq!(offset, end);
}

#[test]
fn test_reopen_cuts_torn_tail() {
    let (_temp, log_path) = setup_temp_log();

    let end = {
        let mut writer = LogWriter::open(&log_path, MAX).unwrap();
        writer.append(&mut payload_entry(0)).unwrap();
        writer.end_offset()
    };

    // Half of a second frame
    let torn = codec::encode(&payload_entry(1), MAX).unwrap();
    let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
    file.write_all(&torn[..torn.len() / 2]).unwrap();
    file.sync_all().unwrap();
    drop(file);

    let mut writer = LogWriter::open(&log_path, MAX).unwrap();
    assert_eq!(writer.end_offset(), end);
    assert_eq!(fs::metadata(&log_path).unwrap().len(), end);

    let offset = writer.append(&mut payload_entry(1)).unwrap();
    assert_eq!(offset, end);

    let result = Recovery::verify(&log_path, MAX).unwrap();
    assert_eq!(result.entries_recovered, 2);
    assert!(!result.was_truncated);
}
