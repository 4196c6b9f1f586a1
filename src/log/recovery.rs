//! Log Recovery
//!
//! Handles crash recovery by replaying the log from offset 0.
//!
//! Every fully written frame survives a crash. A damaged frame at the tail
//! (torn write, garbage length) ends the scan; it and anything after it are
//! reported as discarded rather than failing the open.
//!
//! A frame that is fully present but longer than `max_frame_size` is not
//! damage: the scan fails with `FrameTooLarge` and nothing is discarded.

use std::fs;
use std::path::Path;

use tracing::{error, info, warn};

use super::{Entry, LogReader};
use crate::error::{LogError, Result};

/// Handles log recovery after a crash
pub struct Recovery;

/// Result of a recovery operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryResult {
    /// Number of entries successfully recovered
    pub entries_recovered: u64,

    /// Sequence number of the last recovered entry
    pub last_sequence: Option<u64>,

    /// Byte position just past the last recovered frame
    pub durable_len: u64,

    /// Size of the file when it was scanned
    pub file_len: u64,

    /// Whether bytes past `durable_len` must be cut off
    pub was_truncated: bool,
}

impl RecoveryResult {
    /// Bytes past the last good frame
    pub fn discarded_bytes(&self) -> u64 {
        self.file_len.saturating_sub(self.durable_len)
    }
}

impl Recovery {
    /// Recover entries from a log file
    ///
    /// This will:
    /// 1. Decode frames sequentially from offset 0
    /// 2. Stop cleanly at end of file
    /// 3. Stop at the first damaged or out-of-order frame and mark the rest
    ///    of the file as discarded
    /// 4. Return all recovered entries in file order
    ///
    /// The file itself is not modified; `LogWriter::resume` cuts the tail.
    pub fn replay(path: &Path, max_frame_size: u32) -> Result<(Vec<Entry>, RecoveryResult)> {
        let mut entries = Vec::new();
        let result = Self::scan(path, max_frame_size, |entry| entries.push(entry))?;
        Ok((entries, result))
    }

    /// Verify integrity of a log file without retaining entries or
    /// modifying the file
    pub fn verify(path: &Path, max_frame_size: u32) -> Result<RecoveryResult> {
        Self::scan(path, max_frame_size, |_| {})
    }

    fn scan(path: &Path, max_frame_size: u32, mut on_entry: impl FnMut(Entry)) -> Result<RecoveryResult> {
        let file_len = fs::metadata(path)?.len();
        let mut reader = LogReader::open(path, max_frame_size)?;
        let mut result = RecoveryResult {
            file_len,
            ..RecoveryResult::default()
        };

        loop {
            let offset = reader.position();
            match reader.next_entry() {
                Ok(Some(entry)) => {
                    if let Some(last) = result.last_sequence {
                        if entry.sequence_number() <= last {
                            warn!(
                                "Entry {} at offset {} does not follow entry {}; stopping replay",
                                entry.sequence_number(),
                                offset,
                                last
                            );
                            break;
                        }
                    }

                    result.entries_recovered += 1;
                    result.last_sequence = Some(entry.sequence_number());
                    result.durable_len = reader.position();
                    on_entry(entry);
                }
                Ok(None) => break,
                Err(LogError::FrameTooLarge { size, limit }) if offset + size > file_len => {
                    warn!(
                        "Frame at offset {} declares {} bytes (limit {}) but the file ends first",
                        offset, size, limit
                    );
                    break;
                }
                Err(e @ LogError::FrameTooLarge { .. }) => {
                    error!(
                        "Complete frame at offset {} in {} is over max_frame_size; refusing to discard it",
                        offset,
                        path.display()
                    );
                    return Err(e);
                }
                Err(e) if e.is_frame_damage() => {
                    warn!("Damaged frame in {}: {}", path.display(), e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        result.was_truncated = result.durable_len < file_len;

        if result.was_truncated {
            warn!(
                "Recovery of {} stopped at offset {}; {} trailing bytes will be discarded",
                path.display(),
                result.durable_len,
                result.discarded_bytes()
            );
        }

        info!(
            "Recovered {} entries from {} (last_sequence={:?}, durable_len={})",
            result.entries_recovered,
            path.display(),
            result.last_sequence,
            result.durable_len
        );

        Ok(result)
    }
}
