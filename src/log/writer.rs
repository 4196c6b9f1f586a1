//! Log Writer
//!
//! Appends encoded frames to the log file. Every append ends with a
//! durability barrier; a frame is only reported written once it is on disk.

use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytes::BytesMut;
use tracing::{debug, error, trace, warn};

use super::codec;
use super::recovery::{Recovery, RecoveryResult};
use super::Entry;
use crate::error::{LogError, Result};

/// Writes entries to the log file
///
/// Holds the durable end of the log: the next frame always starts exactly
/// where the last successfully synced frame ended.
pub struct LogWriter {
    path: PathBuf,
    file: File,
    /// Byte position just past the last durable frame
    end_offset: u64,
    /// Sequence number of the last durable frame
    last_sequence: Option<u64>,
    max_frame_size: u32,
    /// Reused encode buffer
    buffer: BytesMut,
    /// Set when a failed write could not be rolled back
    poisoned: bool,
}

impl LogWriter {
    /// Open or create a log file, scanning it to find its durable end
    pub fn open(path: &Path, max_frame_size: u32) -> Result<Self> {
        let result = if path.exists() {
            Recovery::verify(path, max_frame_size)?
        } else {
            RecoveryResult::default()
        };
        Self::resume(path, &result, max_frame_size)
    }

    /// Open a log whose durable extent is already known from recovery
    ///
    /// Anything past `result.durable_len` is a torn frame and is cut off so
    /// the next append lands exactly after the last recovered frame.
    pub fn resume(path: &Path, result: &RecoveryResult, max_frame_size: u32) -> Result<Self> {
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .open(path)?;

        let file_len = file.metadata()?.len();
        if file_len < result.durable_len {
            return Err(LogError::TruncatedFrame {
                offset: file_len,
                expected: result.durable_len,
                available: file_len,
            });
        }
        if file_len > result.durable_len {
            warn!(
                "Discarding {} bytes of torn tail from {} (durable end {})",
                file_len - result.durable_len,
                path.display(),
                result.durable_len
            );
            file.set_len(result.durable_len)?;
            file.sync_all()?;
        }

        file.seek(SeekFrom::Start(result.durable_len))?;

        debug!(
            "Log writer open at {} (end_offset={}, last_sequence={:?})",
            path.display(),
            result.durable_len,
            result.last_sequence
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            end_offset: result.durable_len,
            last_sequence: result.last_sequence,
            max_frame_size,
            buffer: BytesMut::new(),
            poisoned: false,
        })
    }

    /// Append one entry and force it to disk
    ///
    /// Assigns the entry's offset only after the durability barrier
    /// succeeds. Returns that offset.
    pub fn append(&mut self, entry: &mut Entry) -> Result<u64> {
        self.check_appendable(entry, self.last_sequence, self.end_offset)?;

        self.buffer.clear();
        let frame_len = codec::encode_into(entry, self.max_frame_size, &mut self.buffer)?;
        let offset = self.end_offset;

        self.write_and_sync()?;

        entry.mark_written(offset);
        self.end_offset += frame_len as u64;
        self.last_sequence = Some(entry.sequence_number());

        trace!(
            "Appended entry {} at offset {} ({} bytes)",
            entry.sequence_number(),
            offset,
            frame_len
        );

        Ok(offset)
    }

    /// Append several entries with a single write and a single barrier
    ///
    /// All-or-nothing: on any failure no entry in the batch is marked
    /// written. Entries must be in increasing sequence order.
    pub fn append_batch(&mut self, entries: &mut [Entry]) -> Result<Vec<u64>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        self.buffer.clear();
        let mut offsets = Vec::with_capacity(entries.len());
        let mut next_offset = self.end_offset;
        let mut last_sequence = self.last_sequence;

        for entry in entries.iter() {
            self.check_appendable(entry, last_sequence, next_offset)?;
            let frame_len = codec::encode_into(entry, self.max_frame_size, &mut self.buffer)?;
            offsets.push(next_offset);
            next_offset += frame_len as u64;
            last_sequence = Some(entry.sequence_number());
        }

        self.write_and_sync()?;

        for (entry, offset) in entries.iter_mut().zip(&offsets) {
            entry.mark_written(*offset);
        }
        self.end_offset = next_offset;
        self.last_sequence = last_sequence;

        debug!(
            "Appended batch of {} entries ending at offset {}",
            entries.len(),
            next_offset
        );

        Ok(offsets)
    }

    /// Force sync to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Byte position where the next frame will start
    pub fn end_offset(&self) -> u64 {
        self.end_offset
    }

    /// Sequence number of the last durable entry
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A failed write left bytes past the durable end that could not be cut
    pub(crate) fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn check_appendable(&self, entry: &Entry, last_sequence: Option<u64>, end_offset: u64) -> Result<()> {
        if self.poisoned {
            return Err(LogError::WriterPoisoned);
        }

        if entry.is_durable() {
            return Err(LogError::AlreadyWritten(entry.sequence_number()));
        }

        if let Some(last) = last_sequence {
            if entry.sequence_number() <= last {
                return Err(LogError::OutOfOrderAppend {
                    sequence_number: entry.sequence_number(),
                    last_durable: last,
                });
            }
        }

        // A reference can only name a frame that is already in the file
        for reference in entry.references() {
            if reference.target_offset >= end_offset {
                return Err(LogError::InvalidReference {
                    entry: entry.sequence_number(),
                    target: reference.target_sequence_number,
                    reason: "target offset is beyond the durable end of the log",
                });
            }
        }

        Ok(())
    }

    /// Write the encode buffer and run the durability barrier, rolling the
    /// file back to `end_offset` if either step fails
    fn write_and_sync(&mut self) -> Result<()> {
        let outcome = match self.file.write_all(&self.buffer) {
            Ok(()) => self.file.sync_data(),
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            error!("Append to {} failed: {}", self.path.display(), e);
            self.rollback();
            return Err(e.into());
        }

        Ok(())
    }

    fn rollback(&mut self) {
        let end = self.end_offset;
        let result = self
            .file
            .set_len(end)
            .and_then(|_| self.file.seek(SeekFrom::Start(end)).map(|_| ()));

        match result {
            Ok(()) => warn!("Rolled {} back to offset {}", self.path.display(), end),
            Err(e) => {
                error!(
                    "Rollback of {} to offset {} failed, refusing further appends: {}",
                    self.path.display(),
                    end,
                    e
                );
                self.poisoned = true;
            }
        }
    }
}
