//! Log Reader
//!
//! Handles reading entries from the log file, either sequentially from a
//! position or by random access at a known offset.
//!
//! Each reader owns its own file handle, so readers never contend with the
//! writer or with each other. A reader can be capped at a byte limit (the
//! durable end of the log when the reader was created) and will not read
//! beyond it.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use super::codec::{self, FrameReferences, LENGTH_PREFIX_SIZE};
use super::Entry;
use crate::error::{LogError, Result};

/// Reads entries from the log file
pub struct LogReader {
    path: PathBuf,
    reader: BufReader<File>,
    position: u64,
    limit: Option<u64>,
    max_frame_size: u32,
}

impl LogReader {
    /// Open a log file for reading, positioned at offset 0
    pub fn open(path: &Path, max_frame_size: u32) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            position: 0,
            limit: None,
            max_frame_size,
        })
    }

    /// Never read at or past `limit`
    pub fn with_limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Current read position
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the read position to `offset`
    pub fn seek(&mut self, offset: u64) -> Result<()> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Read the next entry at the current position
    ///
    /// Returns `Ok(None)` at a clean end of log. A partial frame is an error
    /// (`TruncatedFrame`), as is a frame whose lengths do not add up
    /// (`MalformedFrame`).
    pub fn next_entry(&mut self) -> Result<Option<Entry>> {
        let offset = self.position;
        let remaining = self.remaining();
        let max_frame_size = self.max_frame_size;

        let frame = match codec::read_frame(&mut (&mut self.reader).take(remaining), offset, max_frame_size)? {
            Some(frame) => frame,
            None => return Ok(None),
        };

        let (entry, consumed) = codec::decode(&frame, offset)?;
        self.position += consumed as u64;
        Ok(Some(entry))
    }

    /// Read the full entry whose frame starts at `offset`
    ///
    /// Unlike `next_entry`, hitting the end of the log is an error: the
    /// caller asked for a frame that should exist.
    pub fn read_entry_at(&mut self, offset: u64) -> Result<Entry> {
        self.seek(offset)?;
        self.next_entry()?.ok_or(LogError::TruncatedFrame {
            offset,
            expected: LENGTH_PREFIX_SIZE as u64,
            available: 0,
        })
    }

    /// Read only the sequence number and references of the frame at `offset`
    pub fn read_references_at(&mut self, offset: u64) -> Result<FrameReferences> {
        self.seek(offset)?;
        let remaining = self.remaining();
        let max_frame_size = self.max_frame_size;

        let frame = codec::read_references(&mut (&mut self.reader).take(remaining), offset, max_frame_size)?
            .ok_or(LogError::TruncatedFrame {
                offset,
                expected: LENGTH_PREFIX_SIZE as u64,
                available: 0,
            })?;

        // The payload was skipped, so the buffered position is stale
        self.seek(offset + frame.frame_len as u64)?;
        Ok(frame)
    }

    /// Iterate over all entries from the current position
    pub fn entries(self) -> LogIterator {
        LogIterator {
            reader: self,
            done: false,
        }
    }

    fn remaining(&self) -> u64 {
        match self.limit {
            Some(limit) => limit.saturating_sub(self.position),
            None => u64::MAX,
        }
    }
}

/// Iterator over log entries
///
/// Stops after the first error.
pub struct LogIterator {
    reader: LogReader,
    done: bool,
}

impl Iterator for LogIterator {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        match self.reader.next_entry() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
