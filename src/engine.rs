//! Engine Module
//!
//! The append-only log engine that coordinates all components.
//!
//! ## Responsibilities
//! - Allocate sequence numbers for new entries
//! - Serialize durable appends (single writer)
//! - Keep the offset index in step with the log
//! - Replay the log on startup
//! - Serve point reads and lineage queries from independent file handles

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{LogError, Result};
use crate::index::{MemoryIndex, OffsetIndex, SnapshotIndex};
use crate::lineage::LineageResolver;
use crate::log::{Entry, LogReader, LogWriter, Recovery, RecoveryResult, SequenceAllocator};

/// The provenance log engine
///
/// ## Concurrency Model: Single-Writer / Multiple-Reader (SWMR)
///
/// - **Sequence allocation** (`create_entry`): lock-free atomic counter,
///   safe from any thread.
///
/// - **Writes** (append/append_batch/rebuild_index): serialized by the
///   `writer` mutex. Offset assignment, write, durability barrier and index
///   update complete as one unit before the next append starts.
///
/// - **Reads** (read_entry/lineage): each opens its own file handle capped at
///   the durable watermark, so they never block the writer or each other
///   and never see bytes that have not been synced.
pub struct Engine {
    /// Engine configuration
    config: Config,

    /// Hands out sequence numbers for new entries
    sequencer: SequenceAllocator,

    /// The only path to the log file for writes
    writer: Mutex<LogWriter>,

    /// Durable entries in log order
    entries: RwLock<Vec<Entry>>,

    /// Sequence number → offset cache over the log
    index: Arc<dyn OffsetIndex>,

    /// Byte length of the log known to be on disk
    durable_len: AtomicU64,
}

impl Engine {
    /// Open or create a log with the given config
    ///
    /// Uses a `SnapshotIndex` when `config.index_path` is set and a
    /// `MemoryIndex` otherwise.
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let index: Arc<dyn OffsetIndex> = match &config.index_path {
            Some(path) => Arc::new(SnapshotIndex::open(path)?),
            None => Arc::new(MemoryIndex::new()),
        };

        Self::open_validated(config, index)
    }

    /// Open with a path (convenience method)
    ///
    /// Uses default config with the specified log file
    pub fn open_path(path: &Path) -> Result<Self> {
        let config = Config::builder().log_path(path).build();
        Self::open(config)
    }

    /// Open with an externally supplied index
    pub fn open_with_index(config: Config, index: Arc<dyn OffsetIndex>) -> Result<Self> {
        config.validate()?;
        Self::open_validated(config, index)
    }

    /// On startup:
    /// 1. Replay the log if it exists
    /// 2. Reconcile the index with every recovered entry
    /// 3. Open the writer at the end of the last good frame (cutting any torn tail)
    /// 4. Resume sequence numbers after the last recovered entry
    fn open_validated(config: Config, index: Arc<dyn OffsetIndex>) -> Result<Self> {
        let (entries, recovery) = if config.log_path.exists() {
            Recovery::replay(&config.log_path, config.max_frame_size)?
        } else {
            (Vec::new(), RecoveryResult::default())
        };

        // The index cannot be trusted after an unclean shutdown; the log can
        for entry in &entries {
            if let Some(offset) = entry.offset() {
                index.put(entry.sequence_number(), offset)?;
            }
        }

        let writer = LogWriter::resume(&config.log_path, &recovery, config.max_frame_size)?;
        let next_sequence = recovery.last_sequence.map_or(0, |s| s + 1);

        info!(
            "Opened {} with {} entries (next_sequence={}, durable_len={})",
            config.log_path.display(),
            entries.len(),
            next_sequence,
            recovery.durable_len
        );

        Ok(Self {
            sequencer: SequenceAllocator::starting_at(next_sequence),
            writer: Mutex::new(writer),
            entries: RwLock::new(entries),
            index,
            durable_len: AtomicU64::new(recovery.durable_len),
            config,
        })
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Allocate the next sequence number and return a fresh, unwritten entry
    pub fn create_entry(&self) -> Entry {
        Entry::new(self.sequencer.allocate())
    }

    /// Durably append an entry
    ///
    /// Steps:
    /// 1. Acquire the writer lock
    /// 2. Encode at the current end of the log, write, fsync
    /// 3. Publish the new durable length
    /// 4. Record the entry in the index, then in memory
    ///
    /// An error after step 2 (index failure) means the entry is durable but
    /// not indexed; `rebuild_index` repairs that.
    pub fn append(&self, entry: &mut Entry) -> Result<u64> {
        let mut writer = self.writer.lock();

        let offset = writer.append(entry)?;
        self.durable_len.store(writer.end_offset(), Ordering::SeqCst);

        // Index first so a visible entry always resolves
        let indexed = self.index.put(entry.sequence_number(), offset);
        self.entries.write().push(entry.clone());
        indexed?;

        debug!("Entry {} durable at offset {}", entry.sequence_number(), offset);
        Ok(offset)
    }

    /// Durably append several entries with one durability barrier
    ///
    /// The index is only updated after the barrier, so no reader can find a
    /// batch entry in the index before its bytes are on disk.
    pub fn append_batch(&self, batch: &mut [Entry]) -> Result<Vec<u64>> {
        let mut writer = self.writer.lock();

        let offsets = writer.append_batch(batch)?;
        self.durable_len.store(writer.end_offset(), Ordering::SeqCst);

        let indexed = batch
            .iter()
            .zip(&offsets)
            .try_for_each(|(entry, offset)| self.index.put(entry.sequence_number(), *offset));
        self.entries.write().extend(batch.iter().cloned());
        indexed?;

        debug!("Batch of {} entries durable", offsets.len());
        Ok(offsets)
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    /// Get a durable entry from memory
    pub fn get_entry(&self, sequence_number: u64) -> Option<Entry> {
        let entries = self.entries.read();
        entries
            .binary_search_by_key(&sequence_number, Entry::sequence_number)
            .ok()
            .map(|i| entries[i].clone())
    }

    /// Offset of a durable entry, via the index
    ///
    /// Sequence numbers the log does not hold return `None` even if a stale
    /// index still has them.
    pub fn entry_offset(&self, sequence_number: u64) -> Result<Option<u64>> {
        if !self.contains(sequence_number) {
            return Ok(None);
        }
        self.index.get(sequence_number)
    }

    /// Read an entry back from disk: index lookup, seek, decode
    pub fn read_entry(&self, sequence_number: u64) -> Result<Entry> {
        let offset = self
            .entry_offset(sequence_number)?
            .ok_or(LogError::UnknownSequence(sequence_number))?;

        let entry = self.reader()?.read_entry_at(offset)?;
        if entry.sequence_number() != sequence_number {
            return Err(LogError::MalformedFrame {
                offset,
                reason: format!(
                    "index points entry {} at a frame holding entry {}",
                    sequence_number,
                    entry.sequence_number()
                ),
            });
        }

        Ok(entry)
    }

    /// Ancestors of an entry, breadth-first, with one element per path
    pub fn lineage(&self, sequence_number: u64) -> Result<Vec<u64>> {
        if !self.contains(sequence_number) {
            return Err(LogError::UnknownSequence(sequence_number));
        }

        let reader = self.reader()?;
        LineageResolver::new(self.index.as_ref(), reader, self.config.max_lineage_hops)
            .lineage(sequence_number)
    }

    /// A reader capped at the current durable length
    pub fn reader(&self) -> Result<LogReader> {
        let limit = self.durable_len.load(Ordering::SeqCst);
        Ok(LogReader::open(&self.config.log_path, self.config.max_frame_size)?.with_limit(limit))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Re-derive the whole index from the durable log
    ///
    /// Holds the writer lock so the log cannot grow mid-scan. Returns the
    /// number of entries indexed.
    pub fn rebuild_index(&self) -> Result<u64> {
        let _writer = self.writer.lock();

        let mut count = 0;
        for entry in self.reader()?.entries() {
            let entry = entry?;
            if let Some(offset) = entry.offset() {
                self.index.put(entry.sequence_number(), offset)?;
                count += 1;
            }
        }
        self.index.flush()?;

        info!("Rebuilt index with {} entries", count);
        Ok(count)
    }

    /// Persist the index (log appends are already durable)
    pub fn flush(&self) -> Result<()> {
        self.index.flush()
    }

    /// Close the engine gracefully
    ///
    /// Syncs the log and closes the index. A poisoned writer is not synced;
    /// whatever it left past the durable end is handled by recovery on reopen.
    pub fn close(self) -> Result<()> {
        let mut writer = self.writer.lock();
        if writer.is_poisoned() {
            warn!("Closing {} with a poisoned writer", self.config.log_path.display());
        } else {
            writer.sync()?;
        }
        drop(writer);
        self.index.close()?;
        info!("Closed {}", self.config.log_path.display());
        Ok(())
    }

    // =========================================================================
    // Accessors (for testing and debugging)
    // =========================================================================

    /// Number of sequence numbers allocated so far
    pub fn size(&self) -> u64 {
        self.sequencer.allocated()
    }

    /// Number of entries durably in the log
    pub fn durable_count(&self) -> usize {
        self.entries.read().len()
    }

    /// Sequence number of the last durable entry
    pub fn last_sequence(&self) -> Option<u64> {
        self.entries.read().last().map(Entry::sequence_number)
    }

    /// Byte length of the durable log
    pub fn end_offset(&self) -> u64 {
        self.durable_len.load(Ordering::SeqCst)
    }

    /// Get the log file path
    pub fn log_path(&self) -> &Path {
        &self.config.log_path
    }

    /// Get the offset index
    pub fn index(&self) -> &Arc<dyn OffsetIndex> {
        &self.index
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    fn contains(&self, sequence_number: u64) -> bool {
        self.entries
            .read()
            .binary_search_by_key(&sequence_number, Entry::sequence_number)
            .is_ok()
    }
}
