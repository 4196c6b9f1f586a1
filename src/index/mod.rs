//! Offset Index Module
//!
//! Maps sequence numbers to the byte offset of their frame.
//!
//! ## Responsibilities
//! - Point lookups for random-access reads and lineage traversal
//! - Nothing else: the log is the source of truth, and the index is a
//!   cache that recovery reconciles and `Engine::rebuild_index` regenerates
//!
//! The engine only relies on `put`, `get` and `close`, so any ordered
//! key-value store can back it. Two implementations ship with the crate:
//! - [`MemoryIndex`]: a `BTreeMap`, rebuilt from the log on every open
//! - [`SnapshotIndex`]: the same map, saved to a checksummed snapshot file
//!   on flush/close

mod memory;
mod snapshot;

pub use memory::MemoryIndex;
pub use snapshot::SnapshotIndex;

pub(crate) use snapshot::temp_path as snapshot_temp_path;

use crate::error::Result;

/// Sequence number → offset lookup
///
/// Implementations use interior mutability so readers and the single writer
/// can share one instance.
pub trait OffsetIndex: Send + Sync {
    /// Record `sequence_number → offset`, overwriting any previous value
    fn put(&self, sequence_number: u64, offset: u64) -> Result<()>;

    /// Look up the offset recorded for `sequence_number`
    fn get(&self, sequence_number: u64) -> Result<Option<u64>>;

    /// Persist whatever the implementation keeps in memory
    fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Release resources
    fn close(&self) -> Result<()>;
}
