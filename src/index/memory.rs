//! In-memory offset index
//!
//! BTreeMap-based index with RwLock for concurrency.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::OffsetIndex;
use crate::error::Result;

/// Offset index held entirely in memory
#[derive(Debug, Default)]
pub struct MemoryIndex {
    map: RwLock<BTreeMap<u64, u64>>,
}

impl MemoryIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sequence numbers recorded
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }
}

impl OffsetIndex for MemoryIndex {
    fn put(&self, sequence_number: u64, offset: u64) -> Result<()> {
        self.map.write().insert(sequence_number, offset);
        Ok(())
    }

    fn get(&self, sequence_number: u64) -> Result<Option<u64>> {
        Ok(self.map.read().get(&sequence_number).copied())
    }

    fn close(&self) -> Result<()> {
        Ok(())
    }
}
