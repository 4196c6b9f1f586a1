//! Sequence number allocation
//!
//! Each engine owns exactly one allocator; there is no process-wide counter.

use std::sync::atomic::{AtomicU64, Ordering};

/// Hands out strictly increasing sequence numbers (lock-free)
#[derive(Debug)]
pub struct SequenceAllocator {
    next: AtomicU64,
}

impl SequenceAllocator {
    /// Start allocating at `next`
    pub fn starting_at(next: u64) -> Self {
        Self {
            next: AtomicU64::new(next),
        }
    }

    /// Allocate the next sequence number
    pub fn allocate(&self) -> u64 {
        self.next.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of sequence numbers handed out so far
    pub fn allocated(&self) -> u64 {
        self.next.load(Ordering::SeqCst)
    }
}
