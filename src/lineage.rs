//! Lineage Resolution
//!
//! Walks backward references breadth-first, reading every frame straight
//! from the log file so the answer reflects exactly what is durable.
//!
//! ## Multiplicity
//! Ancestors are NOT deduplicated. If an ancestor is reachable along two
//! paths it is reported twice, once per path:
//!
//! ```text
//!        C
//!       / \
//!      A   B        lineage(C) = [A, B, Z, Z]
//!       \ /
//!        Z
//! ```
//!
//! ## Termination
//! Every hop must land on a strictly older entry; a reference that does not
//! (forward or self reference written by some other producer) stops the
//! walk with `LineageCycleSuspected`. Because ancestors are not
//! deduplicated, wide diamonds can still multiply the work, so the number
//! of hops is also capped.

use std::collections::VecDeque;

use tracing::{debug, trace};

use crate::error::{LogError, Result};
use crate::index::OffsetIndex;
use crate::log::{EntryReference, FrameReferences, LogReader};

/// Resolves the ancestors of an entry from disk
pub struct LineageResolver<'a> {
    index: &'a dyn OffsetIndex,
    reader: LogReader,
    max_hops: usize,
}

impl<'a> LineageResolver<'a> {
    pub fn new(index: &'a dyn OffsetIndex, reader: LogReader, max_hops: usize) -> Self {
        Self {
            index,
            reader,
            max_hops,
        }
    }

    /// Ancestor sequence numbers of `start`, in breadth-first order
    ///
    /// Fails with `UnknownSequence` when the index has no offset for
    /// `start`, and with `LineageCycleSuspected` when a reference does not
    /// point backward or the walk exceeds the hop limit.
    pub fn lineage(&mut self, start: u64) -> Result<Vec<u64>> {
        let offset = self
            .index
            .get(start)?
            .ok_or(LogError::UnknownSequence(start))?;

        let mut pending: VecDeque<EntryReference> = VecDeque::new();
        let frame = self.read_frame(offset, start)?;
        Self::enqueue(frame, start, 0, &mut pending)?;

        let mut history = Vec::new();
        while let Some(reference) = pending.pop_front() {
            if history.len() >= self.max_hops {
                return Err(LogError::LineageCycleSuspected {
                    start,
                    hops: self.max_hops,
                });
            }

            history.push(reference.target_sequence_number);
            trace!(
                "Lineage of {}: visiting {} at offset {}",
                start,
                reference.target_sequence_number,
                reference.target_offset
            );

            let frame = self.read_frame(reference.target_offset, reference.target_sequence_number)?;
            Self::enqueue(frame, start, history.len(), &mut pending)?;
        }

        debug!("Lineage of {} resolved {} ancestors", start, history.len());
        Ok(history)
    }

    /// Read a frame's references and confirm it is the entry we expected
    fn read_frame(&mut self, offset: u64, expected_sequence: u64) -> Result<FrameReferences> {
        let frame = self.reader.read_references_at(offset)?;
        if frame.sequence_number != expected_sequence {
            return Err(LogError::MalformedFrame {
                offset,
                reason: format!(
                    "expected entry {} but found entry {}",
                    expected_sequence, frame.sequence_number
                ),
            });
        }
        Ok(frame)
    }

    fn enqueue(
        frame: FrameReferences,
        start: u64,
        hops: usize,
        pending: &mut VecDeque<EntryReference>,
    ) -> Result<()> {
        for reference in frame.references {
            if reference.target_sequence_number >= frame.sequence_number {
                return Err(LogError::LineageCycleSuspected { start, hops });
            }
            pending.push_back(reference);
        }
        Ok(())
    }
}
