//! Log entry definitions
//!
//! Defines the in-memory shape of a log entry and its backward references.

use bytes::Bytes;

use crate::error::{LogError, Result};

/// A backward edge from one entry to an earlier one
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntryReference {
    /// Byte offset of the referenced entry's frame
    pub target_offset: u64,

    /// Sequence number of the referenced entry
    pub target_sequence_number: u64,

    /// Free-form relation label
    pub relation_type: String,
}

impl EntryReference {
    pub fn new(
        target_offset: u64,
        target_sequence_number: u64,
        relation_type: impl Into<String>,
    ) -> Self {
        Self {
            target_offset,
            target_sequence_number,
            relation_type: relation_type.into(),
        }
    }
}

/// A single record in the log
///
/// Created in memory by the engine with the next sequence number. References
/// may be attached until the entry is written; writing assigns the offset,
/// after which the entry is immutable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    sequence_number: u64,
    offset: Option<u64>,
    payload: Bytes,
    references: Vec<EntryReference>,
}

impl Entry {
    /// Create an entry with no payload, no references and no offset
    pub fn new(sequence_number: u64) -> Self {
        Self {
            sequence_number,
            offset: None,
            payload: Bytes::new(),
            references: Vec::new(),
        }
    }

    /// Rebuild an entry read back from the log
    pub(crate) fn from_parts(
        sequence_number: u64,
        offset: u64,
        payload: Bytes,
        references: Vec<EntryReference>,
    ) -> Self {
        Self {
            sequence_number,
            offset: Some(offset),
            payload,
            references,
        }
    }

    /// Set the payload, consuming the entry
    pub fn with_payload(mut self, payload: impl Into<Bytes>) -> Self {
        self.payload = payload.into();
        self
    }

    /// Replace the payload of an entry that has not been written yet
    pub fn set_payload(&mut self, payload: impl Into<Bytes>) -> Result<()> {
        if self.is_durable() {
            return Err(LogError::AlreadyWritten(self.sequence_number));
        }
        self.payload = payload.into();
        Ok(())
    }

    /// Attach a reference to an already written entry
    ///
    /// The target must be durable (it needs an offset) and strictly older
    /// than this entry.
    pub fn add_reference_to(&mut self, target: &Entry, relation_type: impl Into<String>) -> Result<()> {
        let target_offset = target.offset.ok_or(LogError::InvalidReference {
            entry: self.sequence_number,
            target: target.sequence_number,
            reason: "target has not been written",
        })?;

        self.add_reference(EntryReference::new(
            target_offset,
            target.sequence_number,
            relation_type,
        ))
    }

    /// Attach a raw reference
    ///
    /// Rejects any target whose sequence number is not strictly less than
    /// this entry's. The reference list is left untouched on error.
    pub fn add_reference(&mut self, reference: EntryReference) -> Result<()> {
        if self.is_durable() {
            return Err(LogError::AlreadyWritten(self.sequence_number));
        }

        if reference.target_sequence_number >= self.sequence_number {
            return Err(LogError::InvalidReference {
                entry: self.sequence_number,
                target: reference.target_sequence_number,
                reason: "references must point to an earlier entry",
            });
        }

        self.references.push(reference);
        Ok(())
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    /// Byte offset of this entry's frame, once written
    pub fn offset(&self) -> Option<u64> {
        self.offset
    }

    pub fn is_durable(&self) -> bool {
        self.offset.is_some()
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    pub fn references(&self) -> &[EntryReference] {
        &self.references
    }

    /// Reserved signature field; never populated and never serialized
    pub fn signature(&self) -> &[u8] {
        &[]
    }

    pub(crate) fn mark_written(&mut self, offset: u64) {
        self.offset = Some(offset);
    }
}
