//! Error types for provlog
//!
//! Provides a unified error type for all operations.

use thiserror::Error;

/// Result type alias using LogError
pub type Result<T> = std::result::Result<T, LogError>;

/// Unified error type for provlog operations
#[derive(Debug, Error)]
pub enum LogError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Frame Errors
    // -------------------------------------------------------------------------
    /// Fewer bytes are available than the frame declares
    #[error("Truncated frame at offset {offset}: expected {expected} bytes, {available} available")]
    TruncatedFrame {
        offset: u64,
        expected: u64,
        available: u64,
    },

    /// Declared lengths disagree with the bytes actually present
    #[error("Malformed frame at offset {offset}: {reason}")]
    MalformedFrame { offset: u64, reason: String },

    #[error("Frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: u64, limit: u32 },

    // -------------------------------------------------------------------------
    // Entry Errors
    // -------------------------------------------------------------------------
    #[error("Invalid reference from entry {entry} to entry {target}: {reason}")]
    InvalidReference {
        entry: u64,
        target: u64,
        reason: &'static str,
    },

    #[error("Entry {0} has already been written")]
    AlreadyWritten(u64),

    #[error("Entry {sequence_number} cannot be appended after entry {last_durable}")]
    OutOfOrderAppend {
        sequence_number: u64,
        last_durable: u64,
    },

    #[error("Sequence number {0} is not in the log")]
    UnknownSequence(u64),

    // -------------------------------------------------------------------------
    // Lineage Errors
    // -------------------------------------------------------------------------
    #[error("Lineage of entry {start} stopped after {hops} hops; reference cycle suspected")]
    LineageCycleSuspected { start: u64, hops: usize },

    // -------------------------------------------------------------------------
    // Index Errors
    // -------------------------------------------------------------------------
    #[error("Index snapshot corrupted: {0}")]
    IndexCorruption(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // Writer State Errors
    // -------------------------------------------------------------------------
    /// A failed append could not be rolled back; the tail of the file is unknown
    #[error("Log writer is poisoned after a failed rollback; reopen the log to recover")]
    WriterPoisoned,
}

impl LogError {
    /// True for the two decode failures recovery treats as a torn tail
    pub fn is_frame_damage(&self) -> bool {
        matches!(
            self,
            LogError::TruncatedFrame { .. } | LogError::MalformedFrame { .. }
        )
    }
}
