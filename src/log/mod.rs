//! Append-Only Log Module
//!
//! The durable record of every entry and the frames that encode them.
//!
//! ## Responsibilities
//! - Encode/decode self-delimiting entry frames
//! - Allocate sequence numbers
//! - Append frames with a durability barrier after each write
//! - Random-access and sequential reads over independent file handles
//! - Crash recovery and replay
//!
//! ## File Format
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │ Frame 0 (offset 0)                                  │
//! │ ┌────────┬─────────┬──────────┬──────┬────────────┐ │
//! │ │ Len(4) │ Seq (8) │RefCnt (4)│ Refs │ Payload    │ │
//! │ └────────┴─────────┴──────────┴──────┴────────────┘ │
//! ├─────────────────────────────────────────────────────┤
//! │ Frame 1 (offset = len of frame 0)                   │
//! │ ...                                                 │
//! └─────────────────────────────────────────────────────┘
//! ```
//! No file header, footer, or checksum: frames sit back to back.

mod entry;
mod sequence;
mod writer;
mod reader;
mod recovery;

pub mod codec;

pub use codec::{FrameReferences, MIN_FRAME_SIZE};
pub use entry::{Entry, EntryReference};
pub use reader::{LogIterator, LogReader};
pub use recovery::{Recovery, RecoveryResult};
pub use sequence::SequenceAllocator;
pub use writer::LogWriter;
