//! # provlog
//!
//! An append-only log of immutable entries that reference earlier entries,
//! forming a provenance DAG:
//! - Durable appends (fsync before an entry is reported written)
//! - Offset-indexed point lookups
//! - Crash recovery by replay with torn-tail handling
//! - Backward lineage traversal read straight from disk
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │         (Single Writer / Multi Reader, owns sequencer)       │
//! └──────┬──────────────────────┬───────────────────────┬───────┘
//!        │ append               │ put / get             │ lineage
//!        ▼                      ▼                       ▼
//!   ┌─────────────┐      ┌─────────────┐       ┌─────────────────┐
//!   │  LogWriter  │      │ OffsetIndex │◄──────│ LineageResolver │
//!   │  (Append)   │      │   (cache)   │       │   (BFS, disk)   │
//!   └──────┬──────┘      └─────────────┘       └────────┬────────┘
//!          │                                            │
//!          ▼                                            ▼
//!   ┌─────────────────────────────────────────────────────────────┐
//!   │            Log file: frame │ frame │ frame │ ...             │
//!   └─────────────────────────────────────────────────────────────┘
//!          ▲
//!          │ replay on open
//!   ┌─────────────┐
//!   │  Recovery   │
//!   └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use provlog::{Config, Engine};
//!
//! # fn main() -> provlog::Result<()> {
//! let engine = Engine::open(Config::builder().log_path("/tmp/provlog/entries.log").build())?;
//!
//! let mut root = engine.create_entry().with_payload(&b"raw"[..]);
//! engine.append(&mut root)?;
//!
//! let mut derived = engine.create_entry().with_payload(&b"cleaned"[..]);
//! derived.add_reference_to(&root, "derived-from")?;
//! engine.append(&mut derived)?;
//!
//! assert_eq!(engine.lineage(derived.sequence_number())?, vec![root.sequence_number()]);
//! engine.close()?;
//! # Ok(())
//! # }
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod log;
pub mod index;
pub mod lineage;
pub mod engine;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{LogError, Result};
pub use config::Config;
pub use engine::Engine;
pub use index::OffsetIndex;
pub use lineage::LineageResolver;
pub use log::{Entry, EntryReference};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of provlog
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
