//! Snapshot-backed offset index
//!
//! Keeps the map in memory and writes it to a single snapshot file on
//! `flush()`/`close()`. Snapshots are replaced atomically (`<index>.tmp` +
//! rename + directory fsync), so a crash leaves either the old or the new
//! snapshot.
//!
//! ## File Format
//! ```text
//! ┌──────────┬───────────┬──────────────┬──────────────────┬──────────┐
//! │Magic (4) │Version (2)│ BodyLen (8)  │ Body (bincode)   │ CRC32 (4)│
//! └──────────┴───────────┴──────────────┴──────────────────┴──────────┘
//! ```
//!
//! A snapshot that fails any check is ignored: the index starts empty and
//! recovery fills it back in from the log.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::OffsetIndex;
use crate::error::{LogError, Result};

/// Magic bytes identifying an index snapshot
pub const MAGIC: &[u8; 4] = b"PLIX";

/// Snapshot format version
pub const VERSION: u16 = 1;

/// Magic (4) + version (2) + body length (8)
const HEADER_SIZE: usize = 14;

/// CRC32 of the body
const FOOTER_SIZE: usize = 4;

/// Scratch file a snapshot is written to before it replaces `path`
///
/// The suffix is appended to the whole file name, so it never collides
/// with a sibling that merely shares the stem.
pub(crate) fn temp_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".tmp");
    PathBuf::from(name)
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexSnapshot {
    entries: Vec<(u64, u64)>,
}

/// Offset index persisted as a snapshot file
pub struct SnapshotIndex {
    path: PathBuf,
    map: RwLock<BTreeMap<u64, u64>>,
}

impl SnapshotIndex {
    /// Open the index at `path`, loading the snapshot if one is usable
    pub fn open(path: &Path) -> Result<Self> {
        let map = if path.exists() {
            match Self::load(path) {
                Ok(map) => {
                    debug!("Loaded {} index entries from {}", map.len(), path.display());
                    map
                }
                Err(LogError::IndexCorruption(reason)) => {
                    warn!(
                        "Ignoring unusable index snapshot {}: {}",
                        path.display(),
                        reason
                    );
                    BTreeMap::new()
                }
                Err(e) => return Err(e),
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            map: RwLock::new(map),
        })
    }

    /// Number of sequence numbers recorded
    pub fn len(&self) -> usize {
        self.map.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.read().is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write the current map to disk
    pub fn save(&self) -> Result<()> {
        let snapshot = IndexSnapshot {
            entries: self.map.read().iter().map(|(k, v)| (*k, *v)).collect(),
        };

        let body = bincode::serialize(&snapshot)
            .map_err(|e| LogError::Serialization(format!("Failed to encode index snapshot: {}", e)))?;

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&body);
        let crc = hasher.finalize();

        let tmp_path = temp_path(&self.path);
        {
            let mut file = File::create(&tmp_path)?;
            file.write_all(MAGIC)?;
            file.write_all(&VERSION.to_le_bytes())?;
            file.write_all(&(body.len() as u64).to_le_bytes())?;
            file.write_all(&body)?;
            file.write_all(&crc.to_le_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;

        // Fsync the directory so the rename itself is durable
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        File::open(dir)?.sync_all()?;

        debug!(
            "Saved {} index entries to {}",
            snapshot.entries.len(),
            self.path.display()
        );
        Ok(())
    }

    fn load(path: &Path) -> Result<BTreeMap<u64, u64>> {
        let data = fs::read(path)?;

        if data.len() < HEADER_SIZE + FOOTER_SIZE {
            return Err(LogError::IndexCorruption(format!(
                "snapshot is {} bytes, smaller than header and footer",
                data.len()
            )));
        }

        if &data[0..4] != MAGIC {
            return Err(LogError::IndexCorruption(format!(
                "invalid magic: expected PLIX, got {:?}",
                &data[0..4]
            )));
        }

        let version = u16::from_le_bytes([data[4], data[5]]);
        if version != VERSION {
            return Err(LogError::IndexCorruption(format!(
                "unsupported snapshot version: {}",
                version
            )));
        }

        let mut len_bytes = [0u8; 8];
        len_bytes.copy_from_slice(&data[6..HEADER_SIZE]);
        let body_len = u64::from_le_bytes(len_bytes);

        if body_len != (data.len() - HEADER_SIZE - FOOTER_SIZE) as u64 {
            return Err(LogError::IndexCorruption(format!(
                "body length {} does not match file size {}",
                body_len,
                data.len()
            )));
        }

        let body = &data[HEADER_SIZE..data.len() - FOOTER_SIZE];
        let mut crc_bytes = [0u8; 4];
        crc_bytes.copy_from_slice(&data[data.len() - FOOTER_SIZE..]);
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(body);
        let actual_crc = hasher.finalize();

        if stored_crc != actual_crc {
            return Err(LogError::IndexCorruption(format!(
                "CRC mismatch: expected {:#x}, got {:#x}",
                stored_crc, actual_crc
            )));
        }

        let snapshot: IndexSnapshot = bincode::deserialize(body)
            .map_err(|e| LogError::IndexCorruption(format!("undecodable body: {}", e)))?;

        Ok(snapshot.entries.into_iter().collect())
    }
}

impl OffsetIndex for SnapshotIndex {
    fn put(&self, sequence_number: u64, offset: u64) -> Result<()> {
        self.map.write().insert(sequence_number, offset);
        Ok(())
    }

    fn get(&self, sequence_number: u64) -> Result<Option<u64>> {
        Ok(self.map.read().get(&sequence_number).copied())
    }

    fn flush(&self) -> Result<()> {
        self.save()
    }

    fn close(&self) -> Result<()> {
        self.save()
    }
}
