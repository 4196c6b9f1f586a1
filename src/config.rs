//! Configuration for provlog
//!
//! Centralized configuration with sensible defaults. The log path is always
//! explicit; `validate()` checks it before the engine touches the file.

use std::fs;
use std::path::PathBuf;

use crate::error::{LogError, Result};
use crate::index::snapshot_temp_path;
use crate::log::MIN_FRAME_SIZE;

/// Main configuration for a provlog instance
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// The append-only log file (frames back to back, no header)
    pub log_path: PathBuf,

    /// Where the offset index snapshot lives.
    /// `None` keeps the index purely in memory; it is rebuilt on every open.
    pub index_path: Option<PathBuf>,

    /// Create the log file (and its parent directory) when missing
    pub create_if_missing: bool,

    // -------------------------------------------------------------------------
    // Codec Configuration
    // -------------------------------------------------------------------------
    /// Largest frame accepted on write or read (in bytes)
    pub max_frame_size: u32,

    // -------------------------------------------------------------------------
    // Lineage Configuration
    // -------------------------------------------------------------------------
    /// Upper bound on references followed by a single lineage query
    pub max_lineage_hops: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_path: PathBuf::from("./provlog_data/entries.log"),
            index_path: None,
            create_if_missing: true,
            max_frame_size: 16 * 1024 * 1024, // 16 MB
            max_lineage_hops: 1_000_000,
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Check the configuration before use
    ///
    /// - Log path must be non-empty and must not name a directory
    /// - An existing log file must be writable
    /// - A missing log file is only accepted with `create_if_missing`,
    ///   in which case the parent directory is created
    pub fn validate(&self) -> Result<()> {
        if self.log_path.as_os_str().is_empty() {
            return Err(LogError::Config("log_path must not be empty".to_string()));
        }

        if self.max_frame_size < MIN_FRAME_SIZE as u32 {
            return Err(LogError::Config(format!(
                "max_frame_size must be at least {} bytes, got {}",
                MIN_FRAME_SIZE, self.max_frame_size
            )));
        }

        if self.max_lineage_hops == 0 {
            return Err(LogError::Config(
                "max_lineage_hops must be greater than zero".to_string(),
            ));
        }

        match fs::metadata(&self.log_path) {
            Ok(meta) => {
                if meta.is_dir() {
                    return Err(LogError::Config(format!(
                        "log_path {} is a directory",
                        self.log_path.display()
                    )));
                }
                if meta.permissions().readonly() {
                    return Err(LogError::Config(format!(
                        "log_path {} is not writable",
                        self.log_path.display()
                    )));
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if !self.create_if_missing {
                    return Err(LogError::Config(format!(
                        "log_path {} does not exist",
                        self.log_path.display()
                    )));
                }
                if let Some(parent) = self.log_path.parent() {
                    if !parent.as_os_str().is_empty() {
                        fs::create_dir_all(parent)?;
                    }
                }
            }
            Err(e) => return Err(e.into()),
        }

        if let Some(index_path) = &self.index_path {
            if index_path.is_dir() {
                return Err(LogError::Config(format!(
                    "index_path {} is a directory",
                    index_path.display()
                )));
            }
            if index_path == &self.log_path {
                return Err(LogError::Config(
                    "index_path must differ from log_path".to_string(),
                ));
            }
            if snapshot_temp_path(index_path) == self.log_path {
                return Err(LogError::Config(format!(
                    "log_path {} is the scratch file of index_path",
                    self.log_path.display()
                )));
            }
        }

        Ok(())
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the log file path
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.log_path = path.into();
        self
    }

    /// Persist the offset index as a snapshot at this path
    pub fn index_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.index_path = Some(path.into());
        self
    }

    /// Whether to create the log when it does not exist
    pub fn create_if_missing(mut self, create: bool) -> Self {
        self.config.create_if_missing = create;
        self
    }

    /// Set the maximum frame size (in bytes)
    pub fn max_frame_size(mut self, size: u32) -> Self {
        self.config.max_frame_size = size;
        self
    }

    /// Set the hop bound for lineage traversal
    pub fn max_lineage_hops(mut self, hops: usize) -> Self {
        self.config.max_lineage_hops = hops;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
