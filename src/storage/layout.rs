use std::path::PathBuf;
use std::fs;
use crate::core::error::Result;

/// Directory structure for a durable store
#[derive(Debug, Clone)]
pub struct StorageLayout {
    pub base_dir: PathBuf,      // Root directory
    pub log_dir: PathBuf,       // Append-only record log
}

impl StorageLayout {
    pub fn new(base_dir: PathBuf) -> Result<Self> {
        let log_dir = base_dir.join("log");

        fs::create_dir_all(&log_dir)?;

        Ok(StorageLayout {
            base_dir,
            log_dir,
        })
    }

    pub fn log_path(&self) -> PathBuf {
        self.log_dir.join("data.log")
    }

    /// Scratch file a compaction writes before renaming over the live log.
    pub fn compaction_path(&self) -> PathBuf {
        self.log_dir.join("data.log.compact")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.base_dir.join(".lock")
    }
}
