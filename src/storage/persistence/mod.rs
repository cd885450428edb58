//! Durable snapshots of the span tables
//!
//! The store lives in memory; snapshots written here are what survives a
//! restart. Each snapshot is one LZ4-compressed JSON document holding all
//! three tables, so a restore never sees a partial set of tables.

pub mod file;
pub mod snapshot;
pub mod worker;

pub use file::FileBackend;
pub use snapshot::{SnapshotManager, SnapshotMetadata};
pub use worker::SnapshotWorker;

use std::path::Path;

/// Trait for persistence backends
pub trait PersistenceBackend: Send + Sync {
    /// Write data to persistence
    fn write(&self, key: &str, data: &[u8]) -> Result<(), PersistenceError>;

    /// Read data from persistence
    fn read(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;

    /// Delete data from persistence
    fn delete(&self, key: &str) -> Result<(), PersistenceError>;

    /// List all keys
    fn list_keys(&self) -> Result<Vec<String>, PersistenceError>;
}

/// Persistence configuration
#[derive(Debug, Clone)]
pub struct PersistenceConfig {
    /// Base directory for snapshot files
    pub data_dir: std::path::PathBuf,
    /// Snapshot interval in seconds
    pub snapshot_interval_secs: u64,
    /// Number of snapshots kept on disk
    pub keep_snapshots: usize,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            data_dir: std::path::PathBuf::from("./tracewell_data"),
            snapshot_interval_secs: 300,
            keep_snapshots: 3,
        }
    }
}

impl PersistenceConfig {
    pub fn new<P: AsRef<Path>>(data_dir: P) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            ..Default::default()
        }
    }

    pub fn with_snapshot_interval(mut self, secs: u64) -> Self {
        self.snapshot_interval_secs = secs;
        self
    }

    pub fn with_keep_snapshots(mut self, keep: usize) -> Self {
        self.keep_snapshots = keep.max(1);
        self
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Snapshot not found: {0}")]
    SnapshotNotFound(String),

    #[error("Corrupted data: {0}")]
    Corrupted(String),
}
