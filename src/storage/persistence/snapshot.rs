//! Snapshot manager for persisting and restoring the span tables

use super::file::FileBackend;
use super::{PersistenceBackend, PersistenceConfig, PersistenceError};
use crate::storage::engine::{Tables, TraceStore};
use crate::storage::rows::TABLES;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};

const LATEST_KEY: &str = "_latest";
const SCHEMA_VERSION: u32 = 1;

/// Snapshot metadata
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct SnapshotMetadata {
    /// Snapshot ID
    pub id: String,
    /// Creation timestamp (epoch ms)
    pub created_at: i64,
    /// Tables included in snapshot
    pub tables: Vec<String>,
    /// Rows per table, same order as `tables`
    pub row_counts: Vec<usize>,
    /// Compressed size in bytes
    pub size_bytes: usize,
    /// Schema version for compatibility
    pub schema_version: u32,
}

/// Writes and restores whole-store snapshots
pub struct SnapshotManager {
    backend: Box<dyn PersistenceBackend>,
    latest_snapshot: RwLock<Option<SnapshotMetadata>>,
    sequence: AtomicU64,
}

impl SnapshotManager {
    /// Open (or create) the snapshot directory described by `config`
    pub fn new(config: PersistenceConfig) -> Result<Self, PersistenceError> {
        Self::with_backend(Box::new(FileBackend::new(config)?))
    }

    pub fn with_backend(backend: Box<dyn PersistenceBackend>) -> Result<Self, PersistenceError> {
        let manager = Self {
            backend,
            latest_snapshot: RwLock::new(None),
            sequence: AtomicU64::new(0),
        };
        manager.load_latest_metadata()?;
        Ok(manager)
    }

    fn load_latest_metadata(&self) -> Result<(), PersistenceError> {
        if let Some(data) = self.backend.read(LATEST_KEY)? {
            let metadata: SnapshotMetadata = serde_json::from_slice(&data)
                .map_err(|e| PersistenceError::Deserialization(e.to_string()))?;
            *self.latest_snapshot.write() = Some(metadata);
        }
        Ok(())
    }

    /// Persist a consistent copy of all three tables
    pub fn create_snapshot(&self, store: &TraceStore) -> Result<SnapshotMetadata, PersistenceError> {
        let created_at = chrono::Utc::now().timestamp_millis();
        let sequence = self.sequence.fetch_add(1, Ordering::SeqCst);
        let snapshot_id = format!("snapshot_{}_{:06}", created_at, sequence);

        let tables = store.dump();
        let row_counts = vec![
            tables.annotations.len(),
            tables.spans.len(),
            tables.binary_annotations.len(),
        ];

        let body = encode(&tables)?;
        self.backend.write(&format!("{}_data", snapshot_id), &body)?;

        let metadata = SnapshotMetadata {
            id: snapshot_id.clone(),
            created_at,
            tables: TABLES.iter().map(|(name, _)| name.to_string()).collect(),
            row_counts,
            size_bytes: body.len(),
            schema_version: SCHEMA_VERSION,
        };

        let metadata_bytes = serde_json::to_vec(&metadata)
            .map_err(|e| PersistenceError::Serialization(e.to_string()))?;
        self.backend
            .write(&format!("{}_meta", snapshot_id), &metadata_bytes)?;
        self.backend.write(LATEST_KEY, &metadata_bytes)?;
        *self.latest_snapshot.write() = Some(metadata.clone());

        tracing::info!(
            snapshot = %metadata.id,
            size_bytes = metadata.size_bytes,
            spans = metadata.row_counts[1],
            "Snapshot written"
        );

        Ok(metadata)
    }

    /// Restore from the latest snapshot, if there is one
    pub fn restore_latest(&self, store: &TraceStore) -> Result<Option<SnapshotMetadata>, PersistenceError> {
        let metadata = match self.latest_snapshot.read().clone() {
            Some(m) => m,
            None => return Ok(None),
        };

        self.restore_snapshot(store, &metadata.id)?;
        Ok(Some(metadata))
    }

    /// Restore a specific snapshot
    pub fn restore_snapshot(&self, store: &TraceStore, snapshot_id: &str) -> Result<(), PersistenceError> {
        let metadata_bytes = self
            .backend
            .read(&format!("{}_meta", snapshot_id))?
            .ok_or_else(|| PersistenceError::SnapshotNotFound(snapshot_id.to_string()))?;
        let metadata: SnapshotMetadata = serde_json::from_slice(&metadata_bytes)
            .map_err(|e| PersistenceError::Deserialization(e.to_string()))?;

        if metadata.schema_version != SCHEMA_VERSION {
            return Err(PersistenceError::Corrupted(format!(
                "snapshot {} has schema version {}, expected {}",
                snapshot_id, metadata.schema_version, SCHEMA_VERSION
            )));
        }

        let body = self
            .backend
            .read(&format!("{}_data", snapshot_id))?
            .ok_or_else(|| PersistenceError::SnapshotNotFound(snapshot_id.to_string()))?;
        let tables = decode(&body)?;

        tracing::info!(
            snapshot = %snapshot_id,
            annotations = tables.annotations.len(),
            spans = tables.spans.len(),
            binary_annotations = tables.binary_annotations.len(),
            "Restoring snapshot"
        );
        store.restore(tables);

        Ok(())
    }

    pub fn latest_snapshot(&self) -> Option<SnapshotMetadata> {
        self.latest_snapshot.read().clone()
    }

    /// List all available snapshots, newest first
    pub fn list_snapshots(&self) -> Result<Vec<SnapshotMetadata>, PersistenceError> {
        let mut snapshots = Vec::new();

        for key in self.backend.list_keys()? {
            if key.ends_with("_meta") {
                if let Some(data) = self.backend.read(&key)? {
                    if let Ok(metadata) = serde_json::from_slice::<SnapshotMetadata>(&data) {
                        snapshots.push(metadata);
                    }
                }
            }
        }

        snapshots.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(snapshots)
    }

    /// Delete old snapshots, keeping only the `keep_count` most recent
    pub fn cleanup_old_snapshots(&self, keep_count: usize) -> Result<usize, PersistenceError> {
        let snapshots = self.list_snapshots()?;
        let mut deleted = 0;

        for snapshot in snapshots.iter().skip(keep_count) {
            self.backend.delete(&format!("{}_data", snapshot.id))?;
            self.backend.delete(&format!("{}_meta", snapshot.id))?;
            deleted += 1;
        }

        Ok(deleted)
    }
}

fn encode(tables: &Tables) -> Result<Vec<u8>, PersistenceError> {
    let json =
        serde_json::to_vec(tables).map_err(|e| PersistenceError::Serialization(e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&json))
}

fn decode(body: &[u8]) -> Result<Tables, PersistenceError> {
    let json = lz4_flex::decompress_size_prepended(body)
        .map_err(|e| PersistenceError::Corrupted(e.to_string()))?;
    serde_json::from_slice(&json).map_err(|e| PersistenceError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::rows::{AnnotationRow, BinaryAnnotationRow, SpanRow};
    use tempfile::TempDir;

    fn populated_store() -> TraceStore {
        let store = TraceStore::new();
        store
            .transaction(|uow| {
                uow.insert_annotation(AnnotationRow {
                    trace_id: 1,
                    span_id: 2,
                    span_name: Some("get".to_string()),
                    service_name: "svc".to_string(),
                    value: "sr".to_string(),
                    ipv4: 0x7F00_0001,
                    port: 8080,
                    timestamp: 1_000,
                });
                uow.insert_span(SpanRow {
                    trace_id: 1,
                    span_id: 2,
                    span_name: Some("get".to_string()),
                    parent_id: None,
                    created_timestamp: 1_000,
                });
                uow.insert_binary_annotation(BinaryAnnotationRow {
                    trace_id: 1,
                    span_id: 2,
                    span_name: Some("get".to_string()),
                    service_name: "svc".to_string(),
                    key: "http.path".to_string(),
                    value: vec![0, 159, 146, 150],
                    annotation_type: 1,
                    ipv4: 0x7F00_0001,
                    port: 8080,
                    timestamp: 1_000,
                });
                Ok(())
            })
            .unwrap();
        store
    }

    #[test]
    fn test_snapshot_create_restore() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(PersistenceConfig::new(dir.path())).unwrap();

        let store = populated_store();
        let metadata = manager.create_snapshot(&store).unwrap();
        assert_eq!(metadata.row_counts, vec![1, 1, 1]);
        assert_eq!(metadata.tables, vec!["annotations", "spans", "binary_annotations"]);

        let restored = TraceStore::new();
        manager.restore_snapshot(&restored, &metadata.id).unwrap();

        assert_eq!(restored.dump(), store.dump());
        assert!(restored.span_exists(2));
    }

    #[test]
    fn test_restore_latest_across_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let manager = SnapshotManager::new(PersistenceConfig::new(dir.path())).unwrap();
            assert!(manager.restore_latest(&TraceStore::new()).unwrap().is_none());
            manager.create_snapshot(&populated_store()).unwrap();
        }

        let manager = SnapshotManager::new(PersistenceConfig::new(dir.path())).unwrap();
        let store = TraceStore::new();
        let restored = manager.restore_latest(&store).unwrap();

        assert!(restored.is_some());
        assert_eq!(store.spans().len(), 1);
    }

    #[test]
    fn test_corrupted_body_is_reported() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(PersistenceConfig::new(dir.path())).unwrap();
        let metadata = manager.create_snapshot(&populated_store()).unwrap();

        std::fs::write(
            dir.path().join(format!("{}_data.snap", metadata.id)),
            b"\x05\x00\x00\x00garbage",
        )
        .unwrap();

        let store = TraceStore::new();
        assert!(manager.restore_snapshot(&store, &metadata.id).is_err());
        assert!(store.spans().is_empty());
    }

    #[test]
    fn test_missing_snapshot() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(PersistenceConfig::new(dir.path())).unwrap();

        assert!(matches!(
            manager.restore_snapshot(&TraceStore::new(), "snapshot_0_0"),
            Err(PersistenceError::SnapshotNotFound(_))
        ));
    }

    #[test]
    fn test_cleanup_keeps_newest() {
        let dir = TempDir::new().unwrap();
        let manager = SnapshotManager::new(PersistenceConfig::new(dir.path())).unwrap();
        let store = populated_store();

        for _ in 0..4 {
            manager.create_snapshot(&store).unwrap();
        }
        let newest = manager.latest_snapshot().unwrap();

        assert_eq!(manager.cleanup_old_snapshots(2).unwrap(), 2);
        let remaining = manager.list_snapshots().unwrap();
        assert_eq!(remaining.len(), 2);
        assert_eq!(remaining[0].id, newest.id);
    }
}
