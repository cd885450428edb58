use super::SnapshotManager;
use crate::storage::TraceStore;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time;

/// Periodically snapshots the store and prunes old snapshots
pub struct SnapshotWorker {
    store: Arc<TraceStore>,
    snapshots: Arc<SnapshotManager>,
    interval: Duration,
    keep: usize,
    running: Arc<AtomicBool>,
}

impl SnapshotWorker {
    pub fn new(
        store: Arc<TraceStore>,
        snapshots: Arc<SnapshotManager>,
        interval: Duration,
        keep: usize,
    ) -> Self {
        Self {
            store,
            snapshots,
            interval,
            keep,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Start the background worker
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        self.running.store(true, Ordering::SeqCst);

        tokio::spawn(async move {
            tracing::info!("Snapshot worker started with interval {:?}", self.interval);

            let mut interval = time::interval(self.interval);
            // The first tick completes immediately; there is nothing new to save yet.
            interval.tick().await;

            while self.running.load(Ordering::SeqCst) {
                interval.tick().await;
                if !self.running.load(Ordering::SeqCst) {
                    break;
                }

                // Dump, encode and fsync are blocking work
                let worker = Arc::clone(&self);
                if let Err(e) = tokio::task::spawn_blocking(move || worker.run_once()).await {
                    tracing::error!(error = %e, "Snapshot task failed");
                }
            }

            tracing::info!("Snapshot worker stopped");
        })
    }

    /// Take one snapshot and prune. Failures are logged; the next tick retries.
    pub fn run_once(&self) -> bool {
        match self.snapshots.create_snapshot(&self.store) {
            Ok(_) => {
                match self.snapshots.cleanup_old_snapshots(self.keep) {
                    Ok(deleted) if deleted > 0 => {
                        tracing::debug!("Snapshot worker pruned {} snapshots", deleted);
                    }
                    Ok(_) => {}
                    Err(e) => tracing::warn!(error = %e, "Failed to prune old snapshots"),
                }
                true
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to write snapshot");
                false
            }
        }
    }

    /// Stop the worker
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Check if worker is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::persistence::PersistenceConfig;
    use tempfile::TempDir;

    #[test]
    fn test_run_once_prunes_to_keep() {
        let dir = TempDir::new().unwrap();
        let snapshots = Arc::new(SnapshotManager::new(PersistenceConfig::new(dir.path())).unwrap());
        let worker = SnapshotWorker::new(
            Arc::new(TraceStore::new()),
            Arc::clone(&snapshots),
            Duration::from_secs(60),
            2,
        );

        for _ in 0..3 {
            assert!(worker.run_once());
        }

        assert_eq!(snapshots.list_snapshots().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_start_and_stop() {
        let dir = TempDir::new().unwrap();
        let snapshots = Arc::new(SnapshotManager::new(PersistenceConfig::new(dir.path())).unwrap());
        let worker = Arc::new(SnapshotWorker::new(
            Arc::new(TraceStore::new()),
            snapshots,
            Duration::from_millis(10),
            1,
        ));

        let handle = Arc::clone(&worker).start();
        assert!(worker.is_running());

        worker.stop();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!worker.is_running());
    }

    #[tokio::test]
    async fn test_started_worker_writes_snapshots() {
        let dir = TempDir::new().unwrap();
        let snapshots = Arc::new(SnapshotManager::new(PersistenceConfig::new(dir.path())).unwrap());
        let worker = Arc::new(SnapshotWorker::new(
            Arc::new(TraceStore::new()),
            Arc::clone(&snapshots),
            Duration::from_millis(10),
            5,
        ));

        let handle = Arc::clone(&worker).start();
        tokio::time::timeout(Duration::from_secs(5), async {
            while snapshots.list_snapshots().unwrap().is_empty() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        worker.stop();
        handle.await.unwrap();
    }
}
