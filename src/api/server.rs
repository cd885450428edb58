use axum::{
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{health_check, ingest_legacy_span, ingest_spans, stats, AppState};
use crate::ingest::DEFAULT_INBOUND_CHANNEL;
use crate::storage::{PersistenceConfig, SnapshotManager, SnapshotWorker, TraceStore};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_memory_bytes: usize,
    /// Inbound channel name; spans named `message/<channel>` are dropped
    pub inbound_channel: String,
    /// Snapshot directory. No persistence when unset.
    pub data_dir: Option<PathBuf>,
    pub snapshot_interval_secs: u64,
    pub keep_snapshots: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 9411,
            max_memory_bytes: 1024 * 1024 * 1024, // 1GB
            inbound_channel: DEFAULT_INBOUND_CHANNEL.to_string(),
            data_dir: None,
            snapshot_interval_secs: 300,
            keep_snapshots: 3,
        }
    }
}

impl ServerConfig {
    /// Read `TRACEWELL_*` environment variables over the defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            host: std::env::var("TRACEWELL_HOST").unwrap_or(defaults.host),
            port: env_parse("TRACEWELL_PORT").unwrap_or(defaults.port),
            max_memory_bytes: env_parse::<usize>("TRACEWELL_MAX_MEMORY_MB")
                .and_then(|mb| {
                    let bytes = megabytes_to_bytes(mb);
                    if bytes.is_none() {
                        tracing::warn!(
                            megabytes = mb,
                            "TRACEWELL_MAX_MEMORY_MB is too large, using the default"
                        );
                    }
                    bytes
                })
                .unwrap_or(defaults.max_memory_bytes),
            inbound_channel: std::env::var("TRACEWELL_INBOUND_CHANNEL")
                .ok()
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(defaults.inbound_channel),
            data_dir: std::env::var("TRACEWELL_DATA_DIR")
                .ok()
                .filter(|d| !d.trim().is_empty())
                .map(PathBuf::from),
            snapshot_interval_secs: env_parse("TRACEWELL_SNAPSHOT_INTERVAL_SECS")
                .unwrap_or(defaults.snapshot_interval_secs),
            keep_snapshots: env_parse("TRACEWELL_SNAPSHOT_KEEP").unwrap_or(defaults.keep_snapshots),
        }
    }

    fn persistence(&self) -> Option<PersistenceConfig> {
        self.data_dir.as_ref().map(|dir| {
            PersistenceConfig::new(dir)
                .with_snapshot_interval(self.snapshot_interval_secs)
                .with_keep_snapshots(self.keep_snapshots)
        })
    }
}

fn megabytes_to_bytes(mb: usize) -> Option<usize> {
    mb.checked_mul(1024 * 1024)
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Build the application router
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        // Span ingest
        .route("/api/sleuth", post(ingest_spans))
        .route("/api/v1/spans", post(ingest_legacy_span))
        // Stats
        .route("/stats", get(stats))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Run the HTTP server
pub async fn run_server(config: ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = Arc::new(TraceStore::with_memory_limit(config.max_memory_bytes));
    let mut state = AppState::new(Arc::clone(&store), &config.inbound_channel);

    // Restore and schedule snapshots when a data directory is configured
    let mut snapshot_worker = None;
    if let Some(persistence) = config.persistence() {
        let interval = Duration::from_secs(persistence.snapshot_interval_secs.max(1));
        let keep = persistence.keep_snapshots;
        let snapshots = Arc::new(SnapshotManager::new(persistence)?);

        match snapshots.restore_latest(&store)? {
            Some(metadata) => tracing::info!("Restored snapshot {}", metadata.id),
            None => tracing::info!("No snapshot to restore, starting empty"),
        }

        let worker = Arc::new(SnapshotWorker::new(
            Arc::clone(&store),
            Arc::clone(&snapshots),
            interval,
            keep,
        ));
        let handle = Arc::clone(&worker).start();
        snapshot_worker = Some((worker, handle));
        state = state.with_snapshots(snapshots);
    } else {
        tracing::warn!("No data directory configured; spans will not survive a restart");
    }

    let state = Arc::new(state);

    #[cfg(feature = "kafka")]
    let kafka = match crate::ingest::KafkaConfig::from_env() {
        Some(kafka_config) => {
            let consumer = crate::ingest::KafkaConsumer::new(
                kafka_config,
                Arc::clone(&state.sink),
                state.writer.clone(),
            )?;
            consumer.subscribe()?;
            Some(consumer.start())
        }
        None => None,
    };

    let app = build_router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    tracing::info!("Starting tracewell collector on {}", addr);

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    #[cfg(feature = "kafka")]
    {
        if let Some((shutdown_tx, handle)) = kafka {
            let _ = shutdown_tx.send(()).await;
            let _ = handle.await;
        }
    }

    // Final snapshot, then refuse late writes so nothing lands after it
    if let Some((worker, handle)) = snapshot_worker {
        worker.stop();
        handle.abort();
        store.close();
        worker.run_once();
    }

    tracing::info!("tracewell collector stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install CTRL+C signal handler");
        std::future::pending::<()>().await;
    }

    tracing::info!("Shutdown signal received, draining...");
}
