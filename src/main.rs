//! Tracewell collector
//!
//! Run with: cargo run
//!
//! Environment variables:
//! - TRACEWELL_HOST: Bind address (default: 0.0.0.0)
//! - TRACEWELL_PORT: Port number (default: 9411)
//! - TRACEWELL_MAX_MEMORY_MB: Store memory budget in MB (default: 1024)
//! - TRACEWELL_INBOUND_CHANNEL: Inbound channel name for cycle detection (default: sleuth)
//! - TRACEWELL_DATA_DIR: Snapshot directory (default: unset, no persistence)
//! - TRACEWELL_SNAPSHOT_INTERVAL_SECS: Seconds between snapshots (default: 300)
//! - TRACEWELL_SNAPSHOT_KEEP: Snapshots kept on disk (default: 3)
//! - RUST_LOG: Log level (default: info)
//!
//! With the `kafka` feature, `KAFKA_SPANS_TOPIC` enables the Kafka consumer
//! (see `ingest::kafka` for the remaining variables).

use tracewell::api::{run_server, ServerConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tracewell=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env();

    tracing::info!("Tracewell configuration:");
    tracing::info!("  Host: {}:{}", config.host, config.port);
    tracing::info!(
        "  Max memory: {} MB",
        config.max_memory_bytes / (1024 * 1024)
    );
    tracing::info!("  Inbound channel: {}", config.inbound_channel);
    match &config.data_dir {
        Some(dir) => {
            tracing::info!("  Data directory: {}", dir.display());
            tracing::info!(
                "  Snapshot interval: {} seconds (keeping {})",
                config.snapshot_interval_secs,
                config.keep_snapshots
            );
        }
        None => tracing::info!("  Persistence: DISABLED"),
    }
    tracing::info!("  Version: {}", env!("CARGO_PKG_VERSION"));

    run_server(config).await
}
