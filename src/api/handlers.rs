use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::ingest::{IngestReport, IngestionSink};
use crate::model::{LegacySpan, Span, Spans};
use crate::storage::{
    MemoryStats, SnapshotManager, SpanWriter, StorageError, TableStats, TraceStore, WriteOutcome,
};

/// Application state shared across handlers
pub struct AppState {
    pub store: Arc<TraceStore>,
    pub sink: Arc<IngestionSink<SpanWriter>>,
    pub writer: SpanWriter,
    pub snapshots: Option<Arc<SnapshotManager>>,
}

impl AppState {
    /// Wire the sink and the writer to one store
    pub fn new(store: Arc<TraceStore>, inbound_channel: &str) -> Self {
        let writer = SpanWriter::new(Arc::clone(&store));
        Self {
            sink: Arc::new(IngestionSink::new(writer.clone(), inbound_channel)),
            writer,
            store,
            snapshots: None,
        }
    }

    pub fn with_snapshots(mut self, snapshots: Arc<SnapshotManager>) -> Self {
        self.snapshots = Some(snapshots);
        self
    }
}

// ============================================================================
// Health Check
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<HealthResponse>) {
    let (status, label) = if state.store.is_closed() {
        (StatusCode::SERVICE_UNAVAILABLE, "closed")
    } else {
        (StatusCode::OK, "healthy")
    };

    (
        status,
        Json(HealthResponse {
            status: label,
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

// ============================================================================
// Ingest
// ============================================================================

/// Producer batch from one host
pub async fn ingest_spans(
    State(state): State<Arc<AppState>>,
    Json(batch): Json<Spans>,
) -> Result<Json<IngestReport>, ApiError> {
    let sink = Arc::clone(&state.sink);
    let report = tokio::task::spawn_blocking(move || sink.sink(batch))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(report))
}

/// Single span in the legacy canonical format
pub async fn ingest_legacy_span(
    State(state): State<Arc<AppState>>,
    Json(legacy): Json<LegacySpan>,
) -> Result<Json<WriteOutcome>, ApiError> {
    let span = Span::from(legacy);
    let writer = state.writer.clone();
    let outcome = tokio::task::spawn_blocking(move || writer.write(&span))
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(outcome))
}

// ============================================================================
// Stats
// ============================================================================

#[derive(Serialize)]
pub struct StatsResponse {
    pub tables: Vec<TableStats>,
    pub memory: MemoryStats,
    pub latest_snapshot: Option<String>,
}

pub async fn stats(State(state): State<Arc<AppState>>) -> Json<StatsResponse> {
    Json(StatsResponse {
        tables: state.store.table_stats(),
        memory: state.store.memory_stats(),
        latest_snapshot: state
            .snapshots
            .as_ref()
            .and_then(|s| s.latest_snapshot())
            .map(|m| m.id),
    })
}

// ============================================================================
// Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    Unavailable(String),
    Internal(String),
}

impl From<StorageError> for ApiError {
    fn from(e: StorageError) -> Self {
        ApiError::Unavailable(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, message) = match self {
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = serde_json::json!({
            "error": message
        });

        (status, Json(body)).into_response()
    }
}
