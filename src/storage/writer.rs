//! Span Store Writer: canonical span -> rows in the three span tables

use serde::Serialize;
use std::sync::Arc;

use super::engine::{StorageError, TraceStore};
use super::rows::{AnnotationRow, BinaryAnnotationRow, SpanRow};
use crate::model::Span;

/// The trace store's batch entry point, as seen by the ingestion sink
pub trait SpanStore: Send + Sync {
    fn accept(&self, spans: Vec<Span>) -> Result<(), StorageError>;
}

impl<S: SpanStore + ?Sized> SpanStore for Arc<S> {
    fn accept(&self, spans: Vec<Span>) -> Result<(), StorageError> {
        (**self).accept(spans)
    }
}

/// Wall-clock source for the created timestamp of spans without annotations
pub trait Clock: Send + Sync {
    /// Microseconds since epoch
    fn now_micros(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_micros(&self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}

/// What a single [`SpanWriter::write`] stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WriteOutcome {
    pub span_id: i64,
    pub created_timestamp: i64,
    pub annotations: usize,
    pub binary_annotations: usize,
    /// `false` when a summary row for the span id already existed
    pub summary_inserted: bool,
}

/// Writes canonical spans into a [`TraceStore`], one unit of work per span.
///
/// The summary row is guarded by an existence check that is not atomic with
/// the insert; concurrent writers of the same span id may both insert one.
#[derive(Clone)]
pub struct SpanWriter {
    store: Arc<TraceStore>,
    clock: Arc<dyn Clock>,
}

impl SpanWriter {
    pub fn new(store: Arc<TraceStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<TraceStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub fn store(&self) -> &Arc<TraceStore> {
        &self.store
    }

    /// Store one span: every annotation, the summary row if absent, every
    /// binary annotation. Either all of it becomes visible or none of it.
    pub fn write(&self, span: &Span) -> Result<WriteOutcome, StorageError> {
        let created_timestamp = span
            .min_annotation_timestamp()
            .unwrap_or_else(|| self.clock.now_micros());

        let result = self.store.transaction(|uow| {
            for annotation in &span.annotations {
                uow.insert_annotation(AnnotationRow {
                    trace_id: span.trace_id,
                    span_id: span.id,
                    span_name: span.name.clone(),
                    service_name: annotation.endpoint.service_name.clone(),
                    value: annotation.value.clone(),
                    ipv4: annotation.endpoint.ipv4,
                    port: annotation.endpoint.port,
                    timestamp: annotation.timestamp,
                });
            }

            let summary_inserted = !uow.span_exists(span.id);
            if summary_inserted {
                uow.insert_span(SpanRow {
                    trace_id: span.trace_id,
                    span_id: span.id,
                    span_name: span.name.clone(),
                    // Legacy producers send 0 for "no parent", so 0 is never a real parent here.
                    parent_id: span.parent_id.filter(|&parent| parent != 0),
                    created_timestamp,
                });
            }

            for binary in &span.binary_annotations {
                uow.insert_binary_annotation(BinaryAnnotationRow {
                    trace_id: span.trace_id,
                    span_id: span.id,
                    span_name: span.name.clone(),
                    service_name: binary.endpoint.service_name.clone(),
                    key: binary.key.clone(),
                    value: binary.value.clone(),
                    annotation_type: binary.annotation_type.value(),
                    ipv4: binary.endpoint.ipv4,
                    port: binary.endpoint.port,
                    timestamp: created_timestamp,
                });
            }

            Ok(summary_inserted)
        });

        match result {
            Ok(summary_inserted) => {
                tracing::debug!(
                    trace_id = span.trace_id,
                    span_id = span.id,
                    summary_inserted,
                    "Stored span"
                );
                Ok(WriteOutcome {
                    span_id: span.id,
                    created_timestamp,
                    annotations: span.annotations.len(),
                    binary_annotations: span.binary_annotations.len(),
                    summary_inserted,
                })
            }
            Err(e) => {
                tracing::error!(
                    trace_id = span.trace_id,
                    span_id = span.id,
                    error = %e,
                    "Failed to store span"
                );
                Err(e)
            }
        }
    }
}

impl SpanStore for SpanWriter {
    /// Each span is its own unit of work; the first failure stops the batch
    /// and earlier spans stay committed.
    fn accept(&self, spans: Vec<Span>) -> Result<(), StorageError> {
        for span in &spans {
            self.write(span)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Annotation, AnnotationType, BinaryAnnotation, Endpoint};
    use tokio_test::{assert_err, assert_ok};

    struct FixedClock(i64);

    impl Clock for FixedClock {
        fn now_micros(&self) -> i64 {
            self.0
        }
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("svc", 0x7F00_0001, 8080)
    }

    fn sample_span() -> Span {
        let mut span = Span::new(11, 22);
        span.name = Some("get".to_string());
        span.parent_id = Some(33);
        for (value, timestamp) in [("sr", 5_000), ("cs", 2_000), ("ss", 9_000)] {
            span.annotations.push(Annotation {
                value: value.to_string(),
                timestamp,
                endpoint: endpoint(),
            });
        }
        span.binary_annotations
            .push(BinaryAnnotation::string("http.path", "/", endpoint()));
        span
    }

    fn writer(store: &Arc<TraceStore>) -> SpanWriter {
        SpanWriter::with_clock(Arc::clone(store), Arc::new(FixedClock(42)))
    }

    #[test]
    fn test_write_populates_three_tables() {
        let store = Arc::new(TraceStore::new());
        let outcome = assert_ok!(writer(&store).write(&sample_span()));

        assert!(outcome.summary_inserted);
        assert_eq!(outcome.created_timestamp, 2_000);

        let annotations = store.annotations();
        assert_eq!(annotations.len(), 3);
        assert_eq!(annotations[0].value, "sr");
        assert_eq!(annotations[0].service_name, "svc");
        assert_eq!(annotations[0].timestamp, 5_000);

        assert_eq!(
            store.spans(),
            vec![SpanRow {
                trace_id: 11,
                span_id: 22,
                span_name: Some("get".to_string()),
                parent_id: Some(33),
                created_timestamp: 2_000,
            }]
        );

        let binary = store.binary_annotations();
        assert_eq!(binary.len(), 1);
        assert_eq!(binary[0].key, "http.path");
        assert_eq!(binary[0].value, b"/".to_vec());
        assert_eq!(binary[0].annotation_type, AnnotationType::String.value());
        assert_eq!(binary[0].timestamp, 2_000);
    }

    #[test]
    fn test_rewrite_keeps_single_summary_row() {
        let store = Arc::new(TraceStore::new());
        let writer = writer(&store);

        assert!(assert_ok!(writer.write(&sample_span())).summary_inserted);
        assert!(!assert_ok!(writer.write(&sample_span())).summary_inserted);

        assert_eq!(store.spans().len(), 1);
        assert_eq!(store.annotations().len(), 6);
        assert_eq!(store.binary_annotations().len(), 2);
    }

    #[test]
    fn test_no_annotations_uses_clock_fallback() {
        let store = Arc::new(TraceStore::new());
        let mut span = Span::new(1, 2);
        span.binary_annotations
            .push(BinaryAnnotation::string("k", "v", endpoint()));

        let outcome = assert_ok!(writer(&store).write(&span));

        assert_eq!(outcome.created_timestamp, 42);
        assert_eq!(store.spans()[0].created_timestamp, 42);
        assert_eq!(store.binary_annotations()[0].timestamp, 42);
    }

    #[test]
    fn test_root_span_has_null_parent() {
        let store = Arc::new(TraceStore::new());
        let mut span = sample_span();
        span.parent_id = None;

        assert_ok!(writer(&store).write(&span));
        assert_eq!(store.spans()[0].parent_id, None);
    }

    #[test]
    fn test_zero_parent_id_is_indistinguishable_from_root() {
        let store = Arc::new(TraceStore::new());
        let mut span = sample_span();
        span.parent_id = Some(0);

        assert_ok!(writer(&store).write(&span));
        assert_eq!(store.spans()[0].parent_id, None);
    }

    #[test]
    fn test_failed_write_leaves_no_rows() {
        let store = Arc::new(TraceStore::with_memory_limit(64));

        assert_err!(writer(&store).write(&sample_span()));

        assert!(store.annotations().is_empty());
        assert!(store.spans().is_empty());
        assert!(store.binary_annotations().is_empty());
    }

    #[test]
    fn test_accept_writes_every_span() {
        let store = Arc::new(TraceStore::new());
        let mut other = sample_span();
        other.id = 99;

        assert_ok!(writer(&store).accept(vec![sample_span(), other]));

        assert_eq!(store.spans().len(), 2);
        assert!(store.span_exists(22));
        assert!(store.span_exists(99));
    }

    #[test]
    fn test_system_clock_is_in_microseconds() {
        let now_ms = chrono::Utc::now().timestamp_millis();
        let micros = SystemClock.now_micros();
        assert!(micros / 1000 >= now_ms);
    }
}
