//! Ingestion Sink: producer batch -> canonical spans -> trace store

use serde::Serialize;

use super::cycle::CycleGuard;
use crate::convert::SpanConverter;
use crate::model::{Span, Spans};
use crate::storage::{SpanStore, StorageError};

/// Counts for one handled batch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub received: usize,
    pub dropped: usize,
    pub accepted: usize,
}

/// Entry point for producer batches. Safe to share across workers: it owns no
/// mutable state, the store does all coordination.
pub struct IngestionSink<S> {
    store: S,
    guard: CycleGuard,
    converter: SpanConverter,
}

impl<S: SpanStore> IngestionSink<S> {
    pub fn new(store: S, inbound_channel: &str) -> Self {
        Self {
            store,
            guard: CycleGuard::new(inbound_channel),
            converter: SpanConverter::new(),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Filter cycles, convert, and hand the batch to the store in one call.
    /// Nothing is sent to the store when no span survives.
    pub fn sink(&self, batch: Spans) -> Result<IngestReport, StorageError> {
        let received = batch.spans.len();
        let host = batch.host;

        let spans: Vec<Span> = self
            .guard
            .filter(batch.spans)
            .iter()
            .map(|span| self.converter.convert(span, &host))
            .collect();

        let report = IngestReport {
            received,
            dropped: received - spans.len(),
            accepted: spans.len(),
        };

        if !spans.is_empty() {
            if let Err(e) = self.store.accept(spans) {
                tracing::error!(
                    service = %host.service_name,
                    spans = report.accepted,
                    error = %e,
                    "Trace store rejected batch"
                );
                return Err(e);
            }
        }

        tracing::debug!(
            service = %host.service_name,
            received = report.received,
            dropped = report.dropped,
            accepted = report.accepted,
            "Ingested batch"
        );
        Ok(report)
    }
}
