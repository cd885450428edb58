//! Tracewell: span collector for a Zipkin-style trace store
//!
//! Instrumented services export spans in the producer (Sleuth) shape: string
//! identifiers, any number of parents, millisecond timeline events and a free
//! tag map. Tracewell converts them into canonical (Zipkin) spans and writes
//! them into three append-oriented tables.
//!
//! # Pipeline
//!
//! - **Identifier hashing**: [`convert::hash_id`] maps string ids onto `i64`
//! - **Conversion**: [`convert::SpanConverter`] reshapes one producer span
//! - **Cycle guard**: [`ingest::CycleGuard`] drops spans describing the
//!   collector's own message handling
//! - **Ingestion sink**: [`ingest::IngestionSink`] runs a whole batch into the store
//! - **Span writer**: [`storage::SpanWriter`] stores one canonical span as
//!   `annotations`, `spans` and `binary_annotations` rows
//!
//! # Example
//!
//! ```
//! use std::net::Ipv4Addr;
//! use std::sync::Arc;
//! use tracewell::ingest::IngestionSink;
//! use tracewell::model::{Host, ProducerSpan, Spans};
//! use tracewell::storage::{SpanWriter, TraceStore};
//!
//! let store = Arc::new(TraceStore::new());
//! let sink = IngestionSink::new(SpanWriter::new(Arc::clone(&store)), "sleuth");
//!
//! let host = Host::new("checkout", Ipv4Addr::new(10, 0, 0, 7), 8080);
//! let span = ProducerSpan::new("trace-1", "span-1", "GET /cart")
//!     .with_timeline_annotation("sr", 1_700_000_000_000)
//!     .with_tag("http.path", "/cart");
//!
//! let report = sink.sink(Spans::new(host, vec![span])).unwrap();
//! assert_eq!(report.accepted, 1);
//! assert_eq!(store.spans().len(), 1);
//! ```

pub mod api;
pub mod convert;
pub mod ingest;
pub mod model;
pub mod storage;

#[cfg(test)]
mod testing;

// Re-export commonly used types
pub use convert::{hash_id, SpanConverter};
pub use ingest::{CycleGuard, IngestReport, IngestionSink};
pub use model::{Host, ProducerSpan, Span, Spans};
pub use storage::{SpanStore, SpanWriter, StorageError, TraceStore};
