//! Inbound span channels
//!
//! - [`IngestionSink`]: producer batches, filtered by the [`CycleGuard`] and
//!   converted before they reach the store
//! - HTTP endpoints in [`crate::api`] (always on)
//! - Kafka consumer (optional, enable with `kafka` feature)

pub mod cycle;
pub mod sink;

#[cfg(feature = "kafka")]
pub mod kafka;

pub use cycle::{CycleGuard, DEFAULT_INBOUND_CHANNEL};
pub use sink::{IngestReport, IngestionSink};

#[cfg(feature = "kafka")]
pub use kafka::{KafkaConfig, KafkaConsumer};
