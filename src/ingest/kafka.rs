//! Kafka consumer for durable span ingest
//!
//! Consumes two topics and commits an offset only after the message has been
//! stored. When the store refuses a message its partition is rewound to that
//! offset and retried after a backoff, so no later offset is committed past
//! it. Messages that cannot be decoded are committed and skipped.
//!
//! ## Message Format
//!
//! Producer batches (spans topic), handled by the ingestion sink:
//! ```json
//! {
//!     "host": {"serviceName": "svc", "address": "10.0.0.1", "port": 8080},
//!     "spans": [{"traceId": "t1", "spanId": "s1", "parents": [], "name": "GET /"}]
//! }
//! ```
//!
//! Legacy canonical spans (legacy topic), handled by the span writer:
//! ```json
//! {"trace_id": 1, "id": 2, "parent_id": 0, "name": "get", "annotations": [], "binary_annotations": []}
//! ```
//!
//! ## Configuration
//!
//! Environment variables:
//! - `KAFKA_BROKERS`: Comma-separated list of brokers (default: localhost:9092)
//! - `KAFKA_SPANS_TOPIC`: Topic carrying producer batches (enables the consumer)
//! - `KAFKA_LEGACY_TOPIC`: Topic carrying legacy canonical spans (optional)
//! - `KAFKA_GROUP_ID`: Consumer group ID (default: tracewell)
//! - `KAFKA_AUTO_OFFSET_RESET`: Where to start if no offset (earliest/latest, default: earliest)

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::topic_partition_list::Offset;
use tokio::sync::mpsc;

use super::sink::IngestionSink;
use crate::model::{LegacySpan, Span, Spans};
use crate::storage::SpanWriter;

/// Kafka consumer configuration
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Kafka broker addresses
    pub brokers: String,
    /// Topic with producer batches
    pub spans_topic: String,
    /// Topic with legacy canonical spans
    pub legacy_topic: Option<String>,
    /// Consumer group ID
    pub group_id: String,
    /// Auto offset reset (earliest or latest)
    pub auto_offset_reset: String,
    /// Session timeout in ms
    pub session_timeout_ms: u32,
    /// Max poll interval in ms
    pub max_poll_interval_ms: u32,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: "localhost:9092".to_string(),
            spans_topic: "sleuth".to_string(),
            legacy_topic: None,
            group_id: "tracewell".to_string(),
            auto_offset_reset: "earliest".to_string(),
            session_timeout_ms: 30000,
            max_poll_interval_ms: 300000,
        }
    }
}

impl KafkaConfig {
    /// Create config from environment variables. `None` unless a spans topic is set.
    pub fn from_env() -> Option<Self> {
        let spans_topic = std::env::var("KAFKA_SPANS_TOPIC").ok()?;
        if spans_topic.trim().is_empty() {
            return None;
        }

        let defaults = Self::default();
        Some(Self {
            brokers: std::env::var("KAFKA_BROKERS").unwrap_or(defaults.brokers),
            spans_topic: spans_topic.trim().to_string(),
            legacy_topic: std::env::var("KAFKA_LEGACY_TOPIC")
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            group_id: std::env::var("KAFKA_GROUP_ID").unwrap_or(defaults.group_id),
            auto_offset_reset: std::env::var("KAFKA_AUTO_OFFSET_RESET")
                .unwrap_or(defaults.auto_offset_reset),
            ..defaults
        })
    }

    fn topics(&self) -> Vec<&str> {
        let mut topics = vec![self.spans_topic.as_str()];
        if let Some(legacy) = &self.legacy_topic {
            topics.push(legacy.as_str());
        }
        topics
    }
}

/// Statistics from Kafka consumer
#[derive(Debug, Default, Clone)]
pub struct KafkaStats {
    pub messages_received: u64,
    pub messages_processed: u64,
    pub spans_stored: u64,
    pub errors: u64,
    /// Store failures rewound for redelivery
    pub redeliveries: u64,
    pub last_offset: HashMap<String, i64>,
}

const RECEIVE_BACKOFF: Duration = Duration::from_millis(100);
const STORE_RETRY_BACKOFF: Duration = Duration::from_secs(1);
const SEEK_TIMEOUT: Duration = Duration::from_secs(5);

/// What to do with a message's offset after processing it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Stored, or malformed and never storable: move past it
    Commit,
    /// The store refused it: redeliver it before anything later
    Retry,
}

fn disposition(result: &Result<usize, ProcessError>) -> Disposition {
    match result {
        Ok(_) | Err(ProcessError::Parse(_)) | Err(ProcessError::UnknownTopic(_)) => {
            Disposition::Commit
        }
        Err(ProcessError::Store(_)) => Disposition::Retry,
    }
}

/// Where a message goes once decoded
enum Route {
    Batch,
    Legacy,
}

/// Kafka consumer feeding the ingestion sink and the span writer
pub struct KafkaConsumer {
    config: KafkaConfig,
    sink: Arc<IngestionSink<SpanWriter>>,
    writer: SpanWriter,
    consumer: StreamConsumer,
    stats: Arc<parking_lot::RwLock<KafkaStats>>,
}

impl KafkaConsumer {
    pub fn new(
        config: KafkaConfig,
        sink: Arc<IngestionSink<SpanWriter>>,
        writer: SpanWriter,
    ) -> Result<Self, KafkaError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &config.brokers)
            .set("group.id", &config.group_id)
            .set("auto.offset.reset", &config.auto_offset_reset)
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", config.session_timeout_ms.to_string())
            .set("max.poll.interval.ms", config.max_poll_interval_ms.to_string())
            .set("fetch.min.bytes", "1024")
            .set("fetch.max.wait.ms", "100")
            .create()?;

        Ok(Self {
            config,
            sink,
            writer,
            consumer,
            stats: Arc::new(parking_lot::RwLock::new(KafkaStats::default())),
        })
    }

    /// Subscribe to configured topics
    pub fn subscribe(&self) -> Result<(), KafkaError> {
        let topics = self.config.topics();
        self.consumer.subscribe(&topics)?;
        tracing::info!("Subscribed to Kafka topics: {:?}", topics);
        Ok(())
    }

    pub fn stats(&self) -> KafkaStats {
        self.stats.read().clone()
    }

    /// Start consuming in background. Sending on (or dropping) the returned
    /// sender stops the loop.
    pub fn start(self) -> (mpsc::Sender<()>, tokio::task::JoinHandle<()>) {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

        let handle = tokio::spawn(async move {
            tracing::info!("Kafka consumer started");

            loop {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Kafka consumer shutting down");
                        break;
                    }
                    result = self.consumer.recv() => {
                        let backoff = match result {
                            Ok(message) => self.handle_message(&message),
                            Err(e) => {
                                tracing::error!(error = %e, "Kafka receive error");
                                Some(RECEIVE_BACKOFF)
                            }
                        };
                        if let Some(delay) = backoff {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        });

        (shutdown_tx, handle)
    }

    /// Process one message and commit or rewind its partition. Returns how
    /// long to wait before polling again.
    fn handle_message(&self, message: &BorrowedMessage<'_>) -> Option<Duration> {
        let topic = message.topic();
        let partition = message.partition();
        let offset = message.offset();

        self.stats.write().messages_received += 1;

        let result = match message.payload() {
            Some(payload) => self.process_message(topic, payload),
            None => Ok(0),
        };

        match disposition(&result) {
            Disposition::Commit => {
                if let Err(e) = self.consumer.commit_message(message, CommitMode::Async) {
                    tracing::error!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        error = %e,
                        "Failed to commit offset"
                    );
                }

                let mut s = self.stats.write();
                match &result {
                    Ok(stored) => {
                        s.messages_processed += 1;
                        s.spans_stored += *stored as u64;
                    }
                    Err(e) => {
                        tracing::warn!(
                            topic = %topic,
                            partition = partition,
                            offset = offset,
                            error = %e,
                            "Skipping message that can never be stored"
                        );
                        s.errors += 1;
                    }
                }
                s.last_offset.insert(format!("{}:{}", topic, partition), offset);
                None
            }
            Disposition::Retry => {
                if let Err(e) = &result {
                    tracing::error!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        error = %e,
                        "Failed to store message, rewinding partition"
                    );
                }
                {
                    let mut s = self.stats.write();
                    s.errors += 1;
                    s.redeliveries += 1;
                }

                // Nothing after this offset may be committed until it is stored
                let rewind = self
                    .consumer
                    .seek(topic, partition, Offset::Offset(offset), SEEK_TIMEOUT);
                if let Err(e) = rewind {
                    tracing::error!(
                        topic = %topic,
                        partition = partition,
                        offset = offset,
                        error = %e,
                        "Failed to rewind partition"
                    );
                }
                Some(STORE_RETRY_BACKOFF)
            }
        }
    }

    fn route(&self, topic: &str) -> Option<Route> {
        if topic == self.config.spans_topic {
            Some(Route::Batch)
        } else if self.config.legacy_topic.as_deref() == Some(topic) {
            Some(Route::Legacy)
        } else {
            None
        }
    }

    /// Process a single message, returning the number of spans stored
    fn process_message(&self, topic: &str, payload: &[u8]) -> Result<usize, ProcessError> {
        match self.route(topic) {
            Some(Route::Batch) => process_batch(&self.sink, payload),
            Some(Route::Legacy) => process_legacy(&self.writer, payload),
            None => Err(ProcessError::UnknownTopic(topic.to_string())),
        }
    }
}

fn process_batch(sink: &IngestionSink<SpanWriter>, payload: &[u8]) -> Result<usize, ProcessError> {
    let batch: Spans =
        serde_json::from_slice(payload).map_err(|e| ProcessError::Parse(e.to_string()))?;
    let report = sink
        .sink(batch)
        .map_err(|e| ProcessError::Store(e.to_string()))?;
    Ok(report.accepted)
}

fn process_legacy(writer: &SpanWriter, payload: &[u8]) -> Result<usize, ProcessError> {
    let legacy: LegacySpan =
        serde_json::from_slice(payload).map_err(|e| ProcessError::Parse(e.to_string()))?;
    let span = Span::from(legacy);
    writer
        .write(&span)
        .map_err(|e| ProcessError::Store(e.to_string()))?;
    Ok(1)
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Message from unexpected topic '{0}'")]
    UnknownTopic(String),
}
