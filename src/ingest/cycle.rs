//! Drops spans that describe the collector's own message handling

use crate::model::ProducerSpan;

/// Inbound channel name used by producers that follow Sleuth's conventions
pub const DEFAULT_INBOUND_CHANNEL: &str = "sleuth";

/// Filters spans named `message/<inbound channel>`.
///
/// Receiving a batch is itself traced, and that span would come back through
/// the same channel on the next export. Storing it would feed the collector
/// its own traffic forever.
#[derive(Debug, Clone)]
pub struct CycleGuard {
    pattern: String,
}

impl CycleGuard {
    pub fn new(inbound_channel: &str) -> Self {
        Self {
            pattern: format!("message/{}", inbound_channel),
        }
    }

    /// Span name that marks a cycle
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn is_cycle(&self, span: &ProducerSpan) -> bool {
        span.name == self.pattern
    }

    /// Keep the spans that are not cycles, logging the ones dropped
    pub fn filter(&self, spans: Vec<ProducerSpan>) -> Vec<ProducerSpan> {
        spans
            .into_iter()
            .filter(|span| {
                let cycle = self.is_cycle(span);
                if cycle {
                    tracing::warn!(
                        trace_id = ?span.trace_id,
                        span_id = ?span.span_id,
                        name = %span.name,
                        "Message tracing cycle detected, dropping span"
                    );
                }
                !cycle
            })
            .collect()
    }
}

impl Default for CycleGuard {
    fn default() -> Self {
        Self::new(DEFAULT_INBOUND_CHANNEL)
    }
}
