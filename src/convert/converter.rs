//! Producer span -> canonical span conversion

use super::hash::hash_id;
use crate::model::{
    Annotation, BinaryAnnotation, Endpoint, Host, ProducerSpan, Span, TimelineAnnotation,
};

/// Converts producer spans into store spans. Holds no state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpanConverter;

impl SpanConverter {
    pub fn new() -> Self {
        Self
    }

    /// Convert one producer span emitted by `host`.
    ///
    /// - ids are hashed with [`hash_id`]
    /// - only the first parent is kept; extra parents are logged and dropped
    /// - a blank name becomes `None`
    /// - timeline annotations become annotations (ms -> µs)
    /// - tags become `STRING` binary annotations
    ///
    /// Every annotation shares the endpoint built from `host`.
    pub fn convert(&self, span: &ProducerSpan, host: &Host) -> Span {
        let endpoint = Endpoint::new(host.service_name.clone(), host.ipv4(), host.port);

        let parent_id = match span.parent_ids.as_slice() {
            [] => None,
            [first, rest @ ..] => {
                if !rest.is_empty() {
                    tracing::warn!(
                        trace_id = ?span.trace_id,
                        span_id = ?span.span_id,
                        parents = span.parent_ids.len(),
                        "Canonical spans support a single parent; keeping only the first"
                    );
                }
                Some(hash_id(Some(first)))
            }
        };

        let name = has_text(&span.name).then(|| span.name.clone());

        Span {
            trace_id: hash_id(span.trace_id.as_deref()),
            id: hash_id(span.span_id.as_deref()),
            name,
            parent_id,
            annotations: span
                .timeline_annotations
                .iter()
                .map(|ta| to_annotation(ta, &endpoint))
                .collect(),
            binary_annotations: span
                .annotations
                .iter()
                .map(|(key, value)| BinaryAnnotation::string(key.clone(), value, endpoint.clone()))
                .collect(),
        }
    }
}

/// Whether `s` has a non-whitespace character. No-break spaces and NEL count
/// as text; the information separators U+001C..U+001F count as whitespace.
fn has_text(s: &str) -> bool {
    !s.chars().all(|c| match c {
        '\u{00A0}' | '\u{2007}' | '\u{202F}' | '\u{0085}' => false,
        '\u{001C}'..='\u{001F}' => true,
        _ => c.is_whitespace(),
    })
}

fn to_annotation(annotation: &TimelineAnnotation, endpoint: &Endpoint) -> Annotation {
    Annotation {
        value: annotation.msg.clone(),
        timestamp: annotation.time.wrapping_mul(1000),
        endpoint: endpoint.clone(),
    }
}
