//! Producer-side (Sleuth) span model, as delivered by instrumented services

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use std::net::Ipv4Addr;

/// The service instance that emitted a batch of spans
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Host {
    pub service_name: String,
    pub address: Ipv4Addr,
    pub port: u16,
}

impl Host {
    pub fn new(service_name: impl Into<String>, address: Ipv4Addr, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            address,
            port,
        }
    }

    /// IPv4 address packed big-endian into 32 bits (127.0.0.1 -> 0x7F000001)
    pub fn ipv4(&self) -> u32 {
        u32::from(self.address)
    }
}

/// A timestamped event on a producer span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineAnnotation {
    pub msg: String,
    /// Milliseconds since epoch
    pub time: i64,
}

impl TimelineAnnotation {
    pub fn new(msg: impl Into<String>, time: i64) -> Self {
        Self {
            msg: msg.into(),
            time,
        }
    }
}

/// A span as the producer describes it: string identifiers, possibly several parents
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerSpan {
    #[serde(default)]
    pub trace_id: Option<String>,
    #[serde(default)]
    pub span_id: Option<String>,
    #[serde(default, alias = "parents")]
    pub parent_ids: Vec<String>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub timeline_annotations: Vec<TimelineAnnotation>,
    /// Free-form tags in the order the producer sent them. Non-textual values
    /// are coerced or skipped on the way in.
    #[serde(default, deserialize_with = "deserialize_tags")]
    pub annotations: IndexMap<String, String>,
}

impl ProducerSpan {
    pub fn new(trace_id: impl Into<String>, span_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id.into()),
            span_id: Some(span_id.into()),
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_ids.push(parent_id.into());
        self
    }

    pub fn with_timeline_annotation(mut self, msg: impl Into<String>, time: i64) -> Self {
        self.timeline_annotations
            .push(TimelineAnnotation::new(msg, time));
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.annotations.insert(key.into(), value.into());
        self
    }
}

/// One inbound message: a batch of spans from a single host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Spans {
    pub host: Host,
    #[serde(default)]
    pub spans: Vec<ProducerSpan>,
}

impl Spans {
    pub fn new(host: Host, spans: Vec<ProducerSpan>) -> Self {
        Self { host, spans }
    }
}

/// Coerce a JSON tag map into string values.
///
/// Strings pass through, numbers and booleans take their JSON text. Anything
/// else has no textual form and is dropped with a warning.
fn deserialize_tags<'de, D>(deserializer: D) -> Result<IndexMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<IndexMap<String, serde_json::Value>> = Option::deserialize(deserializer)?;
    let mut tags = IndexMap::new();

    for (key, value) in raw.unwrap_or_default() {
        match tag_text(&value) {
            Some(text) => {
                tags.insert(key, text);
            }
            None => {
                tracing::warn!(
                    key = %key,
                    kind = json_kind(&value),
                    "Skipping tag value that has no string form"
                );
            }
        }
    }

    Ok(tags)
}

fn tag_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
