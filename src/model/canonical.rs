//! Canonical (Zipkin) span model stored by the collector

use serde::{Deserialize, Serialize};

/// Where an annotation or tag originated. Copied onto every row, never referenced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    pub service_name: String,
    pub ipv4: u32,
    pub port: u16,
}

impl Endpoint {
    pub fn new(service_name: impl Into<String>, ipv4: u32, port: u16) -> Self {
        Self {
            service_name: service_name.into(),
            ipv4,
            port,
        }
    }
}

/// A timestamped event on a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Annotation {
    pub value: String,
    /// Microseconds since epoch
    pub timestamp: i64,
    pub endpoint: Endpoint,
}

/// How the bytes of a binary annotation are interpreted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AnnotationType {
    Bool,
    Bytes,
    I16,
    I32,
    I64,
    Double,
    String,
}

impl AnnotationType {
    /// Numeric tag written to the `type` column
    pub fn value(&self) -> i32 {
        match self {
            AnnotationType::Bool => 0,
            AnnotationType::Bytes => 1,
            AnnotationType::I16 => 2,
            AnnotationType::I32 => 3,
            AnnotationType::I64 => 4,
            AnnotationType::Double => 5,
            AnnotationType::String => 6,
        }
    }

    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(AnnotationType::Bool),
            1 => Some(AnnotationType::Bytes),
            2 => Some(AnnotationType::I16),
            3 => Some(AnnotationType::I32),
            4 => Some(AnnotationType::I64),
            5 => Some(AnnotationType::Double),
            6 => Some(AnnotationType::String),
            _ => None,
        }
    }
}

/// A typed key/value tag on a span
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryAnnotation {
    pub key: String,
    pub value: Vec<u8>,
    pub annotation_type: AnnotationType,
    pub endpoint: Endpoint,
}

impl BinaryAnnotation {
    pub fn string(key: impl Into<String>, value: &str, endpoint: Endpoint) -> Self {
        Self {
            key: key.into(),
            value: value.as_bytes().to_vec(),
            annotation_type: AnnotationType::String,
            endpoint,
        }
    }
}

/// A span in store shape: 64-bit identifiers and at most one parent
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub trace_id: i64,
    pub id: i64,
    pub name: Option<String>,
    /// `None` for a root span
    pub parent_id: Option<i64>,
    pub annotations: Vec<Annotation>,
    pub binary_annotations: Vec<BinaryAnnotation>,
}

impl Span {
    pub fn new(trace_id: i64, id: i64) -> Self {
        Self {
            trace_id,
            id,
            name: None,
            parent_id: None,
            annotations: Vec::new(),
            binary_annotations: Vec::new(),
        }
    }

    /// Earliest annotation timestamp, if the span has any annotations
    pub fn min_annotation_timestamp(&self) -> Option<i64> {
        self.annotations.iter().map(|a| a.timestamp).min()
    }
}

/// Wire shape of the legacy single-span path.
///
/// The legacy format has no way to say "no parent": it sends `parent_id = 0`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySpan {
    pub trace_id: i64,
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_id: i64,
    #[serde(default)]
    pub annotations: Vec<Annotation>,
    #[serde(default)]
    pub binary_annotations: Vec<BinaryAnnotation>,
}

impl From<LegacySpan> for Span {
    fn from(legacy: LegacySpan) -> Self {
        Self {
            trace_id: legacy.trace_id,
            id: legacy.id,
            name: legacy.name,
            parent_id: (legacy.parent_id != 0).then_some(legacy.parent_id),
            annotations: legacy.annotations,
            binary_annotations: legacy.binary_annotations,
        }
    }
}
