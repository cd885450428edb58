//! Row layouts of the three span tables.
//!
//! Column names and order are part of the storage contract: downstream query
//! tooling addresses them literally.

use serde::{Deserialize, Serialize};

pub const ANNOTATIONS_TABLE: &str = "annotations";
pub const SPANS_TABLE: &str = "spans";
pub const BINARY_ANNOTATIONS_TABLE: &str = "binary_annotations";

pub const ANNOTATIONS_COLUMNS: &[&str] = &[
    "trace_id",
    "span_id",
    "span_name",
    "service_name",
    "value",
    "ipv4",
    "port",
    "timestamp",
];

pub const SPANS_COLUMNS: &[&str] = &[
    "trace_id",
    "span_id",
    "span_name",
    "parent_id",
    "created_timestamp",
];

pub const BINARY_ANNOTATIONS_COLUMNS: &[&str] = &[
    "trace_id",
    "span_id",
    "span_name",
    "service_name",
    "key",
    "value",
    "type",
    "ipv4",
    "port",
    "timestamp",
];

/// Every table with its ordered column list
pub const TABLES: &[(&str, &[&str])] = &[
    (ANNOTATIONS_TABLE, ANNOTATIONS_COLUMNS),
    (SPANS_TABLE, SPANS_COLUMNS),
    (BINARY_ANNOTATIONS_TABLE, BINARY_ANNOTATIONS_COLUMNS),
];

/// One row of `annotations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationRow {
    pub trace_id: i64,
    pub span_id: i64,
    pub span_name: Option<String>,
    pub service_name: String,
    pub value: String,
    pub ipv4: u32,
    pub port: u16,
    pub timestamp: i64,
}

/// One row of `spans`: the per-span summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpanRow {
    pub trace_id: i64,
    pub span_id: i64,
    pub span_name: Option<String>,
    pub parent_id: Option<i64>,
    pub created_timestamp: i64,
}

/// One row of `binary_annotations`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BinaryAnnotationRow {
    pub trace_id: i64,
    pub span_id: i64,
    pub span_name: Option<String>,
    pub service_name: String,
    pub key: String,
    pub value: Vec<u8>,
    #[serde(rename = "type")]
    pub annotation_type: i32,
    pub ipv4: u32,
    pub port: u16,
    pub timestamp: i64,
}

/// Rough in-memory footprint of a row, used for the store's memory budget
pub trait RowSize {
    fn estimated_size(&self) -> usize;
}

const FIXED_OVERHEAD: usize = 48;

impl RowSize for AnnotationRow {
    fn estimated_size(&self) -> usize {
        FIXED_OVERHEAD
            + self.span_name.as_ref().map_or(0, String::len)
            + self.service_name.len()
            + self.value.len()
    }
}

impl RowSize for SpanRow {
    fn estimated_size(&self) -> usize {
        FIXED_OVERHEAD + self.span_name.as_ref().map_or(0, String::len)
    }
}

impl RowSize for BinaryAnnotationRow {
    fn estimated_size(&self) -> usize {
        FIXED_OVERHEAD
            + self.span_name.as_ref().map_or(0, String::len)
            + self.service_name.len()
            + self.key.len()
            + self.value.len()
    }
}
