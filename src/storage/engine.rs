use dashmap::DashMap;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use serde::{Deserialize, Serialize};

use super::memory::{MemoryBudget, MemoryStats};
use super::rows::{
    AnnotationRow, BinaryAnnotationRow, RowSize, SpanRow, ANNOTATIONS_TABLE,
    BINARY_ANNOTATIONS_TABLE, SPANS_TABLE, TABLES,
};

/// Contents of the three span tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tables {
    pub annotations: Vec<AnnotationRow>,
    pub spans: Vec<SpanRow>,
    pub binary_annotations: Vec<BinaryAnnotationRow>,
}

impl Tables {
    fn estimated_size(&self) -> usize {
        self.annotations.iter().map(RowSize::estimated_size).sum::<usize>()
            + self.spans.iter().map(RowSize::estimated_size).sum::<usize>()
            + self
                .binary_annotations
                .iter()
                .map(RowSize::estimated_size)
                .sum::<usize>()
    }

    fn is_empty(&self) -> bool {
        self.annotations.is_empty() && self.spans.is_empty() && self.binary_annotations.is_empty()
    }
}

/// In-memory relational store for span data.
///
/// Writes go through a [`UnitOfWork`] and become visible together on commit.
/// The `spans` table is indexed by span id for existence checks; the index
/// counts rows, so a duplicate summary row (see [`UnitOfWork::span_exists`])
/// stays visible in it.
pub struct TraceStore {
    tables: RwLock<Tables>,
    span_index: DashMap<i64, usize>,
    memory: MemoryBudget,
    closed: AtomicBool,
}

impl TraceStore {
    pub fn new() -> Self {
        Self::with_memory_limit(1024 * 1024 * 1024)
    }

    pub fn with_memory_limit(max_bytes: usize) -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
            span_index: DashMap::new(),
            memory: MemoryBudget::new(max_bytes),
            closed: AtomicBool::new(false),
        }
    }

    /// Start staging writes
    pub fn begin(&self) -> UnitOfWork<'_> {
        UnitOfWork {
            store: self,
            staged: Tables::default(),
        }
    }

    /// Run `f` in a unit of work, committing only if it returns `Ok`
    pub fn transaction<T, F>(&self, f: F) -> Result<T, StorageError>
    where
        F: FnOnce(&mut UnitOfWork<'_>) -> Result<T, StorageError>,
    {
        let mut uow = self.begin();
        let value = f(&mut uow)?;
        uow.commit()?;
        Ok(value)
    }

    /// Whether a committed `spans` row exists for `span_id`
    pub fn span_exists(&self, span_id: i64) -> bool {
        self.span_index.get(&span_id).is_some_and(|count| *count > 0)
    }

    /// Number of committed `spans` rows for `span_id`
    pub fn span_row_count(&self, span_id: i64) -> usize {
        self.span_index.get(&span_id).map_or(0, |count| *count)
    }

    pub fn annotations(&self) -> Vec<AnnotationRow> {
        self.tables.read().annotations.clone()
    }

    pub fn spans(&self) -> Vec<SpanRow> {
        self.tables.read().spans.clone()
    }

    pub fn binary_annotations(&self) -> Vec<BinaryAnnotationRow> {
        self.tables.read().binary_annotations.clone()
    }

    /// Consistent copy of all three tables
    pub fn dump(&self) -> Tables {
        self.tables.read().clone()
    }

    /// Load rows from a snapshot on top of whatever is already stored.
    /// Restored rows are charged to the memory budget without enforcing it.
    pub fn restore(&self, tables: Tables) {
        let bytes = tables.estimated_size();
        let mut current = self.tables.write();

        for row in &tables.spans {
            *self.span_index.entry(row.span_id).or_insert(0) += 1;
        }
        current.annotations.extend(tables.annotations);
        current.spans.extend(tables.spans);
        current.binary_annotations.extend(tables.binary_annotations);

        self.memory.charge(bytes);
    }

    pub fn table_stats(&self) -> Vec<TableStats> {
        let tables = self.tables.read();
        TABLES
            .iter()
            .map(|(name, columns)| {
                let row_count = match *name {
                    ANNOTATIONS_TABLE => tables.annotations.len(),
                    SPANS_TABLE => tables.spans.len(),
                    BINARY_ANNOTATIONS_TABLE => tables.binary_annotations.len(),
                    _ => 0,
                };
                TableStats {
                    name: name.to_string(),
                    columns: columns.iter().map(|c| c.to_string()).collect(),
                    row_count,
                }
            })
            .collect()
    }

    /// Refuse further commits. Used once the final snapshot is taken.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats::from(&self.memory)
    }

    fn apply(&self, staged: Tables) -> Result<CommitSummary, StorageError> {
        let summary = CommitSummary {
            annotations: staged.annotations.len(),
            spans: staged.spans.len(),
            binary_annotations: staged.binary_annotations.len(),
        };
        if self.is_closed() {
            return Err(StorageError::Unavailable("store is closed".to_string()));
        }
        if staged.is_empty() {
            return Ok(summary);
        }

        let bytes = staged.estimated_size();
        if !self.memory.try_reserve(bytes) {
            return Err(StorageError::MemoryLimitExceeded {
                requested: bytes,
                available: self.memory.max().saturating_sub(self.memory.current()),
            });
        }

        let mut tables = self.tables.write();
        for row in &staged.spans {
            *self.span_index.entry(row.span_id).or_insert(0) += 1;
        }
        tables.annotations.extend(staged.annotations);
        tables.spans.extend(staged.spans);
        tables.binary_annotations.extend(staged.binary_annotations);

        Ok(summary)
    }
}

impl Default for TraceStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Staged writes against a [`TraceStore`]. Dropping it without
/// [`commit`](UnitOfWork::commit) discards everything staged.
pub struct UnitOfWork<'a> {
    store: &'a TraceStore,
    staged: Tables,
}

impl UnitOfWork<'_> {
    pub fn insert_annotation(&mut self, row: AnnotationRow) {
        self.staged.annotations.push(row);
    }

    pub fn insert_span(&mut self, row: SpanRow) {
        self.staged.spans.push(row);
    }

    pub fn insert_binary_annotation(&mut self, row: BinaryAnnotationRow) {
        self.staged.binary_annotations.push(row);
    }

    /// Whether a `spans` row for `span_id` is committed or staged here.
    ///
    /// Not isolated from other units of work: two writers can both see
    /// `false` for the same id and both insert, leaving two summary rows.
    pub fn span_exists(&self, span_id: i64) -> bool {
        self.store.span_exists(span_id) || self.staged.spans.iter().any(|s| s.span_id == span_id)
    }

    /// Make every staged row visible at once, or none if the store refuses
    pub fn commit(self) -> Result<CommitSummary, StorageError> {
        self.store.apply(self.staged)
    }
}

/// Rows made visible by one commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub annotations: usize,
    pub spans: usize,
    pub binary_annotations: usize,
}

/// Table statistics
#[derive(Debug, Clone, Serialize)]
pub struct TableStats {
    pub name: String,
    pub columns: Vec<String>,
    pub row_count: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Memory limit exceeded: requested {requested} bytes, {available} available")]
    MemoryLimitExceeded { requested: usize, available: usize },

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span_row(span_id: i64) -> SpanRow {
        SpanRow {
            trace_id: 1,
            span_id,
            span_name: Some("op".to_string()),
            parent_id: None,
            created_timestamp: 1000,
        }
    }

    fn annotation_row(span_id: i64) -> AnnotationRow {
        AnnotationRow {
            trace_id: 1,
            span_id,
            span_name: Some("op".to_string()),
            service_name: "svc".to_string(),
            value: "sr".to_string(),
            ipv4: 0x7F00_0001,
            port: 8080,
            timestamp: 1000,
        }
    }

    #[test]
    fn test_commit_makes_rows_visible() {
        let store = TraceStore::new();

        let mut uow = store.begin();
        uow.insert_annotation(annotation_row(7));
        uow.insert_span(span_row(7));
        assert!(store.spans().is_empty());
        assert!(!store.span_exists(7));

        let summary = uow.commit().unwrap();
        assert_eq!(summary.annotations, 1);
        assert_eq!(summary.spans, 1);
        assert!(store.span_exists(7));
        assert_eq!(store.annotations().len(), 1);
    }

    #[test]
    fn test_dropped_unit_of_work_discards_rows() {
        let store = TraceStore::new();
        {
            let mut uow = store.begin();
            uow.insert_span(span_row(7));
            assert!(uow.span_exists(7));
        }
        assert!(store.spans().is_empty());
        assert!(!store.span_exists(7));
    }

    #[test]
    fn test_transaction_rolls_back_on_error() {
        let store = TraceStore::new();

        let result: Result<(), StorageError> = store.transaction(|uow| {
            uow.insert_annotation(annotation_row(7));
            Err(StorageError::Unavailable("boom".to_string()))
        });

        assert!(result.is_err());
        assert!(store.annotations().is_empty());
    }

    #[test]
    fn test_memory_limit_rejects_whole_unit() {
        let store = TraceStore::with_memory_limit(100);

        let mut uow = store.begin();
        uow.insert_span(span_row(1));
        for _ in 0..10 {
            uow.insert_annotation(annotation_row(1));
        }

        assert!(matches!(
            uow.commit(),
            Err(StorageError::MemoryLimitExceeded { .. })
        ));
        assert!(store.dump() == Tables::default());
        assert!(!store.span_exists(1));
        assert_eq!(store.memory_stats().current_bytes, 0);
    }

    #[test]
    fn test_concurrent_check_then_insert_can_duplicate() {
        let store = TraceStore::new();

        let mut first = store.begin();
        let mut second = store.begin();
        assert!(!first.span_exists(9));
        assert!(!second.span_exists(9));
        first.insert_span(span_row(9));
        second.insert_span(span_row(9));
        first.commit().unwrap();
        second.commit().unwrap();

        assert_eq!(store.span_row_count(9), 2);
        assert_eq!(store.spans().len(), 2);
    }

    #[test]
    fn test_closed_store_refuses_commits() {
        let store = TraceStore::new();
        store.close();

        let mut uow = store.begin();
        uow.insert_span(span_row(1));
        assert!(matches!(uow.commit(), Err(StorageError::Unavailable(_))));
        assert!(store.spans().is_empty());
    }

    #[test]
    fn test_restore_rebuilds_index() {
        let store = TraceStore::new();
        store.restore(Tables {
            annotations: vec![annotation_row(3)],
            spans: vec![span_row(3)],
            binary_annotations: vec![],
        });

        assert!(store.span_exists(3));
        assert!(store.memory_stats().current_bytes > 0);
    }

    #[test]
    fn test_table_stats_lists_columns() {
        let store = TraceStore::new();
        store
            .transaction(|uow| {
                uow.insert_span(span_row(1));
                Ok(())
            })
            .unwrap();

        let stats = store.table_stats();
        let spans = stats.iter().find(|t| t.name == "spans").unwrap();
        assert_eq!(spans.row_count, 1);
        assert_eq!(
            spans.columns,
            vec!["trace_id", "span_id", "span_name", "parent_id", "created_timestamp"]
        );
    }
}
