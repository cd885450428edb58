pub mod engine;
pub mod memory;
pub mod persistence;
pub mod rows;
pub mod writer;

pub use engine::{CommitSummary, StorageError, TableStats, Tables, TraceStore, UnitOfWork};
pub use memory::{MemoryBudget, MemoryStats};
pub use persistence::{PersistenceConfig, PersistenceError, SnapshotManager, SnapshotWorker};
pub use rows::{AnnotationRow, BinaryAnnotationRow, SpanRow};
pub use writer::{Clock, SpanStore, SpanWriter, SystemClock, WriteOutcome};
