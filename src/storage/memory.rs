use std::sync::atomic::{AtomicUsize, Ordering};

/// Byte budget shared by every commit against a [`TraceStore`](super::TraceStore)
#[derive(Debug)]
pub struct MemoryBudget {
    current_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    max_bytes: usize,
}

impl MemoryBudget {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            current_bytes: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            max_bytes,
        }
    }

    /// Reserve `bytes` if the budget allows it. All or nothing.
    pub fn try_reserve(&self, bytes: usize) -> bool {
        let reserved = self
            .current_bytes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                current
                    .checked_add(bytes)
                    .filter(|next| *next <= self.max_bytes)
            });

        match reserved {
            Ok(previous) => {
                self.peak_bytes.fetch_max(previous + bytes, Ordering::SeqCst);
                true
            }
            Err(_) => false,
        }
    }

    /// Account for bytes that are already resident (snapshot restore)
    pub fn charge(&self, bytes: usize) {
        let now = self.current_bytes.fetch_add(bytes, Ordering::SeqCst) + bytes;
        self.peak_bytes.fetch_max(now, Ordering::SeqCst);
    }

    pub fn current(&self) -> usize {
        self.current_bytes.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.peak_bytes.load(Ordering::SeqCst)
    }

    pub fn max(&self) -> usize {
        self.max_bytes
    }

    /// Usage as a fraction of the budget (may exceed 1.0 after a restore)
    pub fn usage_ratio(&self) -> f64 {
        if self.max_bytes == 0 {
            return 0.0;
        }
        self.current() as f64 / self.max_bytes as f64
    }
}

impl Default for MemoryBudget {
    fn default() -> Self {
        Self::new(1024 * 1024 * 1024)
    }
}

/// Memory statistics
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryStats {
    pub current_bytes: usize,
    pub peak_bytes: usize,
    pub max_bytes: usize,
    pub usage_ratio: f64,
}

impl From<&MemoryBudget> for MemoryStats {
    fn from(budget: &MemoryBudget) -> Self {
        Self {
            current_bytes: budget.current(),
            peak_bytes: budget.peak(),
            max_bytes: budget.max(),
            usage_ratio: budget.usage_ratio(),
        }
    }
}
