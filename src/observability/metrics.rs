//! Freshening metrics
//!
//! Monotonic counters only, reset on process start. Relaxed ordering:
//! metrics are passive and never influence behavior.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counter registry for freshening outcomes.
#[derive(Debug, Default)]
pub struct FreshMetrics {
    /// Columns whose stored value passed the freshness check.
    columns_fresh: AtomicU64,
    /// Columns recomputed within the request deadline.
    columns_recomputed: AtomicU64,
    /// Columns that fell back to the stored value on deadline expiry.
    stale_fallbacks: AtomicU64,
    /// Producer task failures.
    producer_errors: AtomicU64,
    /// Plugin load or setup failures.
    load_errors: AtomicU64,
    /// Requests that joined an already in-flight task.
    dedup_joins: AtomicU64,
    /// Stale columns dropped because the in-flight cap was reached.
    tasks_dropped: AtomicU64,
    /// Recomputed values written back to the row store.
    write_backs: AtomicU64,
}

impl FreshMetrics {
    /// Create a registry with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Increment the fresh-column counter.
    pub fn increment_fresh(&self) {
        self.columns_fresh.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the recomputed-column counter.
    pub fn increment_recomputed(&self) {
        self.columns_recomputed.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the stale-fallback counter.
    pub fn increment_stale_fallback(&self) {
        self.stale_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the producer-error counter.
    pub fn increment_producer_error(&self) {
        self.producer_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the load-error counter.
    pub fn increment_load_error(&self) {
        self.load_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the dedup-join counter.
    pub fn increment_dedup_join(&self) {
        self.dedup_joins.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the dropped-task counter.
    pub fn increment_task_dropped(&self) {
        self.tasks_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment the write-back counter.
    pub fn increment_write_back(&self) {
        self.write_backs.fetch_add(1, Ordering::Relaxed);
    }

    /// Fresh-column count.
    pub fn fresh(&self) -> u64 {
        self.columns_fresh.load(Ordering::Relaxed)
    }

    /// Recomputed-column count.
    pub fn recomputed(&self) -> u64 {
        self.columns_recomputed.load(Ordering::Relaxed)
    }

    /// Stale-fallback count.
    pub fn stale_fallbacks(&self) -> u64 {
        self.stale_fallbacks.load(Ordering::Relaxed)
    }

    /// Producer-error count.
    pub fn producer_errors(&self) -> u64 {
        self.producer_errors.load(Ordering::Relaxed)
    }

    /// Load-error count.
    pub fn load_errors(&self) -> u64 {
        self.load_errors.load(Ordering::Relaxed)
    }

    /// Dedup-join count.
    pub fn dedup_joins(&self) -> u64 {
        self.dedup_joins.load(Ordering::Relaxed)
    }

    /// Dropped-task count.
    pub fn tasks_dropped(&self) -> u64 {
        self.tasks_dropped.load(Ordering::Relaxed)
    }

    /// Write-back count.
    pub fn write_backs(&self) -> u64 {
        self.write_backs.load(Ordering::Relaxed)
    }
}
