use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters for failures that are otherwise only logged. Everything in the
/// storage path is best-effort, so these are the only record of lost data.
#[derive(Debug, Default)]
pub struct StoreMetrics {
    corrupt_reads: AtomicU64,
    failed_writes: AtomicU64,
    evicted_actions: AtomicU64,
    failed_reconciliations: AtomicU64,
    skipped_items: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub corrupt_reads: u64,
    pub failed_writes: u64,
    pub evicted_actions: u64,
    pub failed_reconciliations: u64,
    pub skipped_items: u64,
}

impl StoreMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_corrupt_read(&self) {
        self.corrupt_reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed_write(&self) {
        self.failed_writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_evictions(&self, count: usize) {
        self.evicted_actions.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn record_failed_reconciliation(&self) {
        self.failed_reconciliations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped_items(&self, count: usize) {
        self.skipped_items.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            corrupt_reads: self.corrupt_reads.load(Ordering::Relaxed),
            failed_writes: self.failed_writes.load(Ordering::Relaxed),
            evicted_actions: self.evicted_actions.load(Ordering::Relaxed),
            failed_reconciliations: self.failed_reconciliations.load(Ordering::Relaxed),
            skipped_items: self.skipped_items.load(Ordering::Relaxed),
        }
    }
}
