//! GC metrics
//!
//! - Counters only, plus the duration of the last run
//! - Monotonic increase
//! - Thread-safe, lock-free

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;

use crate::gc::DeletionCounts;

/// Counters maintained across GC runs.
///
/// All counters use Relaxed ordering; readers only need eventually
/// consistent values.
#[derive(Debug, Default)]
pub struct GcMetrics {
    /// Completed runs
    runs: AtomicU64,
    /// Failed or cancelled runs
    failures: AtomicU64,
    relationships_removed: AtomicU64,
    transactions_removed: AtomicU64,
    namespaces_removed: AtomicU64,
    caveats_removed: AtomicU64,
    /// Duration of the most recent run, successful or not
    last_duration_micros: AtomicU64,
}

impl GcMetrics {
    /// Create a registry with all counters at zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed run
    pub fn record_run(&self, counts: &DeletionCounts, elapsed: Duration) {
        self.runs.fetch_add(1, Ordering::Relaxed);
        self.add_removed(counts);
        self.set_last_duration(elapsed);
    }

    /// Record a failed run. Rows removed before the failure still count.
    pub fn record_failure(&self, partial: &DeletionCounts, elapsed: Duration) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        self.add_removed(partial);
        self.set_last_duration(elapsed);
    }

    pub fn runs(&self) -> u64 {
        self.runs.load(Ordering::Relaxed)
    }

    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    fn add_removed(&self, counts: &DeletionCounts) {
        self.relationships_removed
            .fetch_add(counts.relationships, Ordering::Relaxed);
        self.transactions_removed
            .fetch_add(counts.transactions, Ordering::Relaxed);
        self.namespaces_removed
            .fetch_add(counts.namespaces, Ordering::Relaxed);
        self.caveats_removed.fetch_add(counts.caveats, Ordering::Relaxed);
    }

    fn set_last_duration(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.last_duration_micros.store(micros, Ordering::Relaxed);
    }

    /// Get all metrics as a snapshot
    pub fn snapshot(&self) -> GcMetricsSnapshot {
        GcMetricsSnapshot {
            runs: self.runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            relationships_removed: self.relationships_removed.load(Ordering::Relaxed),
            transactions_removed: self.transactions_removed.load(Ordering::Relaxed),
            namespaces_removed: self.namespaces_removed.load(Ordering::Relaxed),
            caveats_removed: self.caveats_removed.load(Ordering::Relaxed),
            last_duration_micros: self.last_duration_micros.load(Ordering::Relaxed),
        }
    }

    /// Current values as JSON
    pub fn to_json(&self) -> String {
        serde_json::to_string(&self.snapshot()).unwrap_or_default()
    }
}

/// A point-in-time snapshot of the GC counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GcMetricsSnapshot {
    pub runs: u64,
    pub failures: u64,
    pub relationships_removed: u64,
    pub transactions_removed: u64,
    pub namespaces_removed: u64,
    pub caveats_removed: u64,
    pub last_duration_micros: u64,
}
