//! Garbage collection of superseded data
//!
//! A low-water-mark revision is derived from `now - gc_window`; every fact
//! row superseded below the mark's horizon, and every transaction record
//! below the mark, is physically removed in bounded chunks.
//!
//! - `GarbageCollector` is the backend-facing contract
//! - `run_garbage_collection` performs one complete pass
//! - `GcWorker` repeats passes on an interval in the background

mod cancel;
mod collector;
mod errors;
mod sweep;
mod worker;

pub use cancel::{CancelReason, CancelSignal};
pub use errors::{GcError, GcResult};
pub use worker::{GcSchedule, GcWorker, GcWorkerHandle};

use std::fmt;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::datastore::gc_cutoff;
use crate::observability::GcMetrics;
use crate::revision::Revision;

/// Rows removed by one GC pass, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DeletionCounts {
    pub relationships: u64,
    pub transactions: u64,
    pub namespaces: u64,
    pub caveats: u64,
}

impl DeletionCounts {
    pub fn total(&self) -> u64 {
        self.relationships + self.transactions + self.namespaces + self.caveats
    }

    pub(crate) fn add(&mut self, target: GcTarget, removed: u64) {
        let slot = match target {
            GcTarget::Relationships => &mut self.relationships,
            GcTarget::Transactions => &mut self.transactions,
            GcTarget::Namespaces => &mut self.namespaces,
            GcTarget::Caveats => &mut self.caveats,
        };
        *slot += removed;
    }
}

impl fmt::Display for DeletionCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} relationships, {} transactions, {} namespaces, {} caveats",
            self.relationships, self.transactions, self.namespaces, self.caveats
        )
    }
}

/// Table a sweep works on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GcTarget {
    Relationships,
    Transactions,
    Namespaces,
    Caveats,
}

impl fmt::Display for GcTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GcTarget::Relationships => "relationships",
            GcTarget::Transactions => "transactions",
            GcTarget::Namespaces => "namespaces",
            GcTarget::Caveats => "caveats",
        };
        f.write_str(name)
    }
}

/// A datastore that can collect its own garbage.
pub trait GarbageCollector: Send + Sync {
    /// Current time as the datastore sees it.
    fn now(&self) -> GcResult<DateTime<Utc>>;

    /// Revision of the latest transaction committed strictly before
    /// `before`, if any.
    fn txid_before(&self, before: DateTime<Utc>) -> GcResult<Option<Revision>>;

    /// Removes everything no revision at or after `mark` can observe.
    fn delete_before_tx(&self, mark: &Revision, cancel: &CancelSignal) -> GcResult<DeletionCounts>;

    fn is_ready(&self) -> bool;

    fn mark_gc_completed(&self);

    fn has_gc_run(&self) -> bool;
}

/// Runs one GC pass with the mark taken `window` before now.
///
/// Returns `None` when no transaction is old enough to serve as a mark.
pub fn run_garbage_collection<G>(
    gc: &G,
    window: Duration,
    cancel: &CancelSignal,
    metrics: &GcMetrics,
) -> GcResult<Option<DeletionCounts>>
where
    G: GarbageCollector + ?Sized,
{
    let started = Instant::now();
    let result = collect(gc, window, cancel);
    let elapsed = started.elapsed();

    match &result {
        Ok(Some(counts)) => {
            metrics.record_run(counts, elapsed);
            gc.mark_gc_completed();
            info!(
                relationships = counts.relationships,
                transactions = counts.transactions,
                namespaces = counts.namespaces,
                caveats = counts.caveats,
                elapsed = ?elapsed,
                "garbage collection completed"
            );
        }
        Ok(None) => {
            metrics.record_run(&DeletionCounts::default(), elapsed);
            gc.mark_gc_completed();
            debug!(window = ?window, "no transaction old enough to collect before");
        }
        Err(e) => {
            metrics.record_failure(&e.partial(), elapsed);
            warn!(error = %e, elapsed = ?elapsed, "garbage collection failed");
        }
    }

    result
}

fn collect<G>(gc: &G, window: Duration, cancel: &CancelSignal) -> GcResult<Option<DeletionCounts>>
where
    G: GarbageCollector + ?Sized,
{
    let now = gc.now()?;
    let Some(cutoff) = gc_cutoff(now, window) else {
        return Ok(None);
    };
    let Some(mark) = gc.txid_before(cutoff)? else {
        return Ok(None);
    };
    debug!(mark = %mark, cutoff = %cutoff, "collecting garbage");
    gc.delete_before_tx(&mark, cancel).map(Some)
}
