//! Head revision resolution
//!
//! Wall-clock time is cut into half-open buckets of width `q`, aligned to
//! the Unix epoch. Only transactions committed before the start of the
//! current bucket are eligible, so every call within one bucket resolves
//! to the same revision and staleness stays below `2q`.

use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::engine::TransactionLog;
use crate::revision::Revision;

/// Widths at or below this disable bucketing.
pub const QUANTIZATION_DISABLED_AT: Duration = Duration::from_nanos(1);

/// A resolved head revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadRevision {
    pub revision: Revision,
    /// How long the current bucket stays open. Zero when unquantized.
    pub valid_for: Duration,
}

/// Eligibility window derived from "now" and the bucket width.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QuantizedWindow {
    /// Transactions committed strictly before this instant are eligible.
    /// `None` means every committed transaction is.
    pub cutoff: Option<DateTime<Utc>>,
    pub valid_for: Duration,
}

impl QuantizedWindow {
    pub(crate) fn at(now: DateTime<Utc>, quantization: Duration) -> Self {
        if quantization <= QUANTIZATION_DISABLED_AT {
            return Self {
                cutoff: None,
                valid_for: Duration::ZERO,
            };
        }

        let width = quantization.as_nanos().min(i64::MAX as u128) as i128;
        let now_nanos =
            i128::from(now.timestamp()) * 1_000_000_000 + i128::from(now.timestamp_subsec_nanos());
        let into_bucket = now_nanos.rem_euclid(width);

        // into_bucket < width <= i64::MAX
        let cutoff = now - chrono::Duration::nanoseconds(into_bucket as i64);
        let valid_for = Duration::from_nanos((width - into_bucket) as u64);

        Self {
            cutoff: Some(cutoff),
            valid_for,
        }
    }
}

/// Picks the latest eligible transaction, falling back to the oldest one
/// still in the log when nothing is eligible yet.
pub(crate) fn resolve(log: &TransactionLog, window: &QuantizedWindow) -> Option<Revision> {
    let eligible = match window.cutoff {
        Some(cutoff) => log.latest_before(cutoff),
        None => log.latest(),
    };
    eligible.or_else(|| log.oldest()).map(|record| record.revision())
}
