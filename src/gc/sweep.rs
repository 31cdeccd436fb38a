//! Bounded-batch deletion loop
//!
//! Each chunk selects at most `batch_size` eligible rows through an index
//! range and removes them in one short engine transaction. The loop stops
//! at the first chunk that removes nothing.

use tracing::debug;

use crate::engine::EngineResult;

use super::cancel::{CancelReason, CancelSignal};
use super::errors::{GcError, GcResult};
use super::{DeletionCounts, GcTarget};

pub(crate) struct Sweep<'a> {
    batch_size: usize,
    cancel: &'a CancelSignal,
}

impl<'a> Sweep<'a> {
    pub(crate) fn new(batch_size: usize, cancel: &'a CancelSignal) -> Self {
        Self {
            batch_size: batch_size.max(1),
            cancel,
        }
    }

    /// Runs chunks for `target`, adding what each removes to `counts`.
    ///
    /// `chunk` receives the batch size and returns how many rows it removed.
    pub(crate) fn run(
        &self,
        target: GcTarget,
        counts: &mut DeletionCounts,
        mut chunk: impl FnMut(usize) -> EngineResult<usize>,
    ) -> GcResult<()> {
        loop {
            if let Some(reason) = self.cancel.check() {
                let partial = *counts;
                return Err(match reason {
                    CancelReason::Shutdown => GcError::Cancelled { partial },
                    CancelReason::DeadlineExceeded => GcError::DeadlineExceeded { partial },
                });
            }

            let removed = chunk(self.batch_size).map_err(|source| GcError::Engine {
                source,
                partial: *counts,
            })?;
            if removed == 0 {
                return Ok(());
            }

            counts.add(target, removed as u64);
            debug!(table = %target, removed, "gc chunk committed");
        }
    }
}
