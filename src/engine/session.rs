//! Scoped engine access
//!
//! Every datastore operation borrows the engine through a `Session`. The
//! session is counted while alive and released when dropped, on every exit
//! path. Read-write work happens inside an `EngineTxn`, which aborts on
//! drop unless committed.

use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::revision::{Snapshot, Xid};

use super::errors::{EngineError, EngineResult};
use super::transaction_log::TransactionRecord;
use super::{Engine, EngineState};

/// A borrowed engine handle.
pub struct Session<'e> {
    engine: &'e Engine,
}

impl<'e> Session<'e> {
    pub(super) fn new(engine: &'e Engine) -> Self {
        engine.active_sessions.fetch_add(1, Ordering::SeqCst);
        Self { engine }
    }

    /// Engine wall clock, UTC.
    pub fn now(&self) -> DateTime<Utc> {
        self.engine.now()
    }

    /// Snapshot of the engine at this instant.
    pub fn current_snapshot(&self) -> Snapshot {
        self.engine.state.read().snapshot()
    }

    /// All transaction log records, ordered by xid.
    pub fn transaction_records(&self) -> Vec<TransactionRecord> {
        self.engine.state.read().transactions.iter().cloned().collect()
    }

    pub(crate) fn read<R>(&self, f: impl FnOnce(&EngineState) -> R) -> R {
        f(&self.engine.state.read())
    }

    /// Runs `f` as one short, atomic engine transaction that is not
    /// recorded in the transaction log.
    pub(crate) fn atomically<R>(&self, f: impl FnOnce(&mut EngineState) -> R) -> EngineResult<R> {
        if self.engine.is_closed() {
            return Err(EngineError::Closed);
        }
        Ok(f(&mut self.engine.state.write()))
    }

    /// Allocates a fresh xid and captures the snapshot it will read at.
    pub fn begin(&self) -> EngineTxn<'e> {
        let mut state = self.engine.state.write();
        let xid = state.allocate();
        let snapshot = state.snapshot();
        debug!(xid = %xid, snapshot = %snapshot, "began transaction");

        EngineTxn {
            engine: self.engine,
            xid,
            snapshot,
            finished: false,
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        self.engine.active_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

/// An open read-write engine transaction.
pub struct EngineTxn<'e> {
    engine: &'e Engine,
    xid: Xid,
    snapshot: Snapshot,
    finished: bool,
}

impl EngineTxn<'_> {
    pub fn xid(&self) -> Xid {
        self.xid
    }

    /// Snapshot captured at begin. The transaction's own xid is not
    /// visible in it.
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Applies staged work and commits.
    ///
    /// `apply` must validate before it mutates: on error nothing it did may
    /// remain, and the transaction is aborted.
    pub(crate) fn commit<E>(
        mut self,
        apply: impl FnOnce(&mut EngineState, Xid) -> Result<(), E>,
    ) -> Result<TransactionRecord, E> {
        let mut state = self.engine.state.write();
        let applied = apply(&mut state, self.xid);
        state.in_progress.remove(&self.xid);
        self.finished = true;

        if let Err(e) = applied {
            debug!(xid = %self.xid, "transaction failed to apply, aborted");
            return Err(e);
        }

        let record = TransactionRecord {
            xid: self.xid,
            timestamp: self.engine.now(),
            snapshot: state.snapshot(),
        };
        state.transactions.append(record.clone());
        debug!(xid = %self.xid, timestamp = %record.timestamp, "committed transaction");
        Ok(record)
    }
}

impl Drop for EngineTxn<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.engine.state.write().in_progress.remove(&self.xid);
        debug!(xid = %self.xid, "aborted transaction");
    }
}
