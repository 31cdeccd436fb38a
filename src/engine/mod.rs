//! Backing engine
//!
//! An in-process relational engine exposing the primitives the datastore
//! core builds on:
//! - 64-bit xids allocated at begin, tracked in an in-progress set
//! - snapshot capture (`xmin:xmax:xip`)
//! - atomic commit and abort
//! - append-only versioned fact tables with B-tree indexes
//! - a transaction log indexed by xid and by UTC commit timestamp
//!
//! All state sits behind one lock. Begin, commit and GC chunks hold the
//! write side briefly; reads hold the read side for a single query. Caller
//! code never runs with the lock held.

mod clock;
mod errors;
mod observer;
mod session;
mod table;
mod transaction_log;

pub use clock::{Clock, ManualClock, SystemClock};
pub use errors::{EngineError, EngineResult};
pub use observer::{QueryEvent, QueryObserver, QueryRecorder, ScanKind};
pub use session::{EngineTxn, Session};
pub use table::{Keyed, RowId, StoredRow, VersionedTable};
pub use transaction_log::{TransactionLog, TransactionRecord};

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::info;
use uuid::Uuid;

use crate::model::{CaveatDefinition, NamespaceDefinition, Relationship};
use crate::revision::{Snapshot, Xid};

/// Table layout version the datastore expects.
pub const SCHEMA_VERSION: u32 = 1;

pub(crate) const RELATIONSHIP_TABLE: &str = "relation_tuple";
pub(crate) const NAMESPACE_TABLE: &str = "namespace_config";
pub(crate) const CAVEAT_TABLE: &str = "caveat";

/// Everything guarded by the engine lock.
pub struct EngineState {
    next_xid: u64,
    in_progress: BTreeSet<Xid>,
    pub(crate) relationships: VersionedTable<Relationship>,
    pub(crate) namespaces: VersionedTable<NamespaceDefinition>,
    pub(crate) caveats: VersionedTable<CaveatDefinition>,
    pub(crate) transactions: TransactionLog,
}

impl EngineState {
    fn new(observer: Option<Arc<dyn QueryObserver>>) -> Self {
        Self {
            next_xid: Xid::BOOTSTRAP.value(),
            in_progress: BTreeSet::new(),
            relationships: VersionedTable::new(RELATIONSHIP_TABLE, observer.clone()),
            namespaces: VersionedTable::new(NAMESPACE_TABLE, observer.clone()),
            caveats: VersionedTable::new(CAVEAT_TABLE, observer.clone()),
            transactions: TransactionLog::new(observer),
        }
    }

    fn allocate(&mut self) -> Xid {
        let xid = Xid::new(self.next_xid);
        self.next_xid += 1;
        self.in_progress.insert(xid);
        xid
    }

    /// First xid not yet allocated.
    pub(crate) fn next_xid(&self) -> Xid {
        Xid::new(self.next_xid)
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let xmax = self.next_xid();
        let xmin = self.in_progress.first().copied().unwrap_or(xmax);
        Snapshot::new(xmin, xmax, self.in_progress.iter().copied())
    }
}

pub struct Engine {
    state: RwLock<EngineState>,
    clock: Arc<dyn Clock>,
    unique_id: Uuid,
    schema_version: AtomicU32,
    closed: AtomicBool,
    active_sessions: AtomicUsize,
}

impl Engine {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_observer(clock, None)
    }

    /// Creates an engine that reports every table access to `observer`.
    ///
    /// A bootstrap transaction is committed immediately, so the
    /// transaction log is never empty.
    pub fn with_observer(clock: Arc<dyn Clock>, observer: Option<Arc<dyn QueryObserver>>) -> Self {
        let mut state = EngineState::new(observer);

        let xid = state.allocate();
        state.in_progress.remove(&xid);
        let bootstrap = TransactionRecord {
            xid,
            timestamp: clock.now_utc(),
            snapshot: state.snapshot(),
        };
        state.transactions.append(bootstrap);

        let unique_id = Uuid::new_v4();
        info!(unique_id = %unique_id, schema_version = SCHEMA_VERSION, "engine started");

        Self {
            state: RwLock::new(state),
            clock,
            unique_id,
            schema_version: AtomicU32::new(SCHEMA_VERSION),
            closed: AtomicBool::new(false),
            active_sessions: AtomicUsize::new(0),
        }
    }

    /// Stable identity of this engine instance.
    pub fn unique_id(&self) -> Uuid {
        self.unique_id
    }

    pub fn schema_version(&self) -> u32 {
        self.schema_version.load(Ordering::SeqCst)
    }

    #[cfg(test)]
    pub(crate) fn set_schema_version(&self, version: u32) {
        self.schema_version.store(version, Ordering::SeqCst);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now_utc()
    }

    /// Acquires a session. Fails once the engine is closed.
    pub fn session(&self) -> EngineResult<Session<'_>> {
        if self.is_closed() {
            return Err(EngineError::Closed);
        }
        Ok(Session::new(self))
    }

    /// Sessions currently held.
    pub fn active_sessions(&self) -> usize {
        self.active_sessions.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(unique_id = %self.unique_id, "engine closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn engine() -> Engine {
        Engine::new(Arc::new(ManualClock::new(Utc.timestamp_opt(1_000, 0).unwrap())))
    }

    #[test]
    fn test_bootstrap_transaction() {
        let engine = engine();
        let session = engine.session().unwrap();

        let records = session.transaction_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].xid, Xid::BOOTSTRAP);
        assert!(records[0].snapshot.is_visible(Xid::BOOTSTRAP));
        assert_eq!(session.current_snapshot().to_string(), "2:2:");
    }

    #[test]
    fn test_begin_sees_nothing_in_flight() {
        let engine = engine();
        let session = engine.session().unwrap();

        let first = session.begin();
        let second = session.begin();

        assert!(!first.snapshot().is_visible(first.xid()));
        assert!(!second.snapshot().is_visible(first.xid()));
        assert!(!second.snapshot().is_visible(second.xid()));
        assert_eq!(session.current_snapshot().to_string(), "2:2:");
    }

    #[test]
    fn test_commit_records_transaction() {
        let engine = engine();
        let session = engine.session().unwrap();

        let txn = session.begin();
        let xid = txn.xid();
        let record = txn.commit(|_, _| Ok::<_, EngineError>(())).unwrap();

        assert_eq!(record.xid, xid);
        assert!(record.snapshot.is_visible(xid));
        assert_eq!(record.timestamp, engine.now());
        assert_eq!(session.transaction_records().len(), 2);
    }

    #[test]
    fn test_drop_aborts() {
        let engine = engine();
        let session = engine.session().unwrap();

        let aborted = session.begin().xid();
        let snapshot = session.current_snapshot();

        // Aborted xids are finished, but nothing was recorded for them.
        assert!(snapshot.is_visible(aborted));
        assert_eq!(session.transaction_records().len(), 1);
    }

    #[test]
    fn test_failed_apply_aborts() {
        let engine = engine();
        let session = engine.session().unwrap();

        let txn = session.begin();
        let result = txn.commit(|_, _| Err(EngineError::Unavailable("boom".into())));

        assert!(result.is_err());
        assert!(session.current_snapshot().xip().next().is_none());
        assert_eq!(session.transaction_records().len(), 1);
    }

    #[test]
    fn test_sessions_are_counted_and_closed_engine_refuses() {
        let engine = engine();
        {
            let _a = engine.session().unwrap();
            let _b = engine.session().unwrap();
            assert_eq!(engine.active_sessions(), 2);
        }
        assert_eq!(engine.active_sessions(), 0);

        engine.close();
        assert!(matches!(engine.session(), Err(EngineError::Closed)));
        assert_eq!(engine.active_sessions(), 0);
    }
}
