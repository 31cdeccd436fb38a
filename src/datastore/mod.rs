//! Datastore
//!
//! The snapshot-isolated relationship datastore built on the engine:
//! - `read_write_tx` runs a callback against a fresh transaction and
//!   returns the revision of its commit
//! - `snapshot_reader` serves point-in-time reads at any revision
//! - `quantized_head` / `optimized_revision` / `head_revision` resolve "now"
//! - `check_revision` rejects revisions outside the servable range
//!
//! Every operation borrows the engine through a scoped session that is
//! released on all exit paths.

mod config;
mod errors;
mod head;
mod reader;
mod writer;

pub use config::{
    DatastoreConfig, DEFAULT_GC_BATCH_SIZE, DEFAULT_GC_INTERVAL, DEFAULT_GC_MAX_OPERATION_TIME,
    DEFAULT_GC_WINDOW, DEFAULT_REVISION_QUANTIZATION,
};
pub use errors::{
    ConfigError, DatastoreError, DatastoreResult, DefinitionKind, InvalidRevisionReason,
};
pub use head::{HeadRevision, QUANTIZATION_DISABLED_AT};
pub use reader::{Reader, RevisionedDefinition, SnapshotReader};
pub use writer::ReadWriteTransaction;

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

use crate::engine::{Engine, EngineError, SystemClock, SCHEMA_VERSION};
use crate::model::RelationshipsFilter;
use crate::revision::Revision;

use head::QuantizedWindow;

/// Readiness of the backing engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadyState {
    pub is_ready: bool,
    pub message: String,
}

/// Datastore-wide statistics at head.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub unique_id: Uuid,
    pub object_type_names: Vec<String>,
    pub estimated_relationship_count: u64,
}

pub struct Datastore {
    engine: Arc<Engine>,
    config: DatastoreConfig,
    pub(crate) gc_has_run: AtomicBool,
}

impl Datastore {
    /// Creates a datastore over a fresh engine on the system clock.
    pub fn new(config: DatastoreConfig) -> DatastoreResult<Self> {
        Self::with_engine(Arc::new(Engine::new(Arc::new(SystemClock))), config)
    }

    pub fn with_engine(engine: Arc<Engine>, config: DatastoreConfig) -> DatastoreResult<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            config,
            gc_has_run: AtomicBool::new(false),
        })
    }

    pub fn engine(&self) -> &Arc<Engine> {
        &self.engine
    }

    pub fn config(&self) -> &DatastoreConfig {
        &self.config
    }

    /// Runs `f` in a new read-write transaction and commits it.
    ///
    /// If `f` fails, or its writes conflict at commit, nothing is written
    /// and the transaction's xid is released.
    pub fn read_write_tx<F>(&self, f: F) -> DatastoreResult<Revision>
    where
        F: FnOnce(&mut ReadWriteTransaction<'_>) -> DatastoreResult<()>,
    {
        let session = self.engine.session()?;
        let txn = session.begin();
        let xid = txn.xid();
        let begin = txn.snapshot().clone();

        let mut rwt = ReadWriteTransaction::new(&session, xid, begin.clone());
        f(&mut rwt)?;
        let (staged, view) = rwt.into_staged();

        txn.commit(|state, xid| staged.apply(state, xid, &view))?;

        let revision = Revision::new(xid, begin.mark_complete(xid));
        debug!(revision = %revision, "read-write transaction committed");
        Ok(revision)
    }

    pub fn snapshot_reader(&self, revision: Revision) -> SnapshotReader {
        SnapshotReader::new(self.engine.clone(), revision)
    }

    /// Unquantized head: everything committed right now.
    pub fn head_revision(&self) -> DatastoreResult<Revision> {
        let session = self.engine.session()?;
        session.read(|state| {
            let latest = state
                .transactions
                .latest()
                .ok_or_else(|| EngineError::Unavailable("transaction log is empty".to_string()))?;
            Ok(Revision::new(latest.xid, state.snapshot()))
        })
    }

    /// Head revision quantized to buckets of width `quantization`.
    pub fn quantized_head(&self, quantization: Duration) -> DatastoreResult<HeadRevision> {
        let session = self.engine.session()?;
        let window = QuantizedWindow::at(session.now(), quantization);
        let revision = session
            .read(|state| head::resolve(&state.transactions, &window))
            .ok_or_else(|| EngineError::Unavailable("transaction log is empty".to_string()))?;

        Ok(HeadRevision {
            revision,
            valid_for: window.valid_for,
        })
    }

    /// Quantized head at the configured quantization.
    pub fn optimized_revision(&self) -> DatastoreResult<HeadRevision> {
        self.quantized_head(self.config.revision_quantization)
    }

    /// Checks that `revision` can still be served.
    ///
    /// Stale: it references a transaction older than the oldest one
    /// committed inside the GC window (or, with nothing committed in the
    /// window, older than the latest commit). Future: it references an
    /// xid the engine has not allocated.
    pub fn check_revision(&self, revision: &Revision) -> DatastoreResult<()> {
        let session = self.engine.session()?;
        let cutoff = gc_cutoff(session.now(), self.config.gc_window);

        let reason = session.read(|state| {
            let next = state.next_xid();
            if revision.xid() >= next || revision.snapshot().xmax() > next {
                return Some(InvalidRevisionReason::Future);
            }
            let oldest_valid = cutoff
                .and_then(|cutoff| state.transactions.min_xid_since(cutoff))
                .or_else(|| state.transactions.latest().map(|r| r.xid));
            match oldest_valid {
                Some(oldest) if revision.xid() < oldest => Some(InvalidRevisionReason::Stale),
                _ => None,
            }
        });

        match reason {
            Some(reason) => Err(DatastoreError::InvalidRevision {
                revision: revision.clone(),
                reason,
            }),
            None => Ok(()),
        }
    }

    /// Engine wall clock, UTC.
    pub fn now(&self) -> DatastoreResult<DateTime<Utc>> {
        Ok(self.engine.session()?.now())
    }

    pub fn ready_state(&self) -> ReadyState {
        if self.engine.is_closed() {
            return ReadyState {
                is_ready: false,
                message: EngineError::Closed.to_string(),
            };
        }
        let found = self.engine.schema_version();
        if found != SCHEMA_VERSION {
            return ReadyState {
                is_ready: false,
                message: EngineError::SchemaMismatch {
                    expected: SCHEMA_VERSION,
                    found,
                }
                .to_string(),
            };
        }
        ReadyState {
            is_ready: true,
            message: String::new(),
        }
    }

    pub fn statistics(&self) -> DatastoreResult<Statistics> {
        let head = self.head_revision()?;
        let reader = self.snapshot_reader(head);

        let object_type_names = reader
            .list_namespaces()?
            .into_iter()
            .map(|ns| ns.definition.name)
            .collect::<Vec<_>>();

        let mut estimated_relationship_count = 0;
        for name in &object_type_names {
            estimated_relationship_count +=
                reader.query_relationships(&RelationshipsFilter::new(name.as_str()))?.len() as u64;
        }

        Ok(Statistics {
            unique_id: self.engine.unique_id(),
            object_type_names,
            estimated_relationship_count,
        })
    }

    /// Closes the engine. Later operations fail with `EngineError::Closed`.
    pub fn close(&self) {
        self.engine.close();
    }
}

/// `now - window`, or `None` if that lies outside the representable range.
pub(crate) fn gc_cutoff(now: DateTime<Utc>, window: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(window)
        .ok()
        .and_then(|window| now.checked_sub_signed(window))
}
