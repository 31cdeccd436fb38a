//! Garbage collection over the datastore's engine
//!
//! A fact row is removable once the transaction that superseded it lies
//! below the mark's `xmin`: it is visible to the mark and to every
//! revision a reader can still be handed. The mark's own transaction
//! record is always kept.

use std::sync::atomic::Ordering;

use chrono::{DateTime, Utc};

use crate::datastore::Datastore;
use crate::revision::Revision;

use super::cancel::CancelSignal;
use super::errors::GcResult;
use super::sweep::Sweep;
use super::{DeletionCounts, GarbageCollector, GcTarget};

impl GarbageCollector for Datastore {
    fn now(&self) -> GcResult<DateTime<Utc>> {
        Ok(self.engine().session()?.now())
    }

    fn txid_before(&self, before: DateTime<Utc>) -> GcResult<Option<Revision>> {
        let session = self.engine().session()?;
        Ok(session.read(|state| {
            state
                .transactions
                .latest_before(before)
                .map(|record| record.revision())
        }))
    }

    fn delete_before_tx(&self, mark: &Revision, cancel: &CancelSignal) -> GcResult<DeletionCounts> {
        let session = self.engine().session()?;
        let sweep = Sweep::new(self.config().gc_batch_size, cancel);
        let mut counts = DeletionCounts::default();

        let fact_bound = mark.snapshot().xmin();
        let tx_bound = mark.xid().min(fact_bound);

        sweep.run(GcTarget::Relationships, &mut counts, |limit| {
            session.atomically(|state| {
                let ids = state.relationships.deleted_before(fact_bound, limit);
                state.relationships.remove(&ids)
            })
        })?;
        sweep.run(GcTarget::Transactions, &mut counts, |limit| {
            session.atomically(|state| {
                let xids = state.transactions.xids_before(tx_bound, limit);
                state.transactions.remove(&xids)
            })
        })?;
        sweep.run(GcTarget::Namespaces, &mut counts, |limit| {
            session.atomically(|state| {
                let ids = state.namespaces.deleted_before(fact_bound, limit);
                state.namespaces.remove(&ids)
            })
        })?;
        sweep.run(GcTarget::Caveats, &mut counts, |limit| {
            session.atomically(|state| {
                let ids = state.caveats.deleted_before(fact_bound, limit);
                state.caveats.remove(&ids)
            })
        })?;

        Ok(counts)
    }

    fn is_ready(&self) -> bool {
        self.ready_state().is_ready
    }

    fn mark_gc_completed(&self) {
        self.gc_has_run.store(true, Ordering::SeqCst);
    }

    fn has_gc_run(&self) -> bool {
        self.gc_has_run.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use crate::datastore::Reader;

    use crate::datastore::DatastoreConfig;
    use crate::engine::{Engine, ManualClock};
    use crate::model::{NamespaceDefinition, Relationship, RelationshipUpdate};

    fn datastore(batch: usize) -> Datastore {
        let clock = Arc::new(ManualClock::new(Utc.timestamp_opt(1_000_000, 0).unwrap()));
        let config = DatastoreConfig::default().with_gc_batch_size(batch);
        Datastore::with_engine(Arc::new(Engine::new(clock)), config).unwrap()
    }

    fn touch(ds: &Datastore, rel: &str) -> Revision {
        let rel: Relationship = rel.parse().unwrap();
        ds.read_write_tx(|tx| tx.write_relationships([RelationshipUpdate::touch(rel)]))
            .unwrap()
    }

    #[test]
    fn test_superseded_row_removed_at_superseding_revision() {
        let ds = datastore(10);
        ds.read_write_tx(|tx| tx.write_namespaces([NamespaceDefinition::new("document")]))
            .unwrap();
        touch(&ds, "document:a#viewer@user:tom");
        let second = touch(&ds, "document:a#viewer@user:tom");

        let counts = ds.delete_before_tx(&second, &CancelSignal::none()).unwrap();
        assert_eq!(counts.relationships, 1);
        assert_eq!(counts.transactions, 3);

        let again = ds.delete_before_tx(&second, &CancelSignal::none()).unwrap();
        assert_eq!(again, DeletionCounts::default());

        let live = ds
            .snapshot_reader(second)
            .query_relationships(&crate::model::RelationshipsFilter::new("document"))
            .unwrap();
        assert_eq!(live.len(), 1);
    }

    #[test]
    fn test_mark_transaction_is_kept() {
        let ds = datastore(10);
        let rev = ds.read_write_tx(|_| Ok(())).unwrap();
        ds.delete_before_tx(&rev, &CancelSignal::none()).unwrap();

        let session = ds.engine().session().unwrap();
        let xids: Vec<_> = session.transaction_records().iter().map(|r| r.xid).collect();
        assert_eq!(xids, vec![rev.xid()]);
    }

    #[test]
    fn test_txid_before_is_strict() {
        let ds = datastore(10);
        let rev = ds.read_write_tx(|_| Ok(())).unwrap();
        let now = GarbageCollector::now(&ds).unwrap();

        // every commit so far happened at `now`
        assert_eq!(ds.txid_before(now).unwrap(), None);
        let after = now + chrono::Duration::nanoseconds(1);
        assert_eq!(ds.txid_before(after).unwrap().map(|r| r.xid()), Some(rev.xid()));
    }

    #[test]
    fn test_gc_completion_flag() {
        let ds = datastore(10);
        assert!(ds.is_ready());
        assert!(!ds.has_gc_run());
        ds.mark_gc_completed();
        assert!(ds.has_gc_run());
    }

    #[test]
    fn test_closed_engine_fails() {
        let ds = datastore(10);
        let rev = ds.head_revision().unwrap();
        ds.close();
        let err = ds.delete_before_tx(&rev, &CancelSignal::none()).unwrap_err();
        assert_eq!(err.partial(), DeletionCounts::default());
    }
}
