//! Shared fixtures for integration tests
#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};

use permstore::datastore::{Datastore, DatastoreConfig, Reader};
use permstore::engine::{Engine, ManualClock, QueryObserver};
use permstore::model::{NamespaceDefinition, Relationship, RelationshipUpdate, RelationshipsFilter};
use permstore::observability::logging;
use permstore::revision::Revision;

pub const RELATIONSHIP: &str = "resource:someresource#reader@user:someuser";

pub fn base_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_000_000, 0).unwrap()
}

pub struct Fixture {
    pub ds: Datastore,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(DatastoreConfig::default())
    }

    pub fn with_config(config: DatastoreConfig) -> Self {
        Self::build(config, None)
    }

    pub fn with_observer(config: DatastoreConfig, observer: Arc<dyn QueryObserver>) -> Self {
        Self::build(config, Some(observer))
    }

    fn build(config: DatastoreConfig, observer: Option<Arc<dyn QueryObserver>>) -> Self {
        logging::init_test();
        let clock = Arc::new(ManualClock::new(base_time()));
        let engine = Arc::new(Engine::with_observer(clock.clone(), observer));
        let ds = Datastore::with_engine(engine, config).unwrap();
        Self { ds, clock }
    }

    pub fn advance_millis(&self, ms: i64) {
        self.clock.advance(Duration::milliseconds(ms));
    }
}

pub fn rel(s: &str) -> Relationship {
    s.parse().unwrap()
}

/// Writes `resource` (with `relations`) and `user`.
pub fn write_namespaces(ds: &Datastore, relations: &[&str]) -> Revision {
    let mut resource = NamespaceDefinition::new("resource");
    for relation in relations {
        resource = resource.with_relation(*relation);
    }
    ds.read_write_tx(|tx| tx.write_namespaces([resource, NamespaceDefinition::new("user")]))
        .unwrap()
}

pub fn write(ds: &Datastore, update: fn(Relationship) -> RelationshipUpdate, rels: &[Relationship]) -> Revision {
    let updates: Vec<_> = rels.iter().cloned().map(update).collect();
    ds.read_write_tx(|tx| tx.write_relationships(updates)).unwrap()
}

pub fn noop(ds: &Datastore) -> Revision {
    ds.read_write_tx(|_| Ok(())).unwrap()
}

pub fn relationships_at(ds: &Datastore, revision: &Revision, resource_type: &str) -> Vec<Relationship> {
    ds.snapshot_reader(revision.clone())
        .query_relationships(&RelationshipsFilter::new(resource_type))
        .unwrap()
}

pub fn exists_at(ds: &Datastore, revision: &Revision, relationship: &Relationship) -> bool {
    ds.snapshot_reader(revision.clone())
        .read_relationship(&relationship.key)
        .is_ok()
}
