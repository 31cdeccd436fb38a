//! permstore - snapshot-isolated relationship datastore core
//!
//! Revisions, point-in-time reads, quantized head resolution and garbage
//! collection of superseded data over an in-memory MVCC engine.

pub mod datastore;
pub mod engine;
pub mod gc;
pub mod model;
pub mod observability;
pub mod revision;

pub use datastore::{Datastore, DatastoreConfig, DatastoreError, DatastoreResult, Reader};
pub use gc::{DeletionCounts, GarbageCollector, GcError};
pub use revision::{Revision, RevisionOrder, RevisionOrdering, Snapshot, Xid};
