//! Snapshot reads
//!
//! Every read is evaluated at one revision: a row is returned iff it is
//! live under that revision's snapshot.

use std::sync::Arc;

use serde::Serialize;

use crate::engine::{Engine, EngineState, Keyed, VersionedTable};
use crate::model::{
    CaveatDefinition, NamespaceDefinition, Relationship, RelationshipKey, RelationshipsFilter,
    SubjectsFilter,
};
use crate::revision::{Revision, Xid};

use super::errors::{DatastoreError, DatastoreResult, DefinitionKind};

/// A definition together with the transaction that last wrote it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionedDefinition<T> {
    pub definition: T,
    pub last_written: Xid,
}

/// Point-in-time queries over the fact tables.
pub trait Reader {
    /// The revision all reads are evaluated at.
    fn revision(&self) -> &Revision;

    fn read_namespace(&self, name: &str) -> DatastoreResult<RevisionedDefinition<NamespaceDefinition>>;

    /// All live namespaces, ordered by name.
    fn list_namespaces(&self) -> DatastoreResult<Vec<RevisionedDefinition<NamespaceDefinition>>>;

    /// The named namespaces that exist; missing names are skipped.
    fn lookup_namespaces(&self, names: &[&str]) -> DatastoreResult<Vec<RevisionedDefinition<NamespaceDefinition>>>;

    fn read_caveat(&self, name: &str) -> DatastoreResult<RevisionedDefinition<CaveatDefinition>>;

    fn list_caveats(&self) -> DatastoreResult<Vec<RevisionedDefinition<CaveatDefinition>>>;

    fn lookup_caveats(&self, names: &[&str]) -> DatastoreResult<Vec<RevisionedDefinition<CaveatDefinition>>>;

    fn read_relationship(&self, key: &RelationshipKey) -> DatastoreResult<Relationship>;

    /// Relationships matching `filter`, ordered by key.
    fn query_relationships(&self, filter: &RelationshipsFilter) -> DatastoreResult<Vec<Relationship>>;

    /// Relationships whose subject matches `filter`, ordered by key.
    fn reverse_query_relationships(&self, filter: &SubjectsFilter) -> DatastoreResult<Vec<Relationship>>;
}

/// Reader bound to a fixed revision.
pub struct SnapshotReader {
    engine: Arc<Engine>,
    revision: Revision,
}

impl SnapshotReader {
    pub(crate) fn new(engine: Arc<Engine>, revision: Revision) -> Self {
        Self { engine, revision }
    }

    fn with_state<R>(&self, f: impl FnOnce(&EngineState) -> R) -> DatastoreResult<R> {
        let session = self.engine.session()?;
        Ok(session.read(f))
    }
}

impl Reader for SnapshotReader {
    fn revision(&self) -> &Revision {
        &self.revision
    }

    fn read_namespace(&self, name: &str) -> DatastoreResult<RevisionedDefinition<NamespaceDefinition>> {
        self.with_state(|state| read_definition(&state.namespaces, name, &self.revision))?
            .ok_or_else(|| not_found(DefinitionKind::Namespace, name, &self.revision))
    }

    fn list_namespaces(&self) -> DatastoreResult<Vec<RevisionedDefinition<NamespaceDefinition>>> {
        self.with_state(|state| list_definitions(&state.namespaces, &self.revision))
    }

    fn lookup_namespaces(&self, names: &[&str]) -> DatastoreResult<Vec<RevisionedDefinition<NamespaceDefinition>>> {
        self.with_state(|state| lookup_definitions(&state.namespaces, names, &self.revision))
    }

    fn read_caveat(&self, name: &str) -> DatastoreResult<RevisionedDefinition<CaveatDefinition>> {
        self.with_state(|state| read_definition(&state.caveats, name, &self.revision))?
            .ok_or_else(|| not_found(DefinitionKind::Caveat, name, &self.revision))
    }

    fn list_caveats(&self) -> DatastoreResult<Vec<RevisionedDefinition<CaveatDefinition>>> {
        self.with_state(|state| list_definitions(&state.caveats, &self.revision))
    }

    fn lookup_caveats(&self, names: &[&str]) -> DatastoreResult<Vec<RevisionedDefinition<CaveatDefinition>>> {
        self.with_state(|state| lookup_definitions(&state.caveats, names, &self.revision))
    }

    fn read_relationship(&self, key: &RelationshipKey) -> DatastoreResult<Relationship> {
        self.with_state(|state| {
            state
                .relationships
                .visible(key, &self.revision)
                .map(|row| row.value.clone())
        })?
        .ok_or_else(|| relationship_not_found(key, &self.revision))
    }

    fn query_relationships(&self, filter: &RelationshipsFilter) -> DatastoreResult<Vec<Relationship>> {
        self.with_state(|state| query(&state.relationships, filter, &self.revision))
    }

    fn reverse_query_relationships(&self, filter: &SubjectsFilter) -> DatastoreResult<Vec<Relationship>> {
        self.with_state(|state| reverse_query(&state.relationships, filter, &self.revision))
    }
}

pub(crate) fn not_found(kind: DefinitionKind, name: &str, revision: &Revision) -> DatastoreError {
    DatastoreError::NotFound {
        kind,
        name: name.to_string(),
        revision: revision.clone(),
    }
}

pub(crate) fn relationship_not_found(key: &RelationshipKey, revision: &Revision) -> DatastoreError {
    DatastoreError::RelationshipNotFound {
        relationship: Relationship::new(key.resource.clone(), key.subject.clone()).to_string(),
        revision: revision.clone(),
    }
}

pub(crate) fn read_definition<V>(
    table: &VersionedTable<V>,
    name: &str,
    revision: &Revision,
) -> Option<RevisionedDefinition<V>>
where
    V: Keyed<Key = String> + Clone,
{
    table
        .visible(&name.to_string(), revision)
        .map(|row| RevisionedDefinition {
            definition: row.value.clone(),
            last_written: row.created_xid,
        })
}

pub(crate) fn list_definitions<V>(table: &VersionedTable<V>, revision: &Revision) -> Vec<RevisionedDefinition<V>>
where
    V: Keyed<Key = String> + Clone,
{
    table
        .all_visible(revision)
        .map(|row| RevisionedDefinition {
            definition: row.value.clone(),
            last_written: row.created_xid,
        })
        .collect()
}

fn lookup_definitions<V>(table: &VersionedTable<V>, names: &[&str], revision: &Revision) -> Vec<RevisionedDefinition<V>>
where
    V: Keyed<Key = String> + Clone,
{
    names
        .iter()
        .filter_map(|name| read_definition(table, name, revision))
        .collect()
}

pub(crate) fn query(
    table: &VersionedTable<Relationship>,
    filter: &RelationshipsFilter,
    revision: &Revision,
) -> Vec<Relationship> {
    table
        .scan_visible(&filter.scan_start(), revision)
        .take_while(|row| !filter.scan_exhausted(&row.value.key))
        .filter(|row| filter.matches(&row.value.key))
        .map(|row| row.value.clone())
        .collect()
}

pub(crate) fn reverse_query(
    table: &VersionedTable<Relationship>,
    filter: &SubjectsFilter,
    revision: &Revision,
) -> Vec<Relationship> {
    table
        .all_visible(revision)
        .filter(|row| filter.matches(&row.value.key.subject))
        .map(|row| row.value.clone())
        .collect()
}
