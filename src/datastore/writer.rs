//! Write path
//!
//! A read-write transaction stages its writes as per-key intents. Nothing
//! touches the tables until commit, when the intents are validated and then
//! applied under the engine lock: superseded rows get `deleted_xid = xid`,
//! new rows get `created_xid = xid`.
//!
//! First committer wins. Every key a transaction writes must still have, at
//! commit, the row it had at the transaction's begin snapshot; otherwise the
//! commit fails with `Conflict`. This keeps at most one row per key live at
//! any revision.
//!
//! Reads inside the transaction see its begin snapshot overlaid with its
//! own staged intents.

use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::engine::{EngineState, Keyed, Session, VersionedTable};
use crate::model::{
    CaveatDefinition, NamespaceDefinition, Relationship, RelationshipKey, RelationshipUpdate,
    RelationshipsFilter, SubjectsFilter, UpdateOperation,
};
use crate::revision::{Revision, Snapshot, Xid};

use super::errors::{DatastoreError, DatastoreResult, DefinitionKind};
use super::reader::{self, Reader, RevisionedDefinition};

#[derive(Debug, Clone)]
enum Intent<V> {
    /// Replace whatever is current. `must_be_absent` rejects the write if
    /// a current row exists at commit.
    Write { value: V, must_be_absent: bool },
    Delete,
}

struct Staged<V: Keyed> {
    intents: BTreeMap<V::Key, Intent<V>>,
}

impl<V: Keyed> Default for Staged<V> {
    fn default() -> Self {
        Self {
            intents: BTreeMap::new(),
        }
    }
}

impl<V: Keyed> Staged<V> {
    fn write(&mut self, value: V) {
        self.intents.insert(
            value.key(),
            Intent::Write {
                value,
                must_be_absent: false,
            },
        );
    }

    fn delete(&mut self, key: V::Key) {
        self.intents.insert(key, Intent::Delete);
    }

    fn get(&self, key: &V::Key) -> Option<&Intent<V>> {
        self.intents.get(key)
    }

    /// First staged key whose row changed since `view`.
    fn first_conflict(&self, table: &VersionedTable<V>, view: &Revision) -> Option<&V::Key> {
        self.intents.keys().find(|key| !unchanged_since(table, key, view))
    }

    /// Supersedes or inserts per intent. Returns (written, deleted).
    fn apply(self, table: &mut VersionedTable<V>, xid: Xid) -> (usize, usize) {
        let (mut written, mut deleted) = (0, 0);
        for (key, intent) in self.intents {
            match intent {
                Intent::Write { value, .. } => {
                    table.supersede(&key, xid);
                    table.insert(value, xid);
                    written += 1;
                }
                Intent::Delete => {
                    if table.supersede(&key, xid) {
                        deleted += 1;
                    }
                }
            }
        }
        (written, deleted)
    }
}

/// Whether the row live at `view` for `key` is still the current one.
///
/// A row id is unique per `(key, created_xid)`, so comparing creators is
/// enough. A concurrent delete leaves no current row, a concurrent write
/// leaves a current row the view cannot see.
fn unchanged_since<V: Keyed>(table: &VersionedTable<V>, key: &V::Key, view: &Revision) -> bool {
    let seen = table.visible(key, view).map(|row| row.created_xid);
    let current = table.current(key).map(|row| row.created_xid);
    seen == current
}

fn relationship_name(key: &RelationshipKey) -> String {
    Relationship::new(key.resource.clone(), key.subject.clone()).to_string()
}

/// Everything a read-write transaction has staged.
#[derive(Default)]
pub(crate) struct StagedWrites {
    relationships: Staged<Relationship>,
    relationship_filters: Vec<RelationshipsFilter>,
    namespaces: Staged<NamespaceDefinition>,
    caveats: Staged<CaveatDefinition>,
}

impl StagedWrites {
    fn filtered(&self, key: &RelationshipKey) -> bool {
        self.relationship_filters.iter().any(|f| f.matches(key))
    }

    /// Keys live at `view` that the staged filters delete.
    fn filtered_keys(&self, state: &EngineState, view: &Revision) -> BTreeSet<RelationshipKey> {
        let mut keys = BTreeSet::new();
        for filter in &self.relationship_filters {
            keys.extend(
                state
                    .relationships
                    .scan_visible(&filter.scan_start(), view)
                    .take_while(|row| !filter.scan_exhausted(&row.value.key))
                    .filter(|row| filter.matches(&row.value.key))
                    .map(|row| row.value.key.clone()),
            );
        }
        keys
    }

    /// Validates against the rows `view` saw, then applies. On error
    /// nothing has been mutated.
    pub(crate) fn apply(self, state: &mut EngineState, xid: Xid, view: &Revision) -> DatastoreResult<()> {
        for (key, intent) in &self.relationships.intents {
            if let Intent::Write {
                value,
                must_be_absent: true,
            } = intent
            {
                if state.relationships.current(key).is_some() && !self.filtered(key) {
                    return Err(DatastoreError::AlreadyExists(value.to_string()));
                }
            }
        }

        let doomed = self.filtered_keys(state, view);
        if let Some(key) = doomed
            .iter()
            .find(|key| !unchanged_since(&state.relationships, key, view))
            .or_else(|| self.relationships.first_conflict(&state.relationships, view))
        {
            return Err(DatastoreError::Conflict(relationship_name(key)));
        }
        if let Some(name) = self
            .namespaces
            .first_conflict(&state.namespaces, view)
            .or_else(|| self.caveats.first_conflict(&state.caveats, view))
        {
            return Err(DatastoreError::Conflict(name.clone()));
        }

        let mut filtered_out = 0;
        for key in &doomed {
            if state.relationships.supersede(key, xid) {
                filtered_out += 1;
            }
        }

        let (rels_written, rels_deleted) = self.relationships.apply(&mut state.relationships, xid);
        let (ns_written, ns_deleted) = self.namespaces.apply(&mut state.namespaces, xid);
        let (caveats_written, caveats_deleted) = self.caveats.apply(&mut state.caveats, xid);

        debug!(
            xid = %xid,
            relationships_written = rels_written,
            relationships_deleted = rels_deleted + filtered_out,
            namespaces_written = ns_written,
            namespaces_deleted = ns_deleted,
            caveats_written = caveats_written,
            caveats_deleted = caveats_deleted,
            "applied staged writes"
        );
        Ok(())
    }
}

/// Handle passed to `Datastore::read_write_tx` callbacks.
pub struct ReadWriteTransaction<'a> {
    session: &'a Session<'a>,
    xid: Xid,
    /// Begin snapshot; the transaction's own xid is not visible in it.
    view: Revision,
    staged: StagedWrites,
}

impl<'a> ReadWriteTransaction<'a> {
    pub(crate) fn new(session: &'a Session<'a>, xid: Xid, begin: Snapshot) -> Self {
        Self {
            session,
            xid,
            view: Revision::new(xid, begin),
            staged: StagedWrites::default(),
        }
    }

    /// The xid every row written here will be stamped with.
    pub fn xid(&self) -> Xid {
        self.xid
    }

    /// The staged writes and the view they were made against.
    pub(crate) fn into_staged(self) -> (StagedWrites, Revision) {
        (self.staged, self.view)
    }

    fn base_relationship_live(&self, key: &RelationshipKey) -> bool {
        self.session
            .read(|state| state.relationships.visible(key, &self.view).is_some())
    }

    /// Applies relationship updates in order.
    ///
    /// `Create` fails with `AlreadyExists` when the relationship is live,
    /// `Touch` writes whether or not it is live, `Delete` removes it if
    /// present. All three fail at commit with `Conflict` when a concurrent
    /// transaction changed the same relationship first.
    pub fn write_relationships(
        &mut self,
        updates: impl IntoIterator<Item = RelationshipUpdate>,
    ) -> DatastoreResult<()> {
        for update in updates {
            let relationship = update.relationship;
            let key = relationship.key.clone();
            match update.operation {
                UpdateOperation::Create => {
                    let must_be_absent = match self.staged.relationships.get(&key) {
                        Some(Intent::Write { .. }) => {
                            return Err(DatastoreError::AlreadyExists(relationship.to_string()));
                        }
                        Some(Intent::Delete) => false,
                        None if self.staged.filtered(&key) => false,
                        None => {
                            if self.base_relationship_live(&key) {
                                return Err(DatastoreError::AlreadyExists(relationship.to_string()));
                            }
                            true
                        }
                    };
                    self.staged.relationships.intents.insert(
                        key,
                        Intent::Write {
                            value: relationship,
                            must_be_absent,
                        },
                    );
                }
                UpdateOperation::Touch => self.staged.relationships.write(relationship),
                UpdateOperation::Delete => self.staged.relationships.delete(key),
            }
        }
        Ok(())
    }

    /// Deletes every relationship matching `filter` that is live at this
    /// transaction's begin snapshot, plus matching ones staged here.
    /// Commit fails with `Conflict` if another transaction changed one of
    /// them in the meantime.
    pub fn delete_relationships(&mut self, filter: RelationshipsFilter) -> DatastoreResult<()> {
        let staged_matches: Vec<RelationshipKey> = self
            .staged
            .relationships
            .intents
            .iter()
            .filter(|(key, intent)| matches!(intent, Intent::Write { .. }) && filter.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        for key in staged_matches {
            self.staged.relationships.delete(key);
        }
        self.staged.relationship_filters.push(filter);
        Ok(())
    }

    pub fn write_namespaces(
        &mut self,
        definitions: impl IntoIterator<Item = NamespaceDefinition>,
    ) -> DatastoreResult<()> {
        for definition in definitions {
            definition.validate()?;
            self.staged.namespaces.write(definition);
        }
        Ok(())
    }

    /// Deletes namespaces and every relationship whose resource is of
    /// that type. Fails with `NotFound` if a namespace does not exist.
    pub fn delete_namespaces(&mut self, names: &[&str]) -> DatastoreResult<()> {
        for name in names {
            self.read_namespace(name)?;
            self.staged.namespaces.delete(name.to_string());
            self.delete_relationships(RelationshipsFilter::new(*name))?;
        }
        Ok(())
    }

    pub fn write_caveats(
        &mut self,
        definitions: impl IntoIterator<Item = CaveatDefinition>,
    ) -> DatastoreResult<()> {
        for definition in definitions {
            definition.validate()?;
            self.staged.caveats.write(definition);
        }
        Ok(())
    }

    /// Deletes caveats. Names that do not exist are ignored.
    pub fn delete_caveats(&mut self, names: &[&str]) -> DatastoreResult<()> {
        for name in names {
            self.staged.caveats.delete(name.to_string());
        }
        Ok(())
    }

    fn overlay_definition<V>(
        &self,
        staged: &Staged<V>,
        name: &str,
        base: impl FnOnce(&EngineState) -> Option<RevisionedDefinition<V>>,
    ) -> Option<RevisionedDefinition<V>>
    where
        V: Keyed<Key = String> + Clone,
    {
        match staged.get(&name.to_string()) {
            Some(Intent::Write { value, .. }) => Some(RevisionedDefinition {
                definition: value.clone(),
                last_written: self.xid,
            }),
            Some(Intent::Delete) => None,
            None => self.session.read(base),
        }
    }

    fn overlay_list<V>(&self, staged: &Staged<V>, base: Vec<RevisionedDefinition<V>>) -> Vec<RevisionedDefinition<V>>
    where
        V: Keyed<Key = String> + Clone,
    {
        let mut merged: BTreeMap<String, RevisionedDefinition<V>> = base
            .into_iter()
            .map(|d| (d.definition.key(), d))
            .collect();
        for (name, intent) in &staged.intents {
            match intent {
                Intent::Write { value, .. } => {
                    merged.insert(
                        name.clone(),
                        RevisionedDefinition {
                            definition: value.clone(),
                            last_written: self.xid,
                        },
                    );
                }
                Intent::Delete => {
                    merged.remove(name);
                }
            }
        }
        merged.into_values().collect()
    }

    fn overlay_relationships(
        &self,
        base: Vec<Relationship>,
        keep: impl Fn(&RelationshipKey) -> bool,
    ) -> Vec<Relationship> {
        let mut merged: BTreeMap<RelationshipKey, Relationship> = base
            .into_iter()
            .filter(|r| !self.staged.filtered(&r.key))
            .map(|r| (r.key.clone(), r))
            .collect();
        for (key, intent) in &self.staged.relationships.intents {
            match intent {
                Intent::Write { value, .. } if keep(key) => {
                    merged.insert(key.clone(), value.clone());
                }
                _ => {
                    merged.remove(key);
                }
            }
        }
        merged.into_values().collect()
    }
}

impl Reader for ReadWriteTransaction<'_> {
    fn revision(&self) -> &Revision {
        &self.view
    }

    fn read_namespace(&self, name: &str) -> DatastoreResult<RevisionedDefinition<NamespaceDefinition>> {
        self.overlay_definition(&self.staged.namespaces, name, |state| {
            reader::read_definition(&state.namespaces, name, &self.view)
        })
        .ok_or_else(|| reader::not_found(DefinitionKind::Namespace, name, &self.view))
    }

    fn list_namespaces(&self) -> DatastoreResult<Vec<RevisionedDefinition<NamespaceDefinition>>> {
        let base = self
            .session
            .read(|state| reader::list_definitions(&state.namespaces, &self.view));
        Ok(self.overlay_list(&self.staged.namespaces, base))
    }

    fn lookup_namespaces(&self, names: &[&str]) -> DatastoreResult<Vec<RevisionedDefinition<NamespaceDefinition>>> {
        Ok(names
            .iter()
            .filter_map(|name| self.read_namespace(name).ok())
            .collect())
    }

    fn read_caveat(&self, name: &str) -> DatastoreResult<RevisionedDefinition<CaveatDefinition>> {
        self.overlay_definition(&self.staged.caveats, name, |state| {
            reader::read_definition(&state.caveats, name, &self.view)
        })
        .ok_or_else(|| reader::not_found(DefinitionKind::Caveat, name, &self.view))
    }

    fn list_caveats(&self) -> DatastoreResult<Vec<RevisionedDefinition<CaveatDefinition>>> {
        let base = self
            .session
            .read(|state| reader::list_definitions(&state.caveats, &self.view));
        Ok(self.overlay_list(&self.staged.caveats, base))
    }

    fn lookup_caveats(&self, names: &[&str]) -> DatastoreResult<Vec<RevisionedDefinition<CaveatDefinition>>> {
        Ok(names
            .iter()
            .filter_map(|name| self.read_caveat(name).ok())
            .collect())
    }

    fn read_relationship(&self, key: &RelationshipKey) -> DatastoreResult<Relationship> {
        let found = match self.staged.relationships.get(key) {
            Some(Intent::Write { value, .. }) => Some(value.clone()),
            Some(Intent::Delete) => None,
            None if self.staged.filtered(key) => None,
            None => self.session.read(|state| {
                state
                    .relationships
                    .visible(key, &self.view)
                    .map(|row| row.value.clone())
            }),
        };
        found.ok_or_else(|| reader::relationship_not_found(key, &self.view))
    }

    fn query_relationships(&self, filter: &RelationshipsFilter) -> DatastoreResult<Vec<Relationship>> {
        let base = self
            .session
            .read(|state| reader::query(&state.relationships, filter, &self.view));
        Ok(self.overlay_relationships(base, |key| filter.matches(key)))
    }

    fn reverse_query_relationships(&self, filter: &SubjectsFilter) -> DatastoreResult<Vec<Relationship>> {
        let base = self
            .session
            .read(|state| reader::reverse_query(&state.relationships, filter, &self.view));
        Ok(self.overlay_relationships(base, |key| filter.matches(&key.subject)))
    }
}
