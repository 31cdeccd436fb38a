//! Append-only versioned tables
//!
//! Rows are never updated in place. A write inserts a row stamped with
//! `created_xid`; superseding it stamps `deleted_xid` on the old row.
//! Indexes:
//! - `by_key`: `(domain key, created_xid)`, for point and range reads
//! - `by_deleted_xid`: tombstoned rows, for garbage collection
//! - `current`: rows no committed transaction has superseded yet

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use crate::revision::{Revision, Xid};

use super::observer::{QueryEvent, QueryObserver, ScanKind};

/// A value with a domain key.
pub trait Keyed {
    type Key: Ord + Clone + Debug + Send + Sync;

    fn key(&self) -> Self::Key;
}

/// Physical row identity.
pub type RowId = u64;

/// A stored version of a fact.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredRow<V> {
    pub value: V,
    pub created_xid: Xid,
    pub deleted_xid: Option<Xid>,
}

impl<V> StoredRow<V> {
    pub fn is_live_at(&self, revision: &Revision) -> bool {
        revision.is_live(self.created_xid, self.deleted_xid)
    }
}

pub struct VersionedTable<V: Keyed> {
    name: &'static str,
    rows: HashMap<RowId, StoredRow<V>>,
    by_key: BTreeMap<(V::Key, Xid), RowId>,
    by_deleted_xid: BTreeSet<(Xid, RowId)>,
    current: BTreeMap<V::Key, RowId>,
    next_row_id: RowId,
    observer: Option<Arc<dyn QueryObserver>>,
}

impl<V: Keyed> VersionedTable<V> {
    pub(crate) fn new(name: &'static str, observer: Option<Arc<dyn QueryObserver>>) -> Self {
        Self {
            name,
            rows: HashMap::new(),
            by_key: BTreeMap::new(),
            by_deleted_xid: BTreeSet::new(),
            current: BTreeMap::new(),
            next_row_id: 0,
            observer,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Number of physical rows, live or not.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn observe(&self, scan: ScanKind) {
        if let Some(observer) = &self.observer {
            observer.on_query(QueryEvent {
                table: self.name,
                scan,
            });
        }
    }

    /// The version of `key` live at `revision`, if any.
    pub fn visible(&self, key: &V::Key, revision: &Revision) -> Option<&StoredRow<V>> {
        self.observe(ScanKind::IndexRange { index: "by_key" });
        self.by_key
            .range((key.clone(), Xid::new(0))..=(key.clone(), Xid::new(u64::MAX)))
            .rev()
            .filter_map(|(_, id)| self.rows.get(id))
            .find(|row| row.is_live_at(revision))
    }

    /// Rows live at `revision`, ordered by key, starting at `start`.
    pub fn scan_visible<'a>(
        &'a self,
        start: &V::Key,
        revision: &'a Revision,
    ) -> impl Iterator<Item = &'a StoredRow<V>> + 'a {
        self.observe(ScanKind::IndexRange { index: "by_key" });
        self.by_key
            .range((start.clone(), Xid::new(0))..)
            .filter_map(move |(_, id)| self.rows.get(id))
            .filter(move |row| row.is_live_at(revision))
    }

    /// Every row live at `revision`, ordered by key.
    pub fn all_visible<'a>(&'a self, revision: &'a Revision) -> impl Iterator<Item = &'a StoredRow<V>> + 'a {
        self.observe(ScanKind::FullScan);
        self.by_key
            .values()
            .filter_map(move |id| self.rows.get(id))
            .filter(move |row| row.is_live_at(revision))
    }

    /// The row for `key` no committed transaction has superseded.
    pub fn current(&self, key: &V::Key) -> Option<&StoredRow<V>> {
        self.observe(ScanKind::IndexRange { index: "current" });
        self.current.get(key).and_then(|id| self.rows.get(id))
    }

    /// Unsuperseded rows ordered by key, starting at `start`.
    pub(crate) fn current_from<'a>(&'a self, start: &V::Key) -> impl Iterator<Item = &'a StoredRow<V>> + 'a {
        self.observe(ScanKind::IndexRange { index: "current" });
        self.current
            .range(start.clone()..)
            .filter_map(move |(_, id)| self.rows.get(id))
    }

    pub(crate) fn insert(&mut self, value: V, xid: Xid) -> RowId {
        let key = value.key();
        let id = self.next_row_id;
        self.next_row_id += 1;

        self.rows.insert(
            id,
            StoredRow {
                value,
                created_xid: xid,
                deleted_xid: None,
            },
        );
        self.by_key.insert((key.clone(), xid), id);
        self.current.insert(key, id);
        id
    }

    /// Tombstones the current row for `key`. Returns false if there is none.
    pub(crate) fn supersede(&mut self, key: &V::Key, xid: Xid) -> bool {
        let Some(id) = self.current.remove(key) else {
            return false;
        };
        if let Some(row) = self.rows.get_mut(&id) {
            row.deleted_xid = Some(xid);
            self.by_deleted_xid.insert((xid, id));
        }
        true
    }

    /// Up to `limit` tombstoned rows whose `deleted_xid` is below `bound`.
    pub(crate) fn deleted_before(&self, bound: Xid, limit: usize) -> Vec<RowId> {
        self.observe(ScanKind::IndexRange {
            index: "by_deleted_xid",
        });
        self.by_deleted_xid
            .range(..(bound, 0))
            .take(limit)
            .map(|(_, id)| *id)
            .collect()
    }

    /// Physically removes rows. Returns how many existed.
    pub(crate) fn remove(&mut self, ids: &[RowId]) -> usize {
        let mut removed = 0;
        for id in ids {
            let Some(row) = self.rows.remove(id) else {
                continue;
            };
            let key = row.value.key();
            self.by_key.remove(&(key.clone(), row.created_xid));
            if let Some(deleted) = row.deleted_xid {
                self.by_deleted_xid.remove(&(deleted, *id));
            }
            if self.current.get(&key) == Some(id) {
                self.current.remove(&key);
            }
            removed += 1;
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::observer::QueryRecorder;

    #[derive(Clone, Debug, PartialEq, Eq)]
    struct Named(&'static str, u32);

    impl Keyed for Named {
        type Key = &'static str;

        fn key(&self) -> &'static str {
            self.0
        }
    }

    fn rev(s: &str) -> Revision {
        s.parse().unwrap()
    }

    fn table() -> VersionedTable<Named> {
        VersionedTable::new("named", None)
    }

    #[test]
    fn test_supersede_keeps_history() {
        let mut t = table();
        t.insert(Named("a", 1), Xid::new(2));
        assert!(t.supersede(&"a", Xid::new(3)));
        t.insert(Named("a", 2), Xid::new(3));

        assert_eq!(t.len(), 2);
        assert_eq!(t.current(&"a").unwrap().value, Named("a", 2));

        // Before 3 the old version is live, after it the new one.
        assert_eq!(t.visible(&"a", &rev("2@3:3:")).unwrap().value.1, 1);
        assert_eq!(t.visible(&"a", &rev("3@4:4:")).unwrap().value.1, 2);
        assert!(t.visible(&"a", &rev("1@2:2:")).is_none());
    }

    #[test]
    fn test_supersede_missing_key() {
        let mut t = table();
        assert!(!t.supersede(&"missing", Xid::new(5)));
    }

    #[test]
    fn test_deleted_before_is_strict_and_bounded() {
        let mut t = table();
        for (i, name) in ["a", "b", "c"].into_iter().enumerate() {
            t.insert(Named(name, 0), Xid::new(2));
            t.supersede(&name, Xid::new(3 + i as u64));
        }

        assert_eq!(t.deleted_before(Xid::new(3), 10).len(), 0);
        assert_eq!(t.deleted_before(Xid::new(5), 10).len(), 2);
        assert_eq!(t.deleted_before(Xid::new(100), 1).len(), 1);
    }

    #[test]
    fn test_remove_cleans_indexes() {
        let mut t = table();
        t.insert(Named("a", 1), Xid::new(2));
        t.supersede(&"a", Xid::new(3));
        t.insert(Named("a", 2), Xid::new(3));

        let ids = t.deleted_before(Xid::new(4), 10);
        assert_eq!(t.remove(&ids), 1);
        assert_eq!(t.remove(&ids), 0);
        assert!(t.deleted_before(Xid::new(4), 10).is_empty());
        assert_eq!(t.visible(&"a", &rev("3@4:4:")).unwrap().value.1, 2);
        assert!(t.visible(&"a", &rev("2@3:3:")).is_none());
    }

    #[test]
    fn test_scan_visible_is_ordered() {
        let mut t = table();
        t.insert(Named("c", 0), Xid::new(2));
        t.insert(Named("a", 0), Xid::new(2));
        t.insert(Named("b", 0), Xid::new(3));

        let at = rev("2@3:3:");
        let keys: Vec<_> = t.scan_visible(&"a", &at).map(|r| r.value.0).collect();
        assert_eq!(keys, vec!["a", "c"]);

        let keys: Vec<_> = t.all_visible(&rev("3@4:4:")).map(|r| r.value.0).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_queries_report_access_path() {
        let recorder = Arc::new(QueryRecorder::new());
        let mut t: VersionedTable<Named> = VersionedTable::new("named", Some(recorder.clone() as Arc<dyn QueryObserver>));
        t.insert(Named("a", 0), Xid::new(2));

        t.deleted_before(Xid::new(9), 10);
        let _ = t.all_visible(&rev("2@3:3:")).count();

        let events = recorder.events();
        assert_eq!(
            events[0].scan,
            ScanKind::IndexRange {
                index: "by_deleted_xid"
            }
        );
        assert_eq!(events[1].scan, ScanKind::FullScan);
        assert!(events.iter().all(|e| e.table == "named"));
    }
}
