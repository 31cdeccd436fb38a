//! Transaction log
//!
//! One record per committed read-write transaction, never updated.
//! Indexed by xid (for GC and point lookups) and by commit timestamp (for
//! head resolution). The timestamp index is tie-broken by commit order.
//!
//! Xids are allocated at begin but logged at commit, so xid order and
//! timestamp order disagree for overlapping transactions. Each timestamp
//! entry therefore also carries the lowest xid at or after it, which makes
//! "lowest xid committed since t" a single lookup.

use std::collections::BTreeMap;
use std::ops::Bound::{Excluded, Unbounded};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::revision::{Revision, Snapshot, Xid};

use super::observer::{QueryEvent, QueryObserver, ScanKind};

pub(crate) const TRANSACTION_TABLE: &str = "relation_tuple_transaction";

/// A committed transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub xid: Xid,
    /// Commit instant, always UTC
    pub timestamp: DateTime<Utc>,
    /// Engine snapshot captured at the commit instant; sees `xid` itself
    pub snapshot: Snapshot,
}

impl TransactionRecord {
    /// The revision observing this transaction and everything committed before it.
    pub fn revision(&self) -> Revision {
        Revision::new(self.xid, self.snapshot.clone())
    }
}

struct Entry {
    record: TransactionRecord,
    seq: u64,
}

type TimestampKey = (DateTime<Utc>, u64);

struct TimestampSlot {
    xid: Xid,
    /// Lowest xid among this entry and every later one.
    floor: Xid,
}

pub struct TransactionLog {
    by_xid: BTreeMap<Xid, Entry>,
    by_timestamp: BTreeMap<TimestampKey, TimestampSlot>,
    next_seq: u64,
    last_committed: Option<Xid>,
    observer: Option<Arc<dyn QueryObserver>>,
}

impl TransactionLog {
    pub(crate) fn new(observer: Option<Arc<dyn QueryObserver>>) -> Self {
        Self {
            by_xid: BTreeMap::new(),
            by_timestamp: BTreeMap::new(),
            next_seq: 0,
            last_committed: None,
            observer,
        }
    }

    fn observe(&self, scan: ScanKind) {
        if let Some(observer) = &self.observer {
            observer.on_query(QueryEvent {
                table: TRANSACTION_TABLE,
                scan,
            });
        }
    }

    pub fn len(&self) -> usize {
        self.by_xid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_xid.is_empty()
    }

    pub(crate) fn append(&mut self, record: TransactionRecord) {
        let seq = self.next_seq;
        self.next_seq += 1;
        let key = (record.timestamp, seq);
        self.by_timestamp.insert(
            key,
            TimestampSlot {
                xid: record.xid,
                floor: record.xid,
            },
        );
        self.refloor(key);
        self.last_committed = Some(record.xid);
        self.by_xid.insert(record.xid, Entry { record, seq });
    }

    /// Recomputes floors from `from` backwards. Stops at the first earlier
    /// entry whose floor does not change, since nothing before it can.
    fn refloor(&mut self, from: TimestampKey) {
        let mut next_floor = self
            .by_timestamp
            .range((Excluded(from), Unbounded))
            .next()
            .map(|(_, slot)| slot.floor);
        for (i, (_, slot)) in self.by_timestamp.range_mut(..=from).rev().enumerate() {
            let floor = next_floor.map_or(slot.xid, |next| next.min(slot.xid));
            if i > 0 && floor == slot.floor {
                break;
            }
            slot.floor = floor;
            next_floor = Some(floor);
        }
    }

    pub fn get(&self, xid: Xid) -> Option<&TransactionRecord> {
        self.observe(ScanKind::IndexRange { index: "by_xid" });
        self.by_xid.get(&xid).map(|e| &e.record)
    }

    /// Most recently committed transaction.
    pub fn latest(&self) -> Option<&TransactionRecord> {
        match self.last_committed.and_then(|xid| self.by_xid.get(&xid)) {
            Some(entry) => Some(&entry.record),
            None => self
                .by_timestamp
                .values()
                .next_back()
                .and_then(|slot| self.get(slot.xid)),
        }
    }

    /// Latest transaction committed strictly before `ts`.
    pub fn latest_before(&self, ts: DateTime<Utc>) -> Option<&TransactionRecord> {
        self.observe(ScanKind::IndexRange {
            index: "by_timestamp",
        });
        self.by_timestamp
            .range(..(ts, 0))
            .next_back()
            .and_then(|(_, slot)| self.by_xid.get(&slot.xid))
            .map(|e| &e.record)
    }

    /// Oldest transaction still in the log.
    pub fn oldest(&self) -> Option<&TransactionRecord> {
        self.observe(ScanKind::IndexRange {
            index: "by_timestamp",
        });
        self.by_timestamp
            .values()
            .next()
            .and_then(|slot| self.by_xid.get(&slot.xid))
            .map(|e| &e.record)
    }

    /// Lowest xid committed at or after `ts`.
    pub fn min_xid_since(&self, ts: DateTime<Utc>) -> Option<Xid> {
        self.observe(ScanKind::IndexRange {
            index: "by_timestamp",
        });
        self.by_timestamp
            .range((ts, 0)..)
            .next()
            .map(|(_, slot)| slot.floor)
    }

    /// Up to `limit` xids strictly below `bound`.
    pub(crate) fn xids_before(&self, bound: Xid, limit: usize) -> Vec<Xid> {
        self.observe(ScanKind::IndexRange { index: "by_xid" });
        self.by_xid.range(..bound).take(limit).map(|(xid, _)| *xid).collect()
    }

    pub(crate) fn remove(&mut self, xids: &[Xid]) -> usize {
        let mut removed = 0;
        for xid in xids {
            let Some(entry) = self.by_xid.remove(xid) else {
                continue;
            };
            let key = (entry.record.timestamp, entry.seq);
            self.by_timestamp.remove(&key);
            let before = self.by_timestamp.range(..key).next_back().map(|(k, _)| *k);
            if let Some(before) = before {
                self.refloor(before);
            }
            if self.last_committed == Some(*xid) {
                self.last_committed = None;
            }
            removed += 1;
        }
        removed
    }

    /// Records ordered by xid.
    pub fn iter(&self) -> impl Iterator<Item = &TransactionRecord> {
        self.by_xid.values().map(|e| &e.record)
    }
}
