//! Revision & Snapshot model
//!
//! A `Revision` identifies a consistent point-in-time view of the store:
//! a reference transaction plus the snapshot that decides visibility.
//!
//! Transaction ids are allocated at begin but become visible at commit, so
//! two transactions may be allocated in one order and commit in the other.
//! Revisions are therefore only partially ordered: revisions of
//! transactions whose lifetimes overlapped compare as
//! `RevisionOrdering::Concurrent`, never equal and never greater.
//!
//! This module provides:
//! - `Xid` - Engine-assigned transaction identity
//! - `Snapshot` - Visibility set (`xmin:xmax:xip`)
//! - `Revision` - (reference xid, snapshot) with visibility ordering
//! - `token` - Opaque client-facing revision tokens

mod errors;
mod snapshot;
pub mod token;
mod xid;

pub use errors::{RevisionError, RevisionResult};
pub use snapshot::{RevisionOrdering, Snapshot};
pub use xid::Xid;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Comparison capability shared by every revision representation.
pub trait RevisionOrder {
    /// Both revisions observe exactly the same set of transactions.
    fn equal(&self, other: &Self) -> bool;

    /// This revision observes everything `other` does, and more.
    fn greater_than(&self, other: &Self) -> bool;

    /// `other` observes everything this revision does, and more.
    fn less_than(&self, other: &Self) -> bool;
}

/// An immutable point-in-time identifier.
///
/// `==` is structural. Use [`RevisionOrder`] or [`Revision::compare`] for
/// visibility-based comparison.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Revision {
    xid: Xid,
    snapshot: Snapshot,
}

impl Revision {
    pub fn new(xid: Xid, snapshot: Snapshot) -> Self {
        Self { xid, snapshot }
    }

    /// The reference transaction.
    pub fn xid(&self) -> Xid {
        self.xid
    }

    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    /// Whether the effects of `xid` are observable at this revision.
    pub fn is_visible(&self, xid: Xid) -> bool {
        self.snapshot.is_visible(xid)
    }

    /// Whether a row created by `created` and optionally tombstoned by
    /// `deleted` is live at this revision.
    pub fn is_live(&self, created: Xid, deleted: Option<Xid>) -> bool {
        self.is_visible(created) && !deleted.is_some_and(|d| self.is_visible(d))
    }

    pub fn compare(&self, other: &Revision) -> RevisionOrdering {
        self.snapshot.compare(&other.snapshot)
    }
}

impl RevisionOrder for Revision {
    fn equal(&self, other: &Self) -> bool {
        self.compare(other) == RevisionOrdering::Equal
    }

    fn greater_than(&self, other: &Self) -> bool {
        self.compare(other) == RevisionOrdering::Greater
    }

    fn less_than(&self, other: &Self) -> bool {
        self.compare(other) == RevisionOrdering::Less
    }
}

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.xid, self.snapshot)
    }
}

impl FromStr for Revision {
    type Err = RevisionError;

    fn from_str(s: &str) -> RevisionResult<Self> {
        let (xid, snapshot) = s
            .split_once('@')
            .ok_or_else(|| RevisionError::malformed(s, "expected xid@snapshot"))?;
        let xid = xid
            .parse::<Xid>()
            .map_err(|e| RevisionError::malformed(s, e.to_string()))?;
        let snapshot = snapshot.parse::<Snapshot>()?;
        Ok(Self { xid, snapshot })
    }
}

impl TryFrom<String> for Revision {
    type Error = RevisionError;

    fn try_from(value: String) -> RevisionResult<Self> {
        value.parse()
    }
}

impl From<Revision> for String {
    fn from(value: Revision) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rev(s: &str) -> Revision {
        s.parse().unwrap()
    }

    #[test]
    fn test_sequential_revisions_are_ordered() {
        let first = rev("10@11:11:");
        let second = rev("11@12:12:");

        assert!(second.greater_than(&first));
        assert!(first.less_than(&second));
        assert!(!first.equal(&second));
    }

    #[test]
    fn test_overlapping_revisions_are_incomparable() {
        // 10 began first and committed last; 11 committed while 10 ran.
        let committed_last = rev("10@11:11:");
        let committed_first = rev("11@10:12:10");

        assert!(!committed_first.greater_than(&committed_last));
        assert!(!committed_last.greater_than(&committed_first));
        assert!(!committed_first.equal(&committed_last));
        assert_eq!(
            committed_first.compare(&committed_last),
            RevisionOrdering::Concurrent
        );
    }

    #[test]
    fn test_equal_by_visibility_not_structure() {
        // Same visibility set reached from different reference xids.
        let a = rev("12@13:13:");
        let b = rev("9@13:13:");
        assert!(a.equal(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn test_is_live() {
        let r = rev("20@18:21:18");

        assert!(r.is_live(Xid::new(5), None));
        assert!(r.is_live(Xid::new(5), Some(Xid::new(18))));
        assert!(!r.is_live(Xid::new(5), Some(Xid::new(17))));
        assert!(!r.is_live(Xid::new(18), None));
        assert!(!r.is_live(Xid::new(21), None));
    }

    #[test]
    fn test_text_and_serde_form() {
        let r = rev("42@41:43:41");
        assert_eq!(r.to_string(), "42@41:43:41");

        let json = serde_json::to_string(&r).unwrap();
        let back: Revision = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_decode_failure_is_an_error_value() {
        assert!(matches!(
            "42".parse::<Revision>(),
            Err(RevisionError::Malformed { .. })
        ));
        assert!(matches!(
            "x@1:1:".parse::<Revision>(),
            Err(RevisionError::Malformed { .. })
        ));
        assert!(matches!(
            "4@1:x:".parse::<Revision>(),
            Err(RevisionError::MalformedSnapshot { .. })
        ));
    }
}
