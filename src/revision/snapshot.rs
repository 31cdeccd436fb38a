//! Snapshot - the visibility set of a point-in-time view
//!
//! A snapshot answers exactly one question: "are the effects of xid X
//! observable here?". It is described by three values:
//!
//! - `xmin`: every xid below it has finished
//! - `xmax`: no xid at or above it is visible
//! - `xip`: the xids in `[xmin, xmax)` still in progress when captured
//!
//! Snapshots are normalized on construction, so two snapshots with the same
//! visibility set are structurally equal.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{RevisionError, RevisionResult};
use super::Xid;

/// Outcome of comparing the visibility sets of two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RevisionOrdering {
    /// Left sees strictly fewer transactions than right
    Less,
    /// Both see exactly the same transactions
    Equal,
    /// Left sees strictly more transactions than right
    Greater,
    /// Each side sees a transaction the other does not
    Concurrent,
}

impl RevisionOrdering {
    /// Maps to `std::cmp::Ordering`, or `None` when incomparable.
    pub fn as_ordering(&self) -> Option<Ordering> {
        match self {
            RevisionOrdering::Less => Some(Ordering::Less),
            RevisionOrdering::Equal => Some(Ordering::Equal),
            RevisionOrdering::Greater => Some(Ordering::Greater),
            RevisionOrdering::Concurrent => None,
        }
    }
}

/// An immutable transaction visibility set.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Snapshot {
    xmin: u64,
    xmax: u64,
    xip: Vec<u64>,
}

impl Snapshot {
    /// Builds a normalized snapshot.
    ///
    /// In-progress ids outside `[xmin, xmax)` carry no information and are
    /// dropped; `xmin > xmax` is clamped to `xmax`.
    pub fn new(xmin: Xid, xmax: Xid, xip: impl IntoIterator<Item = Xid>) -> Self {
        Self::normalized(xmin.value(), xmax.value(), xip.into_iter().map(|x| x.value()).collect())
    }

    fn normalized(xmin: u64, mut xmax: u64, mut xip: Vec<u64>) -> Self {
        let xmin = xmin.min(xmax);
        xip.retain(|x| *x >= xmin && *x < xmax);
        xip.sort_unstable();
        xip.dedup();

        // A trailing in-progress id is equivalent to a lower xmax.
        while let Some(&last) = xip.last() {
            if last + 1 != xmax {
                break;
            }
            xip.pop();
            xmax = last;
        }

        let xmin = xip.first().copied().unwrap_or(xmax);
        Self { xmin, xmax, xip }
    }

    /// Lowest xid that may still have been in progress.
    pub fn xmin(&self) -> Xid {
        Xid::new(self.xmin)
    }

    /// First xid that is not visible regardless of the in-progress list.
    pub fn xmax(&self) -> Xid {
        Xid::new(self.xmax)
    }

    /// In-progress xids, ascending.
    pub fn xip(&self) -> impl Iterator<Item = Xid> + '_ {
        self.xip.iter().map(|x| Xid::new(*x))
    }

    /// Whether `xid`'s effects are observable under this snapshot.
    pub fn is_visible(&self, xid: Xid) -> bool {
        let xid = xid.value();
        if xid < self.xmin {
            return true;
        }
        if xid >= self.xmax {
            return false;
        }
        self.xip.binary_search(&xid).is_err()
    }

    /// Returns a snapshot identical to this one except that `xid` is visible.
    ///
    /// Used by a committing transaction to describe the view that includes
    /// its own writes.
    pub fn mark_complete(&self, xid: Xid) -> Snapshot {
        if self.is_visible(xid) {
            return self.clone();
        }

        let txid = xid.value();
        let mut xip = self.xip.clone();
        let mut xmax = self.xmax;

        if txid >= xmax {
            xip.extend(xmax..txid);
            xmax = txid + 1;
        } else {
            xip.retain(|x| *x != txid);
        }

        Self::normalized(self.xmin, xmax, xip)
    }

    /// Compares visibility sets.
    ///
    /// Thanks to normalization `xmax - 1` is always visible, so "sees
    /// anything at or above the other's xmax" reduces to comparing xmax.
    pub fn compare(&self, other: &Snapshot) -> RevisionOrdering {
        let self_sees_more = self.xmax > other.xmax
            || other.xip.iter().any(|x| self.is_visible(Xid::new(*x)));
        let other_sees_more = other.xmax > self.xmax
            || self.xip.iter().any(|x| other.is_visible(Xid::new(*x)));

        match (self_sees_more, other_sees_more) {
            (true, true) => RevisionOrdering::Concurrent,
            (true, false) => RevisionOrdering::Greater,
            (false, true) => RevisionOrdering::Less,
            (false, false) => RevisionOrdering::Equal,
        }
    }
}

impl fmt::Display for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:", self.xmin, self.xmax)?;
        for (i, x) in self.xip.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}", x)?;
        }
        Ok(())
    }
}

impl FromStr for Snapshot {
    type Err = RevisionError;

    fn from_str(s: &str) -> RevisionResult<Self> {
        let mut parts = s.splitn(3, ':');
        let (Some(xmin), Some(xmax), Some(xip)) = (parts.next(), parts.next(), parts.next()) else {
            return Err(RevisionError::malformed_snapshot(s, "expected xmin:xmax:xip"));
        };

        let parse = |v: &str| {
            v.trim()
                .parse::<u64>()
                .map_err(|e| RevisionError::malformed_snapshot(s, e.to_string()))
        };

        let xmin = parse(xmin)?;
        let xmax = parse(xmax)?;
        if xmin > xmax {
            return Err(RevisionError::malformed_snapshot(s, "xmin is greater than xmax"));
        }

        let mut ids = Vec::new();
        if !xip.is_empty() {
            for id in xip.split(',') {
                let id = parse(id)?;
                if id < xmin || id >= xmax {
                    return Err(RevisionError::malformed_snapshot(
                        s,
                        format!("in-progress xid {} outside [{}, {})", id, xmin, xmax),
                    ));
                }
                ids.push(id);
            }
        }

        Ok(Self::normalized(xmin, xmax, ids))
    }
}

impl TryFrom<String> for Snapshot {
    type Error = RevisionError;

    fn try_from(value: String) -> RevisionResult<Self> {
        value.parse()
    }
}

impl From<Snapshot> for String {
    fn from(value: Snapshot) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(s: &str) -> Snapshot {
        s.parse().unwrap()
    }

    #[test]
    fn test_visibility_rule() {
        let s = snap("10:15:11,13");

        assert!(s.is_visible(Xid::new(3)));
        assert!(s.is_visible(Xid::new(10)));
        assert!(!s.is_visible(Xid::new(11)));
        assert!(s.is_visible(Xid::new(12)));
        assert!(!s.is_visible(Xid::new(13)));
        assert!(s.is_visible(Xid::new(14)));
        assert!(!s.is_visible(Xid::new(15)));
        assert!(!s.is_visible(Xid::new(100)));
    }

    #[test]
    fn test_normalization_trims_trailing_in_progress() {
        // 11 and 12 in progress right below xmax: same as xmax = 11
        let s = Snapshot::new(Xid::new(9), Xid::new(13), [Xid::new(11), Xid::new(12)]);
        assert_eq!(s.to_string(), "11:11:");
        assert_eq!(s, snap("11:11:"));
    }

    #[test]
    fn test_normalization_raises_xmin_to_first_in_progress() {
        let s = Snapshot::new(Xid::new(5), Xid::new(20), [Xid::new(12)]);
        assert_eq!(s.xmin(), Xid::new(12));
        assert!(s.is_visible(Xid::new(7)));
    }

    #[test]
    fn test_mark_complete_beyond_xmax() {
        // Own xid 10 in progress at begin
        let begin = snap("10:11:10");
        assert_eq!(begin, snap("10:10:"));

        let done = begin.mark_complete(Xid::new(10));
        assert!(done.is_visible(Xid::new(10)));
        assert_eq!(done.to_string(), "11:11:");
    }

    #[test]
    fn test_mark_complete_inside_xip() {
        let s = snap("10:15:10,12").mark_complete(Xid::new(12));
        assert!(s.is_visible(Xid::new(12)));
        assert!(!s.is_visible(Xid::new(10)));
        assert_eq!(s.to_string(), "10:15:10");
    }

    #[test]
    fn test_mark_complete_gap_stays_invisible() {
        let s = snap("5:5:").mark_complete(Xid::new(8));
        assert!(!s.is_visible(Xid::new(5)));
        assert!(!s.is_visible(Xid::new(7)));
        assert!(s.is_visible(Xid::new(8)));
    }

    #[test]
    fn test_mark_complete_already_visible_is_noop() {
        let s = snap("10:15:12");
        assert_eq!(s.mark_complete(Xid::new(3)), s);
    }

    #[test]
    fn test_compare_total_cases() {
        assert_eq!(snap("5:5:").compare(&snap("5:5:")), RevisionOrdering::Equal);
        assert_eq!(snap("5:5:").compare(&snap("7:7:")), RevisionOrdering::Less);
        assert_eq!(snap("7:7:").compare(&snap("5:5:")), RevisionOrdering::Greater);
        assert_eq!(snap("5:8:5").compare(&snap("8:8:")), RevisionOrdering::Less);
    }

    #[test]
    fn test_compare_concurrent() {
        // Left saw 10 finish but not 11; right saw 11 finish but not 10.
        let left = snap("11:11:");
        let right = snap("10:12:10");
        assert_eq!(left.compare(&right), RevisionOrdering::Concurrent);
        assert_eq!(right.compare(&left), RevisionOrdering::Concurrent);
        assert_eq!(RevisionOrdering::Concurrent.as_ordering(), None);
    }

    #[test]
    fn test_compare_gap_above_other_xmax() {
        // Left sees 6 but not 5; right sees neither.
        let left = snap("5:7:5");
        let right = snap("5:5:");
        assert_eq!(left.compare(&right), RevisionOrdering::Greater);
    }

    #[test]
    fn test_text_round_trip_and_serde() {
        let s = snap("10:15:11,13");
        assert_eq!(s.to_string(), "10:15:11,13");

        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, "\"10:15:11,13\"");
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!("".parse::<Snapshot>().is_err());
        assert!("1:2".parse::<Snapshot>().is_err());
        assert!("x:2:".parse::<Snapshot>().is_err());
        assert!("9:2:".parse::<Snapshot>().is_err());
        assert!("2:9:12".parse::<Snapshot>().is_err());
        assert!(serde_json::from_str::<Snapshot>("\"nope\"").is_err());
    }
}
