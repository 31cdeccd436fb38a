//! Xid - Engine-assigned transaction identity
//!
//! - Allocated once per mutating transaction, at transaction start
//! - Allocation order is NOT commit order
//! - Never reused, never updated
//!
//! Ordering on `Xid` is allocation order only. Whether one transaction's
//! effects are visible to another is answered by a `Snapshot`, never by
//! comparing two xids.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An opaque 64-bit transaction identity.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Xid(u64);

impl Xid {
    /// The xid of the bootstrap transaction written when an engine is created.
    pub const BOOTSTRAP: Xid = Xid(1);

    /// Creates a new Xid with the given value.
    #[inline]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the underlying value.
    ///
    /// This accessor exists for encoding and index keys.
    #[inline]
    pub fn value(&self) -> u64 {
        self.0
    }

    /// The next xid in allocation order.
    #[inline]
    pub fn next(&self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Xid {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Xid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xid_requires_explicit_construction() {
        let xid = Xid::new(42);
        assert_eq!(xid.value(), 42);
    }

    #[test]
    fn test_xid_next() {
        assert_eq!(Xid::new(7).next(), Xid::new(8));
        assert_eq!(Xid::BOOTSTRAP.next().value(), 2);
    }

    #[test]
    fn test_xid_text_form() {
        let xid: Xid = "123".parse().unwrap();
        assert_eq!(xid, Xid::new(123));
        assert_eq!(xid.to_string(), "123");
        assert!("abc".parse::<Xid>().is_err());
    }

    #[test]
    fn test_xid_serializes_as_number() {
        let json = serde_json::to_string(&Xid::new(9)).unwrap();
        assert_eq!(json, "9");
    }
}
