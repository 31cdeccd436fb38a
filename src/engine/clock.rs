//! Engine clocks
//!
//! The engine reads wall-clock time in whatever offset its host is
//! configured with. Everything stored or compared is normalized to UTC
//! first, so bucketing math never depends on a local time zone.

use chrono::{DateTime, Duration, FixedOffset, Local, Offset, Utc};
use parking_lot::Mutex;

/// Source of the engine's notion of "now".
pub trait Clock: Send + Sync {
    /// Current instant in the clock's own offset.
    fn now(&self) -> DateTime<FixedOffset>;

    /// Current instant normalized to UTC.
    fn now_utc(&self) -> DateTime<Utc> {
        self.now().with_timezone(&Utc)
    }
}

/// Host wall clock, reported in the host's local offset.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        DateTime::<FixedOffset>::from(Local::now())
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<FixedOffset>>,
}

impl ManualClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self::with_offset(at.with_timezone(&Utc.fix()))
    }

    /// A clock reporting instants in a non-UTC offset.
    pub fn with_offset(at: DateTime<FixedOffset>) -> Self {
        Self { now: Mutex::new(at) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut now = self.now.lock();
        let offset = *now.offset();
        *now = at.with_timezone(&offset);
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.now.lock()
    }
}
