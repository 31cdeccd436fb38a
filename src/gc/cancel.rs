//! Cancellation for GC runs
//!
//! A run stops before its next chunk when the shutdown channel flips to
//! `true` or the deadline passes, whichever comes first.

use std::time::{Duration, Instant};

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Shutdown,
    DeadlineExceeded,
}

#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    shutdown: Option<watch::Receiver<bool>>,
    deadline: Option<Instant>,
}

impl CancelSignal {
    /// Never cancels.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn from_shutdown(shutdown: watch::Receiver<bool>) -> Self {
        Self {
            shutdown: Some(shutdown),
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Deadline `timeout` from now. Timeouts too large to represent mean
    /// no deadline.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    pub fn check(&self) -> Option<CancelReason> {
        if self.shutdown.as_ref().is_some_and(|rx| *rx.borrow()) {
            return Some(CancelReason::Shutdown);
        }
        if self.deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Some(CancelReason::DeadlineExceeded);
        }
        None
    }
}
