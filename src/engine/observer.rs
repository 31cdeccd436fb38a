//! Query observation
//!
//! Every table access inside the engine reports which access path it used.
//! Production code runs without an observer; tests install a
//! [`QueryRecorder`] to check that hot paths stay on indexes.

use parking_lot::Mutex;

/// Access path used by a table query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanKind {
    /// Range over a B-tree index
    IndexRange { index: &'static str },
    /// Visits every row of the table
    FullScan,
}

impl ScanKind {
    pub fn uses_index(&self) -> bool {
        matches!(self, ScanKind::IndexRange { .. })
    }
}

/// One observed table access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueryEvent {
    pub table: &'static str,
    pub scan: ScanKind,
}

/// Receives table access events.
pub trait QueryObserver: Send + Sync {
    fn on_query(&self, event: QueryEvent);
}

/// Observer that keeps every event in memory.
#[derive(Debug, Default)]
pub struct QueryRecorder {
    events: Mutex<Vec<QueryEvent>>,
}

impl QueryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<QueryEvent> {
        self.events.lock().clone()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl QueryObserver for QueryRecorder {
    fn on_query(&self, event: QueryEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recorder_collects_and_clears() {
        let recorder = QueryRecorder::new();
        recorder.on_query(QueryEvent {
            table: "relation_tuple",
            scan: ScanKind::IndexRange {
                index: "by_deleted_xid",
            },
        });
        recorder.on_query(QueryEvent {
            table: "relation_tuple",
            scan: ScanKind::FullScan,
        });

        let events = recorder.events();
        assert_eq!(events.len(), 2);
        assert!(events[0].scan.uses_index());
        assert!(!events[1].scan.uses_index());

        recorder.clear();
        assert!(recorder.events().is_empty());
    }
}
