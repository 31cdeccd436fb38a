//! Observability
//!
//! - `tracing` events throughout the crate; `logging` installs a subscriber
//! - `GcMetrics` counters for garbage collection
//!
//! Observability is read-only: nothing here influences datastore behavior.

pub mod logging;
mod metrics;

pub use metrics::{GcMetrics, GcMetricsSnapshot};
