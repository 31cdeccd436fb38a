//! Background GC worker
//!
//! Sleeps for the configured interval, runs one pass on the blocking pool
//! with a deadline, and repeats. Consecutive failures stretch the sleep
//! exponentially, with jitter, up to `MAX_BACKOFF_FACTOR` intervals. A
//! `true` on the shutdown channel stops the loop and cancels a running
//! pass before its next chunk.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{error, info, warn};

use crate::datastore::{Datastore, DatastoreConfig};
use crate::observability::GcMetrics;

use super::cancel::CancelSignal;
use super::{run_garbage_collection, GarbageCollector};

const MAX_BACKOFF_FACTOR: u32 = 32;
const MAX_JITTER: f64 = 0.1;

/// Timing of background passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcSchedule {
    pub interval: Duration,
    pub window: Duration,
    pub max_operation_time: Duration,
}

impl GcSchedule {
    pub fn from_config(config: &DatastoreConfig) -> Self {
        Self {
            interval: config.gc_interval,
            window: config.gc_window,
            max_operation_time: config.gc_max_operation_time,
        }
    }

    /// Sleep before the next pass after `failures` consecutive failures.
    fn delay(&self, failures: u32) -> Duration {
        if failures == 0 {
            return self.interval;
        }
        let factor = 2u32
            .saturating_pow(failures.min(MAX_BACKOFF_FACTOR.trailing_zeros()))
            .min(MAX_BACKOFF_FACTOR);
        let base = self.interval.saturating_mul(factor);
        let jitter = rand::thread_rng().gen_range(0.0..=MAX_JITTER);
        Duration::try_from_secs_f64(base.as_secs_f64() * (1.0 + jitter)).unwrap_or(base)
    }
}

pub struct GcWorker<G: GarbageCollector + 'static> {
    gc: Arc<G>,
    schedule: GcSchedule,
    metrics: Arc<GcMetrics>,
}

impl GcWorker<Datastore> {
    /// Worker for `datastore` using its configuration. `None` when GC is
    /// disabled.
    pub fn for_datastore(datastore: Arc<Datastore>) -> Option<Self> {
        if !datastore.config().gc_enabled {
            info!("garbage collection disabled");
            return None;
        }
        let schedule = GcSchedule::from_config(datastore.config());
        Some(Self::new(datastore, schedule))
    }
}

impl<G: GarbageCollector + 'static> GcWorker<G> {
    pub fn new(gc: Arc<G>, schedule: GcSchedule) -> Self {
        Self {
            gc,
            schedule,
            metrics: Arc::new(GcMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<GcMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> &Arc<GcMetrics> {
        &self.metrics
    }

    /// Starts the loop on the current tokio runtime.
    pub fn spawn(self) -> GcWorkerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = self.metrics.clone();
        let task = tokio::spawn(self.run(shutdown_rx));

        GcWorkerHandle {
            shutdown: shutdown_tx,
            task,
            metrics,
        }
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval = ?self.schedule.interval,
            window = ?self.schedule.window,
            "gc worker started"
        );
        let mut failures: u32 = 0;

        loop {
            let delay = self.schedule.delay(failures);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                changed = shutdown.changed() => {
                    let stop = changed.is_err() || *shutdown.borrow();
                    if stop {
                        break;
                    }
                    continue;
                }
            }

            if !self.gc.is_ready() {
                warn!("datastore not ready, skipping garbage collection");
                continue;
            }

            let gc = self.gc.clone();
            let metrics = self.metrics.clone();
            let window = self.schedule.window;
            let cancel = CancelSignal::from_shutdown(shutdown.clone())
                .with_timeout(self.schedule.max_operation_time);

            let outcome = tokio::task::spawn_blocking(move || {
                run_garbage_collection(gc.as_ref(), window, &cancel, &metrics)
            })
            .await;

            match outcome {
                Ok(Ok(_)) => failures = 0,
                Ok(Err(e)) if e.is_cancellation() => {}
                Ok(Err(_)) => failures = failures.saturating_add(1),
                Err(e) => {
                    error!(error = %e, "garbage collection task panicked");
                    failures = failures.saturating_add(1);
                }
            }
        }

        info!("gc worker stopped");
    }
}

/// Owner of a running worker.
pub struct GcWorkerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    metrics: Arc<GcMetrics>,
}

impl GcWorkerHandle {
    pub fn metrics(&self) -> &Arc<GcMetrics> {
        &self.metrics
    }

    /// Signals shutdown and waits for the loop to exit.
    pub async fn shutdown(self) -> Result<(), JoinError> {
        // the receiver only goes away once the task has already exited
        let _ = self.shutdown.send(true);
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(interval_ms: u64) -> GcSchedule {
        GcSchedule {
            interval: Duration::from_millis(interval_ms),
            window: Duration::from_secs(1),
            max_operation_time: Duration::from_secs(1),
        }
    }

    #[test]
    fn test_delay_without_failures_is_interval() {
        assert_eq!(schedule(100).delay(0), Duration::from_millis(100));
    }

    #[test]
    fn test_delay_backs_off_with_bounded_jitter() {
        let s = schedule(100);
        for (failures, factor) in [(1, 2), (2, 4), (5, 32), (40, 32)] {
            let delay = s.delay(failures);
            let base = Duration::from_millis(100 * factor);
            assert!(delay + Duration::from_micros(1) >= base, "{failures}: {delay:?} < {base:?}");
            let ceiling = base.mul_f64(1.0 + MAX_JITTER) + Duration::from_micros(1);
            assert!(delay <= ceiling, "{failures}: {delay:?}");
        }
    }

    #[test]
    fn test_disabled_config_has_no_worker() {
        let config = DatastoreConfig::default().with_gc_enabled(false);
        let ds = Arc::new(Datastore::new(config).unwrap());
        assert!(GcWorker::for_datastore(ds).is_none());
    }

    #[test]
    fn test_schedule_from_config() {
        let config = DatastoreConfig::default();
        let s = GcSchedule::from_config(&config);
        assert_eq!(s.interval, config.gc_interval);
        assert_eq!(s.window, config.gc_window);
        assert_eq!(s.max_operation_time, config.gc_max_operation_time);
    }
}
