//! Datastore Configuration
//!
//! Values only; where they come from (file, env, flags) is the caller's
//! concern. Durations serialize as `{ secs, nanos }`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::errors::ConfigError;

/// Default bucket width for quantized head revisions.
pub const DEFAULT_REVISION_QUANTIZATION: Duration = Duration::from_secs(5);
/// Default retention window before superseded data may be collected.
pub const DEFAULT_GC_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);
/// Default pause between GC runs.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(3 * 60);
/// Default upper bound on a single GC run.
pub const DEFAULT_GC_MAX_OPERATION_TIME: Duration = Duration::from_secs(60);
/// Default number of rows removed per GC chunk.
pub const DEFAULT_GC_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreConfig {
    /// Width of head-revision time buckets. At or below 1ns, bucketing
    /// is disabled.
    pub revision_quantization: Duration,

    /// How far behind now the GC low-water-mark is taken.
    pub gc_window: Duration,

    /// Pause between background GC runs.
    pub gc_interval: Duration,

    /// Rows removed per GC chunk.
    pub gc_batch_size: usize,

    /// Deadline for one GC run. Chunks committed before it expires stay.
    pub gc_max_operation_time: Duration,

    /// Whether the background GC worker should run.
    pub gc_enabled: bool,
}

impl Default for DatastoreConfig {
    fn default() -> Self {
        Self {
            revision_quantization: DEFAULT_REVISION_QUANTIZATION,
            gc_window: DEFAULT_GC_WINDOW,
            gc_interval: DEFAULT_GC_INTERVAL,
            gc_batch_size: DEFAULT_GC_BATCH_SIZE,
            gc_max_operation_time: DEFAULT_GC_MAX_OPERATION_TIME,
            gc_enabled: true,
        }
    }
}

impl DatastoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_revision_quantization(mut self, quantization: Duration) -> Self {
        self.revision_quantization = quantization;
        self
    }

    pub fn with_gc_window(mut self, window: Duration) -> Self {
        self.gc_window = window;
        self
    }

    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    pub fn with_gc_batch_size(mut self, batch_size: usize) -> Self {
        self.gc_batch_size = batch_size;
        self
    }

    pub fn with_gc_max_operation_time(mut self, max: Duration) -> Self {
        self.gc_max_operation_time = max;
        self
    }

    pub fn with_gc_enabled(mut self, enabled: bool) -> Self {
        self.gc_enabled = enabled;
        self
    }

    /// Validate the configuration.
    ///
    /// The GC window must cover at least one quantization bucket, otherwise
    /// a freshly served quantized revision could already be collectable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.gc_batch_size == 0 {
            return Err(ConfigError::invalid("gc_batch_size", "must be greater than zero"));
        }
        if self.gc_window.is_zero() {
            return Err(ConfigError::invalid("gc_window", "must be greater than zero"));
        }
        if self.gc_window < self.revision_quantization {
            return Err(ConfigError::invalid(
                "gc_window",
                format!(
                    "{:?} is shorter than revision_quantization {:?}",
                    self.gc_window, self.revision_quantization
                ),
            ));
        }
        if self.gc_enabled {
            if self.gc_interval.is_zero() {
                return Err(ConfigError::invalid("gc_interval", "must be greater than zero"));
            }
            if self.gc_max_operation_time.is_zero() {
                return Err(ConfigError::invalid(
                    "gc_max_operation_time",
                    "must be greater than zero",
                ));
            }
        }
        Ok(())
    }
}
