//! GC errors
//!
//! Every variant carries the counts already committed before the run
//! stopped. Committed chunks are never rolled back.

use thiserror::Error;

use crate::engine::EngineError;

use super::DeletionCounts;

/// Result type for garbage collection
pub type GcResult<T> = Result<T, GcError>;

#[derive(Debug, Error)]
pub enum GcError {
    #[error("garbage collection cancelled after removing {partial}")]
    Cancelled { partial: DeletionCounts },

    #[error("garbage collection exceeded its deadline after removing {partial}")]
    DeadlineExceeded { partial: DeletionCounts },

    #[error("garbage collection failed after removing {partial}: {source}")]
    Engine {
        #[source]
        source: EngineError,
        partial: DeletionCounts,
    },
}

impl GcError {
    /// Rows removed before the failure.
    pub fn partial(&self) -> DeletionCounts {
        match self {
            GcError::Cancelled { partial }
            | GcError::DeadlineExceeded { partial }
            | GcError::Engine { partial, .. } => *partial,
        }
    }

    /// True if the run was stopped by its cancel signal rather than failing.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, GcError::Cancelled { .. } | GcError::DeadlineExceeded { .. })
    }
}

impl From<EngineError> for GcError {
    fn from(source: EngineError) -> Self {
        GcError::Engine {
            source,
            partial: DeletionCounts::default(),
        }
    }
}
