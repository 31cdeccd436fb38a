//! # Datastore Errors

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::engine::EngineError;
use crate::model::ModelError;
use crate::revision::{Revision, RevisionError};

/// Result type for datastore operations
pub type DatastoreResult<T> = Result<T, DatastoreError>;

/// Definition kinds that support point lookups.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DefinitionKind {
    Namespace,
    Caveat,
}

impl fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DefinitionKind::Namespace => f.write_str("namespace"),
            DefinitionKind::Caveat => f.write_str("caveat"),
        }
    }
}

/// Why a caller-supplied revision cannot be served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InvalidRevisionReason {
    /// Older than the GC window; data it needs may be gone
    Stale,
    /// References a transaction the engine has not allocated
    Future,
}

impl fmt::Display for InvalidRevisionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidRevisionReason::Stale => f.write_str("stale"),
            InvalidRevisionReason::Future => f.write_str("in the future"),
        }
    }
}

/// Datastore errors
///
/// Not-found errors carry the revision they were evaluated at, so callers
/// can tell "absent at this revision" apart from a storage failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DatastoreError {
    #[error("{kind} '{name}' not found at revision {revision}")]
    NotFound {
        kind: DefinitionKind,
        name: String,
        revision: Revision,
    },

    #[error("Relationship '{relationship}' not found at revision {revision}")]
    RelationshipNotFound {
        relationship: String,
        revision: Revision,
    },

    #[error("Relationship '{0}' already exists")]
    AlreadyExists(String),

    /// A transaction that committed after this one began changed a row this
    /// one also writes. The whole transaction is aborted and may be retried.
    #[error("'{0}' was changed by a concurrent transaction")]
    Conflict(String),

    #[error("Revision {revision} is {reason}")]
    InvalidRevision {
        revision: Revision,
        reason: InvalidRevisionReason,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Revision(#[from] RevisionError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DatastoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            DatastoreError::NotFound { .. } | DatastoreError::RelationshipNotFound { .. }
        )
    }

    /// Whether running the same transaction again may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DatastoreError::Conflict(_))
    }
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_carries_revision() {
        let revision: Revision = "4@5:5:".parse().unwrap();
        let err = DatastoreError::NotFound {
            kind: DefinitionKind::Namespace,
            name: "document".into(),
            revision: revision.clone(),
        };

        assert!(err.is_not_found());
        assert_eq!(
            err.to_string(),
            "namespace 'document' not found at revision 4@5:5:"
        );
    }

    #[test]
    fn test_wrapped_errors_are_transparent() {
        let err: DatastoreError = EngineError::Closed.into();
        assert_eq!(err.to_string(), "Engine is closed");
        assert!(!err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_conflict_is_retryable() {
        let err = DatastoreError::Conflict("document:1#viewer@user:alice".into());
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "'document:1#viewer@user:alice' was changed by a concurrent transaction"
        );
    }
}
