//! Revision encoding errors

use thiserror::Error;

/// Result type for revision decoding
pub type RevisionResult<T> = Result<T, RevisionError>;

/// Failures decoding a revision or snapshot from its external form.
///
/// Decoding failures are fatal to the call that produced them only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RevisionError {
    #[error("malformed revision '{input}': {reason}")]
    Malformed { input: String, reason: String },

    #[error("malformed snapshot '{input}': {reason}")]
    MalformedSnapshot { input: String, reason: String },

    #[error("invalid revision token: {0}")]
    InvalidToken(String),

    #[error("unsupported revision token version {0}")]
    UnsupportedTokenVersion(u8),
}

impl RevisionError {
    pub(crate) fn malformed(input: &str, reason: impl Into<String>) -> Self {
        RevisionError::Malformed {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn malformed_snapshot(input: &str, reason: impl Into<String>) -> Self {
        RevisionError::MalformedSnapshot {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}
