//! Fact model errors

use thiserror::Error;

/// Result type for model parsing and validation
pub type ModelResult<T> = Result<T, ModelError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("invalid relationship '{input}': {reason}")]
    InvalidRelationship { input: String, reason: String },

    #[error("invalid {kind} definition '{name}': {reason}")]
    InvalidDefinition {
        kind: &'static str,
        name: String,
        reason: String,
    },
}

impl ModelError {
    pub(crate) fn relationship(input: &str, reason: impl Into<String>) -> Self {
        ModelError::InvalidRelationship {
            input: input.to_string(),
            reason: reason.into(),
        }
    }

    pub(crate) fn definition(kind: &'static str, name: &str, reason: impl Into<String>) -> Self {
        ModelError::InvalidDefinition {
            kind,
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
