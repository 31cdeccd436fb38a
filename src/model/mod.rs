//! Fact model
//!
//! The three fact kinds kept in the versioned log:
//! - `Relationship` - keyed by resource/relation/subject
//! - `NamespaceDefinition` - keyed by name
//! - `CaveatDefinition` - keyed by name

mod definitions;
mod errors;
mod relationship;

pub use definitions::{CaveatDefinition, NamespaceDefinition, RelationDefinition};
pub use errors::{ModelError, ModelResult};
pub use relationship::{
    CaveatReference, ObjectAndRelation, Relationship, RelationshipKey, RelationshipUpdate,
    RelationshipsFilter, SubjectsFilter, UpdateOperation, ELLIPSIS,
};

use crate::engine::Keyed;

impl Keyed for Relationship {
    type Key = RelationshipKey;

    fn key(&self) -> RelationshipKey {
        self.key.clone()
    }
}

impl Keyed for NamespaceDefinition {
    type Key = String;

    fn key(&self) -> String {
        self.name.clone()
    }
}

impl Keyed for CaveatDefinition {
    type Key = String;

    fn key(&self) -> String {
        self.name.clone()
    }
}
