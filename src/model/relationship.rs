//! Relationships, relationship updates and relationship filters
//!
//! Text form: `resource_type:resource_id#relation@subject_type:subject_id[#subject_relation][[caveat]]`.
//! A missing subject relation means the subject object itself (`...`).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::errors::{ModelError, ModelResult};

/// Subject relation meaning "the object itself".
pub const ELLIPSIS: &str = "...";

/// An object and one of its relations.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectAndRelation {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
}

impl ObjectAndRelation {
    pub fn new(
        namespace: impl Into<String>,
        object_id: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            object_id: object_id.into(),
            relation: relation.into(),
        }
    }
}

/// Domain key of a relationship row: the relationship without its caveat.
///
/// Ordering is by resource type first, which is what relationship queries
/// range over.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RelationshipKey {
    pub resource: ObjectAndRelation,
    pub subject: ObjectAndRelation,
}

impl RelationshipKey {
    /// Smallest key for the given resource type (and object, if any).
    pub(crate) fn lower_bound(resource_type: &str, resource_id: Option<&str>) -> Self {
        Self {
            resource: ObjectAndRelation::new(resource_type, resource_id.unwrap_or_default(), ""),
            subject: ObjectAndRelation::new("", "", ""),
        }
    }
}

/// A caveat reference attached to a relationship.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaveatReference {
    pub name: String,
}

/// A relationship fact.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Relationship {
    pub key: RelationshipKey,
    pub caveat: Option<CaveatReference>,
}

impl Relationship {
    pub fn new(resource: ObjectAndRelation, subject: ObjectAndRelation) -> Self {
        Self {
            key: RelationshipKey { resource, subject },
            caveat: None,
        }
    }

    pub fn with_caveat(mut self, name: impl Into<String>) -> Self {
        self.caveat = Some(CaveatReference { name: name.into() });
        self
    }

    pub fn resource(&self) -> &ObjectAndRelation {
        &self.key.resource
    }

    pub fn subject(&self) -> &ObjectAndRelation {
        &self.key.subject
    }

    /// Parses the text form, panicking on malformed input. Test helper.
    #[cfg(test)]
    pub(crate) fn parse_unchecked(s: &str) -> Self {
        s.parse().expect("valid relationship")
    }
}

fn validate_segment(input: &str, what: &str, value: &str) -> ModelResult<()> {
    if value.is_empty() {
        return Err(ModelError::relationship(input, format!("empty {}", what)));
    }
    if value.contains([':', '#', '@', '[', ']']) {
        return Err(ModelError::relationship(
            input,
            format!("{} '{}' contains a reserved character", what, value),
        ));
    }
    Ok(())
}

fn split_object(input: &str, part: &str, what: &str) -> ModelResult<(String, String)> {
    let (namespace, object_id) = part
        .split_once(':')
        .ok_or_else(|| ModelError::relationship(input, format!("{} must be type:id", what)))?;
    validate_segment(input, "type", namespace)?;
    validate_segment(input, "object id", object_id)?;
    Ok((namespace.to_string(), object_id.to_string()))
}

impl FromStr for Relationship {
    type Err = ModelError;

    fn from_str(s: &str) -> ModelResult<Self> {
        let input = s.trim();

        let (body, caveat) = match input.strip_suffix(']') {
            Some(rest) => {
                let (body, name) = rest
                    .rsplit_once('[')
                    .ok_or_else(|| ModelError::relationship(input, "unbalanced caveat brackets"))?;
                validate_segment(input, "caveat name", name)?;
                (body, Some(CaveatReference { name: name.to_string() }))
            }
            None => (input, None),
        };

        let (resource, subject) = body
            .split_once('@')
            .ok_or_else(|| ModelError::relationship(input, "missing '@'"))?;

        let (resource_object, relation) = resource
            .split_once('#')
            .ok_or_else(|| ModelError::relationship(input, "missing resource relation"))?;
        let (resource_type, resource_id) = split_object(input, resource_object, "resource")?;
        validate_segment(input, "relation", relation)?;

        let (subject_object, subject_relation) = match subject.split_once('#') {
            Some((object, relation)) => (object, relation),
            None => (subject, ELLIPSIS),
        };
        let (subject_type, subject_id) = split_object(input, subject_object, "subject")?;
        if subject_relation != ELLIPSIS {
            validate_segment(input, "subject relation", subject_relation)?;
        }

        Ok(Relationship {
            key: RelationshipKey {
                resource: ObjectAndRelation::new(resource_type, resource_id, relation),
                subject: ObjectAndRelation::new(subject_type, subject_id, subject_relation),
            },
            caveat,
        })
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let r = &self.key.resource;
        let s = &self.key.subject;
        write!(
            f,
            "{}:{}#{}@{}:{}",
            r.namespace, r.object_id, r.relation, s.namespace, s.object_id
        )?;
        if s.relation != ELLIPSIS {
            write!(f, "#{}", s.relation)?;
        }
        if let Some(caveat) = &self.caveat {
            write!(f, "[{}]", caveat.name)?;
        }
        Ok(())
    }
}

/// What a relationship update does to the row for its key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UpdateOperation {
    /// Insert; fails if the relationship already exists
    Create,
    /// Insert or replace
    Touch,
    /// Remove if present
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipUpdate {
    pub operation: UpdateOperation,
    pub relationship: Relationship,
}

impl RelationshipUpdate {
    pub fn create(relationship: Relationship) -> Self {
        Self {
            operation: UpdateOperation::Create,
            relationship,
        }
    }

    pub fn touch(relationship: Relationship) -> Self {
        Self {
            operation: UpdateOperation::Touch,
            relationship,
        }
    }

    pub fn delete(relationship: Relationship) -> Self {
        Self {
            operation: UpdateOperation::Delete,
            relationship,
        }
    }
}

/// Matches subjects by type and optionally by id and relation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectsFilter {
    pub subject_type: String,
    /// Empty matches every id
    pub subject_ids: Vec<String>,
    pub relation: Option<String>,
}

impl SubjectsFilter {
    pub fn new(subject_type: impl Into<String>) -> Self {
        Self {
            subject_type: subject_type.into(),
            ..Self::default()
        }
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subject_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn matches(&self, subject: &ObjectAndRelation) -> bool {
        subject.namespace == self.subject_type
            && (self.subject_ids.is_empty() || self.subject_ids.contains(&subject.object_id))
            && self.relation.as_ref().map_or(true, |r| *r == subject.relation)
    }
}

/// Selects relationships of one resource type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipsFilter {
    pub resource_type: String,
    /// Empty matches every id
    pub resource_ids: Vec<String>,
    pub relation: Option<String>,
    pub subject: Option<SubjectsFilter>,
}

impl RelationshipsFilter {
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            ..Self::default()
        }
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation = Some(relation.into());
        self
    }

    pub fn with_subject(mut self, subject: SubjectsFilter) -> Self {
        self.subject = Some(subject);
        self
    }

    pub fn matches(&self, key: &RelationshipKey) -> bool {
        key.resource.namespace == self.resource_type
            && (self.resource_ids.is_empty() || self.resource_ids.contains(&key.resource.object_id))
            && self.relation.as_ref().map_or(true, |r| *r == key.resource.relation)
            && self.subject.as_ref().map_or(true, |s| s.matches(&key.subject))
    }

    /// Where an ordered scan for this filter may start.
    pub(crate) fn scan_start(&self) -> RelationshipKey {
        let single_id = match self.resource_ids.as_slice() {
            [id] => Some(id.as_str()),
            _ => None,
        };
        RelationshipKey::lower_bound(&self.resource_type, single_id)
    }

    /// Whether an ordered scan that reached `key` can stop.
    pub(crate) fn scan_exhausted(&self, key: &RelationshipKey) -> bool {
        if key.resource.namespace != self.resource_type {
            return true;
        }
        matches!(self.resource_ids.as_slice(), [id] if *id != key.resource.object_id)
    }
}
