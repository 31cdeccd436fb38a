//! Schema definitions: namespaces and caveats

use serde::{Deserialize, Serialize};

use super::errors::{ModelError, ModelResult};

/// A relation declared by a namespace.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
}

/// A namespace (object type) definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespaceDefinition {
    pub name: String,
    pub relations: Vec<RelationDefinition>,
}

impl NamespaceDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            relations: Vec::new(),
        }
    }

    pub fn with_relation(mut self, name: impl Into<String>) -> Self {
        self.relations.push(RelationDefinition { name: name.into() });
        self
    }

    pub fn relation(&self, name: &str) -> Option<&RelationDefinition> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn validate(&self) -> ModelResult<()> {
        validate_name("namespace", &self.name)?;
        for (i, relation) in self.relations.iter().enumerate() {
            validate_name("namespace", &relation.name).map_err(|_| {
                ModelError::definition("namespace", &self.name, format!("invalid relation name '{}'", relation.name))
            })?;
            if self.relations[..i].iter().any(|r| r.name == relation.name) {
                return Err(ModelError::definition(
                    "namespace",
                    &self.name,
                    format!("duplicate relation '{}'", relation.name),
                ));
            }
        }
        Ok(())
    }
}

/// A caveat definition. The expression is opaque to the datastore.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CaveatDefinition {
    pub name: String,
    pub expression: Vec<u8>,
}

impl CaveatDefinition {
    pub fn new(name: impl Into<String>, expression: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            expression: expression.into(),
        }
    }

    pub fn validate(&self) -> ModelResult<()> {
        validate_name("caveat", &self.name)
    }
}

fn validate_name(kind: &'static str, name: &str) -> ModelResult<()> {
    if name.is_empty() {
        return Err(ModelError::definition(kind, name, "empty name"));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
    {
        return Err(ModelError::definition(kind, name, "name must be [a-zA-Z0-9_/]"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_namespace_builder() {
        let ns = NamespaceDefinition::new("resource")
            .with_relation("reader")
            .with_relation("unused");

        assert_eq!(ns.relations.len(), 2);
        assert!(ns.relation("reader").is_some());
        assert!(ns.relation("writer").is_none());
        assert!(ns.validate().is_ok());
    }

    #[test]
    fn test_namespace_validation() {
        assert!(NamespaceDefinition::new("").validate().is_err());
        assert!(NamespaceDefinition::new("bad name").validate().is_err());
        assert!(NamespaceDefinition::new("doc")
            .with_relation("viewer")
            .with_relation("viewer")
            .validate()
            .is_err());
        assert!(NamespaceDefinition::new("doc")
            .with_relation("view#er")
            .validate()
            .is_err());
        assert!(NamespaceDefinition::new("tenant/doc").validate().is_ok());
    }

    #[test]
    fn test_caveat_validation() {
        assert!(CaveatDefinition::new("only_weekdays", b"day < 6".to_vec()).validate().is_ok());
        assert!(CaveatDefinition::new("", Vec::new()).validate().is_err());
    }
}
