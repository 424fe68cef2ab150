//! Entity descriptions and payload validation.
//!
//! The schema is the metadata collaborator: it resolves an entity type name
//! to its description within a context. A type with no description cannot
//! be created or fetched.
//!
//! A description names two kinds of property. Attributes hold scalar values
//! and are what predicates and sort descriptors address. Relationships hold
//! ids of other entities: one id for a to-one reference, an array of ids for
//! a to-many collection.

use crate::{error::Result, EntityName, Error, ObjectId, SchemaVersion};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Scalar kinds an attribute can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Int,
}

impl AttributeType {
    fn accepts(self, value: &Value) -> bool {
        match self {
            AttributeType::String => value.is_string(),
            AttributeType::Int => value.is_i64() || value.is_u64(),
        }
    }

    fn label(self) -> &'static str {
        match self {
            AttributeType::String => "string",
            AttributeType::Int => "integer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeDef {
    /// Serialized field name
    pub name: String,
    pub attribute_type: AttributeType,
    /// Whether a committed entity must carry a non-null value
    pub required: bool,
}

impl AttributeDef {
    pub fn required(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            name: name.into(),
            attribute_type,
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>, attribute_type: AttributeType) -> Self {
        Self {
            required: false,
            ..Self::required(name, attribute_type)
        }
    }
}

/// A reference from one entity to others of the `target` entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationshipDef {
    /// Serialized field name
    pub name: String,
    /// Entity the stored ids must belong to
    pub target: EntityName,
    pub to_many: bool,
}

impl RelationshipDef {
    pub fn to_one(name: impl Into<String>, target: impl Into<EntityName>) -> Self {
        Self {
            name: name.into(),
            target: target.into(),
            to_many: false,
        }
    }

    pub fn to_many(name: impl Into<String>, target: impl Into<EntityName>) -> Self {
        Self {
            to_many: true,
            ..Self::to_one(name, target)
        }
    }

    fn check(&self, value: &Value) -> Result<()> {
        match value {
            Value::Null => Ok(()),
            Value::Array(ids) if self.to_many => {
                ids.iter().try_for_each(|id| self.check_reference(id))
            }
            value if !self.to_many => self.check_reference(value),
            other => Err(self.mismatch(kind_of(other))),
        }
    }

    fn check_reference(&self, value: &Value) -> Result<()> {
        match ObjectId::deserialize(value) {
            Ok(id) if id.entity == self.target => Ok(()),
            Ok(id) => Err(self.mismatch(&format!("{} reference", id.entity))),
            Err(_) => Err(self.mismatch(kind_of(value))),
        }
    }

    fn mismatch(&self, got: &str) -> Error {
        let shape = if self.to_many { "array of" } else { "one" };
        Error::TypeMismatch {
            field: self.name.clone(),
            expected: format!("{shape} {} reference", self.target),
            got: got.to_string(),
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "float",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Description of one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityDescription {
    pub name: EntityName,
    pub attributes: Vec<AttributeDef>,
    #[serde(default)]
    pub relationships: Vec<RelationshipDef>,
}

impl EntityDescription {
    pub fn new(name: impl Into<EntityName>, attributes: Vec<AttributeDef>) -> Self {
        Self {
            name: name.into(),
            attributes,
            relationships: Vec::new(),
        }
    }

    pub fn with_relationship(mut self, relationship: RelationshipDef) -> Self {
        self.relationships.push(relationship);
        self
    }

    pub fn attribute(&self, name: &str) -> Option<&AttributeDef> {
        self.attributes.iter().find(|a| a.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDef> {
        self.relationships.iter().find(|r| r.name == name)
    }

    /// The attribute a predicate or sort descriptor names.
    ///
    /// # Errors
    /// [`Error::UnknownAttribute`] when `key` names nothing or names a
    /// relationship. Relationships hold ids and are not queryable.
    pub fn check_key(&self, key: &str) -> Result<&AttributeDef> {
        self.attribute(key).ok_or_else(|| Error::UnknownAttribute {
            entity: self.name.clone(),
            key: key.to_string(),
        })
    }

    /// Validate a serialized entity against this description.
    ///
    /// Every field must be a declared property of the right shape, and every
    /// required attribute must be non-null.
    pub fn validate_payload(&self, payload: &Value) -> Result<()> {
        let fields = payload
            .as_object()
            .ok_or_else(|| Error::InvalidPayload(format!("{} payload must be an object", self.name)))?;

        for (name, value) in fields {
            if let Some(attribute) = self.attribute(name) {
                if !value.is_null() && !attribute.attribute_type.accepts(value) {
                    return Err(Error::TypeMismatch {
                        field: name.clone(),
                        expected: attribute.attribute_type.label().to_string(),
                        got: kind_of(value).to_string(),
                    });
                }
            } else if let Some(relationship) = self.relationship(name) {
                relationship.check(value)?;
            } else {
                return Err(Error::UnknownAttribute {
                    entity: self.name.clone(),
                    key: name.clone(),
                });
            }
        }

        let missing = self
            .attributes
            .iter()
            .filter(|a| a.required)
            .find(|a| fields.get(&a.name).map_or(true, Value::is_null));
        match missing {
            Some(attribute) => Err(Error::MissingRequiredField(attribute.name.clone())),
            None => Ok(()),
        }
    }
}

/// Schema for the entire store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Checked when importing snapshots
    pub version: SchemaVersion,
    pub entities: HashMap<EntityName, EntityDescription>,
}

impl Schema {
    pub fn new(version: SchemaVersion) -> Self {
        Self {
            version,
            entities: HashMap::new(),
        }
    }

    pub fn with_entity(mut self, description: EntityDescription) -> Self {
        self.entities.insert(description.name.clone(), description);
        self
    }

    pub fn description(&self, name: &str) -> Option<&EntityDescription> {
        self.entities.get(name)
    }

    /// Resolve an entity description, failing with [`Error::EntityNotFound`].
    pub fn require(&self, name: &str) -> Result<&EntityDescription> {
        self.description(name)
            .ok_or_else(|| Error::EntityNotFound(name.to_string()))
    }
}
