//! Error types for the plainsync engine.

use crate::{ContextId, EntityName, ObjectId, SchemaVersion};
use thiserror::Error;

/// All possible errors from the plainsync engine.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Schema errors
    #[error("entity description not found: {0}")]
    EntityNotFound(EntityName),

    // Query errors
    #[error("query on {entity} failed: {reason}")]
    Query { entity: EntityName, reason: String },

    #[error("unknown attribute '{key}' on entity {entity}")]
    UnknownAttribute { entity: EntityName, key: String },

    // Context resolution errors
    #[error("object {id} cannot be resolved in context {context}")]
    ObjectNotFound { id: ObjectId, context: ContextId },

    #[error("object {id} is not registered in context {context}")]
    ForeignObject { id: ObjectId, context: ContextId },

    #[error("object {0} is locked by an in-progress mutation")]
    ObjectLocked(ObjectId),

    // Validation errors
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    #[error("missing required field: {0}")]
    MissingRequiredField(String),

    #[error("type mismatch for field '{field}': expected {expected}, got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("serialization failed: {0}")]
    Serialization(String),

    // State errors
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    #[error("schema version mismatch: expected {expected}, got {actual}")]
    SchemaVersionMismatch {
        expected: SchemaVersion,
        actual: SchemaVersion,
    },
}

impl Error {
    /// Whether this error came from executing a fetch rather than from
    /// resolving the entity type or an object id.
    pub fn is_query_error(&self) -> bool {
        matches!(self, Error::Query { .. } | Error::UnknownAttribute { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Serialization(value.to_string())
    }
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = Error::EntityNotFound("Tag".into());
        assert_eq!(err.to_string(), "entity description not found: Tag");

        let err = Error::UnknownAttribute {
            entity: "Tag".into(),
            key: "colour".into(),
        };
        assert_eq!(err.to_string(), "unknown attribute 'colour' on entity Tag");

        let err = Error::ObjectNotFound {
            id: ObjectId::new("Tag", 7),
            context: ContextId(3),
        };
        assert_eq!(
            err.to_string(),
            "object Tag#7 cannot be resolved in context ctx-3"
        );

        let err = Error::TypeMismatch {
            field: "age".into(),
            expected: "Int".into(),
            got: "String".into(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch for field 'age': expected Int, got String"
        );
    }

    #[test]
    fn query_error_classification() {
        assert!(Error::Query {
            entity: "Tag".into(),
            reason: "boom".into()
        }
        .is_query_error());
        assert!(!Error::EntityNotFound("Tag".into()).is_query_error());
    }

    #[test]
    fn from_serde_json() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
