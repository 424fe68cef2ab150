//! Entity types shared by unit tests.

use crate::{
    assign, AttributeDef, AttributeType, Entity, EntityDescription, ObjectId, PersistenceContext,
    PlainObjectBridge, Schema, UniqueKey,
};
use serde::{Deserialize, Serialize};

pub fn test_schema() -> Schema {
    Schema::new(1)
        .with_entity(EntityDescription::new(
            "Tag",
            vec![
                AttributeDef::required("name", AttributeType::String),
                AttributeDef::optional("colour", AttributeType::String),
            ],
        ))
        .with_entity(EntityDescription::new(
            "Note",
            vec![AttributeDef::optional("text", AttributeType::String)],
        ))
}

/// Keyed by name.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Tag {
    pub name: Option<String>,
    pub colour: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TagPlain {
    pub name: String,
    pub colour: Option<String>,
}

impl Entity for Tag {
    const ENTITY_NAME: &'static str = "Tag";
}

impl PlainObjectBridge for Tag {
    type Plain = TagPlain;

    fn fill<C: PersistenceContext>(&mut self, plain: &TagPlain, _ctx: &C, _this: &ObjectId) {
        self.name = Some(plain.name.clone());
        assign(&mut self.colour, plain.colour.clone(), false);
    }

    fn to_plain(&self) -> TagPlain {
        TagPlain {
            name: self.name.clone().unwrap_or_default(),
            colour: self.colour.clone(),
        }
    }

    fn unique_key(plain: &TagPlain) -> Option<UniqueKey> {
        Some(UniqueKey::new("name", plain.name.clone()))
    }
}

/// No natural key.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Note {
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NotePlain {
    pub text: String,
}

impl Entity for Note {
    const ENTITY_NAME: &'static str = "Note";
}

impl PlainObjectBridge for Note {
    type Plain = NotePlain;

    fn fill<C: PersistenceContext>(&mut self, plain: &NotePlain, _ctx: &C, _this: &ObjectId) {
        self.text = Some(plain.text.clone());
    }

    fn to_plain(&self) -> NotePlain {
        NotePlain {
            text: self.text.clone().unwrap_or_default(),
        }
    }
}

/// Registered as an entity but missing from [`test_schema`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Untracked {}

impl Entity for Untracked {
    const ENTITY_NAME: &'static str = "Untracked";
}

impl PlainObjectBridge for Untracked {
    type Plain = ();

    fn fill<C: PersistenceContext>(&mut self, _plain: &(), _ctx: &C, _this: &ObjectId) {}

    fn to_plain(&self) {}
}
