//! The plain-object bridge.
//!
//! An entity type opts into synchronization by implementing
//! [`PlainObjectBridge`]: how to fill itself from a plain value, how to
//! produce one, and which attribute identifies it.

use crate::{Entity, ObjectId, PersistenceContext, Predicate};
use serde_json::Value;

/// Conversion contract between an entity and its plain counterpart.
pub trait PlainObjectBridge: Entity {
    /// Caller-owned value type with no persistence awareness.
    type Plain;

    /// Overwrite fields from `plain`. Must be idempotent.
    ///
    /// `ctx` is the context the entity lives in, for synchronizing nested
    /// relationships. `this` is the entity's own id, for children that keep a
    /// back-reference.
    fn fill<C: PersistenceContext>(&mut self, plain: &Self::Plain, ctx: &C, this: &ObjectId);

    /// Snapshot the entity as a plain value.
    fn to_plain(&self) -> Self::Plain;

    /// Natural key of `plain`. Types without one always create.
    fn unique_key(_plain: &Self::Plain) -> Option<UniqueKey> {
        None
    }
}

/// An attribute name and the value that identifies an entity by it.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueKey {
    pub key: String,
    pub value: Value,
}

impl UniqueKey {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    /// Equality predicate selecting entities with this key.
    pub fn predicate(&self) -> Predicate {
        Predicate::equals(self.key.clone(), self.value.clone())
    }
}

/// Set `target` to `value` when `enforce` is true or `value` is present.
/// Otherwise `target` keeps its current value.
pub fn assign<T>(target: &mut Option<T>, value: Option<T>, enforce: bool) {
    if enforce || value.is_some() {
        *target = value;
    }
}
