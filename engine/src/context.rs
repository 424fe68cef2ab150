//! The persistence context seam.
//!
//! A context binds a set of entities to one in-memory session over a backing
//! store. The engine never reaches a store directly; everything goes through
//! this trait, passed explicitly to every operation.

use crate::{error::Result, ContextId, Entity, EntityDescription, FetchRequest, Managed, ObjectId};
use serde::de::DeserializeOwned;

/// Operations a backing persistence API must provide.
///
/// Every call is synchronous and serialized against the context's own
/// access lock. Fetches see pending, uncommitted changes of this context.
pub trait PersistenceContext {
    fn id(&self) -> ContextId;

    /// Resolve an entity description by name.
    ///
    /// # Errors
    /// [`Error::EntityNotFound`](crate::Error::EntityNotFound) when the schema
    /// has no such entity.
    fn description(&self, entity: &str) -> Result<EntityDescription>;

    /// Insert a new, default-initialised entity. No store write happens
    /// until the context commits.
    fn insert<E: Entity>(&self) -> Result<Managed<E>>;

    /// Execute a fetch. Absent results are an empty vector, never an error.
    fn execute_fetch<E: Entity>(&self, request: &FetchRequest) -> Result<Vec<Managed<E>>>;

    /// Remove an entity from this context. Returns `false` when it had
    /// already been deleted.
    fn delete<E: Entity>(&self, object: &Managed<E>) -> Result<bool>;

    /// Resolve an entity by id within this context, materializing it from
    /// committed store state when needed.
    fn existing_object<E: Entity>(&self, id: &ObjectId) -> Result<Managed<E>>;

    /// Replace the entity's temporary id with a permanent one.
    fn obtain_permanent_id<E: Entity>(&self, object: &Managed<E>) -> Result<()>;

    /// Decode a serialized value whose relationship fields should bind in
    /// this context.
    ///
    /// The default decodes without binding. Members of such fields then
    /// resolve only through [`Relationship::resolve_in`](crate::Relationship::resolve_in).
    fn decode<T: DeserializeOwned>(&self, payload: serde_json::Value) -> Result<T> {
        Ok(serde_json::from_value(payload)?)
    }
}
