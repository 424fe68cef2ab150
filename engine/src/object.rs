//! Object identity and the shared entity handle.
//!
//! A [`Managed`] handle is the persistent side of the bridge: it wraps one
//! entity value bound to exactly one context. Handles are cheap to clone and
//! compare by object identity; across contexts the same logical entity is
//! recognised by its [`ObjectId`].

use crate::{error::Result, EntityName};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};

/// A persistent entity type, registered at compile time under a schema name.
///
/// The serialized form of the value is its attribute payload: the fields that
/// predicates, sort descriptors and schema validation see. Relationship
/// fields ([`EntityRef`](crate::EntityRef), [`EntitySet`](crate::EntitySet),
/// [`EntityList`](crate::EntityList)) serialize as object ids.
pub trait Entity: Serialize + DeserializeOwned + Default + Send + 'static {
    /// Name of the entity description in the context's schema.
    const ENTITY_NAME: &'static str;
}

/// Store-assigned identifier of an entity.
///
/// The key is unique across the whole store. Whether an id is still
/// temporary is tracked on the handle, so an id value never changes once
/// handed out.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectId {
    /// Entity description name
    pub entity: EntityName,
    /// Store-wide key, also the creation sequence number
    pub key: u64,
}

impl ObjectId {
    pub fn new(entity: impl Into<EntityName>, key: u64) -> Self {
        Self {
            entity: entity.into(),
            key,
        }
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.entity, self.key)
    }
}

/// Identifier of a persistence context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContextId(pub u64);

impl ContextId {
    /// Allocate a process-wide unique context id.
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        ContextId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx-{}", self.0)
    }
}

struct ManagedInner<E> {
    id: ObjectId,
    context: ContextId,
    temporary: AtomicBool,
    deleted: AtomicBool,
    /// Set while the value is checked out by a fill
    filling: AtomicBool,
    state: Mutex<E>,
    /// Payload as of the last released mutation. `None` if it could not be
    /// serialized.
    published: Mutex<Option<Value>>,
}

impl<E: Entity> ManagedInner<E> {
    fn lock_state(&self) -> MutexGuard<'_, E> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, payload: Option<Value>) {
        *self.published.lock().unwrap_or_else(PoisonError::into_inner) = payload;
    }

    fn published(&self) -> Option<Value> {
        self.published
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Handle to an entity bound to a persistence context.
pub struct Managed<E> {
    inner: Arc<ManagedInner<E>>,
}

impl<E: Entity> Managed<E> {
    /// Wrap a freshly inserted value. Its id starts out temporary.
    ///
    /// Intended for [`PersistenceContext`](crate::PersistenceContext)
    /// implementations.
    pub fn inserted(id: ObjectId, context: ContextId, value: E) -> Self {
        Self::with_state(id, context, value, true)
    }

    /// Wrap a value materialized from committed store state.
    pub fn materialized(id: ObjectId, context: ContextId, value: E) -> Self {
        Self::with_state(id, context, value, false)
    }

    fn with_state(id: ObjectId, context: ContextId, value: E, temporary: bool) -> Self {
        let published = serde_json::to_value(&value).ok();
        Self {
            inner: Arc::new(ManagedInner {
                id,
                context,
                temporary: AtomicBool::new(temporary),
                deleted: AtomicBool::new(false),
                filling: AtomicBool::new(false),
                state: Mutex::new(value),
                published: Mutex::new(published),
            }),
        }
    }

    /// Serialize the current attribute payload.
    pub fn payload(&self) -> Result<Value> {
        Ok(serde_json::to_value(&*self.lock())?)
    }

    /// Lock the entity state for reading or mutation.
    ///
    /// Mutating through the guard republishes the payload that fetches
    /// match against while the entity is locked.
    pub fn lock(&self) -> EntityGuard<'_, E> {
        EntityGuard {
            inner: &self.inner,
            state: self.inner.lock_state(),
            touched: false,
        }
    }

    /// Lock the entity state unless it is already locked.
    pub fn try_lock(&self) -> Option<EntityGuard<'_, E>> {
        try_lock_state(&self.inner.state).map(|state| EntityGuard {
            inner: &self.inner,
            state,
            touched: false,
        })
    }

    pub fn read<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.lock())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        f(&mut self.lock())
    }

    /// Take the value out for filling, leaving a default in its place.
    /// `None` when a fill of this entity is already in progress.
    pub(crate) fn begin_fill(&self) -> Option<E> {
        if self.inner.filling.swap(true, Ordering::AcqRel) {
            return None;
        }
        Some(std::mem::take(&mut *self.inner.lock_state()))
    }

    /// Until the fill ends, readers see `stand_in` and fetches match
    /// `preview`.
    pub(crate) fn show_while_filling(&self, stand_in: E, preview: Value) {
        *self.inner.lock_state() = stand_in;
        self.inner.publish(Some(preview));
    }

    /// Put the filled value back and publish it.
    pub(crate) fn end_fill(&self, value: E) {
        let mut state = self.inner.lock_state();
        *state = value;
        self.inner.publish(serde_json::to_value(&*state).ok());
        drop(state);
        self.inner.filling.store(false, Ordering::Release);
    }

    pub(crate) fn erased(&self) -> Arc<dyn ErasedObject> {
        self.inner.clone()
    }

    pub(crate) fn from_erased(object: Arc<dyn ErasedObject>) -> Option<Self> {
        object
            .into_any()
            .downcast::<ManagedInner<E>>()
            .ok()
            .map(|inner| Self { inner })
    }
}

impl<E> Managed<E> {
    pub fn id(&self) -> &ObjectId {
        &self.inner.id
    }

    /// Context this handle is confined to.
    pub fn context_id(&self) -> ContextId {
        self.inner.context
    }

    pub fn has_temporary_id(&self) -> bool {
        self.inner.temporary.load(Ordering::Acquire)
    }

    /// Whether the entity has been deleted from its context.
    pub fn is_deleted(&self) -> bool {
        self.inner.deleted.load(Ordering::Acquire)
    }

    /// Whether a synchronization pass is filling the entity right now.
    pub fn is_filling(&self) -> bool {
        self.inner.filling.load(Ordering::Acquire)
    }

    /// Mark the id permanent. Called by contexts when permanent ids are
    /// obtained or the entity is committed.
    pub fn mark_permanent(&self) {
        self.inner.temporary.store(false, Ordering::Release);
    }

    /// Mark the entity deleted. Returns `false` if it already was.
    pub fn mark_deleted(&self) -> bool {
        !self.inner.deleted.swap(true, Ordering::AcqRel)
    }

    /// Whether two handles refer to the same in-context object.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

fn try_lock_state<E>(state: &Mutex<E>) -> Option<MutexGuard<'_, E>> {
    match state.try_lock() {
        Ok(guard) => Some(guard),
        Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
        Err(TryLockError::WouldBlock) => None,
    }
}

/// Locked access to an entity's state. Republishes the payload on release
/// if the state was borrowed mutably.
pub struct EntityGuard<'a, E: Entity> {
    inner: &'a ManagedInner<E>,
    state: MutexGuard<'a, E>,
    touched: bool,
}

impl<E: Entity> Deref for EntityGuard<'_, E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.state
    }
}

impl<E: Entity> DerefMut for EntityGuard<'_, E> {
    fn deref_mut(&mut self) -> &mut E {
        self.touched = true;
        &mut self.state
    }
}

impl<E: Entity> Drop for EntityGuard<'_, E> {
    fn drop(&mut self) {
        if self.touched {
            self.inner.publish(serde_json::to_value(&*self.state).ok());
        }
    }
}

impl<E> Clone for Managed<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E> PartialEq for Managed<E> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<E> Eq for Managed<E> {}

impl<E> Hash for Managed<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(Arc::as_ptr(&self.inner), state);
    }
}

impl<E> fmt::Debug for Managed<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Managed")
            .field("id", &self.inner.id)
            .field("context", &self.inner.context)
            .field("temporary", &self.has_temporary_id())
            .field("deleted", &self.is_deleted())
            .finish()
    }
}

/// Type-erased view of a registered object, used by contexts that hold
/// entities of many types.
pub(crate) trait ErasedObject: Send + Sync {
    fn object_id(&self) -> &ObjectId;
    fn mark_permanent(&self);
    fn is_deleted(&self) -> bool;
    /// Payload of the live state. `None` while the entity is locked or
    /// being filled.
    fn try_payload(&self) -> Option<Result<Value>>;
    /// Payload fetches match against: the live state when it is free,
    /// otherwise the last published one.
    fn visible_payload(&self) -> Option<Result<Value>>;
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: Entity> ErasedObject for ManagedInner<E> {
    fn object_id(&self) -> &ObjectId {
        &self.id
    }

    fn mark_permanent(&self) {
        self.temporary.store(false, Ordering::Release);
    }

    fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    fn try_payload(&self) -> Option<Result<Value>> {
        if self.filling.load(Ordering::Acquire) {
            return None;
        }
        let state = try_lock_state(&self.state)?;
        Some(serde_json::to_value(&*state).map_err(Into::into))
    }

    fn visible_payload(&self) -> Option<Result<Value>> {
        self.try_payload().or_else(|| self.published().map(Ok))
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}
