//! In-memory persistence collaborator.
//!
//! A [`MemoryStore`] holds committed rows shared by any number of
//! [`MemoryContext`]s. Each context keeps its own registry of materialized
//! and inserted objects; [`MemoryContext::save`] writes them back.
//!
//! Store order is ascending object key, which is also creation order. A fetch
//! without sort descriptors therefore returns the most recently created match
//! last.

use crate::collection::decoding_in;
use crate::config::{ConfigError, StoreConfig};
use crate::object::ErasedObject;
use crate::predicate::compare_by;
use crate::{
    error::Result, ContextId, Entity, EntityDescription, EntityName, Error, FetchRequest, Managed,
    ObjectId, PersistenceContext, Record, Schema,
};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[derive(Debug)]
pub(crate) struct StoreState {
    pub(crate) schema: Schema,
    pub(crate) config: StoreConfig,
    /// Next object key to hand out
    pub(crate) next_key: u64,
    /// Committed rows by entity, then by key
    pub(crate) rows: BTreeMap<EntityName, BTreeMap<u64, Record>>,
}

impl StoreState {
    fn row(&self, id: &ObjectId) -> Option<&Record> {
        self.rows.get(&id.entity)?.get(&id.key)
    }
}

/// Shared committed state. Cloning yields another handle to the same store.
#[derive(Debug, Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Create an empty store with the default configuration.
    pub fn new(schema: Schema) -> Self {
        Self::with_config(schema, StoreConfig::default())
    }

    /// Create an empty store configured from `PLAINSYNC_*` environment
    /// variables.
    pub fn from_env(schema: Schema) -> std::result::Result<Self, ConfigError> {
        Ok(Self::with_config(schema, StoreConfig::from_env()?))
    }

    pub fn with_config(schema: Schema, config: StoreConfig) -> Self {
        Self {
            inner: Arc::new(Mutex::new(StoreState {
                schema,
                config,
                next_key: 1,
                rows: BTreeMap::new(),
            })),
        }
    }

    pub(crate) fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a new context over this store.
    pub fn new_context(&self) -> MemoryContext {
        MemoryContext::new(self.clone())
    }

    pub fn schema(&self) -> Schema {
        self.lock().schema.clone()
    }

    pub fn config(&self) -> StoreConfig {
        self.lock().config
    }

    /// Get a committed row by id.
    pub fn record(&self, id: &ObjectId) -> Option<Record> {
        self.lock().row(id).cloned()
    }

    /// Committed rows of one entity, in store order.
    pub fn records(&self, entity: &str) -> Vec<Record> {
        self.lock()
            .rows
            .get(entity)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Count of committed rows across all entities.
    pub fn record_count(&self) -> usize {
        self.lock().rows.values().map(BTreeMap::len).sum()
    }

    fn description(&self, entity: &str) -> Result<EntityDescription> {
        self.lock().schema.require(entity).cloned()
    }

    fn allocate_key(&self) -> u64 {
        let mut state = self.lock();
        let key = state.next_key;
        state.next_key += 1;
        key
    }

    fn same_store(&self, other: &MemoryStore) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

struct Registration {
    object: Arc<dyn ErasedObject>,
    /// Inserted in this context and not yet committed
    inserted: bool,
}

#[derive(Default)]
struct ContextState {
    /// Registered objects by key, i.e. in store order
    objects: BTreeMap<u64, Registration>,
}

/// Counts reported by [`MemoryContext::save`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl SaveSummary {
    pub fn is_empty(&self) -> bool {
        self.inserted == 0 && self.updated == 0 && self.deleted == 0
    }
}

pub(crate) struct ContextInner {
    id: ContextId,
    store: MemoryStore,
    state: Mutex<ContextState>,
}

/// A context over a [`MemoryStore`].
///
/// Relationship fields decoded by this context bind their members here on
/// first access, for as long as the context is alive.
pub struct MemoryContext {
    inner: Arc<ContextInner>,
}

impl MemoryContext {
    pub fn new(store: MemoryStore) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: ContextId::next(),
                store,
                state: Mutex::new(ContextState::default()),
            }),
        }
    }

    /// The context a decoded relationship field was bound to, if it is
    /// still open.
    pub(crate) fn from_source(source: &Weak<ContextInner>) -> Option<Self> {
        source.upgrade().map(|inner| Self { inner })
    }

    pub fn store(&self) -> &MemoryStore {
        &self.inner.store
    }

    fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of objects currently registered, deleted ones included until
    /// the next save.
    pub fn registered_count(&self) -> usize {
        self.lock_state().objects.len()
    }

    /// Whether a save would write anything.
    pub fn has_changes(&self) -> bool {
        self.lock_state()
            .objects
            .values()
            .any(|r| r.inserted || r.object.is_deleted())
    }

    /// Commit inserts, updates and deletions to the store.
    ///
    /// Inserted objects receive permanent ids. When validation is enabled,
    /// nothing is written unless every payload passes.
    ///
    /// # Errors
    /// [`Error::ObjectLocked`] when an entity is locked or being filled.
    pub fn save(&self) -> Result<SaveSummary> {
        let registrations: Vec<(Arc<dyn ErasedObject>, bool)> = self
            .lock_state()
            .objects
            .values()
            .map(|r| (Arc::clone(&r.object), r.inserted))
            .collect();

        let schema = self.store().schema();
        let validate = self.store().config().validate_on_save;

        let mut writes = Vec::new();
        let mut removals = Vec::new();
        for (object, inserted) in &registrations {
            let id = object.object_id();
            if object.is_deleted() {
                if !inserted {
                    removals.push(id.clone());
                }
                continue;
            }

            let payload = object
                .try_payload()
                .ok_or_else(|| Error::ObjectLocked(id.clone()))??;
            if validate {
                schema.require(&id.entity)?.validate_payload(&payload)?;
            }
            writes.push((id.clone(), payload));
        }

        let mut summary = SaveSummary::default();
        {
            let mut store = self.store().lock();
            for id in removals {
                if let Some(rows) = store.rows.get_mut(&id.entity) {
                    if rows.remove(&id.key).is_some() {
                        summary.deleted += 1;
                    }
                }
            }
            for (id, payload) in writes {
                let rows = store.rows.entry(id.entity.clone()).or_default();
                match rows.get_mut(&id.key) {
                    Some(record) => {
                        if record.update_payload(payload) {
                            summary.updated += 1;
                        }
                    }
                    None => {
                        rows.insert(id.key, Record::new(id, payload));
                        summary.inserted += 1;
                    }
                }
            }
        }

        let mut state = self.lock_state();
        state.objects.retain(|_, r| !r.object.is_deleted());
        for registration in state.objects.values_mut() {
            registration.object.mark_permanent();
            registration.inserted = false;
        }
        drop(state);

        tracing::debug!(
            context = %self.inner.id,
            inserted = summary.inserted,
            updated = summary.updated,
            deleted = summary.deleted,
            "context saved"
        );

        Ok(summary)
    }

    /// Register committed rows of `E` that this context has not seen yet.
    fn materialize_committed<E: Entity>(&self, state: &mut ContextState) -> Result<()> {
        let store = self.store().lock();
        let Some(rows) = store.rows.get(E::ENTITY_NAME) else {
            return Ok(());
        };

        for (key, record) in rows {
            if state.objects.contains_key(key) {
                continue;
            }
            let handle = self.materialize::<E>(record)?;
            state.objects.insert(
                *key,
                Registration {
                    object: handle.erased(),
                    inserted: false,
                },
            );
        }

        Ok(())
    }

    fn materialize<E: Entity>(&self, record: &Record) -> Result<Managed<E>> {
        let value: E = self
            .decode(record.payload.clone())
            .map_err(|e| Error::Query {
                entity: E::ENTITY_NAME.to_string(),
                reason: format!("cannot decode {}: {e}", record.id),
            })?;
        Ok(Managed::materialized(record.id.clone(), self.inner.id, value))
    }

    fn require_registered<E: Entity>(
        &self,
        state: &ContextState,
        object: &Managed<E>,
    ) -> Result<()> {
        let registered = object.context_id() == self.inner.id
            && state.objects.contains_key(&object.id().key);
        if registered {
            Ok(())
        } else {
            Err(Error::ForeignObject {
                id: object.id().clone(),
                context: self.inner.id,
            })
        }
    }
}

impl std::fmt::Debug for MemoryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContext")
            .field("id", &self.inner.id)
            .field("registered", &self.registered_count())
            .finish()
    }
}

impl PersistenceContext for MemoryContext {
    fn id(&self) -> ContextId {
        self.inner.id
    }

    fn description(&self, entity: &str) -> Result<EntityDescription> {
        self.store().description(entity)
    }

    fn insert<E: Entity>(&self) -> Result<Managed<E>> {
        self.store().description(E::ENTITY_NAME)?;
        let key = self.store().allocate_key();
        let handle = Managed::inserted(
            ObjectId::new(E::ENTITY_NAME, key),
            self.inner.id,
            E::default(),
        );

        self.lock_state().objects.insert(
            key,
            Registration {
                object: handle.erased(),
                inserted: true,
            },
        );

        tracing::debug!(context = %self.inner.id, id = %handle.id(), "entity inserted");
        Ok(handle)
    }

    fn execute_fetch<E: Entity>(&self, request: &FetchRequest) -> Result<Vec<Managed<E>>> {
        if request.entity != E::ENTITY_NAME {
            return Err(Error::Query {
                entity: E::ENTITY_NAME.to_string(),
                reason: format!("request targets entity {}", request.entity),
            });
        }

        let description = self.store().description(E::ENTITY_NAME)?;
        for key in request.referenced_keys() {
            description.check_key(key)?;
        }
        let include_pending = self.store().config().include_pending_changes;

        let mut state = self.lock_state();
        self.materialize_committed::<E>(&mut state)?;

        let mut matches = Vec::new();
        for registration in state.objects.values() {
            let object = &registration.object;
            if object.object_id().entity != E::ENTITY_NAME || object.is_deleted() {
                continue;
            }
            if registration.inserted && !include_pending {
                continue;
            }

            // Locked or filling objects match on their published payload.
            let Some(payload) = object.visible_payload() else {
                tracing::trace!(id = %object.object_id(), "skipping object without payload");
                continue;
            };
            let payload = payload?;
            if !request.matches(&payload) {
                continue;
            }

            let handle = Managed::<E>::from_erased(Arc::clone(object)).ok_or_else(|| {
                Error::Query {
                    entity: E::ENTITY_NAME.to_string(),
                    reason: format!("{} is registered with another type", object.object_id()),
                }
            })?;
            matches.push((handle, payload));
        }
        drop(state);

        if !request.sort.is_empty() {
            matches.sort_by(|(_, a), (_, b)| compare_by(&request.sort, a, b));
        }

        tracing::trace!(
            context = %self.inner.id,
            entity = E::ENTITY_NAME,
            count = matches.len(),
            "fetch executed"
        );

        Ok(matches.into_iter().map(|(handle, _)| handle).collect())
    }

    fn delete<E: Entity>(&self, object: &Managed<E>) -> Result<bool> {
        let state = self.lock_state();
        self.require_registered(&state, object)?;
        Ok(object.mark_deleted())
    }

    fn existing_object<E: Entity>(&self, id: &ObjectId) -> Result<Managed<E>> {
        let not_found = || Error::ObjectNotFound {
            id: id.clone(),
            context: self.inner.id,
        };

        if id.entity != E::ENTITY_NAME {
            return Err(not_found());
        }

        let mut state = self.lock_state();
        if let Some(registration) = state.objects.get(&id.key) {
            if registration.object.is_deleted() {
                return Err(not_found());
            }
            return Managed::<E>::from_erased(Arc::clone(&registration.object))
                .ok_or_else(not_found);
        }

        let record = self.store().record(id).ok_or_else(not_found)?;
        let handle = self.materialize::<E>(&record)?;
        state.objects.insert(
            id.key,
            Registration {
                object: handle.erased(),
                inserted: false,
            },
        );
        Ok(handle)
    }

    fn obtain_permanent_id<E: Entity>(&self, object: &Managed<E>) -> Result<()> {
        let state = self.lock_state();
        self.require_registered(&state, object)?;
        object.mark_permanent();
        Ok(())
    }

    fn decode<T: DeserializeOwned>(&self, payload: serde_json::Value) -> Result<T> {
        decoding_in(Arc::downgrade(&self.inner), || {
            serde_json::from_value(payload).map_err(Into::into)
        })
    }
}

/// Whether two contexts share the same committed store.
pub fn share_store(a: &MemoryContext, b: &MemoryContext) -> bool {
    a.store().same_store(b.store())
}
