//! Synchronization of plain values into entities and relationship
//! fields.
//!
//! Resolution is by unique key: a plain value whose key matches an existing
//! entity reuses it, otherwise a new entity is created. Fetches see this
//! context's pending inserts, so a key repeated within one pass resolves to
//! the entity created for its first occurrence.
//!
//! An entity is checked out of its handle while it fills, so nested
//! synchronization may read it without blocking. For the duration, readers
//! see its state as of the hook with the unique key already applied, and
//! fetches match it by that key.

use crate::{
    error::Result, EntityLifecycle, EntityList, EntityRef, EntitySet, FetchRequest, Managed,
    PersistenceContext, PlainObjectBridge, UniqueKey,
};
use serde_json::Value;

pub trait SyncEngine: PlainObjectBridge + EntityLifecycle {
    /// Like [`find_unique`](Self::find_unique), but surfaces query failures.
    fn try_find_unique<C: PersistenceContext>(
        ctx: &C,
        plain: &Self::Plain,
    ) -> Result<Option<Managed<Self>>> {
        let Some(key) = Self::unique_key(plain) else {
            return Ok(None);
        };
        let request = FetchRequest::new(Self::ENTITY_NAME).with_predicate(Some(key.predicate()));
        Ok(Self::try_find(ctx, &request)?.pop())
    }

    /// The last entity whose unique key matches `plain`. `None` when the type
    /// has no key, nothing matches, or the fetch fails.
    fn find_unique<C: PersistenceContext>(ctx: &C, plain: &Self::Plain) -> Option<Managed<Self>> {
        let key = Self::unique_key(plain)?;
        Self::find_all_with_predicate(ctx, &key.predicate())?.pop()
    }

    /// Reuse the entity matching `plain`'s key, or create a new one. Does
    /// not fill.
    fn lazy_create_unique<C: PersistenceContext>(
        ctx: &C,
        plain: &Self::Plain,
    ) -> Option<Managed<Self>> {
        Self::find_unique(ctx, plain).or_else(|| Self::create_or_fail(ctx))
    }

    /// Resolve an entity for `plain` and fill it.
    ///
    /// When `plain` resolves to an entity that is already being filled
    /// further up the call chain, that entity is returned as is.
    fn lazy_create_and_fill_unique<C: PersistenceContext>(
        ctx: &C,
        plain: &Self::Plain,
    ) -> Option<Managed<Self>> {
        resolve_and_fill::<Self, C, _>(ctx, plain, &mut |_: &mut Self| {})
    }

    fn sync_set<C: PersistenceContext>(ctx: &C, plains: &[Self::Plain]) -> EntitySet<Self> {
        Self::sync_set_with(ctx, plains, |_| {})
    }

    /// Build an unordered collection from `plains`.
    ///
    /// `before_fill` runs on each resolved entity before it is filled,
    /// typically to set a back-reference to the owning parent. Entries that
    /// cannot be resolved are skipped.
    fn sync_set_with<C, F>(ctx: &C, plains: &[Self::Plain], mut before_fill: F) -> EntitySet<Self>
    where
        C: PersistenceContext,
        F: FnMut(&mut Self),
    {
        let mut members = EntitySet::new();
        for plain in plains {
            if let Some(item) = resolve_and_fill::<Self, C, F>(ctx, plain, &mut before_fill) {
                members.insert(item);
            }
        }

        log_pass::<Self>(plains.len(), members.len(), "set synchronized");
        members
    }

    fn sync_ordered<C: PersistenceContext>(ctx: &C, plains: &[Self::Plain]) -> EntityList<Self> {
        Self::sync_ordered_with(ctx, plains, |_| {})
    }

    /// Build an ordered collection from `plains`, one position per resolved
    /// entry. A key repeated in the input yields the same entity at each of
    /// its positions.
    fn sync_ordered_with<C, F>(
        ctx: &C,
        plains: &[Self::Plain],
        mut before_fill: F,
    ) -> EntityList<Self>
    where
        C: PersistenceContext,
        F: FnMut(&mut Self),
    {
        let mut members = EntityList::new();
        for plain in plains {
            if let Some(item) = resolve_and_fill::<Self, C, F>(ctx, plain, &mut before_fill) {
                members.push(item);
            }
        }

        log_pass::<Self>(plains.len(), members.len(), "list synchronized");
        members
    }

    /// Rebuild an owned unordered relationship: delete its current members,
    /// then synchronize `plains` into it. `None` leaves it cleared.
    fn replace_set_with<C, F>(
        ctx: &C,
        target: &mut Option<EntitySet<Self>>,
        plains: Option<&[Self::Plain]>,
        before_fill: F,
    ) where
        C: PersistenceContext,
        F: FnMut(&mut Self),
    {
        Self::delete_cascade(ctx, target);
        *target = plains.map(|plains| Self::sync_set_with(ctx, plains, before_fill));
    }

    /// Ordered counterpart of [`replace_set_with`](Self::replace_set_with).
    fn replace_ordered_with<C, F>(
        ctx: &C,
        target: &mut Option<EntityList<Self>>,
        plains: Option<&[Self::Plain]>,
        before_fill: F,
    ) where
        C: PersistenceContext,
        F: FnMut(&mut Self),
    {
        Self::delete_cascade(ctx, target);
        *target = plains.map(|plains| Self::sync_ordered_with(ctx, plains, before_fill));
    }

    /// Point a to-one reference at the entity resolved for `plain` and fill
    /// it. An absent `plain`, or one that cannot be resolved, leaves the
    /// reference unchanged.
    fn sync_one<C: PersistenceContext>(
        ctx: &C,
        target: &mut Option<EntityRef<Self>>,
        plain: Option<&Self::Plain>,
    ) -> Option<Managed<Self>> {
        let item = Self::lazy_create_and_fill_unique(ctx, plain?)?;
        *target = Some(EntityRef::new(item.clone()));
        Some(item)
    }

    /// Like [`sync_one`](Self::sync_one) for an owned reference: the entity
    /// referenced so far is deleted first, and an absent `plain` clears the
    /// reference.
    fn replace_one<C: PersistenceContext>(
        ctx: &C,
        target: &mut Option<EntityRef<Self>>,
        plain: Option<&Self::Plain>,
    ) -> Option<Managed<Self>> {
        if let Some(previous) = target.take() {
            if let Some(previous) = previous.resolve_in(ctx) {
                Self::delete(ctx, previous);
            }
        }
        Self::sync_one(ctx, target, plain)
    }

    /// Plain values of every member, in id order.
    ///
    /// Blocks on each member's lock, so it must not be called on a collection
    /// containing an entity the caller holds locked.
    fn to_plain_array(members: &EntitySet<Self>) -> Vec<Self::Plain> {
        members.iter().map(|member| member.read(Self::to_plain)).collect()
    }

    /// Plain values in list order, repeats included.
    fn to_plain_list(members: &EntityList<Self>) -> Vec<Self::Plain> {
        members.iter().map(|member| member.read(Self::to_plain)).collect()
    }
}

impl<E: PlainObjectBridge> SyncEngine for E {}

/// Resolve `plain`, then run the hook and fill on the checked-out value.
fn resolve_and_fill<E, C, F>(ctx: &C, plain: &E::Plain, before_fill: &mut F) -> Option<Managed<E>>
where
    E: SyncEngine,
    C: PersistenceContext,
    F: FnMut(&mut E),
{
    let item = E::lazy_create_unique(ctx, plain)?;
    let Some(mut value) = item.begin_fill() else {
        tracing::debug!(id = %item.id(), "entity is already being filled");
        return Some(item);
    };

    before_fill(&mut value);
    match preview(ctx, &value, E::unique_key(plain)) {
        Ok((stand_in, payload)) => item.show_while_filling(stand_in, payload),
        Err(err) => tracing::warn!(id = %item.id(), error = %err, "cannot preview entity being filled"),
    }
    value.fill(plain, ctx, item.id());
    item.end_fill(value);
    Some(item)
}

/// The payload `value` will be matched on while it fills, and a copy for
/// readers. The unique key is applied ahead of `fill`.
fn preview<E, C>(ctx: &C, value: &E, key: Option<UniqueKey>) -> Result<(E, Value)>
where
    E: PlainObjectBridge,
    C: PersistenceContext,
{
    let mut payload = serde_json::to_value(value)?;
    if let (Some(key), Some(fields)) = (key, payload.as_object_mut()) {
        fields.insert(key.key, key.value);
    }
    Ok((ctx.decode(payload.clone())?, payload))
}

fn log_pass<E: SyncEngine>(requested: usize, resolved: usize, message: &str) {
    if resolved < requested {
        tracing::warn!(
            entity = E::ENTITY_NAME,
            requested,
            resolved,
            "{message} with unresolved entries"
        );
    } else {
        tracing::debug!(entity = E::ENTITY_NAME, requested, resolved, "{message}");
    }
}
