//! Entity store adapter: typed create, find and delete over a
//! [`PersistenceContext`].
//!
//! The `find_*` family absorbs failures into `None` and logs them. Use
//! [`EntityStore::try_find`] to tell an empty result from a failed query.

use crate::{
    error::Result, Entity, Error, FetchRequest, Managed, PersistenceContext, Predicate,
    Relationship, SortDescriptor,
};

/// Typed persistence operations, available on every [`Entity`].
pub trait EntityStore: Entity + Sized {
    /// Insert a new, default-initialised entity into `ctx`.
    ///
    /// # Errors
    /// [`Error::EntityNotFound`] when the context's schema has no description
    /// for this type.
    fn create_in<C: PersistenceContext>(ctx: &C) -> Result<Managed<Self>> {
        ctx.insert::<Self>()
    }

    /// Execute a fetch, surfacing query failures.
    fn try_find<C: PersistenceContext>(ctx: &C, request: &FetchRequest) -> Result<Vec<Managed<Self>>> {
        ctx.execute_fetch(request)
    }

    /// Every entity of this type, in store order.
    fn find_all<C: PersistenceContext>(ctx: &C) -> Option<Vec<Managed<Self>>> {
        fetch_or_log(ctx, &FetchRequest::new(Self::ENTITY_NAME))
    }

    fn find_all_with_predicate<C: PersistenceContext>(
        ctx: &C,
        predicate: &Predicate,
    ) -> Option<Vec<Managed<Self>>> {
        let request = FetchRequest::new(Self::ENTITY_NAME).with_predicate(Some(predicate.clone()));
        fetch_or_log(ctx, &request)
    }

    /// Entities sorted by a comma-separated list of attribute names, all in
    /// the same direction.
    fn find_all_sorted_by<C: PersistenceContext>(
        ctx: &C,
        sort_terms: &str,
        ascending: bool,
        predicate: Option<&Predicate>,
    ) -> Option<Vec<Managed<Self>>> {
        let request = FetchRequest::new(Self::ENTITY_NAME)
            .with_predicate(predicate.cloned())
            .with_sort(SortDescriptor::parse_list(sort_terms, ascending));
        fetch_or_log(ctx, &request)
    }

    /// Resolve `object`, owned by `source`, in `target`.
    ///
    /// A temporary id is made permanent in `source` first. Returns `None`
    /// when either step fails, e.g. when `target` cannot see the object's
    /// committed row.
    fn rehost<S, T>(object: &Managed<Self>, source: &S, target: &T) -> Option<Managed<Self>>
    where
        S: PersistenceContext,
        T: PersistenceContext,
    {
        if object.has_temporary_id() {
            if let Err(err) = source.obtain_permanent_id(object) {
                tracing::warn!(
                    id = %object.id(),
                    context = %source.id(),
                    error = %err,
                    "cannot obtain permanent id"
                );
                return None;
            }
        }

        match target.existing_object::<Self>(object.id()) {
            Ok(resolved) => Some(resolved),
            Err(err) => {
                tracing::warn!(
                    id = %object.id(),
                    context = %target.id(),
                    error = %err,
                    "cannot resolve object in target context"
                );
                None
            }
        }
    }

    /// Remove `object` from `ctx`. Returns `false` when it was already
    /// deleted or could not be deleted.
    fn delete<C: PersistenceContext>(ctx: &C, object: &Managed<Self>) -> bool {
        match ctx.delete(object) {
            Ok(removed) => removed,
            Err(err) => {
                tracing::warn!(
                    id = %object.id(),
                    context = %ctx.id(),
                    error = %err,
                    "cannot delete object"
                );
                false
            }
        }
    }

    /// Remove every distinct member of `collection` from `ctx`, binding
    /// members decoded from a committed row there first. Returns the number
    /// of entities actually deleted.
    fn delete_all<C, R>(ctx: &C, collection: &R) -> usize
    where
        C: PersistenceContext,
        R: Relationship<Self>,
    {
        collection
            .resolve_in(ctx)
            .iter()
            .filter(|member| Self::delete(ctx, member))
            .count()
    }
}

impl<E: Entity> EntityStore for E {}

/// Run a fetch, logging and absorbing any failure.
pub(crate) fn fetch_or_log<E, C>(ctx: &C, request: &FetchRequest) -> Option<Vec<Managed<E>>>
where
    E: Entity,
    C: PersistenceContext,
{
    match ctx.execute_fetch(request) {
        Ok(found) => Some(found),
        Err(err) => {
            log_failure(E::ENTITY_NAME, &err, "fetch failed");
            None
        }
    }
}

/// Log an absorbed failure. Missing entity descriptions are configuration
/// errors and log at `error`; everything else at `warn`.
pub(crate) fn log_failure(entity: &str, err: &Error, message: &str) {
    match err {
        Error::EntityNotFound(_) => tracing::error!(entity, error = %err, "{message}"),
        _ => tracing::warn!(entity, error = %err, "{message}"),
    }
}
