//! Entity lifecycle: create, find-or-create and cascading delete.

use crate::adapter::log_failure;
use crate::{EntityStore, Managed, PersistenceContext, Predicate, Relationship};

pub trait EntityLifecycle: EntityStore {
    /// Create an entity, logging and absorbing a schema failure.
    fn create_or_fail<C: PersistenceContext>(ctx: &C) -> Option<Managed<Self>> {
        match Self::create_in(ctx) {
            Ok(created) => Some(created),
            Err(err) => {
                log_failure(Self::ENTITY_NAME, &err, "cannot create entity");
                None
            }
        }
    }

    /// The last entity matching `predicate`, or the last of all entities
    /// when there is no predicate. Creates one when nothing matches.
    ///
    /// A failed fetch counts as nothing matching.
    fn lazy_create<C: PersistenceContext>(
        ctx: &C,
        predicate: Option<&Predicate>,
    ) -> Option<Managed<Self>> {
        let found = match predicate {
            Some(predicate) => Self::find_all_with_predicate(ctx, predicate),
            None => Self::find_all(ctx),
        };

        found
            .and_then(|mut matches| matches.pop())
            .or_else(|| Self::create_or_fail(ctx))
    }

    /// Delete every member of `collection`, then clear the reference.
    fn delete_cascade<C, R>(ctx: &C, collection: &mut Option<R>)
    where
        C: PersistenceContext,
        R: Relationship<Self>,
    {
        if let Some(members) = collection.take() {
            let deleted = Self::delete_all(ctx, &members);
            tracing::debug!(
                entity = Self::ENTITY_NAME,
                context = %ctx.id(),
                deleted,
                "cascade delete"
            );
        }
    }
}

impl<E: EntityStore> EntityLifecycle for E {}
