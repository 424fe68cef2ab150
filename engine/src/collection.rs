//! Relationship fields.
//!
//! [`EntityRef`] is a to-one reference, [`EntitySet`] and [`EntityList`] are
//! to-many collections. All three serialize as object ids, so membership is
//! committed with the owning entity's row.
//!
//! Values built by synchronization hold bound handles. Values decoded from a
//! row hold ids only and bind each member to a handle in the decoding
//! context on first access. A member that cannot be bound there, e.g.
//! because it was deleted, is skipped by iteration and logged.

use crate::memory::ContextInner;
use crate::{Entity, Managed, MemoryContext, ObjectId, PersistenceContext};
use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::{OnceLock, Weak};

/// Context decoded members bind in.
type Source = Weak<ContextInner>;

thread_local! {
    static DECODING_IN: RefCell<Option<Source>> = const { RefCell::new(None) };
}

struct RestoreSource(Option<Source>);

impl Drop for RestoreSource {
    fn drop(&mut self) {
        let previous = self.0.take();
        DECODING_IN.with(|cell| *cell.borrow_mut() = previous);
    }
}

/// Run `decode` with every relationship field it deserializes bound to
/// `source`.
pub(crate) fn decoding_in<R>(source: Source, decode: impl FnOnce() -> R) -> R {
    let _restore = RestoreSource(DECODING_IN.with(|cell| cell.replace(Some(source))));
    decode()
}

fn current_source() -> Option<Source> {
    DECODING_IN.with(|cell| cell.borrow().clone())
}

struct Member<E> {
    id: ObjectId,
    handle: OnceLock<Managed<E>>,
}

impl<E> Member<E> {
    fn bound(handle: Managed<E>) -> Self {
        Self {
            id: handle.id().clone(),
            handle: OnceLock::from(handle),
        }
    }

    fn unbound(id: ObjectId) -> Self {
        Self {
            id,
            handle: OnceLock::new(),
        }
    }
}

impl<E: Entity> Member<E> {
    fn resolve(&self, source: Option<&Source>) -> Option<&Managed<E>> {
        if let Some(handle) = self.handle.get() {
            return Some(handle);
        }
        match source.and_then(MemoryContext::from_source) {
            Some(ctx) => self.resolve_in(&ctx),
            None => {
                tracing::warn!(id = %self.id, "relationship member has no context to bind in");
                None
            }
        }
    }

    fn resolve_in<C: PersistenceContext>(&self, ctx: &C) -> Option<&Managed<E>> {
        if let Some(handle) = self.handle.get() {
            return Some(handle);
        }
        match ctx.existing_object::<E>(&self.id) {
            Ok(handle) => Some(self.handle.get_or_init(|| handle)),
            Err(err) => {
                tracing::warn!(id = %self.id, error = %err, "cannot bind relationship member");
                None
            }
        }
    }
}

impl<E> Clone for Member<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            handle: self.handle.clone(),
        }
    }
}

/// Iterator over the bound members of a relationship field.
pub struct Members<'a, E> {
    members: Box<dyn Iterator<Item = &'a Member<E>> + 'a>,
    source: Option<&'a Source>,
}

impl<'a, E: Entity> Iterator for Members<'a, E> {
    type Item = &'a Managed<E>;

    fn next(&mut self) -> Option<Self::Item> {
        let source = self.source;
        self.members.find_map(|member| member.resolve(source))
    }
}

/// Common access to to-many relationship fields.
pub trait Relationship<E: Entity> {
    /// Member ids in iteration order. Ordered collections may repeat an id.
    fn member_ids(&self) -> Vec<ObjectId>;

    /// Members in iteration order, bound in the context the field was
    /// decoded in.
    fn members(&self) -> Members<'_, E>;

    /// Distinct members, each reported once.
    fn distinct_members(&self) -> Vec<Managed<E>> {
        let mut seen = HashSet::new();
        self.members()
            .filter(|member| seen.insert(member.id().clone()))
            .cloned()
            .collect()
    }

    /// Distinct members, binding unbound ones in `ctx`.
    fn resolve_in<C: PersistenceContext>(&self, ctx: &C) -> Vec<Managed<E>>;
}

fn resolve_distinct<'a, E, C>(members: impl Iterator<Item = &'a Member<E>>, ctx: &C) -> Vec<Managed<E>>
where
    E: Entity,
    C: PersistenceContext,
{
    let mut seen = HashSet::new();
    members
        .filter(|member| seen.insert(&member.id))
        .filter_map(|member| member.resolve_in(ctx).cloned())
        .collect()
}

/// To-one relationship field.
pub struct EntityRef<E> {
    member: Member<E>,
    source: Option<Source>,
}

impl<E> EntityRef<E> {
    pub fn new(target: Managed<E>) -> Self {
        Self {
            member: Member::bound(target),
            source: None,
        }
    }

    pub fn id(&self) -> &ObjectId {
        &self.member.id
    }
}

impl<E: Entity> EntityRef<E> {
    /// The referenced entity, bound on first access.
    pub fn get(&self) -> Option<&Managed<E>> {
        self.member.resolve(self.source.as_ref())
    }

    /// The referenced entity, binding it in `ctx` if it is not bound yet.
    pub fn resolve_in<C: PersistenceContext>(&self, ctx: &C) -> Option<&Managed<E>> {
        self.member.resolve_in(ctx)
    }
}

impl<E> Clone for EntityRef<E> {
    fn clone(&self) -> Self {
        Self {
            member: self.member.clone(),
            source: self.source.clone(),
        }
    }
}

impl<E> fmt::Debug for EntityRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EntityRef").field(&self.member.id).finish()
    }
}

impl<E> Serialize for EntityRef<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.member.id.serialize(serializer)
    }
}

impl<'de, E> Deserialize<'de> for EntityRef<E> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let id = ObjectId::deserialize(deserializer)?;
        Ok(Self {
            member: Member::unbound(id),
            source: current_source(),
        })
    }
}

/// Unordered to-many relationship. Members are kept in id order.
pub struct EntitySet<E> {
    members: BTreeMap<ObjectId, Member<E>>,
    source: Option<Source>,
}

impl<E> EntitySet<E> {
    pub fn new() -> Self {
        Self {
            members: BTreeMap::new(),
            source: None,
        }
    }

    /// Add a member. Returns `false` if it was already present.
    pub fn insert(&mut self, member: Managed<E>) -> bool {
        if self.members.contains_key(member.id()) {
            return false;
        }
        self.members
            .insert(member.id().clone(), Member::bound(member));
        true
    }

    pub fn remove(&mut self, member: &Managed<E>) -> bool {
        self.members.remove(member.id()).is_some()
    }

    pub fn contains(&self, member: &Managed<E>) -> bool {
        self.members.contains_key(member.id())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.members.keys()
    }
}

impl<E: Entity> EntitySet<E> {
    pub fn iter(&self) -> Members<'_, E> {
        self.members()
    }
}

impl<E> Default for EntitySet<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EntitySet<E> {
    fn clone(&self) -> Self {
        Self {
            members: self.members.clone(),
            source: self.source.clone(),
        }
    }
}

impl<E> fmt::Debug for EntitySet<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.members.keys()).finish()
    }
}

impl<E> FromIterator<Managed<E>> for EntitySet<E> {
    fn from_iter<I: IntoIterator<Item = Managed<E>>>(iter: I) -> Self {
        let mut set = Self::new();
        for member in iter {
            set.insert(member);
        }
        set
    }
}

impl<'a, E: Entity> IntoIterator for &'a EntitySet<E> {
    type Item = &'a Managed<E>;
    type IntoIter = Members<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.members()
    }
}

impl<E: Entity> Relationship<E> for EntitySet<E> {
    fn member_ids(&self) -> Vec<ObjectId> {
        self.members.keys().cloned().collect()
    }

    fn members(&self) -> Members<'_, E> {
        Members {
            members: Box::new(self.members.values()),
            source: self.source.as_ref(),
        }
    }

    fn resolve_in<C: PersistenceContext>(&self, ctx: &C) -> Vec<Managed<E>> {
        resolve_distinct(self.members.values(), ctx)
    }
}

impl<E> Serialize for EntitySet<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.members.keys())
    }
}

impl<'de, E> Deserialize<'de> for EntitySet<E> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ids = Vec::<ObjectId>::deserialize(deserializer)?;
        Ok(Self {
            members: ids
                .into_iter()
                .map(|id| (id.clone(), Member::unbound(id)))
                .collect(),
            source: current_source(),
        })
    }
}

/// Order-preserving to-many relationship.
///
/// The same member may occupy several positions.
pub struct EntityList<E> {
    members: Vec<Member<E>>,
    source: Option<Source>,
}

impl<E> EntityList<E> {
    pub fn new() -> Self {
        Self {
            members: Vec::new(),
            source: None,
        }
    }

    pub fn push(&mut self, member: Managed<E>) {
        self.members.push(Member::bound(member));
    }

    pub fn contains(&self, member: &Managed<E>) -> bool {
        self.members.iter().any(|m| &m.id == member.id())
    }

    /// Number of positions, counting repeated members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn ids(&self) -> impl Iterator<Item = &ObjectId> {
        self.members.iter().map(|m| &m.id)
    }
}

impl<E: Entity> EntityList<E> {
    pub fn get(&self, index: usize) -> Option<&Managed<E>> {
        self.members.get(index)?.resolve(self.source.as_ref())
    }

    pub fn iter(&self) -> Members<'_, E> {
        self.members()
    }
}

impl<E> Default for EntityList<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> Clone for EntityList<E> {
    fn clone(&self) -> Self {
        Self {
            members: self.members.clone(),
            source: self.source.clone(),
        }
    }
}

impl<E> fmt::Debug for EntityList<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl<E: Entity> std::ops::Index<usize> for EntityList<E> {
    type Output = Managed<E>;

    /// # Panics
    /// When `index` is out of bounds or the member cannot be bound.
    fn index(&self, index: usize) -> &Self::Output {
        match self.get(index) {
            Some(member) => member,
            None => panic!("no bound member at position {index} of {}", self.len()),
        }
    }
}

impl<E> FromIterator<Managed<E>> for EntityList<E> {
    fn from_iter<I: IntoIterator<Item = Managed<E>>>(iter: I) -> Self {
        Self {
            members: iter.into_iter().map(Member::bound).collect(),
            source: None,
        }
    }
}

impl<'a, E: Entity> IntoIterator for &'a EntityList<E> {
    type Item = &'a Managed<E>;
    type IntoIter = Members<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.members()
    }
}

impl<E: Entity> Relationship<E> for EntityList<E> {
    fn member_ids(&self) -> Vec<ObjectId> {
        self.ids().cloned().collect()
    }

    fn members(&self) -> Members<'_, E> {
        Members {
            members: Box::new(self.members.iter()),
            source: self.source.as_ref(),
        }
    }

    fn resolve_in<C: PersistenceContext>(&self, ctx: &C) -> Vec<Managed<E>> {
        resolve_distinct(self.members.iter(), ctx)
    }
}

impl<E> Serialize for EntityList<E> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.ids())
    }
}

impl<'de, E> Deserialize<'de> for EntityList<E> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let ids = Vec::<ObjectId>::deserialize(deserializer)?;
        Ok(Self {
            members: ids.into_iter().map(Member::unbound).collect(),
            source: current_source(),
        })
    }
}
