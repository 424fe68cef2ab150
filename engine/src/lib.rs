//! # Plainsync Engine
//!
//! Synchronization between plain values and persistent entities.
//!
//! Applications often carry two representations of the same data: plain
//! values decoded from an API or built by UI code, and entities bound to a
//! persistence context. This crate converts between them, reusing existing
//! entities by a natural key instead of creating duplicates.
//!
//! ## Core Concepts
//!
//! ### Entities and contexts
//!
//! An [`Entity`] type is stored as a JSON attribute payload. A
//! [`PersistenceContext`] owns entities through [`Managed`] handles. Every
//! operation takes the context explicitly. [`MemoryStore`] and
//! [`MemoryContext`] are the in-memory implementation.
//!
//! ### The bridge
//!
//! [`PlainObjectBridge`] is the per-type conversion contract: `fill` from a
//! plain value, `to_plain` back, and an optional [`UniqueKey`].
//!
//! ### Relationships
//!
//! [`EntityRef`], [`EntitySet`] and [`EntityList`] fields serialize as object
//! ids and are committed with their owner. Read back in another context,
//! their members bind there on first access.
//!
//! ### Operations
//!
//! Operations are extension traits implemented for every entity type:
//! - [`EntityStore`] - create, find, sort, delete, move between contexts
//! - [`EntityLifecycle`] - find-or-create and cascading delete
//! - [`SyncEngine`] - unique lookup, whole-collection synchronization and
//!   to-one references
//!
//! The `find_*` and `lazy_*` operations log failures with `tracing` and
//! return `None`. The `try_*` variants return [`Result`].
//!
//! ## Quick Start
//!
//! ```rust
//! use plainsync_engine::{
//!     assign, AttributeDef, AttributeType, Entity, EntityDescription, MemoryStore, ObjectId,
//!     PersistenceContext, PlainObjectBridge, Schema, SyncEngine, UniqueKey,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Default, Serialize, Deserialize)]
//! struct Tag {
//!     name: Option<String>,
//!     colour: Option<String>,
//! }
//!
//! struct TagPlain {
//!     name: String,
//!     colour: Option<String>,
//! }
//!
//! impl Entity for Tag {
//!     const ENTITY_NAME: &'static str = "Tag";
//! }
//!
//! impl PlainObjectBridge for Tag {
//!     type Plain = TagPlain;
//!
//!     fn fill<C: PersistenceContext>(&mut self, plain: &TagPlain, _ctx: &C, _this: &ObjectId) {
//!         self.name = Some(plain.name.clone());
//!         assign(&mut self.colour, plain.colour.clone(), false);
//!     }
//!
//!     fn to_plain(&self) -> TagPlain {
//!         TagPlain {
//!             name: self.name.clone().unwrap_or_default(),
//!             colour: self.colour.clone(),
//!         }
//!     }
//!
//!     fn unique_key(plain: &TagPlain) -> Option<UniqueKey> {
//!         Some(UniqueKey::new("name", plain.name.clone()))
//!     }
//! }
//!
//! // 1. Describe the entity
//! let schema = Schema::new(1).with_entity(EntityDescription::new(
//!     "Tag",
//!     vec![
//!         AttributeDef::required("name", AttributeType::String),
//!         AttributeDef::optional("colour", AttributeType::String),
//!     ],
//! ));
//!
//! // 2. Open a context
//! let store = MemoryStore::new(schema);
//! let ctx = store.new_context();
//!
//! // 3. Synchronize plain values
//! let plains = ["red", "blue", "red"].map(|name| TagPlain {
//!     name: name.into(),
//!     colour: None,
//! });
//! let tags = Tag::sync_ordered(&ctx, &plains);
//! assert_eq!(tags.len(), 3);
//! assert!(tags[0].ptr_eq(&tags[2]));
//!
//! // 4. Commit
//! let summary = ctx.save().unwrap();
//! assert_eq!(summary.inserted, 2);
//! ```
//!
//! ## Persistence
//!
//! Use [`MemoryStore::export_snapshot`] and [`MemoryStore::import_snapshot`]
//! with [`StoreSnapshot`] to persist committed rows. Snapshots are
//! serializable to JSON with deterministic ordering.

pub mod adapter;
pub mod bridge;
pub mod collection;
pub mod config;
pub mod context;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod object;
pub mod predicate;
pub mod record;
pub mod schema;
pub mod snapshot;
pub mod sync;

#[cfg(test)]
mod test_support;

// Re-export main types at crate root
pub use adapter::EntityStore;
pub use bridge::{assign, PlainObjectBridge, UniqueKey};
pub use collection::{EntityList, EntityRef, EntitySet, Members, Relationship};
pub use config::{ConfigError, StoreConfig};
pub use context::PersistenceContext;
pub use error::{Error, Result};
pub use lifecycle::EntityLifecycle;
pub use memory::{share_store, MemoryContext, MemoryStore, SaveSummary};
pub use object::{ContextId, Entity, EntityGuard, Managed, ObjectId};
pub use predicate::{FetchRequest, Predicate, SortDescriptor};
pub use record::Record;
pub use schema::{AttributeDef, AttributeType, EntityDescription, RelationshipDef, Schema};
pub use snapshot::{StoreSnapshot, SNAPSHOT_FORMAT_VERSION};
pub use sync::SyncEngine;

/// Type aliases for clarity
pub type EntityName = String;
pub type Version = u64;
pub type SchemaVersion = u32;
