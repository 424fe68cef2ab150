//! Blog model shared by the integration tests.
#![allow(dead_code)]

use plainsync_engine::{
    assign, AttributeDef, AttributeType, Entity, EntityDescription, EntityList, EntityRef,
    EntitySet, MemoryStore, ObjectId, PersistenceContext, PlainObjectBridge, RelationshipDef,
    Schema, SyncEngine, UniqueKey,
};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plainsync_engine=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

pub fn blog_schema() -> Schema {
    Schema::new(1)
        .with_entity(
            EntityDescription::new(
                "Post",
                vec![
                    AttributeDef::required("title", AttributeType::String),
                    AttributeDef::optional("body", AttributeType::String),
                ],
            )
            .with_relationship(RelationshipDef::to_one("author", "Author"))
            .with_relationship(RelationshipDef::to_many("tags", "Tag"))
            .with_relationship(RelationshipDef::to_many("comments", "Comment")),
        )
        .with_entity(
            EntityDescription::new(
                "Comment",
                vec![
                    AttributeDef::required("author", AttributeType::String),
                    AttributeDef::optional("text", AttributeType::String),
                    AttributeDef::optional("anchor", AttributeType::String),
                ],
            )
            .with_relationship(RelationshipDef::to_one("post", "Post")),
        )
        .with_entity(EntityDescription::new(
            "Author",
            vec![
                AttributeDef::required("handle", AttributeType::String),
                AttributeDef::optional("name", AttributeType::String),
            ],
        ))
        .with_entity(EntityDescription::new(
            "Tag",
            vec![
                AttributeDef::required("name", AttributeType::String),
                AttributeDef::optional("colour", AttributeType::String),
            ],
        ))
}

pub fn blog_store() -> MemoryStore {
    init_tracing();
    MemoryStore::new(blog_schema())
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Tag {
    pub name: Option<String>,
    pub colour: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct TagPlain {
    pub name: String,
    pub colour: Option<String>,
}

impl TagPlain {
    pub fn named(name: &str) -> Self {
        Self {
            name: name.into(),
            colour: None,
        }
    }
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

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Author {
    pub handle: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorPlain {
    pub handle: String,
    pub name: Option<String>,
}

impl AuthorPlain {
    pub fn new(handle: &str, name: Option<&str>) -> Self {
        Self {
            handle: handle.into(),
            name: name.map(Into::into),
        }
    }
}

impl Entity for Author {
    const ENTITY_NAME: &'static str = "Author";
}

impl PlainObjectBridge for Author {
    type Plain = AuthorPlain;

    fn fill<C: PersistenceContext>(&mut self, plain: &AuthorPlain, _ctx: &C, _this: &ObjectId) {
        self.handle = Some(plain.handle.clone());
        assign(&mut self.name, plain.name.clone(), true);
    }

    fn to_plain(&self) -> AuthorPlain {
        AuthorPlain {
            handle: self.handle.clone().unwrap_or_default(),
            name: self.name.clone(),
        }
    }

    fn unique_key(plain: &AuthorPlain) -> Option<UniqueKey> {
        Some(UniqueKey::new("handle", plain.handle.clone()))
    }
}

/// Comments have no natural key. `anchor` is derived in `fill` from the
/// title of the post set by the hook, read while that post is still filling.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Comment {
    pub author: Option<String>,
    pub text: Option<String>,
    pub post: Option<EntityRef<Post>>,
    pub anchor: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentPlain {
    pub author: String,
    pub text: String,
}

impl CommentPlain {
    pub fn new(author: &str, text: &str) -> Self {
        Self {
            author: author.into(),
            text: text.into(),
        }
    }
}

impl Entity for Comment {
    const ENTITY_NAME: &'static str = "Comment";
}

impl PlainObjectBridge for Comment {
    type Plain = CommentPlain;

    fn fill<C: PersistenceContext>(&mut self, plain: &CommentPlain, ctx: &C, _this: &ObjectId) {
        self.author = Some(plain.author.clone());
        self.text = Some(plain.text.clone());
        self.anchor = self
            .post
            .as_ref()
            .and_then(|post| post.resolve_in(ctx))
            .and_then(|post| post.read(|p| p.title.clone()))
            .map(|title| format!("{title}/{}", plain.author));
    }

    fn to_plain(&self) -> CommentPlain {
        CommentPlain {
            author: self.author.clone().unwrap_or_default(),
            text: self.text.clone().unwrap_or_default(),
        }
    }
}

/// Keyed by title. Tags and authors are shared between posts, comments are
/// owned.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Post {
    pub title: Option<String>,
    pub body: Option<String>,
    pub author: Option<EntityRef<Author>>,
    pub tags: Option<EntitySet<Tag>>,
    pub comments: Option<EntityList<Comment>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostPlain {
    pub title: String,
    pub body: Option<String>,
    pub author: Option<AuthorPlain>,
    pub tags: Vec<TagPlain>,
    pub comments: Vec<CommentPlain>,
}

impl PostPlain {
    pub fn new(title: &str, tags: &[&str], comments: Vec<CommentPlain>) -> Self {
        Self {
            title: title.into(),
            body: None,
            author: None,
            tags: tags.iter().map(|name| TagPlain::named(name)).collect(),
            comments,
        }
    }
}

impl Entity for Post {
    const ENTITY_NAME: &'static str = "Post";
}

impl PlainObjectBridge for Post {
    type Plain = PostPlain;

    fn fill<C: PersistenceContext>(&mut self, plain: &PostPlain, ctx: &C, this: &ObjectId) {
        self.title = Some(plain.title.clone());
        assign(&mut self.body, plain.body.clone(), false);
        self.tags = Some(Tag::sync_set(ctx, &plain.tags));
        Author::sync_one(ctx, &mut self.author, plain.author.as_ref());

        let parent = ctx.existing_object::<Post>(this).ok();
        Comment::replace_ordered_with(
            ctx,
            &mut self.comments,
            Some(plain.comments.as_slice()),
            |comment| comment.post = parent.clone().map(EntityRef::new),
        );
    }

    fn to_plain(&self) -> PostPlain {
        let mut tags = self
            .tags
            .as_ref()
            .map(Tag::to_plain_array)
            .unwrap_or_default();
        tags.sort();

        PostPlain {
            title: self.title.clone().unwrap_or_default(),
            body: self.body.clone(),
            author: self
                .author
                .as_ref()
                .and_then(EntityRef::get)
                .map(|author| author.read(Author::to_plain)),
            tags,
            comments: self
                .comments
                .as_ref()
                .map(Comment::to_plain_list)
                .unwrap_or_default(),
        }
    }

    fn unique_key(plain: &PostPlain) -> Option<UniqueKey> {
        Some(UniqueKey::new("title", plain.title.clone()))
    }
}
