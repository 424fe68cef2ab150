//! Performance benchmarks for plainsync-engine

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use plainsync_engine::{
    assign, AttributeDef, AttributeType, Entity, EntityDescription, MemoryStore, ObjectId,
    PersistenceContext, PlainObjectBridge, Schema, StoreSnapshot, SyncEngine, UniqueKey,
};
use serde::{Deserialize, Serialize};

#[derive(Default, Serialize, Deserialize)]
struct User {
    name: Option<String>,
    email: Option<String>,
}

#[derive(Clone)]
struct UserPlain {
    name: String,
    email: Option<String>,
}

impl Entity for User {
    const ENTITY_NAME: &'static str = "User";
}

impl PlainObjectBridge for User {
    type Plain = UserPlain;

    fn fill<C: PersistenceContext>(&mut self, plain: &UserPlain, _ctx: &C, _this: &ObjectId) {
        self.name = Some(plain.name.clone());
        assign(&mut self.email, plain.email.clone(), false);
    }

    fn to_plain(&self) -> UserPlain {
        UserPlain {
            name: self.name.clone().unwrap_or_default(),
            email: self.email.clone(),
        }
    }

    fn unique_key(plain: &UserPlain) -> Option<UniqueKey> {
        Some(UniqueKey::new("name", plain.name.clone()))
    }
}

fn create_test_schema() -> Schema {
    Schema::new(1).with_entity(EntityDescription::new(
        "User",
        vec![
            AttributeDef::required("name", AttributeType::String),
            AttributeDef::optional("email", AttributeType::String),
        ],
    ))
}

/// `size` plain users over `size / 2` distinct names.
fn plain_users(size: usize) -> Vec<UserPlain> {
    (0..size)
        .map(|i| UserPlain {
            name: format!("user_{}", i % (size / 2).max(1)),
            email: Some(format!("user_{}@example.com", i)),
        })
        .collect()
}

fn bench_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("sync");

    for size in [10, 100, 500].iter() {
        let input = plain_users(*size);

        group.bench_with_input(BenchmarkId::new("sync_set", size), &input, |b, input| {
            b.iter(|| {
                let ctx = MemoryStore::new(create_test_schema()).new_context();
                User::sync_set(&ctx, black_box(input))
            })
        });

        group.bench_with_input(BenchmarkId::new("sync_ordered", size), &input, |b, input| {
            b.iter(|| {
                let ctx = MemoryStore::new(create_test_schema()).new_context();
                User::sync_ordered(&ctx, black_box(input))
            })
        });

        // Resync against committed rows
        group.bench_with_input(BenchmarkId::new("resync_committed", size), &input, |b, input| {
            let store = MemoryStore::new(create_test_schema());
            let ctx = store.new_context();
            User::sync_set(&ctx, input);
            ctx.save().unwrap();

            b.iter(|| {
                let ctx = store.new_context();
                User::sync_set(&ctx, black_box(input))
            })
        });
    }

    group.finish();
}

fn bench_snapshot(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot");

    for size in [100, 1000].iter() {
        let store = MemoryStore::new(create_test_schema());
        let ctx = store.new_context();
        User::sync_set(&ctx, &plain_users(*size * 2));
        ctx.save().unwrap();
        let json = store.export_snapshot().to_json().unwrap();

        group.bench_with_input(BenchmarkId::new("export", size), &store, |b, store| {
            b.iter(|| store.export_snapshot().to_json().unwrap())
        });

        group.bench_with_input(BenchmarkId::new("import", size), &json, |b, json| {
            b.iter(|| {
                let restored = MemoryStore::new(create_test_schema());
                restored
                    .import_snapshot(StoreSnapshot::from_json(black_box(json)).unwrap())
                    .unwrap();
                restored
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_sync, bench_snapshot);
criterion_main!(benches);
