// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Property-based tests for the sync engine's core invariants.
//!
//! Run with: `cargo test --test properties`

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use datastore_sync::{
    Disposition, InMemoryStorage, LocalStorage, ModelField, ModelRegistry, ModelSchema,
    MutationEvent, MutationKind, MutationSyncMetadata, Reconciler, RemoteModel,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

fn mutation_kind_strategy() -> impl Strategy<Value = MutationKind> {
    prop_oneof![
        Just(MutationKind::Create),
        Just(MutationKind::Update),
        Just(MutationKind::Delete),
    ]
}

fn mutation_event_strategy() -> impl Strategy<Value = MutationEvent> {
    (
        "[A-Z][a-z]{1,10}",
        "[a-z0-9-]{1,20}",
        mutation_kind_strategy(),
        prop::option::of(0u64..1_000_000),
    )
        .prop_map(|(model_name, model_id, kind, version)| {
            let mut event = MutationEvent::new(
                model_name,
                model_id.clone(),
                kind,
                &json!({"id": model_id}),
            );
            if let Some(v) = version {
                event = event.with_version(v);
            }
            event
        })
}

/// A registry where model `i` may only belong to models with lower index,
/// so the dependency graph is acyclic by construction. Returns the registry
/// plus each model's parent list.
fn dag_registry_strategy() -> impl Strategy<Value = (ModelRegistry, Vec<Vec<usize>>)> {
    (1usize..8).prop_flat_map(|n| {
        let parents = (0..n)
            .map(|i| prop::collection::vec(0..i.max(1), 0..=i.min(3)))
            .collect::<Vec<_>>();
        parents.prop_map(move |parents| {
            let mut registry = ModelRegistry::new();
            for (i, model_parents) in parents.iter().enumerate() {
                let mut schema = ModelSchema::new(format!("M{i}"));
                for (field_idx, parent) in model_parents.iter().enumerate() {
                    schema = schema
                        .field(ModelField::new(format!("f{field_idx}")).belongs_to(format!("M{parent}")));
                }
                registry.register(schema).unwrap();
            }
            (registry, parents)
        })
    })
}

proptest! {
    /// Mutation events survive a serde round trip unchanged.
    #[test]
    fn mutation_event_serde_roundtrip(event in mutation_event_strategy()) {
        let text = serde_json::to_string(&event).unwrap();
        let back: MutationEvent = serde_json::from_str(&text).unwrap();
        prop_assert_eq!(back, event);
    }

    /// Mutation event deserialization never panics on arbitrary bytes.
    #[test]
    fn mutation_event_decode_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..2000)) {
        let _ = serde_json::from_slice::<MutationEvent>(&bytes);
    }

    /// Kind parsing never panics and round-trips for valid kinds.
    #[test]
    fn mutation_kind_parse_total(s in ".*") {
        let _ = MutationKind::parse(&s);
    }

    /// Sync order visits every syncable model exactly once, respecting all
    /// parent-before-child edges.
    #[test]
    fn sync_order_respects_dependencies((registry, parents) in dag_registry_strategy()) {
        let order = registry.sync_order();
        prop_assert_eq!(order.len(), parents.len());

        let position = |name: &str| order.iter().position(|n| n == name).unwrap();
        for (i, model_parents) in parents.iter().enumerate() {
            for parent in model_parents {
                // Self-edges cannot occur by construction, but a model may
                // list the same parent twice; both checks are the same.
                if *parent != i {
                    prop_assert!(
                        position(&format!("M{parent}")) < position(&format!("M{i}")),
                        "M{} must sync before M{}", parent, i
                    );
                }
            }
        }
    }

    /// Reconciling any sequence of versions leaves local state at the
    /// maximum version seen, and only strictly increasing versions apply.
    #[test]
    fn reconcile_is_last_writer_wins(versions in prop::collection::vec(1u64..100, 1..20)) {
        runtime().block_on(async {
            let storage = Arc::new(InMemoryStorage::new());
            let reconciler = Reconciler::new(storage.clone());

            let mut high_water = 0u64;
            for version in &versions {
                let remote = RemoteModel {
                    content: json!({"id": "p1", "v": version}),
                    metadata: MutationSyncMetadata {
                        model_id: "p1".into(),
                        model_name: "Post".into(),
                        deleted: false,
                        last_changed_at: *version as i64,
                        version: *version,
                    },
                };
                let disposition = reconciler.reconcile(&remote).await.unwrap();
                if *version > high_water {
                    assert_ne!(disposition, Disposition::Dropped);
                    high_water = *version;
                } else {
                    assert_eq!(disposition, Disposition::Dropped);
                }
            }

            let meta = storage.mutation_sync_metadata("p1").await.unwrap().unwrap();
            assert_eq!(meta.version, high_water);
            let record = storage.get_record("Post", "p1").await.unwrap().unwrap();
            assert_eq!(record.content["v"], high_water);
        });
    }

    /// The outbox queue drains in exact enqueue order for any sequence of
    /// distinct events.
    #[test]
    fn outbox_queue_is_fifo(ids in prop::collection::vec("[a-z0-9]{1,12}", 1..20)) {
        runtime().block_on(async {
            let storage = InMemoryStorage::new();
            let mut events = Vec::new();
            for id in &ids {
                let event =
                    MutationEvent::new("Post", id.clone(), MutationKind::Create, &json!({"id": id}));
                storage.save_mutation_event(&event).await.unwrap();
                events.push(event);
            }

            for expected in &events {
                let next = storage.next_mutation_event().await.unwrap().unwrap();
                assert_eq!(&next, expected);
                storage.delete_mutation_event(&next.id).await.unwrap();
            }
            assert!(storage.next_mutation_event().await.unwrap().is_none());
        });
    }
}
