// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! End-to-end engine tests against a scripted remote service.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use datastore_sync::{
    hub::event, InMemoryStorage, LocalStorage, ModelField, ModelRegistry, ModelSchema,
    MutationAck, MutationEvent, MutationKind, MutationSyncMetadata, RemoteApi, RemoteModel,
    RemotePage, SyncEngine, SyncEngineConfig, SyncError, SyncQueryRequest,
};

/// Scripted remote service. Sync queries pop pre-loaded pages per model,
/// mutations auto-ack with an incremented version, subscriptions stay open
/// until the mock drops.
#[derive(Default)]
struct MockRemote {
    pages: Mutex<HashMap<String, Vec<RemotePage>>>,
    /// Every query call, in order: (model, next_token).
    queries: Mutex<Vec<(String, Option<String>)>>,
    /// The delta watermark each query carried.
    watermarks: Mutex<Vec<Option<i64>>>,
    /// Every delivered mutation's model id, in order.
    mutations: Mutex<Vec<String>>,
    feeds: Mutex<Vec<mpsc::Sender<RemoteModel>>>,
}

impl MockRemote {
    fn with_pages(pages: Vec<(&str, Vec<RemotePage>)>) -> Arc<Self> {
        let mock = Self::default();
        for (model, model_pages) in pages {
            mock.pages.lock().insert(model.to_string(), model_pages);
        }
        Arc::new(mock)
    }

    fn queried_models(&self) -> Vec<String> {
        self.queries.lock().iter().map(|(m, _)| m.clone()).collect()
    }
}

#[async_trait]
impl RemoteApi for MockRemote {
    async fn query(&self, request: &SyncQueryRequest) -> Result<RemotePage, SyncError> {
        self.queries
            .lock()
            .push((request.model_name.clone(), request.next_token.clone()));
        self.watermarks.lock().push(request.last_sync);
        let mut pages = self.pages.lock();
        let queue = pages.entry(request.model_name.clone()).or_default();
        if queue.is_empty() {
            Ok(RemotePage::default())
        } else {
            Ok(queue.remove(0))
        }
    }

    async fn mutate(&self, event: &MutationEvent) -> Result<MutationAck, SyncError> {
        self.mutations.lock().push(event.model_id.clone());
        Ok(MutationAck {
            model_id: event.model_id.clone(),
            version: event.version.unwrap_or(0) + 1,
            deleted: event.kind == MutationKind::Delete,
            content: None,
        })
    }

    async fn subscribe(
        &self,
        _model_name: &str,
        buffer: usize,
    ) -> Result<mpsc::Receiver<RemoteModel>, SyncError> {
        let (tx, rx) = mpsc::channel(buffer);
        self.feeds.lock().push(tx);
        Ok(rx)
    }
}

fn remote_post(model_name: &str, model_id: &str, version: u64) -> RemoteModel {
    RemoteModel {
        content: json!({"id": model_id}),
        metadata: MutationSyncMetadata {
            model_id: model_id.into(),
            model_name: model_name.into(),
            deleted: false,
            last_changed_at: version as i64,
            version,
        },
    }
}

fn page(items: Vec<RemoteModel>, next_token: Option<&str>) -> RemotePage {
    RemotePage {
        items,
        next_token: next_token.map(String::from),
        started_at: Some(1_700_000_000_000),
    }
}

/// Post has many Comments; Comment belongs to Post.
fn blog_registry() -> ModelRegistry {
    let mut registry = ModelRegistry::new();
    registry
        .register(ModelSchema::new("Post").field(ModelField::new("comments").has_many("Comment")))
        .unwrap();
    registry
        .register(ModelSchema::new("Comment").field(ModelField::new("post").belongs_to("Post")))
        .unwrap();
    registry
}

fn engine(registry: ModelRegistry, api: Arc<MockRemote>) -> SyncEngine {
    let storage = Arc::new(InMemoryStorage::new());
    engine_on(registry, api, storage)
}

fn engine_on(
    registry: ModelRegistry,
    api: Arc<MockRemote>,
    storage: Arc<InMemoryStorage>,
) -> SyncEngine {
    let config = SyncEngineConfig {
        mutation_max_attempts: 2,
        retry_initial_delay_ms: 1,
        retry_max_delay_ms: 5,
        ..Default::default()
    };
    SyncEngine::with_storage(config, registry, storage, api)
}

async fn wait_outbox_empty(engine: &SyncEngine) {
    for _ in 0..200 {
        if engine.outbox_is_empty().await.unwrap() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("outbox never drained");
}

#[tokio::test]
async fn parent_fully_synced_before_child_despite_pagination() {
    // Post paginates across three pages; every Post query must still come
    // before the first Comment query.
    let api = MockRemote::with_pages(vec![
        (
            "Post",
            vec![
                page(vec![remote_post("Post", "p1", 1)], Some("t1")),
                page(vec![remote_post("Post", "p2", 1)], Some("t2")),
                page(vec![remote_post("Post", "p3", 1)], None),
            ],
        ),
        (
            "Comment",
            vec![page(vec![remote_post("Comment", "c1", 1)], None)],
        ),
    ]);

    let engine = engine(blog_registry(), api.clone());
    engine.start().await.unwrap();
    engine.stop().await;

    assert_eq!(
        api.queried_models(),
        vec!["Post", "Post", "Post", "Comment"]
    );
    assert!(engine.get("Post", "p3").await.unwrap().is_some());
    assert!(engine.get("Comment", "c1").await.unwrap().is_some());
}

#[tokio::test]
async fn one_query_call_per_page() {
    let api = MockRemote::with_pages(vec![(
        "Post",
        vec![
            page(vec![remote_post("Post", "p1", 1)], Some("a")),
            page(vec![remote_post("Post", "p2", 1)], Some("b")),
            page(vec![], None),
        ],
    )]);

    let mut registry = ModelRegistry::new();
    registry.register(ModelSchema::new("Post")).unwrap();
    let engine = engine(registry, api.clone());
    engine.start().await.unwrap();
    engine.stop().await;

    let queries = api.queries.lock().clone();
    assert_eq!(queries.len(), 3);
    assert_eq!(queries[0].1, None);
    assert_eq!(queries[1].1.as_deref(), Some("a"));
    assert_eq!(queries[2].1.as_deref(), Some("b"));
}

#[tokio::test]
async fn zero_syncable_models_start_immediately() {
    let api = Arc::new(MockRemote::default());
    let mut registry = ModelRegistry::new();
    registry
        .register(ModelSchema::new("Scratch").local_only())
        .unwrap();

    let engine = engine(registry, api.clone());
    let (_token, mut rx) = engine.hub().listen(None, Some(event::SYNC_QUERIES_STARTED));

    engine.start().await.unwrap();

    let started = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(started.data["models"], json!([]));
    assert!(api.queries.lock().is_empty());
    engine.stop().await;
}

#[tokio::test]
async fn preloaded_mutations_drain_before_new_ones() {
    // Two saves made while stopped, one made after start: delivery order
    // must be strict enqueue order.
    let api = Arc::new(MockRemote::default());
    let mut registry = ModelRegistry::new();
    registry.register(ModelSchema::new("Post")).unwrap();
    let engine = engine(registry, api.clone());

    engine
        .save("Post", "pendingPost-1", json!({"id": "pendingPost-1"}))
        .await
        .unwrap();
    engine
        .save("Post", "pendingPost-2", json!({"id": "pendingPost-2"}))
        .await
        .unwrap();

    engine.start().await.unwrap();
    engine
        .save("Post", "livePost", json!({"id": "livePost"}))
        .await
        .unwrap();
    wait_outbox_empty(&engine).await;
    engine.stop().await;

    assert_eq!(
        *api.mutations.lock(),
        vec!["pendingPost-1", "pendingPost-2", "livePost"]
    );
}

#[tokio::test]
async fn outbox_status_empty_then_not_empty() {
    let api = Arc::new(MockRemote::default());
    let mut registry = ModelRegistry::new();
    registry.register(ModelSchema::new("Post")).unwrap();
    let engine = engine(registry, api);
    let (_token, mut rx) = engine.hub().listen(None, Some(event::OUTBOX_STATUS));

    engine.start().await.unwrap();
    let first = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first.data["isEmpty"], true);

    engine.save("Post", "p1", json!({"id": "p1"})).await.unwrap();
    let second = timeout(Duration::from_secs(1), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.data["isEmpty"], false);
    engine.stop().await;
}

#[tokio::test]
async fn rerunning_initial_sync_is_idempotent() {
    let storage = Arc::new(InMemoryStorage::new());
    let mut registry = ModelRegistry::new();
    registry.register(ModelSchema::new("Post")).unwrap();

    // Same remote state served on both runs (delta query replays it).
    let serve = || {
        MockRemote::with_pages(vec![(
            "Post",
            vec![page(vec![remote_post("Post", "p1", 3)], None)],
        )])
    };

    let engine1 = engine_on(registry, serve(), storage.clone());
    engine1.start().await.unwrap();
    engine1.stop().await;
    let after_first = engine1.get("Post", "p1").await.unwrap();

    let mut registry = ModelRegistry::new();
    registry.register(ModelSchema::new("Post")).unwrap();
    let engine2 = engine_on(registry, serve(), storage.clone());
    engine2.start().await.unwrap();
    engine2.stop().await;

    assert_eq!(engine2.get("Post", "p1").await.unwrap(), after_first);
    assert_eq!(engine2.query("Post").await.unwrap().len(), 1);
    let meta = storage.mutation_sync_metadata("p1").await.unwrap().unwrap();
    assert_eq!(meta.version, 3);
}

#[tokio::test]
async fn model_synced_and_ready_events() {
    let api = MockRemote::with_pages(vec![(
        "Post",
        vec![page(
            vec![remote_post("Post", "p1", 1), remote_post("Post", "p2", 1)],
            None,
        )],
    )]);
    let mut registry = ModelRegistry::new();
    registry.register(ModelSchema::new("Post")).unwrap();
    let engine = engine(registry, api);
    let (_token, mut rx) = engine.hub().listen(None, None);

    engine.start().await.unwrap();
    engine.stop().await;

    let mut names = Vec::new();
    while let Ok(hub_event) = rx.try_recv() {
        if hub_event.name == event::MODEL_SYNCED {
            assert_eq!(hub_event.data["model"], "Post");
            assert_eq!(hub_event.data["isFullSync"], true);
            assert_eq!(hub_event.data["added"], 2);
        }
        names.push(hub_event.name);
    }
    let started = names
        .iter()
        .position(|n| *n == event::SYNC_QUERIES_STARTED)
        .unwrap();
    let synced = names.iter().position(|n| *n == event::MODEL_SYNCED).unwrap();
    let ready = names
        .iter()
        .position(|n| *n == event::SYNC_QUERIES_READY)
        .unwrap();
    assert!(started < synced && synced < ready);
}

#[tokio::test]
async fn second_start_runs_delta_sync() {
    let storage = Arc::new(InMemoryStorage::new());
    let mut registry = ModelRegistry::new();
    registry.register(ModelSchema::new("Post")).unwrap();

    let api = MockRemote::with_pages(vec![(
        "Post",
        vec![page(vec![remote_post("Post", "p1", 1)], None)],
    )]);
    let engine1 = engine_on(registry, api, storage.clone());
    engine1.start().await.unwrap();
    engine1.stop().await;

    let mut registry = ModelRegistry::new();
    registry.register(ModelSchema::new("Post")).unwrap();
    let api2 = Arc::new(MockRemote::default());
    let engine2 = engine_on(registry, api2.clone(), storage);
    engine2.start().await.unwrap();
    engine2.stop().await;

    // The first run recorded the server's startedAt watermark; the second
    // run must query with it.
    let queries = api2.queries.lock().clone();
    assert_eq!(queries.len(), 1);
    let watermarks = api2.watermarks.lock().clone();
    assert_eq!(watermarks, vec![Some(1_700_000_000_000)]);
}

#[tokio::test]
async fn subscription_changes_apply_while_syncing() {
    let api = Arc::new(MockRemote::default());
    let mut registry = ModelRegistry::new();
    registry.register(ModelSchema::new("Post")).unwrap();
    let engine = engine(registry, api.clone());

    engine.start().await.unwrap();
    let feed = api.feeds.lock()[0].clone();
    feed.send(remote_post("Post", "live-1", 1)).await.unwrap();

    timeout(Duration::from_secs(1), async {
        loop {
            if engine.get("Post", "live-1").await.unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    engine.stop().await;
}
