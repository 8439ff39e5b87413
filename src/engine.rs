// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! The sync engine: local-first storage with cloud synchronization.
//!
//! Saves and deletes always hit local storage first and succeed offline;
//! syncable models additionally enqueue a mutation event for eventual
//! delivery. [`SyncEngine::start`] brings up the cloud side: storage
//! setup, dependency-ordered initial sync, outbox delivery, and remote
//! change subscriptions. Reachability transitions pause and resume cloud
//! traffic without touching local reads and writes.

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::SyncEngineConfig;
use crate::error::SyncError;
use crate::hub::{event, Hub, HubEvent};
use crate::model::ModelRegistry;
use crate::mutation::{MutationEvent, MutationKind};
use crate::outbox::Outbox;
use crate::reachability::Reachability;
use crate::remote::RemoteApi;
use crate::storage::{LocalStorage, ModelRecord, SqliteStorage};
use crate::sync::{InitialSyncOrchestrator, SubscriptionProcessor};

/// Engine lifecycle state.
///
/// Use [`SyncEngine::state()`] to check current state or
/// [`SyncEngine::state_receiver()`] to watch for changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// Just created, not yet started. Local operations already work.
    Created,
    /// Setting up storage.
    Starting,
    /// Running dependency-ordered initial sync queries.
    InitialSyncing,
    /// Fully started: outbox draining, subscriptions live.
    Syncing,
    /// Network unreachable; cloud traffic held, local operations work.
    Paused,
    /// Graceful shutdown in progress.
    Stopping,
    /// Stopped. Local operations still work; `start` may be called again.
    Stopped,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Created => write!(f, "Created"),
            Self::Starting => write!(f, "Starting"),
            Self::InitialSyncing => write!(f, "InitialSyncing"),
            Self::Syncing => write!(f, "Syncing"),
            Self::Paused => write!(f, "Paused"),
            Self::Stopping => write!(f, "Stopping"),
            Self::Stopped => write!(f, "Stopped"),
        }
    }
}

fn state_level(state: EngineState) -> u8 {
    match state {
        EngineState::Stopped | EngineState::Created | EngineState::Stopping => 0,
        EngineState::Starting => 1,
        EngineState::InitialSyncing => 2,
        EngineState::Syncing => 3,
        EngineState::Paused => 4,
    }
}

pub struct SyncEngine {
    config: SyncEngineConfig,
    registry: Arc<ModelRegistry>,
    storage: Arc<dyn LocalStorage>,
    api: Arc<dyn RemoteApi>,
    hub: Hub,
    reachability: Reachability,
    outbox: Arc<Outbox>,

    state: watch::Sender<EngineState>,
    state_rx: watch::Receiver<EngineState>,

    /// Cancels subscriptions and the reachability watcher on stop.
    cancel: Mutex<CancellationToken>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl SyncEngine {
    /// Create an engine over explicit storage. Does not touch the network.
    #[must_use]
    pub fn with_storage(
        config: SyncEngineConfig,
        registry: ModelRegistry,
        storage: Arc<dyn LocalStorage>,
        api: Arc<dyn RemoteApi>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let hub = Hub::new();
        let outbox = Arc::new(Outbox::new(storage.clone(), hub.clone(), config.clone()));
        Self {
            config,
            registry: Arc::new(registry),
            storage,
            api,
            hub,
            reachability: Reachability::default(),
            outbox,
            state: state_tx,
            state_rx,
            cancel: Mutex::new(CancellationToken::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Create an engine backed by SQLite, at `config.storage_path` or
    /// in-memory when unset.
    pub async fn new(
        config: SyncEngineConfig,
        registry: ModelRegistry,
        api: Arc<dyn RemoteApi>,
    ) -> Result<Self, SyncError> {
        let storage: Arc<dyn LocalStorage> = match &config.storage_path {
            Some(path) => Arc::new(SqliteStorage::new(path).await?),
            None => Arc::new(SqliteStorage::in_memory().await?),
        };
        Ok(Self::with_storage(config, registry, storage, api))
    }

    #[must_use]
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    #[must_use]
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    #[must_use]
    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    #[must_use]
    pub fn reachability(&self) -> &Reachability {
        &self.reachability
    }

    fn set_state(&self, state: EngineState) {
        crate::metrics::set_engine_state(state_level(state));
        let _ = self.state.send(state);
    }

    /// Start cloud synchronization: storage setup, initial sync in
    /// dependency order, then outbox delivery and subscriptions.
    #[tracing::instrument(skip(self))]
    pub async fn start(&self) -> Result<(), SyncError> {
        match self.state() {
            EngineState::Created | EngineState::Stopped => {}
            state => {
                return Err(SyncError::Configuration {
                    message: format!("engine cannot start from state {state}"),
                })
            }
        }
        info!("starting sync engine");
        self.set_state(EngineState::Starting);

        let cancel = CancellationToken::new();
        *self.cancel.lock() = cancel.clone();

        self.storage.set_up(self.registry.schemas()).await?;

        self.set_state(EngineState::InitialSyncing);
        let orchestrator = InitialSyncOrchestrator::new(
            self.registry.clone(),
            self.storage.clone(),
            self.api.clone(),
            self.hub.clone(),
            self.config.clone(),
            cancel.clone(),
        );
        if let Err(err) = orchestrator.run().await {
            warn!(error = %err, "initial sync failed");
            self.set_state(EngineState::Stopped);
            return Err(err);
        }

        let subscriptions = SubscriptionProcessor::new(
            self.registry.clone(),
            self.storage.clone(),
            self.api.clone(),
            self.config.subscription_buffer,
            cancel.clone(),
        );
        let mut tasks = subscriptions.start().await?;

        if self.reachability.is_online() {
            self.outbox.start(self.api.clone()).await;
        }
        tasks.push(self.spawn_reachability_watcher(cancel));
        self.tasks.lock().extend(tasks);

        self.set_state(EngineState::Syncing);
        self.hub.dispatch(HubEvent::new(event::READY, json!({})));
        info!("sync engine started");
        Ok(())
    }

    /// Pause or resume cloud traffic as the host reports reachability.
    fn spawn_reachability_watcher(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.reachability.subscribe();
        let outbox = self.outbox.clone();
        let api = self.api.clone();
        let hub = self.hub.clone();
        let state = self.state.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let online = *rx.borrow_and_update();
                        hub.dispatch(HubEvent::new(
                            event::NETWORK_STATUS,
                            json!({ "online": online }),
                        ));
                        if online {
                            outbox.start(api.clone()).await;
                            state.send_if_modified(|s| {
                                if *s == EngineState::Paused {
                                    *s = EngineState::Syncing;
                                    true
                                } else {
                                    false
                                }
                            });
                        } else {
                            outbox.pause().await;
                            state.send_if_modified(|s| {
                                if *s == EngineState::Syncing {
                                    *s = EngineState::Paused;
                                    true
                                } else {
                                    false
                                }
                            });
                        }
                    }
                }
            }
        })
    }

    /// Stop cloud synchronization. Local operations keep working and
    /// pending mutations stay queued for the next start.
    pub async fn stop(&self) {
        info!("stopping sync engine");
        self.set_state(EngineState::Stopping);
        self.cancel.lock().cancel();
        // The watcher and subscription tasks must be fully drained before
        // the outbox stops: the reachability watcher calls `outbox.start`,
        // so stopping the outbox while the watcher still runs could leave
        // behind a drain task spawned after the stop.
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
        self.outbox.stop().await;
        self.set_state(EngineState::Stopped);
        info!("sync engine stopped");
    }

    // --- local-first operations ---

    /// Fail fast, before any storage or network call, on requests the
    /// engine can never serve.
    fn checked_schema(
        &self,
        model_name: &str,
        model_id: &str,
    ) -> Result<&crate::model::ModelSchema, SyncError> {
        if model_id.is_empty() {
            return Err(SyncError::validation("model id must not be empty"));
        }
        self.registry
            .schema(model_name)
            .ok_or_else(|| SyncError::Configuration {
                message: format!("model '{model_name}' is not registered"),
            })
    }

    /// Save a model instance locally; syncable models also enqueue a
    /// create/update mutation. Works offline and before `start`.
    pub async fn save(
        &self,
        model_name: &str,
        model_id: &str,
        content: Value,
    ) -> Result<ModelRecord, SyncError> {
        let schema = self.checked_schema(model_name, model_id)?;

        let existed = self
            .storage
            .get_record(model_name, model_id)
            .await?
            .is_some();
        let record = ModelRecord::new(model_name, model_id, content);
        self.storage.save_record(&record).await?;

        if schema.syncable {
            let kind = if existed {
                MutationKind::Update
            } else {
                MutationKind::Create
            };
            let mut mutation = MutationEvent::new(model_name, model_id, kind, &record.content);
            if let Some(meta) = self.storage.mutation_sync_metadata(model_id).await? {
                mutation = mutation.with_version(meta.version);
            }
            self.outbox.enqueue(mutation).await?;
        }
        Ok(record)
    }

    /// Delete a model instance locally; syncable models also enqueue a
    /// delete mutation carrying the last known remote version.
    pub async fn delete(&self, model_name: &str, model_id: &str) -> Result<(), SyncError> {
        let schema = self.checked_schema(model_name, model_id)?;

        let existing = self.storage.get_record(model_name, model_id).await?;
        self.storage.delete_record(model_name, model_id).await?;

        if schema.syncable {
            let content = existing
                .map(|r| r.content)
                .unwrap_or_else(|| json!({ "id": model_id }));
            let mut mutation =
                MutationEvent::new(model_name, model_id, MutationKind::Delete, &content);
            if let Some(meta) = self.storage.mutation_sync_metadata(model_id).await? {
                mutation = mutation.with_version(meta.version);
            }
            self.outbox.enqueue(mutation).await?;
        }
        Ok(())
    }

    pub async fn get(
        &self,
        model_name: &str,
        model_id: &str,
    ) -> Result<Option<ModelRecord>, SyncError> {
        Ok(self.storage.get_record(model_name, model_id).await?)
    }

    pub async fn query(&self, model_name: &str) -> Result<Vec<ModelRecord>, SyncError> {
        Ok(self.storage.query_records(model_name).await?)
    }

    /// Whether the outgoing mutation queue is empty.
    pub async fn outbox_is_empty(&self) -> Result<bool, SyncError> {
        self.outbox.is_empty().await
    }
}
