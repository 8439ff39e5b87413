//! # DataStore Sync
//!
//! A local-first persistence engine with cloud synchronization.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Application Layer                      │
//! │  • save()/delete()/query() on registered models            │
//! │  • Always served locally, works fully offline              │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Local Storage (SQLite)                  │
//! │  • Model records keyed by (model, id)                      │
//! │  • Durable FIFO outbox of pending mutations                │
//! │  • Per-instance version metadata for reconciliation        │
//! └─────────────────────────────────────────────────────────────┘
//!            │ outbox drain                 ▲ reconcile
//!            ▼                              │
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       Remote Service                        │
//! │  • Paginated base/delta sync queries, parents first        │
//! │  • Versioned mutation acks (last-writer-wins)              │
//! │  • Per-model change subscriptions                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datastore_sync::{
//!     ModelField, ModelRegistry, ModelSchema, RemoteApi, SyncEngine, SyncEngineConfig,
//! };
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! async fn run(api: Arc<dyn RemoteApi>) {
//!     let mut registry = ModelRegistry::new();
//!     registry.register(ModelSchema::new("Post")).unwrap();
//!     registry
//!         .register(
//!             ModelSchema::new("Comment")
//!                 .field(ModelField::new("post").belongs_to("Post")),
//!         )
//!         .unwrap();
//!
//!     let config = SyncEngineConfig {
//!         storage_path: Some("datastore.db".into()),
//!         ..Default::default()
//!     };
//!     let engine = SyncEngine::new(config, registry, api).await.unwrap();
//!
//!     // Local writes work immediately, online or not.
//!     engine
//!         .save("Post", "post-1", json!({"id": "post-1", "title": "hello"}))
//!         .await
//!         .unwrap();
//!
//!     // Start cloud sync: initial queries run parents-first, then the
//!     // outbox drains and subscriptions come up.
//!     engine.start().await.unwrap();
//!     engine.stop().await;
//! }
//! ```
//!
//! ## Features
//!
//! - **Local First**: reads and writes never block on the network
//! - **Durable Outbox**: mutations persist before delivery and drain FIFO
//! - **Dependency-Ordered Sync**: parent models fully sync before children
//! - **Versioned Reconciliation**: remote changes apply last-writer-wins
//! - **Hub Events**: lifecycle progress published to in-process listeners
//! - **Reachability Aware**: cloud traffic pauses and resumes with the network
//!
//! ## Configuration
//!
//! See [`SyncEngineConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`engine`]: The main [`SyncEngine`] coordinating all components
//! - [`model`]: Model schemas, associations, and the registry
//! - [`storage`]: Local storage adapters (SQLite, in-memory)
//! - [`outbox`]: Durable outgoing mutation queue
//! - [`sync`]: Initial sync, reconciliation, subscriptions
//! - [`hub`]: In-process pub/sub for lifecycle events
//! - [`remote`]: The remote service seam
//! - [`resilience`]: Retry with exponential backoff

pub mod config;
pub mod engine;
pub mod error;
pub mod hub;
pub mod metrics;
pub mod model;
pub mod mutation;
pub mod outbox;
pub mod reachability;
pub mod remote;
pub mod resilience;
pub mod storage;
pub mod sync;

pub use config::SyncEngineConfig;
pub use engine::{EngineState, SyncEngine};
pub use error::SyncError;
pub use hub::{Hub, HubChannel, HubEvent, HubToken};
pub use model::{ModelAssociation, ModelField, ModelRegistry, ModelSchema};
pub use mutation::{ModelSyncMetadata, MutationEvent, MutationKind, MutationSyncMetadata};
pub use outbox::{Outbox, OutboxState};
pub use reachability::Reachability;
pub use remote::{MutationAck, RemoteApi, RemoteModel, RemotePage, SyncQueryRequest};
pub use resilience::RetryConfig;
pub use storage::{InMemoryStorage, LocalStorage, ModelRecord, SqliteStorage, StorageError};
pub use sync::{Disposition, InitialSyncOrchestrator, Reconciler, SubscriptionProcessor};
