// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::model::ModelSchema;
use crate::mutation::{ModelSyncMetadata, MutationEvent, MutationSyncMetadata};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("record not found")]
    NotFound,
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("stored data is corrupt: {0}")]
    Corrupt(String),
}

/// A locally persisted model instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    pub model_name: String,
    pub model_id: String,
    pub content: Value,
}

impl ModelRecord {
    #[must_use]
    pub fn new(
        model_name: impl Into<String>,
        model_id: impl Into<String>,
        content: Value,
    ) -> Self {
        Self {
            model_name: model_name.into(),
            model_id: model_id.into(),
            content,
        }
    }
}

/// Local storage adapter consumed by the sync engine.
///
/// The adapter is the single source of truth for the outbox: "next" always
/// means the oldest persisted mutation event, so draining survives process
/// restarts and concurrent enqueues never race the drain loop.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    /// Prepare backing tables/structures for the given schemas.
    async fn set_up(&self, schemas: &[ModelSchema]) -> Result<(), StorageError>;

    // --- model records ---

    async fn save_record(&self, record: &ModelRecord) -> Result<(), StorageError>;
    async fn delete_record(&self, model_name: &str, model_id: &str) -> Result<(), StorageError>;
    async fn get_record(
        &self,
        model_name: &str,
        model_id: &str,
    ) -> Result<Option<ModelRecord>, StorageError>;
    async fn query_records(&self, model_name: &str) -> Result<Vec<ModelRecord>, StorageError>;

    // --- outbox queue (FIFO) ---

    /// Persist a mutation event at the tail of the queue. Saving an id that
    /// already exists is a no-op and must not change queue order.
    async fn save_mutation_event(&self, event: &MutationEvent) -> Result<(), StorageError>;
    async fn delete_mutation_event(&self, id: &str) -> Result<(), StorageError>;
    /// Flag or clear the in-flight marker on a queued event. Unknown ids
    /// are a no-op.
    async fn mark_mutation_event_in_process(
        &self,
        id: &str,
        in_process: bool,
    ) -> Result<(), StorageError>;
    /// The oldest pending mutation event, if any.
    async fn next_mutation_event(&self) -> Result<Option<MutationEvent>, StorageError>;
    /// All pending events in queue order.
    async fn load_mutation_events(&self) -> Result<Vec<MutationEvent>, StorageError>;
    async fn pending_mutation_count(&self) -> Result<usize, StorageError>;

    // --- sync metadata ---

    async fn mutation_sync_metadata(
        &self,
        model_id: &str,
    ) -> Result<Option<MutationSyncMetadata>, StorageError>;
    async fn save_mutation_sync_metadata(
        &self,
        metadata: &MutationSyncMetadata,
    ) -> Result<(), StorageError>;
    async fn model_sync_metadata(
        &self,
        model_name: &str,
    ) -> Result<Option<ModelSyncMetadata>, StorageError>;
    async fn save_model_sync_metadata(
        &self,
        metadata: &ModelSyncMetadata,
    ) -> Result<(), StorageError>;
}
