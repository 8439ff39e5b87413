// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;

use super::traits::{LocalStorage, ModelRecord, StorageError};
use crate::model::ModelSchema;
use crate::mutation::{ModelSyncMetadata, MutationEvent, MutationSyncMetadata};

/// In-memory storage adapter.
///
/// Backs tests and ephemeral use. The outbox is an ordered vector guarded
/// by a mutex so queue order is exactly insertion order.
pub struct InMemoryStorage {
    records: DashMap<(String, String), ModelRecord>,
    outbox: Mutex<Vec<MutationEvent>>,
    mutation_meta: DashMap<String, MutationSyncMetadata>,
    model_meta: DashMap<String, ModelSyncMetadata>,
}

impl InMemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            outbox: Mutex::new(Vec::new()),
            mutation_meta: DashMap::new(),
            model_meta: DashMap::new(),
        }
    }

    /// Total record count across all models.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn clear(&self) {
        self.records.clear();
        self.outbox.lock().clear();
        self.mutation_meta.clear();
        self.model_meta.clear();
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalStorage for InMemoryStorage {
    async fn set_up(&self, _schemas: &[ModelSchema]) -> Result<(), StorageError> {
        Ok(())
    }

    async fn save_record(&self, record: &ModelRecord) -> Result<(), StorageError> {
        self.records.insert(
            (record.model_name.clone(), record.model_id.clone()),
            record.clone(),
        );
        Ok(())
    }

    async fn delete_record(&self, model_name: &str, model_id: &str) -> Result<(), StorageError> {
        self.records
            .remove(&(model_name.to_string(), model_id.to_string()));
        Ok(())
    }

    async fn get_record(
        &self,
        model_name: &str,
        model_id: &str,
    ) -> Result<Option<ModelRecord>, StorageError> {
        Ok(self
            .records
            .get(&(model_name.to_string(), model_id.to_string()))
            .map(|r| r.value().clone()))
    }

    async fn query_records(&self, model_name: &str) -> Result<Vec<ModelRecord>, StorageError> {
        Ok(self
            .records
            .iter()
            .filter(|r| r.key().0 == model_name)
            .map(|r| r.value().clone())
            .collect())
    }

    async fn save_mutation_event(&self, event: &MutationEvent) -> Result<(), StorageError> {
        let mut outbox = self.outbox.lock();
        if outbox.iter().any(|e| e.id == event.id) {
            return Ok(());
        }
        outbox.push(event.clone());
        Ok(())
    }

    async fn delete_mutation_event(&self, id: &str) -> Result<(), StorageError> {
        self.outbox.lock().retain(|e| e.id != id);
        Ok(())
    }

    async fn mark_mutation_event_in_process(
        &self,
        id: &str,
        in_process: bool,
    ) -> Result<(), StorageError> {
        if let Some(event) = self.outbox.lock().iter_mut().find(|e| e.id == id) {
            event.in_process = in_process;
        }
        Ok(())
    }

    async fn next_mutation_event(&self) -> Result<Option<MutationEvent>, StorageError> {
        Ok(self.outbox.lock().first().cloned())
    }

    async fn load_mutation_events(&self) -> Result<Vec<MutationEvent>, StorageError> {
        Ok(self.outbox.lock().clone())
    }

    async fn pending_mutation_count(&self) -> Result<usize, StorageError> {
        Ok(self.outbox.lock().len())
    }

    async fn mutation_sync_metadata(
        &self,
        model_id: &str,
    ) -> Result<Option<MutationSyncMetadata>, StorageError> {
        Ok(self.mutation_meta.get(model_id).map(|m| m.value().clone()))
    }

    async fn save_mutation_sync_metadata(
        &self,
        metadata: &MutationSyncMetadata,
    ) -> Result<(), StorageError> {
        self.mutation_meta
            .insert(metadata.model_id.clone(), metadata.clone());
        Ok(())
    }

    async fn model_sync_metadata(
        &self,
        model_name: &str,
    ) -> Result<Option<ModelSyncMetadata>, StorageError> {
        Ok(self.model_meta.get(model_name).map(|m| m.value().clone()))
    }

    async fn save_model_sync_metadata(
        &self,
        metadata: &ModelSyncMetadata,
    ) -> Result<(), StorageError> {
        self.model_meta
            .insert(metadata.model_name.clone(), metadata.clone());
        Ok(())
    }
}
