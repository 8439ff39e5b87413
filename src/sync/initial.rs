// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Initial sync: paginated base/delta queries, parent models first.
//!
//! On engine start every syncable model type is queried in dependency
//! order ([`ModelRegistry::sync_order`]): a model's full query stream is
//! drained, page by page, before the first page of any model that depends
//! on it. Each page's items run through the [`Reconciler`], so re-running
//! a sync is harmless.
//!
//! A model with no recorded `last_sync` gets a full base query; otherwise
//! a delta query from the watermark. The server's `startedAt` timestamp
//! becomes the new watermark only after the model's final page lands.

use std::sync::Arc;
use std::time::Instant;

use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconcile::{Disposition, Reconciler};
use crate::config::SyncEngineConfig;
use crate::error::SyncError;
use crate::hub::{event, Hub, HubEvent};
use crate::model::ModelRegistry;
use crate::mutation::{epoch_millis, ModelSyncMetadata};
use crate::remote::{RemoteApi, SyncQueryRequest};
use crate::resilience::retry_classified;
use crate::storage::LocalStorage;

#[derive(Debug, Default, Clone, Copy)]
struct SyncCounts {
    added: usize,
    updated: usize,
    deleted: usize,
}

pub struct InitialSyncOrchestrator {
    registry: Arc<ModelRegistry>,
    storage: Arc<dyn LocalStorage>,
    api: Arc<dyn RemoteApi>,
    reconciler: Reconciler,
    hub: Hub,
    config: SyncEngineConfig,
    cancel: CancellationToken,
}

impl InitialSyncOrchestrator {
    pub fn new(
        registry: Arc<ModelRegistry>,
        storage: Arc<dyn LocalStorage>,
        api: Arc<dyn RemoteApi>,
        hub: Hub,
        config: SyncEngineConfig,
        cancel: CancellationToken,
    ) -> Self {
        let reconciler = Reconciler::new(storage.clone());
        Self {
            registry,
            storage,
            api,
            reconciler,
            hub,
            config,
            cancel,
        }
    }

    /// Run the full initial sync. Models that fail are collected and
    /// reported together after the rest have synced; cancellation stops
    /// between pages without reporting anything.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self) -> Result<(), SyncError> {
        let order = self.registry.sync_order();
        self.hub.dispatch(HubEvent::new(
            event::SYNC_QUERIES_STARTED,
            json!({ "models": order }),
        ));

        if order.is_empty() {
            info!("no syncable models, initial sync is trivially complete");
            self.hub
                .dispatch(HubEvent::new(event::SYNC_QUERIES_READY, json!({})));
            return Ok(());
        }

        let total = order.len();
        let mut failures: Vec<String> = Vec::new();

        for model_name in &order {
            if self.cancel.is_cancelled() {
                debug!("initial sync cancelled");
                return Ok(());
            }
            match self.sync_model(model_name).await {
                Ok(Some(counts)) => {
                    debug!(
                        model = model_name.as_str(),
                        added = counts.added,
                        updated = counts.updated,
                        deleted = counts.deleted,
                        "model synced"
                    );
                }
                Ok(None) => {
                    debug!(model = model_name.as_str(), "initial sync cancelled mid-model");
                    return Ok(());
                }
                Err(err) => {
                    warn!(model = model_name.as_str(), error = %err, "model sync failed");
                    failures.push(format!("{model_name}: {err}"));
                }
            }
        }

        if failures.is_empty() {
            info!(models = total, "initial sync complete");
            self.hub
                .dispatch(HubEvent::new(event::SYNC_QUERIES_READY, json!({})));
            Ok(())
        } else {
            Err(SyncError::InitialSync {
                failed: failures.len(),
                total,
                messages: failures.join("; "),
            })
        }
    }

    /// Sync one model type to completion. Returns `None` when cancelled.
    async fn sync_model(&self, model_name: &str) -> Result<Option<SyncCounts>, SyncError> {
        let started = Instant::now();
        let last_sync = self
            .storage
            .model_sync_metadata(model_name)
            .await?
            .and_then(|meta| meta.last_sync);
        let full_sync = last_sync.is_none();

        let mut counts = SyncCounts::default();
        let mut next_token: Option<String> = None;
        let mut server_started_at: Option<i64> = None;
        let retry = self.config.query_retry();

        loop {
            if self.cancel.is_cancelled() {
                return Ok(None);
            }

            let request = SyncQueryRequest {
                model_name: model_name.to_string(),
                last_sync,
                limit: self.config.sync_page_size,
                next_token: next_token.take(),
            };
            let page = retry_classified("sync_query", &retry, || self.api.query(&request)).await?;

            crate::metrics::record_sync_page(model_name, page.items.len());
            server_started_at = server_started_at.or(page.started_at);

            for item in &page.items {
                match self.reconciler.reconcile(item).await? {
                    Disposition::Created => counts.added += 1,
                    Disposition::Updated => counts.updated += 1,
                    Disposition::Deleted => counts.deleted += 1,
                    Disposition::Dropped => {}
                }
            }

            match page.next_token {
                Some(token) => next_token = Some(token),
                None => break,
            }
        }

        // Watermark moves only once the whole stream has been applied, so a
        // crash mid-sync re-queries from the old watermark.
        self.storage
            .save_model_sync_metadata(&ModelSyncMetadata {
                model_name: model_name.to_string(),
                last_sync: Some(server_started_at.unwrap_or_else(epoch_millis)),
            })
            .await?;

        crate::metrics::record_model_sync(model_name, started.elapsed());
        self.hub.dispatch(HubEvent::model_synced(
            model_name,
            full_sync,
            counts.added,
            counts.updated,
            counts.deleted,
        ));
        Ok(Some(counts))
    }
}
