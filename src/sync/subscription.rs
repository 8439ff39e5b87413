// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote change subscriptions.
//!
//! After initial sync the engine opens one change feed per syncable model
//! and reconciles incoming items as they arrive. Each feed runs in its own
//! task; a reconcile failure on one item is logged and skipped rather than
//! tearing down the feed.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::reconcile::Reconciler;
use crate::error::SyncError;
use crate::model::ModelRegistry;
use crate::remote::RemoteApi;
use crate::storage::LocalStorage;

pub struct SubscriptionProcessor {
    registry: Arc<ModelRegistry>,
    storage: Arc<dyn LocalStorage>,
    api: Arc<dyn RemoteApi>,
    buffer: usize,
    cancel: CancellationToken,
}

impl SubscriptionProcessor {
    pub fn new(
        registry: Arc<ModelRegistry>,
        storage: Arc<dyn LocalStorage>,
        api: Arc<dyn RemoteApi>,
        buffer: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            registry,
            storage,
            api,
            buffer,
            cancel,
        }
    }

    /// Open one feed per syncable model and spawn its consumer task.
    pub async fn start(&self) -> Result<Vec<JoinHandle<()>>, SyncError> {
        let mut handles = Vec::new();
        for schema in self.registry.syncable_models() {
            let model_name = schema.name.clone();
            let rx = self.api.subscribe(&model_name, self.buffer).await?;
            let reconciler = Reconciler::new(self.storage.clone());
            let cancel = self.cancel.clone();
            let handle = tokio::spawn(async move {
                let mut rx = rx;
                loop {
                    tokio::select! {
                        _ = cancel.cancelled() => {
                            debug!(model = model_name.as_str(), "subscription cancelled");
                            break;
                        }
                        item = rx.recv() => {
                            let Some(item) = item else {
                                info!(model = model_name.as_str(), "subscription closed by remote");
                                break;
                            };
                            if let Err(err) = reconciler.reconcile(&item).await {
                                warn!(
                                    model = model_name.as_str(),
                                    id = item.model_id(),
                                    error = %err,
                                    "failed to reconcile subscription item"
                                );
                            }
                        }
                    }
                }
            });
            handles.push(handle);
        }
        Ok(handles)
    }
}
