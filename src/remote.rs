// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Remote service seam.
//!
//! [`RemoteApi`] is everything the engine needs from the cloud side: a
//! paginated delta query per model, a mutation call that returns the
//! authoritative version, and a per-model change subscription. Transport
//! details (GraphQL document building, auth, websockets) live behind the
//! trait so the engine and its tests never see them.

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::mutation::{MutationEvent, MutationSyncMetadata};

/// One model instance as the remote service sees it: body plus the version
/// metadata used for reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteModel {
    pub content: Value,
    pub metadata: MutationSyncMetadata,
}

impl RemoteModel {
    #[must_use]
    pub fn model_name(&self) -> &str {
        &self.metadata.model_name
    }

    #[must_use]
    pub fn model_id(&self) -> &str {
        &self.metadata.model_id
    }
}

/// One page of a sync query response.
#[derive(Debug, Clone, Default)]
pub struct RemotePage {
    pub items: Vec<RemoteModel>,
    /// Opaque cursor; `Some` means more pages follow.
    pub next_token: Option<String>,
    /// Server timestamp at which this sync started (epoch millis). Recorded
    /// as the model's `last_sync` watermark once the full query completes.
    pub started_at: Option<i64>,
}

/// Acknowledgement of a processed mutation: the authoritative version the
/// service assigned, echoed back so local metadata can be updated.
#[derive(Debug, Clone, PartialEq)]
pub struct MutationAck {
    pub model_id: String,
    pub version: u64,
    pub deleted: bool,
    /// Remote copy of the model body after the mutation, if returned.
    pub content: Option<Value>,
}

/// A sync query against one model type.
#[derive(Debug, Clone)]
pub struct SyncQueryRequest {
    pub model_name: String,
    /// Delta watermark. `None` requests a full base query.
    pub last_sync: Option<i64>,
    pub limit: usize,
    pub next_token: Option<String>,
}

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Fetch one page of changed instances for a model type.
    async fn query(&self, request: &SyncQueryRequest) -> Result<RemotePage, SyncError>;

    /// Deliver one outbox event. A successful return means the service
    /// accepted the change; the ack carries the new version.
    async fn mutate(&self, event: &MutationEvent) -> Result<MutationAck, SyncError>;

    /// Open a change feed for a model type. The receiver yields remote
    /// changes until the service drops the connection.
    async fn subscribe(
        &self,
        model_name: &str,
        buffer: usize,
    ) -> Result<mpsc::Receiver<RemoteModel>, SyncError>;
}
