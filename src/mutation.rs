// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Mutation envelopes and per-model sync bookkeeping.
//!
//! A [`MutationEvent`] represents one pending change to one model instance.
//! Events are created whenever a local save/delete touches a syncable model,
//! persisted to the outbox, and deleted only after the remote service
//! acknowledges them (or the failure is terminal).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::SyncError;

/// The kind of change a mutation event carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
}

impl MutationKind {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Result<Self, SyncError> {
        match s {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            other => Err(SyncError::Decoding {
                message: format!("unknown mutation kind '{other}'"),
            }),
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Envelope for one pending change to one model instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationEvent {
    /// Unique event id (UUID v4).
    pub id: String,
    /// Identifier of the model instance this event targets.
    pub model_id: String,
    /// Name of the model type.
    pub model_name: String,
    /// Serialized JSON body of the model at mutation time.
    pub json: String,
    /// Create, update, or delete.
    pub kind: MutationKind,
    /// Creation timestamp (epoch millis).
    pub created_at: i64,
    /// Last known remote version, used for conflict detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>,
    /// Set while the event is being delivered to the network.
    #[serde(default)]
    pub in_process: bool,
    /// Optional GraphQL filter JSON forwarded with the mutation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graphql_filter: Option<String>,
}

impl MutationEvent {
    /// Build an event for a model instance. The content is serialized once
    /// here so the envelope is self-contained in the outbox.
    #[must_use]
    pub fn new(
        model_name: impl Into<String>,
        model_id: impl Into<String>,
        kind: MutationKind,
        content: &Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            model_id: model_id.into(),
            model_name: model_name.into(),
            json: content.to_string(),
            kind,
            created_at: epoch_millis(),
            version: None,
            in_process: false,
            graphql_filter: None,
        }
    }

    #[must_use]
    pub fn with_version(mut self, version: u64) -> Self {
        self.version = Some(version);
        self
    }

    /// Deserialize the model body back into JSON.
    pub fn content(&self) -> Result<Value, SyncError> {
        serde_json::from_str(&self.json).map_err(|e| SyncError::Decoding {
            message: format!("mutation event '{}' body is not valid JSON: {e}", self.id),
        })
    }
}

/// Per-instance sync bookkeeping: the remote version last seen for a model
/// id, and whether the remote copy is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationSyncMetadata {
    pub model_id: String,
    pub model_name: String,
    pub deleted: bool,
    /// When the remote last changed this instance (epoch millis).
    pub last_changed_at: i64,
    pub version: u64,
}

/// Per-type sync bookkeeping: when this model type last completed a sync.
/// `None` means no prior sync, so the next initial sync is a full query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSyncMetadata {
    pub model_name: String,
    pub last_sync: Option<i64>,
}

/// Current wall-clock time as epoch millis.
#[must_use]
pub(crate) fn epoch_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
