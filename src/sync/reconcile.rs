// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Version-based reconciliation of remote changes into local storage.
//!
//! Every remote change (initial-sync page item or subscription message)
//! flows through [`Reconciler::reconcile`]. The rule is last-writer-wins on
//! the remote version number: a change is applied only when its version is
//! strictly newer than the version recorded locally, so replaying the same
//! page twice leaves storage unchanged.

use std::sync::Arc;

use tracing::debug;

use crate::error::SyncError;
use crate::remote::RemoteModel;
use crate::storage::{LocalStorage, ModelRecord};

/// What reconciliation did with one remote change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// No local copy existed; the record was created.
    Created,
    /// A local copy existed and was overwritten.
    Updated,
    /// The remote copy is deleted; the local record was removed.
    Deleted,
    /// The change was not newer than local state and was dropped.
    Dropped,
}

impl Disposition {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Deleted => "deleted",
            Self::Dropped => "dropped",
        }
    }
}

pub struct Reconciler {
    storage: Arc<dyn LocalStorage>,
}

impl Reconciler {
    #[must_use]
    pub fn new(storage: Arc<dyn LocalStorage>) -> Self {
        Self { storage }
    }

    /// Apply one remote change under last-writer-wins.
    ///
    /// Versions equal to the locally recorded one are dropped: the local
    /// copy already reflects that write, typically our own mutation echoed
    /// back through a subscription.
    pub async fn reconcile(&self, remote: &RemoteModel) -> Result<Disposition, SyncError> {
        let model_name = remote.model_name();
        let model_id = remote.model_id();

        if let Some(local) = self.storage.mutation_sync_metadata(model_id).await? {
            if remote.metadata.version <= local.version {
                debug!(
                    model = model_name,
                    id = model_id,
                    remote_version = remote.metadata.version,
                    local_version = local.version,
                    "dropping stale remote change"
                );
                crate::metrics::record_reconcile(model_name, Disposition::Dropped.as_str());
                return Ok(Disposition::Dropped);
            }
        }

        let disposition = if remote.metadata.deleted {
            self.storage.delete_record(model_name, model_id).await?;
            Disposition::Deleted
        } else {
            let existed = self
                .storage
                .get_record(model_name, model_id)
                .await?
                .is_some();
            let record = ModelRecord::new(model_name, model_id, remote.content.clone());
            self.storage.save_record(&record).await?;
            if existed {
                Disposition::Updated
            } else {
                Disposition::Created
            }
        };

        // Metadata is written after the record so a crash in between replays
        // the change instead of losing it.
        self.storage
            .save_mutation_sync_metadata(&remote.metadata)
            .await?;

        crate::metrics::record_reconcile(model_name, disposition.as_str());
        Ok(disposition)
    }
}
