// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable outgoing mutation queue.
//!
//! Local saves and deletes of syncable models land here as
//! [`MutationEvent`]s, persisted before anything touches the network.
//! A single drain task delivers them strictly in enqueue order: the next
//! event is always re-read from storage, so the queue survives restarts
//! and events enqueued while offline drain first once delivery starts.
//!
//! Failure handling splits on [`SyncError::is_retryable`]:
//! - terminal errors (validation, 4xx) drop the event and delivery
//!   continues with the next one
//! - retryable errors back off; if attempts run out the event stays
//!   queued, the outbox flags [`OutboxState::Errored`], and draining stops
//!   until restarted

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::SyncEngineConfig;
use crate::error::SyncError;
use crate::hub::{event, Hub, HubEvent};
use crate::mutation::{epoch_millis, MutationEvent, MutationSyncMetadata};
use crate::remote::{MutationAck, RemoteApi};
use crate::resilience::{retry_classified, RetryConfig};
use crate::storage::{LocalStorage, ModelRecord};

/// Pause between drain iterations after a local storage error.
const STORAGE_ERROR_BACKOFF: Duration = Duration::from_millis(250);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxState {
    /// No drain task running.
    Stopped,
    /// Drain task running, delivering queued events.
    Started,
    /// Drain task stopped by request; events keep accumulating.
    Paused,
    /// A retryable failure exhausted its attempts. The failed event is
    /// still queued; a restart retries it.
    Errored,
}

struct DrainTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct Outbox {
    storage: Arc<dyn LocalStorage>,
    hub: Hub,
    config: SyncEngineConfig,
    notify: Arc<Notify>,
    state_tx: watch::Sender<OutboxState>,
    drain: Mutex<Option<DrainTask>>,
}

impl Outbox {
    #[must_use]
    pub fn new(storage: Arc<dyn LocalStorage>, hub: Hub, config: SyncEngineConfig) -> Self {
        let (state_tx, _) = watch::channel(OutboxState::Stopped);
        Self {
            storage,
            hub,
            config,
            notify: Arc::new(Notify::new()),
            state_tx,
            drain: Mutex::new(None),
        }
    }

    /// Observe outbox state transitions.
    #[must_use]
    pub fn state(&self) -> watch::Receiver<OutboxState> {
        self.state_tx.subscribe()
    }

    /// Persist a mutation event at the tail of the queue and wake the
    /// drain task. The event is durable when this returns, whether or not
    /// delivery is running.
    pub async fn enqueue(&self, event: MutationEvent) -> Result<(), SyncError> {
        self.storage.save_mutation_event(&event).await?;
        let depth = self.storage.pending_mutation_count().await?;
        crate::metrics::set_outbox_depth(depth);
        debug!(
            model = event.model_name.as_str(),
            id = event.model_id.as_str(),
            kind = %event.kind,
            depth,
            "mutation enqueued"
        );
        self.notify.notify_one();
        Ok(())
    }

    pub async fn is_empty(&self) -> Result<bool, SyncError> {
        Ok(self.storage.pending_mutation_count().await? == 0)
    }

    /// Start (or restart) delivery to the given remote service. Any
    /// previous drain task is cancelled and awaited first, so at most one
    /// task ever touches the queue head.
    pub async fn start(&self, api: Arc<dyn RemoteApi>) {
        self.stop_drain().await;

        let cancel = CancellationToken::new();
        let loop_ = DrainLoop {
            storage: self.storage.clone(),
            api,
            hub: self.hub.clone(),
            notify: self.notify.clone(),
            retry: self.config.mutation_retry(),
            state_tx: self.state_tx.clone(),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(loop_.run());
        *self.drain.lock() = Some(DrainTask { cancel, handle });
        self.state_tx.send_replace(OutboxState::Started);
        info!("outbox delivery started");
    }

    /// Stop delivery; queued events stay put and new ones still enqueue.
    pub async fn pause(&self) {
        self.stop_drain().await;
        self.state_tx.send_replace(OutboxState::Paused);
        info!("outbox delivery paused");
    }

    /// Stop delivery as part of engine shutdown.
    pub async fn stop(&self) {
        self.stop_drain().await;
        self.state_tx.send_replace(OutboxState::Stopped);
    }

    async fn stop_drain(&self) {
        let task = self.drain.lock().take();
        if let Some(task) = task {
            task.cancel.cancel();
            // The task only awaits cancel-aware points, so this is prompt.
            let _ = task.handle.await;
        }
    }
}

struct DrainLoop {
    storage: Arc<dyn LocalStorage>,
    api: Arc<dyn RemoteApi>,
    hub: Hub,
    notify: Arc<Notify>,
    retry: RetryConfig,
    state_tx: watch::Sender<OutboxState>,
    cancel: CancellationToken,
}

impl DrainLoop {
    async fn run(self) {
        // `None` forces an outboxStatus dispatch on the first iteration.
        let mut was_empty: Option<bool> = None;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            let next = match self.storage.next_mutation_event().await {
                Ok(next) => next,
                Err(err) => {
                    warn!(error = %err, "failed to read queue head");
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = tokio::time::sleep(STORAGE_ERROR_BACKOFF) => continue,
                    }
                }
            };

            match next {
                Some(event) => {
                    self.publish_status(&mut was_empty, false);
                    if !self.deliver(event).await {
                        break;
                    }
                }
                None => {
                    self.publish_status(&mut was_empty, true);
                    tokio::select! {
                        _ = self.cancel.cancelled() => break,
                        _ = self.notify.notified() => {}
                    }
                }
            }
        }
    }

    fn publish_status(&self, was_empty: &mut Option<bool>, is_empty: bool) {
        if *was_empty != Some(is_empty) {
            self.hub.dispatch(HubEvent::outbox_status(is_empty));
            *was_empty = Some(is_empty);
        }
    }

    /// Deliver one event. Returns `false` when draining must stop.
    async fn deliver(&self, event: MutationEvent) -> bool {
        if let Err(err) = self
            .storage
            .mark_mutation_event_in_process(&event.id, true)
            .await
        {
            // Delivery can proceed without the marker.
            warn!(id = event.id.as_str(), error = %err, "failed to flag event in-process");
        }

        let started = Instant::now();
        let result =
            retry_classified("outbox_mutation", &self.retry, || self.api.mutate(&event)).await;
        crate::metrics::record_mutation_latency(&event.model_name, started.elapsed());

        match result {
            Ok(ack) => {
                if let Err(err) = self.record_ack(&event, &ack).await {
                    warn!(id = event.id.as_str(), error = %err, "failed to record mutation ack");
                    tokio::time::sleep(STORAGE_ERROR_BACKOFF).await;
                    // Redelivery is safe: the service already holds the
                    // write, so the retry reconciles to the same version.
                    return true;
                }
                crate::metrics::record_mutation(&event.model_name, "success");
                self.hub.dispatch(HubEvent::new(
                    event::OUTBOX_MUTATION_PROCESSED,
                    json!({
                        "model": event.model_name,
                        "id": event.model_id,
                        "kind": event.kind.as_str(),
                        "version": ack.version,
                    }),
                ));
                true
            }
            Err(err) if !err.is_retryable() => {
                warn!(
                    model = event.model_name.as_str(),
                    id = event.model_id.as_str(),
                    error = %err,
                    "mutation rejected, dropping event"
                );
                crate::metrics::record_mutation(&event.model_name, "error");
                if let Err(storage_err) = self.storage.delete_mutation_event(&event.id).await {
                    warn!(id = event.id.as_str(), error = %storage_err, "failed to drop rejected event");
                    tokio::time::sleep(STORAGE_ERROR_BACKOFF).await;
                    return true;
                }
                self.hub.dispatch(HubEvent::new(
                    event::OUTBOX_MUTATION_FAILED,
                    json!({
                        "model": event.model_name,
                        "id": event.model_id,
                        "kind": event.kind.as_str(),
                        "error": err.to_string(),
                        "recoverySuggestion": err.recovery_suggestion(),
                    }),
                ));
                true
            }
            Err(err) => {
                // Attempts exhausted on a retryable failure. Keep the event
                // queued and stop; a restart picks it up again. Clear the
                // in-flight marker so the kept event reads as idle.
                if let Err(storage_err) = self
                    .storage
                    .mark_mutation_event_in_process(&event.id, false)
                    .await
                {
                    warn!(id = event.id.as_str(), error = %storage_err, "failed to clear in-process flag");
                }
                warn!(
                    model = event.model_name.as_str(),
                    id = event.model_id.as_str(),
                    error = %err,
                    "delivery attempts exhausted, outbox errored"
                );
                crate::metrics::record_mutation(&event.model_name, "exhausted");
                self.state_tx.send_replace(OutboxState::Errored);
                false
            }
        }
    }

    /// Fold the service's acknowledgement back into local state, then
    /// retire the event.
    async fn record_ack(&self, event: &MutationEvent, ack: &MutationAck) -> Result<(), SyncError> {
        self.storage
            .save_mutation_sync_metadata(&MutationSyncMetadata {
                model_id: event.model_id.clone(),
                model_name: event.model_name.clone(),
                deleted: ack.deleted,
                last_changed_at: epoch_millis(),
                version: ack.version,
            })
            .await?;

        if let Some(content) = &ack.content {
            if !ack.deleted {
                self.storage
                    .save_record(&ModelRecord::new(
                        &event.model_name,
                        &event.model_id,
                        content.clone(),
                    ))
                    .await?;
            }
        }

        self.storage.delete_mutation_event(&event.id).await?;
        let depth = self.storage.pending_mutation_count().await?;
        crate::metrics::set_outbox_depth(depth);
        Ok(())
    }
}
