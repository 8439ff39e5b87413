// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process pub/sub for engine lifecycle events.
//!
//! The engine reports progress by dispatching named [`HubEvent`]s on a
//! [`HubChannel`]; callers attach listeners (optionally filtered by channel
//! and event name) and receive events over an unbounded channel, so a slow
//! listener never blocks dispatch. Dropping the returned [`HubToken`]
//! detaches the listener.
//!
//! Registration and dispatch are each thread-safe but not synchronized
//! with one another: a listener attached concurrently with a dispatch may
//! or may not observe that dispatch. No ordering is guaranteed across
//! listeners.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tracing::trace;

/// Event names dispatched by the engine.
pub mod event {
    /// Initial sync is starting; payload lists the model names in order.
    pub const SYNC_QUERIES_STARTED: &str = "syncQueriesStarted";
    /// One model type finished its initial sync; payload counts adds,
    /// updates, and deletes.
    pub const MODEL_SYNCED: &str = "modelSynced";
    /// All model types finished their initial sync.
    pub const SYNC_QUERIES_READY: &str = "syncQueriesReady";
    /// Outbox emptiness changed; payload carries `isEmpty`.
    pub const OUTBOX_STATUS: &str = "outboxStatus";
    /// The remote service acknowledged one outbox event.
    pub const OUTBOX_MUTATION_PROCESSED: &str = "outboxMutationProcessed";
    /// Delivery of one outbox event failed terminally.
    pub const OUTBOX_MUTATION_FAILED: &str = "outboxMutationFailed";
    /// The engine is fully started and observing remote changes.
    pub const READY: &str = "ready";
    /// Network reachability changed; payload carries `online`.
    pub const NETWORK_STATUS: &str = "networkStatus";
}

/// Channels grouping related events. The sync engine publishes on
/// [`HubChannel::DataStore`]; the others exist for host-side categories
/// sharing the same bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HubChannel {
    DataStore,
    Auth,
    Storage,
    Api,
    Custom(&'static str),
}

/// A named event with a JSON payload.
#[derive(Debug, Clone, PartialEq)]
pub struct HubEvent {
    pub channel: HubChannel,
    pub name: &'static str,
    pub data: Value,
}

impl HubEvent {
    /// An event on the DataStore channel.
    #[must_use]
    pub fn new(name: &'static str, data: Value) -> Self {
        Self {
            channel: HubChannel::DataStore,
            name,
            data,
        }
    }

    #[must_use]
    pub fn on_channel(mut self, channel: HubChannel) -> Self {
        self.channel = channel;
        self
    }

    #[must_use]
    pub fn outbox_status(is_empty: bool) -> Self {
        Self::new(event::OUTBOX_STATUS, json!({ "isEmpty": is_empty }))
    }

    #[must_use]
    pub fn model_synced(
        model_name: &str,
        full_sync: bool,
        added: usize,
        updated: usize,
        deleted: usize,
    ) -> Self {
        Self::new(
            event::MODEL_SYNCED,
            json!({
                "model": model_name,
                "isFullSync": full_sync,
                "isDeltaSync": !full_sync,
                "added": added,
                "updated": updated,
                "deleted": deleted,
            }),
        )
    }
}

struct Listener {
    channel: Option<HubChannel>,
    event_name: Option<&'static str>,
    tx: mpsc::UnboundedSender<HubEvent>,
}

struct HubInner {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<u64, Listener>>,
}

/// Detaches its listener when dropped.
pub struct HubToken {
    id: u64,
    hub: Weak<HubInner>,
}

impl Drop for HubToken {
    fn drop(&mut self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.listeners.write().remove(&self.id);
        }
    }
}

/// Cheaply cloneable event bus. All clones share the listener set.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

impl Hub {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                next_id: AtomicU64::new(0),
                listeners: RwLock::new(HashMap::new()),
            }),
        }
    }

    /// Attach a listener. A `None` filter matches everything, so
    /// `listen(None, None)` receives every event on every channel.
    pub fn listen(
        &self,
        channel: Option<HubChannel>,
        event_name: Option<&'static str>,
    ) -> (HubToken, mpsc::UnboundedReceiver<HubEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.write().insert(
            id,
            Listener {
                channel,
                event_name,
                tx,
            },
        );
        let token = HubToken {
            id,
            hub: Arc::downgrade(&self.inner),
        };
        (token, rx)
    }

    /// Dispatch an event to all matching listeners. Listeners whose receiver
    /// has been dropped are pruned.
    pub fn dispatch(&self, event: HubEvent) {
        trace!(event = event.name, "hub dispatch");
        let mut dead = Vec::new();
        {
            let listeners = self.inner.listeners.read();
            for (id, listener) in listeners.iter() {
                if listener.channel.is_some_and(|c| c != event.channel)
                    || listener.event_name.is_some_and(|name| name != event.name)
                {
                    continue;
                }
                if listener.tx.send(event.clone()).is_err() {
                    dead.push(*id);
                }
            }
        }
        if !dead.is_empty() {
            let mut listeners = self.inner.listeners.write();
            for id in dead {
                listeners.remove(&id);
            }
        }
    }

    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.read().len()
    }
}
