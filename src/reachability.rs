// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Network reachability signal.
//!
//! The engine does not probe the network itself; the host application owns
//! platform reachability detection and feeds transitions into
//! [`Reachability::set_online`]. Consumers watch the signal and pause or
//! resume cloud traffic accordingly. Local reads and writes never depend
//! on this signal.

use tokio::sync::watch;
use tracing::info;

/// Cheaply cloneable online/offline signal. All clones share one state.
#[derive(Clone)]
pub struct Reachability {
    tx: watch::Sender<bool>,
}

impl Reachability {
    /// Create a signal with the given starting state.
    #[must_use]
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    /// Report a reachability transition. Publishing the current state again
    /// is a no-op for watchers.
    pub fn set_online(&self, online: bool) {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            info!(online, "network reachability changed");
            crate::metrics::set_network_online(online);
        }
    }

    #[must_use]
    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Watch for transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Reachability {
    /// Assumed-online start: the first delivery failure flips behavior,
    /// which beats stalling cloud sync until the host reports in.
    fn default() -> Self {
        Self::new(true)
    }
}
