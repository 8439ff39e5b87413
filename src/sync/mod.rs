// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Inbound sync: initial sync queries, reconciliation, subscriptions.

pub mod initial;
pub mod reconcile;
pub mod subscription;

pub use initial::InitialSyncOrchestrator;
pub use reconcile::{Disposition, Reconciler};
pub use subscription::SubscriptionProcessor;
