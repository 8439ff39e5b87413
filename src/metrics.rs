// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the sync engine.
//!
//! Uses the `metrics` crate for backend-agnostic metrics collection.
//! The host application is responsible for choosing the exporter
//! (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `datastore_sync_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `model`: model type name
//! - `operation`: the retry-wrapped operation name
//! - `status`: success, error, dropped

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record one delivered (or terminally failed) outbox mutation.
pub fn record_mutation(model: &str, status: &str) {
    counter!(
        "datastore_sync_mutations_total",
        "model" => model.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record mutation delivery latency, measured across retries.
pub fn record_mutation_latency(model: &str, duration: Duration) {
    histogram!(
        "datastore_sync_mutation_seconds",
        "model" => model.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record one retry attempt inside a retry-wrapped operation.
pub fn record_retry(operation: &str) {
    counter!(
        "datastore_sync_retries_total",
        "operation" => operation.to_string()
    )
    .increment(1);
}

/// Record one fetched sync query page and its item count.
pub fn record_sync_page(model: &str, items: usize) {
    counter!(
        "datastore_sync_query_pages_total",
        "model" => model.to_string()
    )
    .increment(1);
    histogram!(
        "datastore_sync_query_page_items",
        "model" => model.to_string()
    )
    .record(items as f64);
}

/// Record full initial-sync duration for one model type.
pub fn record_model_sync(model: &str, duration: Duration) {
    histogram!(
        "datastore_sync_model_sync_seconds",
        "model" => model.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record one reconciled remote change with its disposition.
pub fn record_reconcile(model: &str, disposition: &str) {
    counter!(
        "datastore_sync_reconciled_total",
        "model" => model.to_string(),
        "disposition" => disposition.to_string()
    )
    .increment(1);
}

/// Set current outbox depth.
pub fn set_outbox_depth(count: usize) {
    gauge!("datastore_sync_outbox_depth").set(count as f64);
}

/// Set network reachability (1 = online, 0 = offline).
pub fn set_network_online(online: bool) {
    gauge!("datastore_sync_network_online").set(if online { 1.0 } else { 0.0 });
}

/// Set engine state as a numeric level for dashboards
/// (0 = stopped, 1 = starting, 2 = initial sync, 3 = syncing, 4 = paused).
pub fn set_engine_state(level: u8) {
    gauge!("datastore_sync_engine_state").set(level as f64);
}
