// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the sync engine.
//!
//! # Example
//!
//! ```
//! use datastore_sync::SyncEngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = SyncEngineConfig::default();
//! assert_eq!(config.sync_page_size, 100);
//!
//! // Full config
//! let config = SyncEngineConfig {
//!     storage_path: Some("datastore.db".into()),
//!     sync_page_size: 250,
//!     mutation_max_attempts: 10,
//!     ..Default::default()
//! };
//! ```

use serde::Deserialize;

use crate::resilience::RetryConfig;

/// Configuration for the sync engine.
///
/// All fields have sensible defaults. Leave `storage_path` unset for an
/// in-memory database.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncEngineConfig {
    /// SQLite file path (e.g., "datastore.db"). `None` means in-memory.
    #[serde(default)]
    pub storage_path: Option<String>,

    /// Max items requested per sync query page
    #[serde(default = "default_sync_page_size")]
    pub sync_page_size: usize,

    /// Delivery attempts per outbox event before giving up
    #[serde(default = "default_mutation_max_attempts")]
    pub mutation_max_attempts: usize,

    /// Retry backoff shape (shared by mutations and sync queries)
    #[serde(default = "default_retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_retry_factor")]
    pub retry_factor: f64,

    /// Buffer size for remote change subscriptions
    #[serde(default = "default_subscription_buffer")]
    pub subscription_buffer: usize,
}

fn default_sync_page_size() -> usize { 100 }
fn default_mutation_max_attempts() -> usize { 8 }
fn default_retry_initial_delay_ms() -> u64 { 200 }
fn default_retry_max_delay_ms() -> u64 { 30_000 }
fn default_retry_factor() -> f64 { 2.0 }
fn default_subscription_buffer() -> usize { 256 }

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self {
            storage_path: None,
            sync_page_size: default_sync_page_size(),
            mutation_max_attempts: default_mutation_max_attempts(),
            retry_initial_delay_ms: default_retry_initial_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_factor: default_retry_factor(),
            subscription_buffer: default_subscription_buffer(),
        }
    }
}

impl SyncEngineConfig {
    /// Retry shape for outbox mutation delivery.
    #[must_use]
    pub fn mutation_retry(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.mutation_max_attempts,
            initial_delay: std::time::Duration::from_millis(self.retry_initial_delay_ms),
            max_delay: std::time::Duration::from_millis(self.retry_max_delay_ms),
            factor: self.retry_factor,
        }
    }

    /// Retry shape for individual sync query pages.
    #[must_use]
    pub fn query_retry(&self) -> RetryConfig {
        RetryConfig {
            initial_delay: std::time::Duration::from_millis(self.retry_initial_delay_ms),
            ..RetryConfig::sync_query()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SyncEngineConfig::default();
        assert!(config.storage_path.is_none());
        assert_eq!(config.sync_page_size, 100);
        assert_eq!(config.mutation_max_attempts, 8);
        assert_eq!(config.subscription_buffer, 256);
    }

    #[test]
    fn test_deserialize_partial() {
        let config: SyncEngineConfig =
            serde_json::from_str(r#"{"sync_page_size": 50, "storage_path": "x.db"}"#).unwrap();
        assert_eq!(config.sync_page_size, 50);
        assert_eq!(config.storage_path.as_deref(), Some("x.db"));
        // Unspecified fields fall back to defaults.
        assert_eq!(config.mutation_max_attempts, 8);
    }

    #[test]
    fn test_retry_shapes_follow_config() {
        let config = SyncEngineConfig {
            mutation_max_attempts: 3,
            retry_initial_delay_ms: 10,
            retry_max_delay_ms: 100,
            retry_factor: 3.0,
            ..Default::default()
        };

        let retry = config.mutation_retry();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.initial_delay.as_millis(), 10);
        assert_eq!(retry.max_delay.as_millis(), 100);

        let query = config.query_retry();
        assert_eq!(query.initial_delay.as_millis(), 10);
        assert_eq!(query.max_attempts, RetryConfig::sync_query().max_attempts);
    }
}
