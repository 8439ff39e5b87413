// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff.
//!
//! Two entry points: [`retry`] keeps trying any error until attempts run
//! out (used for storage connection setup), while [`retry_classified`]
//! consults [`SyncError::is_retryable`] and returns terminal errors
//! immediately: validation failures are never retried, expired-session
//! and transport failures are, with the request regenerated fresh on each
//! attempt so refreshed credentials are picked up.
//!
//! # Example
//!
//! ```
//! use datastore_sync::RetryConfig;
//!
//! // Startup: fail fast on bad config
//! let startup = RetryConfig::startup();
//! assert_eq!(startup.max_attempts, 5);
//!
//! // Outgoing mutations: patient, bounded
//! let mutation = RetryConfig::mutation();
//! assert_eq!(mutation.max_attempts, 8);
//! ```

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::SyncError;

/// Configuration for retry behavior.
///
/// Presets cover the engine's cases:
/// - [`RetryConfig::startup()`]: fast-fail while opening local storage
/// - [`RetryConfig::mutation()`]: patient delivery of outbox events
/// - [`RetryConfig::sync_query()`]: quick retry for initial-sync pages
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub factor: f64,
    pub max_attempts: usize,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::mutation()
    }
}

impl RetryConfig {
    /// Fast-fail retry for opening local storage at startup.
    /// Detects configuration errors quickly instead of hanging.
    #[must_use]
    pub fn startup() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Patient retry for outgoing mutation delivery.
    #[must_use]
    pub fn mutation() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            factor: 2.0,
        }
    }

    /// Quick retry for individual sync query pages.
    #[must_use]
    pub fn sync_query() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(2),
            factor: 2.0,
        }
    }

    /// Minimal delays for tests.
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            factor: 2.0,
        }
    }
}

/// Retry an operation on any error, up to `max_attempts`.
pub async fn retry<F, Fut, T, E>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(
                        operation = operation_name,
                        attempts, "operation succeeded after retries"
                    );
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if attempts >= config.max_attempts {
                    return Err(err);
                }
                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max = config.max_attempts,
                    error = %err,
                    delay = ?delay,
                    "operation failed, retrying"
                );
                sleep(delay).await;
                delay = (delay.mul_f64(config.factor)).min(config.max_delay);
            }
        }
    }
}

/// Retry an operation, but only while the error is retryable.
///
/// Terminal errors (validation, decoding, 4xx) return immediately. The
/// closure is re-invoked on each attempt so the request is built fresh.
pub async fn retry_classified<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> Result<T, SyncError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SyncError>>,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        match operation().await {
            Ok(val) => {
                if attempts > 0 {
                    info!(
                        operation = operation_name,
                        attempts, "operation succeeded after retries"
                    );
                }
                return Ok(val);
            }
            Err(err) => {
                attempts += 1;
                if !err.is_retryable() || attempts >= config.max_attempts {
                    return Err(err);
                }
                crate::metrics::record_retry(operation_name);
                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    max = config.max_attempts,
                    error = %err,
                    delay = ?delay,
                    "retryable failure, backing off"
                );
                sleep(delay).await;
                delay = (delay.mul_f64(config.factor)).min(config.max_delay);
            }
        }
    }
}
