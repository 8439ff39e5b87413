// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the sync engine.
//!
//! Every public operation that can fail resolves to a [`SyncError`] carrying
//! a human-readable description (via `Display`) and a recovery suggestion.
//! Errors are classified as retryable or terminal; the outbox and the
//! initial sync orchestrator use [`SyncError::is_retryable`] to decide
//! between backing off and surfacing the failure.

use thiserror::Error;

use crate::storage::traits::StorageError;

/// Unified error type for engine operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Engine or plugin configuration is missing or invalid.
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// The request was malformed before any network call was made.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Local identity/credential resolution failed.
    #[error("auth error: {message}")]
    Auth { message: String },

    /// The remote rejected the call because the auth session expired.
    /// Retryable: a fresh attempt picks up refreshed credentials.
    #[error("auth session expired: {message}")]
    SessionExpired { message: String },

    /// Transport-level failure (connection refused, timeout, DNS).
    #[error("network error: {message}")]
    Network { message: String },

    /// The remote service answered with an HTTP error status.
    #[error("service returned HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// The response body could not be parsed into the expected model.
    #[error("decoding error: {message}")]
    Decoding { message: String },

    /// Local storage adapter failure.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Aggregate wrapper for per-model initial-sync failures.
    #[error("initial sync failed for {failed} of {total} models: {messages}")]
    InitialSync {
        failed: usize,
        total: usize,
        messages: String,
    },
}

impl SyncError {
    /// Whether a fresh attempt of the same operation may succeed.
    ///
    /// Transport errors, server-side HTTP failures (5xx and 429), and
    /// expired auth sessions are retryable. Everything detected locally
    /// (validation, configuration, decoding) is terminal, as are client
    /// errors the server will keep rejecting.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } | Self::SessionExpired { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// A human-readable hint on how to recover from this error.
    #[must_use]
    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => {
                "Review the engine configuration and registered model schemas"
            }
            Self::Validation { .. } => {
                "Fix the request before resubmitting; no network call was made"
            }
            Self::Auth { .. } => "Sign in again or verify the configured credentials",
            Self::SessionExpired { .. } => {
                "The operation is retried automatically; sign in again if it keeps failing"
            }
            Self::Network { .. } => "Check connectivity; delivery resumes when back online",
            Self::Http { .. } => "Inspect the service response; retry if the status is transient",
            Self::Decoding { .. } => {
                "Verify the model schema matches the shape of the remote response"
            }
            Self::Storage(_) => "Inspect the local storage adapter; the device store may be full",
            Self::InitialSync { .. } => {
                "Inspect the per-model messages; models that synced cleanly are not affected"
            }
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }
}
