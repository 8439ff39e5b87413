// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Local storage adapters.
//!
//! [`LocalStorage`] is the single seam between the engine and durable
//! state: model records, the outgoing mutation queue, and per-model sync
//! metadata all live behind it. Two adapters ship in-tree:
//!
//! - [`SqliteStorage`]: durable, file or in-memory, the default
//! - [`InMemoryStorage`]: lock-based, for tests and ephemeral use

pub mod memory;
pub mod sqlite;
pub mod traits;

pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::{LocalStorage, ModelRecord, StorageError};
