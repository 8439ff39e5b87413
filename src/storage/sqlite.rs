// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite storage adapter.
//!
//! Durable backing store for model records, the outgoing mutation queue,
//! and sync metadata. Schema:
//!
//! ```sql
//! CREATE TABLE records (
//!   model_name TEXT NOT NULL,
//!   model_id   TEXT NOT NULL,
//!   content    TEXT NOT NULL,   -- model body as JSON text
//!   PRIMARY KEY (model_name, model_id)
//! );
//! CREATE TABLE mutation_events (
//!   seq        INTEGER PRIMARY KEY AUTOINCREMENT,  -- enqueue order
//!   id         TEXT NOT NULL UNIQUE,
//!   ...
//! );
//! ```
//!
//! Queue order is the `seq` rowid: `next_mutation_event` is `ORDER BY seq
//! ASC LIMIT 1`, and `save_mutation_event` is INSERT OR IGNORE on the
//! unique event id so re-saving an already queued event never reorders it.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use super::traits::{LocalStorage, ModelRecord, StorageError};
use crate::model::ModelSchema;
use crate::mutation::{ModelSyncMetadata, MutationEvent, MutationKind, MutationSyncMetadata};
use crate::resilience::retry::{retry, RetryConfig};

pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (creating if needed) a database at the given path, with
    /// startup-mode retry so a misconfigured path fails fast.
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite://{path}"))
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .create_if_missing(true);

        let pool = retry("sqlite_connect", &RetryConfig::startup(), || {
            let options = options.clone();
            async move {
                SqlitePoolOptions::new()
                    .max_connections(5)
                    .acquire_timeout(Duration::from_secs(10))
                    .connect_with(options)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            }
        })
        .await?;

        let store = Self { pool };
        store.enable_wal_mode().await?;
        store.init_schema().await?;
        Ok(store)
    }

    /// Private in-memory database, used by tests and ephemeral engines.
    ///
    /// Pinned to a single connection: each SQLite `:memory:` connection is
    /// its own database, so a larger pool would scatter the tables.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Enable WAL mode: concurrent reads during writes, single fsync.
    async fn enable_wal_mode(&self) -> Result<(), StorageError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to enable WAL mode: {e}")))?;

        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(format!("Failed to set synchronous mode: {e}")))?;

        Ok(())
    }

    async fn init_schema(&self) -> Result<(), StorageError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS records (
                model_name TEXT NOT NULL,
                model_id   TEXT NOT NULL,
                content    TEXT NOT NULL,
                PRIMARY KEY (model_name, model_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS mutation_events (
                seq            INTEGER PRIMARY KEY AUTOINCREMENT,
                id             TEXT NOT NULL UNIQUE,
                model_id       TEXT NOT NULL,
                model_name     TEXT NOT NULL,
                json           TEXT NOT NULL,
                kind           TEXT NOT NULL,
                created_at     INTEGER NOT NULL,
                version        INTEGER,
                in_process     INTEGER NOT NULL DEFAULT 0,
                graphql_filter TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS mutation_sync_metadata (
                model_id        TEXT PRIMARY KEY,
                model_name      TEXT NOT NULL,
                deleted         INTEGER NOT NULL DEFAULT 0,
                last_changed_at INTEGER NOT NULL,
                version         INTEGER NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS model_sync_metadata (
                model_name TEXT PRIMARY KEY,
                last_sync  INTEGER
            )
            "#,
        ];

        for sql in statements {
            retry("sqlite_init_schema", &RetryConfig::startup(), || async {
                sqlx::query(sql)
                    .execute(&self.pool)
                    .await
                    .map_err(|e| StorageError::Backend(e.to_string()))
            })
            .await?;
        }

        Ok(())
    }

    fn event_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<MutationEvent, StorageError> {
        let kind_str: String = row
            .try_get("kind")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let kind = MutationKind::parse(&kind_str)
            .map_err(|e| StorageError::Corrupt(e.to_string()))?;
        let version: Option<i64> = row
            .try_get("version")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let in_process: i64 = row.try_get("in_process").unwrap_or(0);

        Ok(MutationEvent {
            id: row
                .try_get("id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
            model_id: row
                .try_get("model_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
            model_name: row
                .try_get("model_name")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
            json: row
                .try_get("json")
                .map_err(|e| StorageError::Backend(e.to_string()))?,
            kind,
            created_at: row.try_get("created_at").unwrap_or(0),
            version: version.map(|v| v as u64),
            in_process: in_process != 0,
            graphql_filter: row.try_get("graphql_filter").ok().flatten(),
        })
    }
}

#[async_trait]
impl LocalStorage for SqliteStorage {
    async fn set_up(&self, _schemas: &[ModelSchema]) -> Result<(), StorageError> {
        // All models share the records table, keyed by model name. Nothing
        // schema-specific to create; tables already exist at this point.
        Ok(())
    }

    async fn save_record(&self, record: &ModelRecord) -> Result<(), StorageError> {
        let content = record.content.to_string();
        sqlx::query(
            "INSERT INTO records (model_name, model_id, content) VALUES (?, ?, ?)
             ON CONFLICT(model_name, model_id) DO UPDATE SET content = excluded.content",
        )
        .bind(&record.model_name)
        .bind(&record.model_id)
        .bind(&content)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_record(&self, model_name: &str, model_id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM records WHERE model_name = ? AND model_id = ?")
            .bind(model_name)
            .bind(model_id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn get_record(
        &self,
        model_name: &str,
        model_id: &str,
    ) -> Result<Option<ModelRecord>, StorageError> {
        let row = sqlx::query(
            "SELECT content FROM records WHERE model_name = ? AND model_id = ?",
        )
        .bind(model_name)
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => {
                let content: String = row
                    .try_get("content")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                let content = serde_json::from_str(&content)
                    .map_err(|e| StorageError::Corrupt(e.to_string()))?;
                Ok(Some(ModelRecord::new(model_name, model_id, content)))
            }
            None => Ok(None),
        }
    }

    async fn query_records(&self, model_name: &str) -> Result<Vec<ModelRecord>, StorageError> {
        let rows = sqlx::query(
            "SELECT model_id, content FROM records WHERE model_name = ? ORDER BY model_id",
        )
        .bind(model_name)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let model_id: String = row
                .try_get("model_id")
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let content: String = row
                .try_get("content")
                .map_err(|e| StorageError::Backend(e.to_string()))?;
            let content = serde_json::from_str(&content)
                .map_err(|e| StorageError::Corrupt(e.to_string()))?;
            records.push(ModelRecord::new(model_name, model_id, content));
        }
        Ok(records)
    }

    async fn save_mutation_event(&self, event: &MutationEvent) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT OR IGNORE INTO mutation_events
             (id, model_id, model_name, json, kind, created_at, version, in_process, graphql_filter)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&event.id)
        .bind(&event.model_id)
        .bind(&event.model_name)
        .bind(&event.json)
        .bind(event.kind.as_str())
        .bind(event.created_at)
        .bind(event.version.map(|v| v as i64))
        .bind(i64::from(event.in_process))
        .bind(&event.graphql_filter)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn delete_mutation_event(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query("DELETE FROM mutation_events WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn mark_mutation_event_in_process(
        &self,
        id: &str,
        in_process: bool,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE mutation_events SET in_process = ? WHERE id = ?")
            .bind(i64::from(in_process))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn next_mutation_event(&self) -> Result<Option<MutationEvent>, StorageError> {
        let row = sqlx::query(
            "SELECT id, model_id, model_name, json, kind, created_at, version, in_process, graphql_filter
             FROM mutation_events ORDER BY seq ASC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        row.map(|r| Self::event_from_row(&r)).transpose()
    }

    async fn load_mutation_events(&self) -> Result<Vec<MutationEvent>, StorageError> {
        let rows = sqlx::query(
            "SELECT id, model_id, model_name, json, kind, created_at, version, in_process, graphql_filter
             FROM mutation_events ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        rows.iter().map(Self::event_from_row).collect()
    }

    async fn pending_mutation_count(&self) -> Result<usize, StorageError> {
        let row = sqlx::query("SELECT COUNT(*) as cnt FROM mutation_events")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        let count: i64 = row
            .try_get("cnt")
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(count as usize)
    }

    async fn mutation_sync_metadata(
        &self,
        model_id: &str,
    ) -> Result<Option<MutationSyncMetadata>, StorageError> {
        let row = sqlx::query(
            "SELECT model_name, deleted, last_changed_at, version
             FROM mutation_sync_metadata WHERE model_id = ?",
        )
        .bind(model_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => {
                let deleted: i64 = row.try_get("deleted").unwrap_or(0);
                let version: i64 = row
                    .try_get("version")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(Some(MutationSyncMetadata {
                    model_id: model_id.to_string(),
                    model_name: row
                        .try_get("model_name")
                        .map_err(|e| StorageError::Backend(e.to_string()))?,
                    deleted: deleted != 0,
                    last_changed_at: row.try_get("last_changed_at").unwrap_or(0),
                    version: version as u64,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_mutation_sync_metadata(
        &self,
        metadata: &MutationSyncMetadata,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO mutation_sync_metadata (model_id, model_name, deleted, last_changed_at, version)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT(model_id) DO UPDATE SET
                model_name = excluded.model_name,
                deleted = excluded.deleted,
                last_changed_at = excluded.last_changed_at,
                version = excluded.version",
        )
        .bind(&metadata.model_id)
        .bind(&metadata.model_name)
        .bind(i64::from(metadata.deleted))
        .bind(metadata.last_changed_at)
        .bind(metadata.version as i64)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }

    async fn model_sync_metadata(
        &self,
        model_name: &str,
    ) -> Result<Option<ModelSyncMetadata>, StorageError> {
        let row = sqlx::query("SELECT last_sync FROM model_sync_metadata WHERE model_name = ?")
            .bind(model_name)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        match row {
            Some(row) => {
                let last_sync: Option<i64> = row
                    .try_get("last_sync")
                    .map_err(|e| StorageError::Backend(e.to_string()))?;
                Ok(Some(ModelSyncMetadata {
                    model_name: model_name.to_string(),
                    last_sync,
                }))
            }
            None => Ok(None),
        }
    }

    async fn save_model_sync_metadata(
        &self,
        metadata: &ModelSyncMetadata,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "INSERT INTO model_sync_metadata (model_name, last_sync) VALUES (?, ?)
             ON CONFLICT(model_name) DO UPDATE SET last_sync = excluded.last_sync",
        )
        .bind(&metadata.model_name)
        .bind(metadata.last_sync)
        .execute(&self.pool)
        .await
        .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::MutationKind;
    use serde_json::json;

    async fn store() -> SqliteStorage {
        SqliteStorage::in_memory().await.unwrap()
    }

    fn event(model_id: &str) -> MutationEvent {
        MutationEvent::new("Post", model_id, MutationKind::Create, &json!({"id": model_id}))
    }

    #[tokio::test]
    async fn test_record_roundtrip() {
        let store = store().await;

        let record = ModelRecord::new("Post", "p1", json!({"id": "p1", "title": "hello"}));
        store.save_record(&record).await.unwrap();

        let loaded = store.get_record("Post", "p1").await.unwrap().unwrap();
        assert_eq!(loaded, record);

        assert!(store.get_record("Post", "missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_save_record_overwrites() {
        let store = store().await;

        store
            .save_record(&ModelRecord::new("Post", "p1", json!({"title": "v1"})))
            .await
            .unwrap();
        store
            .save_record(&ModelRecord::new("Post", "p1", json!({"title": "v2"})))
            .await
            .unwrap();

        let loaded = store.get_record("Post", "p1").await.unwrap().unwrap();
        assert_eq!(loaded.content["title"], "v2");
        assert_eq!(store.query_records("Post").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_record() {
        let store = store().await;

        store
            .save_record(&ModelRecord::new("Post", "p1", json!({})))
            .await
            .unwrap();
        store.delete_record("Post", "p1").await.unwrap();
        assert!(store.get_record("Post", "p1").await.unwrap().is_none());

        // Deleting a missing record is a no-op.
        store.delete_record("Post", "missing").await.unwrap();
    }

    #[tokio::test]
    async fn test_query_records_scoped_to_model() {
        let store = store().await;

        store
            .save_record(&ModelRecord::new("Post", "p1", json!({})))
            .await
            .unwrap();
        store
            .save_record(&ModelRecord::new("Post", "p2", json!({})))
            .await
            .unwrap();
        store
            .save_record(&ModelRecord::new("Comment", "c1", json!({})))
            .await
            .unwrap();

        assert_eq!(store.query_records("Post").await.unwrap().len(), 2);
        assert_eq!(store.query_records("Comment").await.unwrap().len(), 1);
        assert!(store.query_records("Author").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_outbox_fifo_order() {
        let store = store().await;

        let first = event("p1");
        let second = event("p2");
        let third = event("p3");
        store.save_mutation_event(&first).await.unwrap();
        store.save_mutation_event(&second).await.unwrap();
        store.save_mutation_event(&third).await.unwrap();

        let next = store.next_mutation_event().await.unwrap().unwrap();
        assert_eq!(next.id, first.id);

        store.delete_mutation_event(&first.id).await.unwrap();
        let next = store.next_mutation_event().await.unwrap().unwrap();
        assert_eq!(next.id, second.id);

        let all = store.load_mutation_events().await.unwrap();
        assert_eq!(
            all.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec![second.id.as_str(), third.id.as_str()]
        );
    }

    #[tokio::test]
    async fn test_duplicate_event_save_is_noop() {
        let store = store().await;

        let first = event("p1");
        let second = event("p2");
        store.save_mutation_event(&first).await.unwrap();
        store.save_mutation_event(&second).await.unwrap();

        // Re-saving the first event must not move it to the tail.
        store.save_mutation_event(&first).await.unwrap();

        assert_eq!(store.pending_mutation_count().await.unwrap(), 2);
        let next = store.next_mutation_event().await.unwrap().unwrap();
        assert_eq!(next.id, first.id);
    }

    #[tokio::test]
    async fn test_mark_event_in_process() {
        let store = store().await;
        let event = event("p1");
        store.save_mutation_event(&event).await.unwrap();

        store
            .mark_mutation_event_in_process(&event.id, true)
            .await
            .unwrap();
        assert!(store.next_mutation_event().await.unwrap().unwrap().in_process);

        store
            .mark_mutation_event_in_process(&event.id, false)
            .await
            .unwrap();
        assert!(!store.next_mutation_event().await.unwrap().unwrap().in_process);
    }

    #[tokio::test]
    async fn test_event_fields_survive_storage() {
        let store = store().await;

        let mut event = MutationEvent::new(
            "Post",
            "p1",
            MutationKind::Update,
            &json!({"id": "p1", "title": "hello"}),
        )
        .with_version(4);
        event.graphql_filter = Some(r#"{"id":{"eq":"p1"}}"#.to_string());

        store.save_mutation_event(&event).await.unwrap();
        let loaded = store.next_mutation_event().await.unwrap().unwrap();
        assert_eq!(loaded, event);
    }

    #[tokio::test]
    async fn test_empty_outbox() {
        let store = store().await;
        assert!(store.next_mutation_event().await.unwrap().is_none());
        assert!(store.load_mutation_events().await.unwrap().is_empty());
        assert_eq!(store.pending_mutation_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mutation_sync_metadata_roundtrip() {
        let store = store().await;

        assert!(store.mutation_sync_metadata("p1").await.unwrap().is_none());

        let meta = MutationSyncMetadata {
            model_id: "p1".into(),
            model_name: "Post".into(),
            deleted: false,
            last_changed_at: 1_700_000_000_000,
            version: 3,
        };
        store.save_mutation_sync_metadata(&meta).await.unwrap();
        assert_eq!(
            store.mutation_sync_metadata("p1").await.unwrap().unwrap(),
            meta
        );

        // Upsert replaces.
        let newer = MutationSyncMetadata { version: 4, deleted: true, ..meta };
        store.save_mutation_sync_metadata(&newer).await.unwrap();
        assert_eq!(
            store.mutation_sync_metadata("p1").await.unwrap().unwrap(),
            newer
        );
    }

    #[tokio::test]
    async fn test_model_sync_metadata_roundtrip() {
        let store = store().await;

        assert!(store.model_sync_metadata("Post").await.unwrap().is_none());

        let meta = ModelSyncMetadata {
            model_name: "Post".into(),
            last_sync: None,
        };
        store.save_model_sync_metadata(&meta).await.unwrap();
        let loaded = store.model_sync_metadata("Post").await.unwrap().unwrap();
        assert!(loaded.last_sync.is_none());

        let synced = ModelSyncMetadata {
            model_name: "Post".into(),
            last_sync: Some(1_700_000_000_000),
        };
        store.save_model_sync_metadata(&synced).await.unwrap();
        let loaded = store.model_sync_metadata("Post").await.unwrap().unwrap();
        assert_eq!(loaded.last_sync, Some(1_700_000_000_000));
    }
}
