// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Explicit model registry with dependency-ordered sync planning.

use std::collections::HashMap;

use tracing::warn;

use super::ModelSchema;
use crate::error::SyncError;

/// Registry of every model schema known to the engine.
///
/// Constructed once, owned by the engine, and shared by reference. Lookup
/// is by model name; registration order is preserved and used as the
/// tie-breaker for [`sync_order`](Self::sync_order).
#[derive(Debug, Default)]
pub struct ModelRegistry {
    schemas: Vec<ModelSchema>,
    index: HashMap<String, usize>,
}

impl ModelRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a schema. Duplicate names are a configuration error.
    pub fn register(&mut self, schema: ModelSchema) -> Result<(), SyncError> {
        if self.index.contains_key(&schema.name) {
            return Err(SyncError::configuration(format!(
                "model '{}' is already registered",
                schema.name
            )));
        }
        self.index.insert(schema.name.clone(), self.schemas.len());
        self.schemas.push(schema);
        Ok(())
    }

    #[must_use]
    pub fn schema(&self, name: &str) -> Option<&ModelSchema> {
        self.index.get(name).map(|&i| &self.schemas[i])
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    #[must_use]
    pub fn schemas(&self) -> &[ModelSchema] {
        &self.schemas
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// All schemas eligible for cloud synchronization, in registration order.
    #[must_use]
    pub fn syncable_models(&self) -> Vec<&ModelSchema> {
        self.schemas.iter().filter(|s| s.syncable).collect()
    }

    /// Syncable model names in dependency order: parents before children.
    ///
    /// Edges come from both sides of an association: a model's `BelongsTo`
    /// targets precede it, and its `HasOne`/`HasMany` children follow it.
    /// The sort is deterministic (registration order breaks ties). If a
    /// cycle remains, the models involved are appended in registration
    /// order rather than dropped.
    #[must_use]
    pub fn sync_order(&self) -> Vec<String> {
        let syncable = self.syncable_models();
        let names: Vec<&str> = syncable.iter().map(|s| s.name.as_str()).collect();
        let position: HashMap<&str, usize> =
            names.iter().enumerate().map(|(i, n)| (*n, i)).collect();

        // indegree[i] = number of unsynced parents of model i
        let mut indegree = vec![0usize; names.len()];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
        for (i, schema) in syncable.iter().enumerate() {
            for parent in schema.parent_models() {
                if let Some(&p) = position.get(parent) {
                    if p != i {
                        children[p].push(i);
                        indegree[i] += 1;
                    }
                }
            }
            for child in schema.child_models() {
                if let Some(&c) = position.get(child) {
                    if c != i {
                        children[i].push(c);
                        indegree[c] += 1;
                    }
                }
            }
        }

        let mut emitted = vec![false; names.len()];
        let mut order = Vec::with_capacity(names.len());
        loop {
            // Lowest registration index among ready models keeps the order stable.
            let next = (0..names.len()).find(|&i| !emitted[i] && indegree[i] == 0);
            let Some(i) = next else { break };
            emitted[i] = true;
            order.push(names[i].to_string());
            for &c in &children[i] {
                if !emitted[c] {
                    indegree[c] = indegree[c].saturating_sub(1);
                }
            }
        }

        if order.len() < names.len() {
            let cyclic: Vec<&str> = (0..names.len())
                .filter(|&i| !emitted[i])
                .map(|i| names[i])
                .collect();
            warn!(models = ?cyclic, "association cycle detected, falling back to registration order");
            for name in cyclic {
                order.push(name.to_string());
            }
        }

        order
    }
}
