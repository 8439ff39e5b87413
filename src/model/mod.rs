// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Model schemas and the model registry.
//!
//! A [`ModelSchema`] describes one user-defined record type: its name, its
//! fields, its associations to other models, and whether it is eligible for
//! cloud synchronization. Schemas are collected into a [`ModelRegistry`],
//! an explicit object constructed alongside the engine (no process-wide
//! static state) and passed by reference to the components that need it.

mod registry;

pub use registry::ModelRegistry;

use serde::{Deserialize, Serialize};

/// A relationship from one model to another.
///
/// Associations drive dependency-ordered synchronization: a model's
/// `BelongsTo` targets are its parents, while `HasOne`/`HasMany` declare
/// the model as parent of the associated model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "model")]
pub enum ModelAssociation {
    HasOne(String),
    BelongsTo(String),
    HasMany(String),
}

/// One field of a model schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelField {
    pub name: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub association: Option<ModelAssociation>,
}

impl ModelField {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
            association: None,
        }
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn belongs_to(mut self, target: impl Into<String>) -> Self {
        self.association = Some(ModelAssociation::BelongsTo(target.into()));
        self
    }

    #[must_use]
    pub fn has_one(mut self, associated: impl Into<String>) -> Self {
        self.association = Some(ModelAssociation::HasOne(associated.into()));
        self
    }

    #[must_use]
    pub fn has_many(mut self, associated: impl Into<String>) -> Self {
        self.association = Some(ModelAssociation::HasMany(associated.into()));
        self
    }
}

/// Schema for one model type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSchema {
    pub name: String,
    /// Whether this model participates in cloud synchronization.
    #[serde(default = "default_syncable")]
    pub syncable: bool,
    #[serde(default)]
    pub fields: Vec<ModelField>,
}

// Schemas are syncable unless they opt out, in code and on the wire alike.
fn default_syncable() -> bool {
    true
}

impl ModelSchema {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            syncable: true,
            fields: Vec::new(),
        }
    }

    #[must_use]
    pub fn local_only(mut self) -> Self {
        self.syncable = false;
        self
    }

    #[must_use]
    pub fn field(mut self, field: ModelField) -> Self {
        self.fields.push(field);
        self
    }

    /// Models that must be synced before this one.
    ///
    /// These are the targets of this schema's `BelongsTo` associations; the
    /// foreign key lives on this model, so the parent row must exist first.
    #[must_use]
    pub fn parent_models(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter_map(|f| match &f.association {
                Some(ModelAssociation::BelongsTo(target)) => Some(target.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Models this schema declares as its children (`HasOne`/`HasMany`).
    #[must_use]
    pub fn child_models(&self) -> Vec<&str> {
        self.fields
            .iter()
            .filter_map(|f| match &f.association {
                Some(ModelAssociation::HasOne(child))
                | Some(ModelAssociation::HasMany(child)) => Some(child.as_str()),
                _ => None,
            })
            .collect()
    }
}
