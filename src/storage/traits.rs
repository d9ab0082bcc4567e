// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Capability contracts the coordinator needs from a backing store.
//!
//! The same [`TierStore`] contract serves both the cache role and the durable
//! role. Whether `save` inserts or updates is the tier's business: it receives
//! the values to write plus the primary key and upserts.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::changes::Delta;
use crate::schema::{AttrId, AttributeMap, Model};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Record not found")]
    NotFound,
    #[error("Storage backend error: {0}")]
    Backend(String),
    #[error("Codec error: {0}")]
    Codec(String),
}

#[async_trait]
pub trait TierStore: Send + Sync {
    /// Read `attributes` of one record.
    ///
    /// Returns `Ok(None)` when the record does not exist. Attributes the
    /// record has no value for are absent from the returned map. An empty
    /// attribute list is an existence check.
    async fn fetch(
        &self,
        model: &Model,
        id: &Value,
        attributes: &[AttrId],
    ) -> Result<Option<AttributeMap>, StorageError>;

    /// Upsert `values`, which always carries the primary key.
    async fn save(&self, model: &Model, values: &AttributeMap) -> Result<(), StorageError>;

    /// Apply `delta` to a counter with the store's native increment.
    ///
    /// Durable tiers create the field when missing. Cache tiers should skip
    /// fields they do not hold, since a cold field would otherwise end up
    /// holding the bare delta.
    async fn incr(
        &self,
        model: &Model,
        id: &Value,
        attribute: AttrId,
        delta: Delta,
    ) -> Result<(), StorageError>;

    async fn destroy(&self, model: &Model, id: &Value) -> Result<(), StorageError>;
}

/// Secondary index pointers: `(attribute, value) → primary key`.
#[async_trait]
pub trait IndexStore: Send + Sync {
    async fn find_by_index(
        &self,
        model: &Model,
        attribute: AttrId,
        value: &Value,
    ) -> Result<Option<Value>, StorageError>;

    async fn write_index(
        &self,
        model: &Model,
        attribute: AttrId,
        value: &Value,
        id: &Value,
    ) -> Result<(), StorageError>;

    async fn delete_index(
        &self,
        model: &Model,
        attribute: AttrId,
        value: &Value,
    ) -> Result<(), StorageError>;
}

/// Render a value as a key segment. Strings are used verbatim, everything
/// else as compact JSON.
#[must_use]
pub fn key_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
