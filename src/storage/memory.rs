// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::traits::{key_segment, IndexStore, StorageError, TierStore};
use crate::changes::Delta;
use crate::schema::{AttrId, AttributeMap, Model};

/// Which side of the engine a tier sits on. Only changes how increments on
/// absent fields behave.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierRole {
    /// Increments on absent records or fields are skipped.
    Cache,
    /// Increments create the field, starting from zero.
    Durable,
}

/// DashMap-backed tier and index store.
pub struct InMemoryTier {
    role: TierRole,
    records: DashMap<String, AttributeMap>,
    indexes: DashMap<String, Value>,
}

impl InMemoryTier {
    #[must_use]
    pub fn new(role: TierRole) -> Self {
        Self {
            role,
            records: DashMap::new(),
            indexes: DashMap::new(),
        }
    }

    #[must_use]
    pub fn cache() -> Self {
        Self::new(TierRole::Cache)
    }

    #[must_use]
    pub fn durable() -> Self {
        Self::new(TierRole::Durable)
    }

    #[must_use]
    pub fn role(&self) -> TierRole {
        self.role
    }

    /// Number of records held
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Copy of everything stored for one record.
    #[must_use]
    pub fn snapshot(&self, model: &Model, id: &Value) -> Option<AttributeMap> {
        self.records.get(&record_key(model, id)).map(|r| r.value().clone())
    }

    #[must_use]
    pub fn index_count(&self) -> usize {
        self.indexes.len()
    }

    pub fn clear(&self) {
        self.records.clear();
        self.indexes.clear();
    }
}

impl Default for InMemoryTier {
    fn default() -> Self {
        Self::durable()
    }
}

fn record_key(model: &Model, id: &Value) -> String {
    format!("{}:{}", model.table(), key_segment(id))
}

fn index_key(model: &Model, attribute: AttrId, value: &Value) -> String {
    format!(
        "{}:index:{}:{}",
        model.table(),
        model.attribute(attribute).name(),
        value
    )
}

#[async_trait]
impl TierStore for InMemoryTier {
    async fn fetch(
        &self,
        model: &Model,
        id: &Value,
        attributes: &[AttrId],
    ) -> Result<Option<AttributeMap>, StorageError> {
        Ok(self.records.get(&record_key(model, id)).map(|stored| {
            attributes
                .iter()
                .filter_map(|attr| stored.get(*attr).map(|v| (*attr, v.clone())))
                .collect()
        }))
    }

    async fn save(&self, model: &Model, values: &AttributeMap) -> Result<(), StorageError> {
        let id = values
            .get(model.primary_key().id())
            .ok_or_else(|| StorageError::Backend("save without a primary key".to_string()))?;
        self.records
            .entry(record_key(model, id))
            .or_default()
            .merge(values.clone());
        Ok(())
    }

    async fn incr(
        &self,
        model: &Model,
        id: &Value,
        attribute: AttrId,
        delta: Delta,
    ) -> Result<(), StorageError> {
        let key = record_key(model, id);
        let mut stored = match self.role {
            TierRole::Durable => self.records.entry(key).or_insert_with(|| {
                let mut fresh = AttributeMap::new();
                fresh.insert(model.primary_key().id(), id.clone());
                fresh
            }),
            TierRole::Cache => match self.records.get_mut(&key) {
                Some(stored) if stored.contains(attribute) => stored,
                _ => return Ok(()),
            },
        };
        let updated = delta.apply_to(stored.get(attribute)).ok_or_else(|| {
            StorageError::Codec(format!(
                "attribute \"{}\" does not hold a number",
                model.attribute(attribute).name()
            ))
        })?;
        stored.insert(attribute, updated);
        Ok(())
    }

    async fn destroy(&self, model: &Model, id: &Value) -> Result<(), StorageError> {
        self.records.remove(&record_key(model, id));
        Ok(())
    }
}

#[async_trait]
impl IndexStore for InMemoryTier {
    async fn find_by_index(
        &self,
        model: &Model,
        attribute: AttrId,
        value: &Value,
    ) -> Result<Option<Value>, StorageError> {
        Ok(self
            .indexes
            .get(&index_key(model, attribute, value))
            .map(|id| id.value().clone()))
    }

    async fn write_index(
        &self,
        model: &Model,
        attribute: AttrId,
        value: &Value,
        id: &Value,
    ) -> Result<(), StorageError> {
        self.indexes.insert(index_key(model, attribute, value), id.clone());
        Ok(())
    }

    async fn delete_index(
        &self,
        model: &Model,
        attribute: AttrId,
        value: &Value,
    ) -> Result<(), StorageError> {
        self.indexes.remove(&index_key(model, attribute, value));
        Ok(())
    }
}
