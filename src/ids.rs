// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Primary key generation for new records.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use uuid::Uuid;

use crate::schema::{AttributeType, Model};
use crate::storage::traits::StorageError;

/// Produces a primary key for a record saved without one.
///
/// Async so implementations can reserve ids from a store.
#[async_trait]
pub trait IdGenerator: Send + Sync {
    async fn generate_id(&self, model: &Model) -> Result<Value, StorageError>;
}

/// Per-table counter starting at 1, held in this process only.
///
/// Two engines, or one engine after a restart, hand out the same ids, so
/// this suits tests and a single-process [`InMemoryTier`](crate::InMemoryTier).
/// [`RedisTier`](crate::RedisTier) keeps the counter in Redis instead.
///
/// Integer keys get a number, string keys its decimal rendering.
#[derive(Debug, Default)]
pub struct SequentialIds {
    counters: DashMap<String, u64>,
}

impl SequentialIds {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdGenerator for SequentialIds {
    async fn generate_id(&self, model: &Model) -> Result<Value, StorageError> {
        check_sequence_key(model)?;

        let next = {
            let mut counter = self.counters.entry(model.table().to_string()).or_insert(0);
            *counter += 1;
            *counter
        };

        Ok(sequence_value(model, next))
    }
}

/// Sequence numbers only fit string and numeric primary keys.
pub(crate) fn check_sequence_key(model: &Model) -> Result<(), StorageError> {
    let kind = model.primary_key().kind();
    if matches!(kind, AttributeType::String | AttributeType::Integer | AttributeType::Float) {
        Ok(())
    } else {
        Err(StorageError::Backend(format!(
            "cannot generate sequential ids for a {} primary key",
            kind
        )))
    }
}

/// The `next` sequence number in the primary key's type.
pub(crate) fn sequence_value(model: &Model, next: u64) -> Value {
    match model.primary_key().kind() {
        AttributeType::String => Value::String(next.to_string()),
        _ => Value::from(next),
    }
}

/// Random v4 UUIDs, for string primary keys only. The default generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidIds;

#[async_trait]
impl IdGenerator for UuidIds {
    async fn generate_id(&self, model: &Model) -> Result<Value, StorageError> {
        match model.primary_key().kind() {
            AttributeType::String => Ok(Value::String(Uuid::new_v4().to_string())),
            other => Err(StorageError::Backend(format!(
                "cannot generate uuid ids for a {} primary key",
                other
            ))),
        }
    }
}
