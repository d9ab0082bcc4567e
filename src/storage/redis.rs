// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Redis cache tier.
//!
//! One hash per record, field values JSON-encoded:
//!
//! ```text
//! HSET myapp:users:42 name "\"Alice\"" logins "7"
//! ```
//!
//! Numbers encode as bare JSON, so `HINCRBY`/`HINCRBYFLOAT` work on counter
//! fields in place. Increments go through a small script that skips fields
//! the hash does not hold, so a cold cache never ends up holding a bare
//! delta.
//!
//! Index pointers are plain strings:
//!
//! ```text
//! SET myapp:users:index:email:"alice@example.com" "\"42\""
//! ```
//!
//! The tier also generates primary keys from a per-table counter, so ids
//! stay unique across engines and restarts:
//!
//! ```text
//! INCR myapp:users:sequence
//! ```

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{cmd, Client, Script};
use serde_json::Value;

use super::traits::{key_segment, IndexStore, StorageError, TierStore};
use crate::changes::Delta;
use crate::ids::{check_sequence_key, sequence_value, IdGenerator};
use crate::resilience::retry::{retry, RetryConfig};
use crate::schema::{AttrId, AttributeMap, Model};

const GUARDED_INCR: &str = r"
if redis.call('HEXISTS', KEYS[1], ARGV[1]) == 1 then
  return redis.call(ARGV[3], KEYS[1], ARGV[1], ARGV[2])
end
return false
";

pub struct RedisTier {
    connection: ConnectionManager,
    keyspace: String,
    retry: RetryConfig,
    incr_script: Script,
}

impl RedisTier {
    /// Connect, retrying with the startup preset so a bad URL fails fast.
    pub async fn connect(connection_string: &str, keyspace: &str) -> Result<Self, StorageError> {
        let client = Client::open(connection_string)
            .map_err(|e| StorageError::Backend(e.to_string()))?;

        let connection = retry("redis_connect", &RetryConfig::startup(), || async {
            ConnectionManager::new(client.clone()).await
        })
        .await
        .map_err(|e: redis::RedisError| StorageError::Backend(e.to_string()))?;

        Ok(Self::from_connection(connection, keyspace))
    }

    /// Wrap an existing connection.
    #[must_use]
    pub fn from_connection(connection: ConnectionManager, keyspace: &str) -> Self {
        Self {
            connection,
            keyspace: keyspace.to_string(),
            retry: RetryConfig::query(),
            incr_script: Script::new(GUARDED_INCR),
        }
    }

    /// Override the per-command retry policy (defaults to the query preset).
    /// Counter increments are never retried.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn keyspace(&self) -> &str {
        &self.keyspace
    }

    /// `<keyspace>:<table>:<id>`
    #[must_use]
    pub fn record_key(&self, model: &Model, id: &Value) -> String {
        format!("{}:{}:{}", self.keyspace, model.table(), key_segment(id))
    }

    /// `<keyspace>:<table>:sequence`
    #[must_use]
    pub fn sequence_key(&self, model: &Model) -> String {
        format!("{}:{}:sequence", self.keyspace, model.table())
    }

    /// `<keyspace>:<table>:index:<attribute>:<json value>`
    #[must_use]
    pub fn index_key(&self, model: &Model, attribute: AttrId, value: &Value) -> String {
        format!(
            "{}:{}:index:{}:{}",
            self.keyspace,
            model.table(),
            model.attribute(attribute).name(),
            value
        )
    }
}

fn backend(e: redis::RedisError) -> StorageError {
    StorageError::Backend(e.to_string())
}

fn encode(value: &Value) -> Result<String, StorageError> {
    serde_json::to_string(value).map_err(|e| StorageError::Codec(e.to_string()))
}

fn decode(raw: &str) -> Result<Value, StorageError> {
    serde_json::from_str(raw).map_err(|e| StorageError::Codec(format!("invalid stored value {:?}: {}", raw, e)))
}

#[async_trait]
impl TierStore for RedisTier {
    async fn fetch(
        &self,
        model: &Model,
        id: &Value,
        attributes: &[AttrId],
    ) -> Result<Option<AttributeMap>, StorageError> {
        let conn = self.connection.clone();
        let key = self.record_key(model, id);
        let fields: Vec<&str> = attributes
            .iter()
            .map(|attr| model.attribute(*attr).name())
            .collect();

        let (exists, raw): (bool, Vec<Option<String>>) = if fields.is_empty() {
            let exists = retry("redis_exists", &self.retry, || {
                let mut conn = conn.clone();
                let key = key.clone();
                async move {
                    let exists: bool = cmd("EXISTS").arg(&key).query_async(&mut conn).await?;
                    Ok(exists)
                }
            })
            .await
            .map_err(backend)?;
            (exists, Vec::new())
        } else {
            retry("redis_hmget", &self.retry, || {
                let mut conn = conn.clone();
                let key = key.clone();
                let fields = fields.clone();
                async move {
                    redis::pipe()
                        .cmd("EXISTS")
                        .arg(&key)
                        .cmd("HMGET")
                        .arg(&key)
                        .arg(&fields)
                        .query_async(&mut conn)
                        .await
                }
            })
            .await
            .map_err(backend)?
        };

        if !exists {
            return Ok(None);
        }

        let mut values = AttributeMap::new();
        for (attr, field) in attributes.iter().zip(raw) {
            if let Some(field) = field {
                values.insert(*attr, decode(&field)?);
            }
        }
        Ok(Some(values))
    }

    async fn save(&self, model: &Model, values: &AttributeMap) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        let id = values
            .get(model.primary_key().id())
            .ok_or_else(|| StorageError::Backend("save without a primary key".to_string()))?;
        let key = self.record_key(model, id);
        let pairs = values
            .iter()
            .map(|(attr, value)| Ok((model.attribute(attr).name().to_string(), encode(value)?)))
            .collect::<Result<Vec<(String, String)>, StorageError>>()?;

        retry("redis_hset", &self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            let pairs = pairs.clone();
            async move {
                let _: () = cmd("HSET").arg(&key).arg(&pairs).query_async(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(backend)
    }

    async fn incr(
        &self,
        model: &Model,
        id: &Value,
        attribute: AttrId,
        delta: Delta,
    ) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        let key = self.record_key(model, id);
        let field = model.attribute(attribute).name().to_string();
        let (command, amount) = match delta {
            Delta::Int(n) => ("HINCRBY", n.to_string()),
            Delta::Float(f) => ("HINCRBYFLOAT", f.to_string()),
        };

        // Not idempotent: a replay after a lost reply would count twice.
        let script = &self.incr_script;
        retry("redis_hincr", &RetryConfig::once(), || {
            let mut conn = conn.clone();
            let key = key.clone();
            let field = field.clone();
            let amount = amount.clone();
            async move {
                let _: redis::Value = script
                    .key(&key)
                    .arg(&field)
                    .arg(&amount)
                    .arg(command)
                    .invoke_async(&mut conn)
                    .await?;
                Ok(())
            }
        })
        .await
        .map_err(backend)
    }

    async fn destroy(&self, model: &Model, id: &Value) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        let key = self.record_key(model, id);

        retry("redis_delete", &self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let _: () = cmd("DEL").arg(&key).query_async(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(backend)
    }
}

#[async_trait]
impl IndexStore for RedisTier {
    async fn find_by_index(
        &self,
        model: &Model,
        attribute: AttrId,
        value: &Value,
    ) -> Result<Option<Value>, StorageError> {
        let conn = self.connection.clone();
        let key = self.index_key(model, attribute, value);

        let raw: Option<String> = retry("redis_index_get", &self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move { cmd("GET").arg(&key).query_async(&mut conn).await }
        })
        .await
        .map_err(backend)?;

        raw.as_deref().map(decode).transpose()
    }

    async fn write_index(
        &self,
        model: &Model,
        attribute: AttrId,
        value: &Value,
        id: &Value,
    ) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        let key = self.index_key(model, attribute, value);
        let id = encode(id)?;

        retry("redis_index_set", &self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            let id = id.clone();
            async move {
                let _: () = cmd("SET").arg(&key).arg(&id).query_async(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(backend)
    }

    async fn delete_index(
        &self,
        model: &Model,
        attribute: AttrId,
        value: &Value,
    ) -> Result<(), StorageError> {
        let conn = self.connection.clone();
        let key = self.index_key(model, attribute, value);

        retry("redis_index_delete", &self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move {
                let _: () = cmd("DEL").arg(&key).query_async(&mut conn).await?;
                Ok(())
            }
        })
        .await
        .map_err(backend)
    }
}

#[async_trait]
impl IdGenerator for RedisTier {
    async fn generate_id(&self, model: &Model) -> Result<Value, StorageError> {
        check_sequence_key(model)?;
        let conn = self.connection.clone();
        let key = self.sequence_key(model);

        let next: u64 = retry("redis_sequence", &self.retry, || {
            let mut conn = conn.clone();
            let key = key.clone();
            async move { cmd("INCR").arg(&key).query_async(&mut conn).await }
        })
        .await
        .map_err(backend)?;

        Ok(sequence_value(model, next))
    }
}
