// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Record engine coordinator.
//!
//! The [`RecordEngine`] owns the protocols that keep a record consistent
//! across the two tiers:
//! - **Save**: durable tier first, then cache, then index pointers
//! - **Fetch**: cache when it can answer, durable otherwise, with background
//!   cache repopulation
//! - **Destroy**: durable, cache, then the pointers this record owns
//! - **Find**: exact-match lookup through a secondary index
//!
//! # Partial failure
//!
//! ```text
//! durable save ──fail──▶ RecordError::Durable            (nothing written, record untouched)
//!    │ ok
//! durable incr ──fail──▶ RecordError::DurableIncrement   (record written, unapplied counters pending)
//!    │ ok
//! cache ─────────fail──▶ RecordError::Cache              (durable committed, indexes still maintained)
//!    │ ok
//! index ─────────fail──▶ RecordError::Index              (durable committed)
//! ```
//!
//! # Example
//!
//! ```
//! use record_sync::schema::{AttributeSpec, AttributeType, ModelDefinition, ModelRegistry};
//! use record_sync::{RecordEngine, Selection, Tiers};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), record_sync::RecordError> {
//! let registry = ModelRegistry::builder()
//!     .define(
//!         "User",
//!         ModelDefinition::new("users")
//!             .attribute("id", AttributeSpec::new(AttributeType::String).primary())
//!             .attribute("email", AttributeSpec::new(AttributeType::String).indexed().cached())
//!             .attribute("logins", AttributeSpec::new(AttributeType::Integer).counter()),
//!     )?
//!     .build();
//! let engine = RecordEngine::new(registry, Tiers::in_memory());
//!
//! let mut user = engine.create("User", json!({"email": "ada@example.com"}))?;
//! user.incr("logins", 1)?;
//! engine.save(&mut user).await?;
//!
//! let mut found = engine.find("User", "email", "ada@example.com").await?.unwrap();
//! engine.fetch(&mut found, &Selection::All).await?;
//! assert_eq!(found.get("logins")?, Some(json!(1)));
//! # Ok(())
//! # }
//! ```

mod destroy;
mod fetch;
mod find;
mod save;
mod types;

pub use types::Tiers;
use types::{Loaded, Tier};

use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::RecordEngineConfig;
use crate::error::RecordError;
use crate::ids::{IdGenerator, UuidIds};
use crate::record::Record;
use crate::schema::{AttributeMap, Model, ModelRegistry};
use crate::storage::redis::RedisTier;
use crate::storage::traits::{key_segment, TierStore};

/// Persistence coordinator over a cache tier, a durable tier and an index
/// store.
///
/// The engine is `Send + Sync`; share it behind an `Arc`. Records are plain
/// values owned by the caller and passed in by `&mut`.
pub struct RecordEngine {
    pub(super) config: RecordEngineConfig,
    pub(super) registry: Arc<ModelRegistry>,
    pub(super) tiers: Tiers,
    pub(super) ids: Arc<dyn IdGenerator>,

    /// Bounds attribute hook fan-out across every fetch and save
    pub(super) hook_permits: Arc<Semaphore>,

    /// Cache repopulation tasks spawned by fetches
    pub(super) background: Mutex<JoinSet<()>>,
}

impl RecordEngine {
    /// Create an engine with the default configuration and UUID primary
    /// keys. Models with non-string keys need
    /// [`with_id_generator`](Self::with_id_generator).
    pub fn new(registry: impl Into<Arc<ModelRegistry>>, tiers: Tiers) -> Self {
        let config = RecordEngineConfig::default();
        Self {
            hook_permits: Arc::new(Semaphore::new(config.hook_concurrency.max(1))),
            config,
            registry: registry.into(),
            tiers,
            ids: Arc::new(UuidIds),
            background: Mutex::new(JoinSet::new()),
        }
    }

    /// Connect a Redis cache tier from `config.redis_url` and pair it with
    /// `durable`. Redis also holds the index pointers and the primary key
    /// sequences.
    pub async fn connect(
        config: RecordEngineConfig,
        registry: impl Into<Arc<ModelRegistry>>,
        durable: Arc<dyn TierStore>,
    ) -> Result<Self, RecordError> {
        let url = config
            .redis_url
            .as_deref()
            .ok_or_else(|| RecordError::Configuration("`redis_url` is not configured".to_string()))?;

        info!(keyspace = %config.redis_keyspace, "Connecting cache tier");
        let redis = Arc::new(
            RedisTier::connect(url, &config.redis_keyspace)
                .await
                .map_err(RecordError::Cache)?,
        );

        let tiers = Tiers::new(redis.clone(), durable, redis.clone());
        let mut engine = Self::new(registry, tiers).with_config(config);
        engine.ids = redis;
        Ok(engine)
    }

    #[must_use]
    pub fn with_config(mut self, config: RecordEngineConfig) -> Self {
        self.hook_permits = Arc::new(Semaphore::new(config.hook_concurrency.max(1)));
        self.config = config;
        self
    }

    #[must_use]
    pub fn with_id_generator(mut self, ids: impl IdGenerator + 'static) -> Self {
        self.ids = Arc::new(ids);
        self
    }

    #[must_use]
    pub fn config(&self) -> &RecordEngineConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    #[must_use]
    pub fn tiers(&self) -> &Tiers {
        &self.tiers
    }

    pub fn model(&self, name: &str) -> Result<Arc<Model>, RecordError> {
        self.registry.model(name)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Record handles
    // ═══════════════════════════════════════════════════════════════════════

    /// New, unsaved record. `data` goes through the external input stage,
    /// so guarded and virtual attributes are ignored and undeclared names
    /// dropped. `null` is an empty record.
    pub fn create(&self, model: &str, data: Value) -> Result<Record, RecordError> {
        let model = self.model(model)?;
        let data = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                return Err(RecordError::InvalidOperation(format!(
                    "record data must be an object, got {}",
                    other
                )))
            }
        };

        let mut record = Record::new(model);
        record.set_many(data);
        Ok(record)
    }

    /// Handle on an existing record. No I/O: [`fetch`](Self::fetch) loads
    /// its values.
    pub fn get(&self, model: &str, id: impl Into<Value>) -> Result<Record, RecordError> {
        let model = self.model(model)?;
        let id = primary_key_input(&model, id.into())?;
        Ok(Record::with_id(model, id))
    }

    /// Wait for outstanding cache repopulation tasks.
    pub async fn flush_background(&self) {
        let mut tasks = std::mem::take(&mut *self.background.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Cache repopulation task failed to complete");
            }
        }
    }

    /// Number of repopulation tasks not yet reaped.
    #[must_use]
    pub fn background_tasks(&self) -> usize {
        self.background.lock().len()
    }
}

impl std::fmt::Debug for RecordEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordEngine")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

/// Coerce a primary key value to the key's type.
fn primary_key_input(model: &Model, id: Value) -> Result<Value, RecordError> {
    let pk = model.primary_key();
    let mut data = AttributeMap::new();
    data.insert(pk.id(), id);
    let (mut data, errors) = model.lookup(data);
    if !errors.is_empty() {
        return Err(RecordError::Validation(errors));
    }

    data.remove(pk.id())
        .filter(|id| !id.is_null())
        .ok_or_else(|| primary_key_required(model))
}

fn primary_key_required(model: &Model) -> RecordError {
    RecordError::PrimaryKeyRequired {
        attribute: model.primary_key().name().to_string(),
    }
}

fn not_found(model: &Model, id: &Value) -> RecordError {
    RecordError::NotFound {
        model: model.name().to_string(),
        id: key_segment(id),
    }
}

fn log_step(tier: Tier, operation: &str, model: &Model, id: &Value) {
    debug!(tier = %tier, operation, model = model.name(), id = %key_segment(id), "Tier call");
}
