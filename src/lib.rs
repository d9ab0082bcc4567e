//! # Record Sync
//!
//! A record-modeling runtime over two tiers: a fast, partially populated
//! cache and a slower, authoritative durable store.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         Record                              │
//! │  • Values, changed set, counter deltas                     │
//! │  • set/get pass through the input/output stages            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                   (save / fetch / destroy / find)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      RecordEngine                           │
//! │  • Save stage: required + rules, model transforms, hooks   │
//! │  • Fetch stage: model transforms, hooks                    │
//! │  • Write ordering and partial-failure reporting            │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!             ┌────────────────┼──────────────────┐
//!             ▼                ▼                  ▼
//! ┌────────────────────┐ ┌──────────────┐ ┌──────────────────┐
//! │   Durable tier     │ │  Cache tier  │ │   Index store    │
//! │  ground truth,     │ │ cached attrs,│ │ (attr, value)    │
//! │  written first     │ │ cache-only   │ │   → primary key  │
//! └────────────────────┘ └──────────────┘ └──────────────────┘
//! ```
//!
//! ## Quick Start
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
//!         "Post",
//!         ModelDefinition::new("posts")
//!             .attribute("id", AttributeSpec::new(AttributeType::String).primary())
//!             .attribute("title", AttributeSpec::new(AttributeType::String).required())
//!             .attribute("views", AttributeSpec::new(AttributeType::Integer).counter().cached()),
//!     )?
//!     .build();
//! let engine = RecordEngine::new(registry, Tiers::in_memory());
//!
//! let mut post = engine.create("Post", json!({"title": "Hello"}))?;
//! post.incr("views", 3)?;
//! engine.save(&mut post).await?;
//!
//! let mut again = engine.get("Post", post.id().cloned().unwrap())?;
//! engine.fetch(&mut again, &Selection::All).await?;
//! assert_eq!(again.get("title")?, Some(json!("Hello")));
//! assert_eq!(again.get("views")?, Some(json!(3)));
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Selective caching**: per-attribute `cache` and `cacheOnly` flags
//! - **Counters**: deltas accumulate locally and apply with native increments
//! - **Secondary indexes**: exact-match lookup via [`RecordEngine::find`]
//! - **Transform chain**: guard, marshal, validate, model transforms and
//!   attribute hooks at every boundary
//! - **Redis cache tier**: [`storage::redis::RedisTier`] with retrying commands
//!
//! ## Configuration
//!
//! See [`RecordEngineConfig`] for all configuration options.
//!
//! ## Modules
//!
//! - [`coordinator`]: The [`RecordEngine`] and its save/fetch/destroy/find protocols
//! - [`schema`]: Attribute descriptors, models and the registry
//! - [`transform`]: The four-stage transform chain
//! - [`record`]: Record instances
//! - [`changes`]: Change tracking and counter deltas
//! - [`storage`]: Tier contracts and backends (Memory, Redis)
//! - [`codec`], [`validate`], [`ids`]: pluggable marshalling, validation, id generation
//! - [`resilience`]: Retry logic for tier clients

pub mod changes;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod ids;
pub mod metrics;
pub mod record;
pub mod resilience;
pub mod schema;
pub mod storage;
pub mod transform;
pub mod validate;

pub use changes::{ChangeTracker, Delta};
pub use codec::{JsonMarshaller, Marshaller};
pub use config::RecordEngineConfig;
pub use coordinator::{RecordEngine, Tiers};
pub use error::{RecordError, ValidationErrors};
pub use ids::{IdGenerator, SequentialIds, UuidIds};
pub use record::Record;
pub use schema::{AttrId, AttributeMap, Model, ModelDefinition, ModelRegistry, Selection};
pub use storage::memory::InMemoryTier;
pub use storage::redis::RedisTier;
pub use storage::traits::{IndexStore, StorageError, TierStore};
pub use transform::{OutputOptions, Transform, TransformChain};
pub use validate::{RuleValidator, Validator};
pub use resilience::retry::RetryConfig;
pub use metrics::LatencyTimer;
