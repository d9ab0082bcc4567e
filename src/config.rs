// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the record engine.
//!
//! # Example
//!
//! ```
//! use record_sync::RecordEngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = RecordEngineConfig::default();
//! assert_eq!(config.hook_concurrency, 16);
//! assert!(config.repopulate_cache);
//!
//! // From a config file
//! let config: RecordEngineConfig = serde_json::from_str(
//!     r#"{"redis_url": "redis://localhost:6379", "repopulate_cache": false}"#,
//! ).unwrap();
//! assert_eq!(config.redis_keyspace, "records");
//! assert!(!config.repopulate_cache);
//! ```

use serde::Deserialize;

/// Configuration for the record engine.
///
/// All fields have defaults. Only [`RecordEngine::connect`](crate::RecordEngine::connect)
/// reads the Redis settings; an engine built from explicit tiers ignores them.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RecordEngineConfig {
    /// Redis connection string for the cache tier (e.g., "redis://localhost:6379")
    #[serde(default)]
    pub redis_url: Option<String>,

    /// Prefix for every cache and index key
    #[serde(default = "default_redis_keyspace")]
    pub redis_keyspace: String,

    /// Max attribute hooks running at once per fetch or save
    #[serde(default = "default_hook_concurrency")]
    pub hook_concurrency: usize,

    /// Write values read from the durable tier back into the cache
    #[serde(default = "default_repopulate_cache")]
    pub repopulate_cache: bool,
}

fn default_redis_keyspace() -> String { "records".to_string() }
fn default_hook_concurrency() -> usize { 16 }
fn default_repopulate_cache() -> bool { true }

impl Default for RecordEngineConfig {
    fn default() -> Self {
        Self {
            redis_url: None,
            redis_keyspace: default_redis_keyspace(),
            hook_concurrency: default_hook_concurrency(),
            repopulate_cache: default_repopulate_cache(),
        }
    }
}
