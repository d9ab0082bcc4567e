// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Public types for the record engine coordinator.

use std::sync::Arc;

use crate::schema::AttributeMap;
use crate::storage::memory::InMemoryTier;
use crate::storage::traits::{IndexStore, TierStore};

/// The stores a [`RecordEngine`](super::RecordEngine) coordinates.
///
/// The engine never connects or closes these; they are shared handles.
#[derive(Clone)]
pub struct Tiers {
    /// Fast, partially populated tier
    pub cache: Arc<dyn TierStore>,
    /// Authoritative tier
    pub durable: Arc<dyn TierStore>,
    /// Secondary index pointers
    pub indexes: Arc<dyn IndexStore>,
}

impl Tiers {
    #[must_use]
    pub fn new(
        cache: Arc<dyn TierStore>,
        durable: Arc<dyn TierStore>,
        indexes: Arc<dyn IndexStore>,
    ) -> Self {
        Self { cache, durable, indexes }
    }

    /// Process-local tiers. Index pointers live next to the cache, as they
    /// would in Redis.
    #[must_use]
    pub fn in_memory() -> Self {
        let cache = Arc::new(InMemoryTier::cache());
        Self {
            cache: cache.clone(),
            durable: Arc::new(InMemoryTier::durable()),
            indexes: cache,
        }
    }
}

impl std::fmt::Debug for Tiers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tiers").finish_non_exhaustive()
    }
}

/// Which store a tier call went to. Used for metric labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Tier {
    Cache,
    Durable,
    Index,
}

impl Tier {
    pub(super) fn as_str(self) -> &'static str {
        match self {
            Self::Cache => "cache",
            Self::Durable => "durable",
            Self::Index => "index",
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Values read for a fetch, and what to write back to the cache.
#[derive(Debug, Default)]
pub(super) struct Loaded {
    pub(super) values: AttributeMap,
    /// Cache-eligible values that came from the durable tier
    pub(super) repopulate: Option<AttributeMap>,
}
