// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Read path: cache when it can answer, durable otherwise.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use super::{log_step, not_found, primary_key_required, Loaded, RecordEngine, Tier};
use crate::error::RecordError;
use crate::metrics::{self, LatencyTimer};
use crate::record::Record;
use crate::schema::{AttrId, AttributeMap, Model, Selection};
use crate::storage::traits::key_segment;

impl RecordEngine {
    /// Load the selected attributes into `record`.
    ///
    /// Fetched values go through the fetch stage, overwrite local values and
    /// leave the changed set. The primary key and virtual attributes are
    /// never read from a tier.
    #[tracing::instrument(skip(self, record), fields(model = %record.model().name()))]
    pub async fn fetch(&self, record: &mut Record, selection: &Selection) -> Result<(), RecordError> {
        let _timer = LatencyTimer::new("engine", "fetch");
        let model = Arc::clone(record.model());
        let id = record.id().cloned().ok_or_else(|| primary_key_required(&model))?;

        let pk = model.primary_key().id();
        let attributes: Vec<AttrId> = model
            .resolve(selection)?
            .into_iter()
            .filter(|attr| *attr != pk && model.attribute(*attr).is_persisted())
            .collect();

        let loaded = self.load(&model, &id, &attributes).await?;

        if let Some(values) = loaded.repopulate {
            self.repopulate(Arc::clone(&model), id, values);
        }

        let values = model
            .chain()
            .fetch(&model, loaded.values, &self.hook_permits)
            .await
            .map_err(RecordError::Hook)?;

        record.merge_fetched(values);
        metrics::record_operation("engine", "fetch", "success");
        Ok(())
    }

    /// Read `attributes` of one record from whichever tiers hold them.
    ///
    /// When every attribute is cache-eligible the cache is tried first. A
    /// cache answer counts only if it holds every requested attribute the
    /// durable tier also has; anything less falls through to durable.
    /// Repopulation stores a null for cached attributes the durable tier
    /// has no value for, so the next read can be answered by the cache;
    /// those nulls are dropped from a cache answer. Counters are left out,
    /// since the cache cannot increment a null.
    ///
    /// A failing cache read never fails the load once the durable tier has
    /// answered: cache-only values are then reported missing.
    pub(super) async fn load(&self, model: &Model, id: &Value, attributes: &[AttrId]) -> Result<Loaded, RecordError> {
        let all_cached = attributes.iter().all(|attr| model.attribute(*attr).is_cached());
        let mut cache_partial = None;

        if all_cached {
            log_step(Tier::Cache, "fetch", model, id);
            match self.tiers.cache.fetch(model, id, attributes).await {
                Ok(Some(mut values)) if covers(model, attributes, &values) => {
                    metrics::record_operation("cache", "fetch", "hit");
                    values.retain(|_, value| !value.is_null());
                    return Ok(Loaded { values, repopulate: None });
                }
                Ok(partial) => {
                    metrics::record_operation("cache", "fetch", "miss");
                    cache_partial = partial;
                }
                Err(e) => {
                    metrics::record_operation("cache", "fetch", "error");
                    warn!(model = model.name(), id = %key_segment(id), error = %e, "Cache read failed, falling back to durable tier");
                }
            }
        }

        let durable_attributes: Vec<AttrId> = attributes
            .iter()
            .copied()
            .filter(|attr| !model.attribute(*attr).is_cache_only())
            .collect();
        let cache_only: Vec<AttrId> = attributes
            .iter()
            .copied()
            .filter(|attr| model.attribute(*attr).is_cache_only())
            .collect();

        log_step(Tier::Durable, "fetch", model, id);
        let read_cache_only = !all_cached && !cache_only.is_empty();
        let (durable, cached) = tokio::join!(
            self.tiers.durable.fetch(model, id, &durable_attributes),
            async {
                if read_cache_only {
                    log_step(Tier::Cache, "fetch", model, id);
                    self.tiers.cache.fetch(model, id, &cache_only).await
                } else {
                    Ok(cache_partial)
                }
            }
        );

        metrics::record_result("durable", "fetch", &durable);
        let durable = durable
            .map_err(RecordError::Durable)?
            .ok_or_else(|| not_found(model, id))?;
        if read_cache_only {
            metrics::record_result("cache", "fetch", &cached);
        }
        let cached = cached.unwrap_or_else(|e| {
            warn!(model = model.name(), id = %key_segment(id), error = %e, "Cache-only read failed, values reported missing");
            None
        });

        let mut repopulate = durable.filtered(|attr| model.attribute(attr).is_cached());
        for attr in &durable_attributes {
            let attribute = model.attribute(*attr);
            if attribute.is_cached() && !attribute.is_counter() && !repopulate.contains(*attr) {
                repopulate.insert(*attr, Value::Null);
            }
        }
        let mut values = durable;
        if let Some(cached) = cached {
            values.merge(cached.filtered(|attr| model.attribute(attr).is_cache_only()));
        }

        let repopulate = (self.config.repopulate_cache && !repopulate.is_empty()).then_some(repopulate);
        Ok(Loaded { values, repopulate })
    }

    /// Write durable values back to the cache without holding up the caller.
    fn repopulate(&self, model: Arc<Model>, id: Value, mut values: AttributeMap) {
        values.insert(model.primary_key().id(), id);
        let cache = Arc::clone(&self.tiers.cache);

        let mut tasks = self.background.lock();
        while tasks.try_join_next().is_some() {}
        tasks.spawn(async move {
            match cache.save(&model, &values).await {
                Ok(()) => {
                    debug!(model = model.name(), "Cache repopulated");
                    metrics::record_repopulation(true);
                }
                Err(e) => {
                    warn!(model = model.name(), error = %e, "Cache repopulation failed");
                    metrics::record_repopulation(false);
                }
            }
        });
    }
}

/// Whether a cache answer holds every requested attribute that also lives in
/// the durable tier.
fn covers(model: &Model, attributes: &[AttrId], values: &AttributeMap) -> bool {
    attributes
        .iter()
        .filter(|attr| !model.attribute(**attr).is_cache_only())
        .all(|attr| values.contains(*attr))
}
