// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::sync::Arc;

use tracing::debug;

use super::save::{cache_failure, durable_failure};
use super::{log_step, primary_key_required, RecordEngine, Tier};
use crate::error::RecordError;
use crate::metrics::{self, LatencyTimer};
use crate::record::Record;
use crate::schema::{AttrId, AttributeMap};
use crate::storage::traits::key_segment;

impl RecordEngine {
    /// Remove a record from every tier.
    ///
    /// The durable delete goes first and a failure there aborts. A cache
    /// failure is reported after the index pointers are cleaned up. Only
    /// pointers that still reference this record are removed.
    #[tracing::instrument(skip(self, record), fields(model = %record.model().name()))]
    pub async fn destroy(&self, record: &mut Record) -> Result<(), RecordError> {
        let _timer = LatencyTimer::new("engine", "destroy");
        let model = Arc::clone(record.model());
        let id = record.id().cloned().ok_or_else(|| primary_key_required(&model))?;

        let indexed: Vec<AttrId> = model.indexed_attributes().map(|a| a.id()).collect();
        let previous = if indexed.is_empty() {
            AttributeMap::new()
        } else {
            match self.load(&model, &id, &indexed).await {
                Ok(loaded) => loaded.values,
                Err(RecordError::NotFound { .. }) => AttributeMap::new(),
                Err(e) => return Err(e),
            }
        };

        log_step(Tier::Durable, "destroy", &model, &id);
        let result = self.tiers.durable.destroy(&model, &id).await;
        metrics::record_result(Tier::Durable.as_str(), "destroy", &result);
        result.map_err(|e| durable_failure(&model, &id, e))?;

        let mut first_error = None;
        if model.has_cached_attributes() {
            log_step(Tier::Cache, "destroy", &model, &id);
            let result = self.tiers.cache.destroy(&model, &id).await;
            metrics::record_result(Tier::Cache.as_str(), "destroy", &result);
            if let Err(e) = result {
                first_error = Some(cache_failure(&model, &id, e));
            }
        }

        for (attr, value) in previous.iter() {
            if value.is_null() {
                continue;
            }
            if let Err(e) = self.release_pointer(&model, &id, attr, value).await {
                first_error.get_or_insert(e);
            }
        }

        debug!(id = %key_segment(&id), "Record destroyed");
        record.mark_destroyed();
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}
