// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Write path: durable tier, then cache, then index pointers.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use super::{log_step, RecordEngine, Tier};
use crate::changes::Delta;
use crate::error::{RecordError, ValidationErrors};
use crate::metrics::{self, LatencyTimer};
use crate::record::Record;
use crate::schema::{AttrId, AttributeMap, AttributeType, Model};
use crate::storage::traits::{key_segment, StorageError};
use crate::transform::SaveCheck;

/// What one save writes, after the save stage has run.
struct Writes {
    id: Value,
    /// Plain values, primary key excluded
    values: AttributeMap,
    deltas: Vec<(AttrId, Delta)>,
}

/// Counters the durable tier did not take after the record was written.
struct Unapplied {
    counters: Vec<AttrId>,
    error: RecordError,
}

impl RecordEngine {
    /// Persist pending changes.
    ///
    /// A record with nothing pending saves without I/O. On
    /// [`RecordError::Durable`] (or any error raised before the durable
    /// write) the record is untouched and the save can be retried. On
    /// [`RecordError::DurableIncrement`] the record is written and has its
    /// id; only the counters that were not applied stay pending. On
    /// [`RecordError::Cache`] and [`RecordError::Index`] the durable write
    /// went through and the record is committed.
    #[tracing::instrument(skip(self, record), fields(model = %record.model().name(), new = record.is_new()))]
    pub async fn save(&self, record: &mut Record) -> Result<(), RecordError> {
        if record.is_destroyed() {
            return Err(RecordError::InvalidOperation("cannot save a destroyed record".to_string()));
        }
        if !record.has_changes() {
            debug!("Nothing to save");
            return Ok(());
        }

        let _timer = LatencyTimer::new("engine", "save");
        let model = Arc::clone(record.model());
        let is_new = record.is_new();

        let mut writes = self.prepare(&model, record).await?;
        let id = writes.id.clone();

        let indexed: Vec<AttrId> = writes
            .values
            .keys()
            .filter(|attr| model.attribute(*attr).is_indexed())
            .collect();
        let previous = if !is_new && !indexed.is_empty() {
            self.previous_values(&model, &id, &indexed).await?
        } else {
            AttributeMap::new()
        };

        let (mut first_error, unapplied) = match self.write_durable(&model, &mut writes, is_new).await? {
            Some(Unapplied { counters, error }) => (Some(error), counters),
            None => (None, Vec::new()),
        };

        if let Err(e) = self.write_cache(&model, &writes).await {
            first_error.get_or_insert(e);
        }
        if let Err(e) = self.write_indexes(&model, &id, &writes.values, &indexed, &previous).await {
            first_error.get_or_insert(e);
        }

        record.commit_save(id, &writes.deltas, &unapplied);
        match first_error {
            Some(e) => {
                metrics::record_operation("engine", "save", "partial");
                Err(e)
            }
            None => {
                metrics::record_operation("engine", "save", "success");
                Ok(())
            }
        }
    }

    /// Build the payload, run the save stage and split the result into
    /// plain values and counter deltas. A new record's id is generated only
    /// once its values pass validation.
    async fn prepare(&self, model: &Model, record: &Record) -> Result<Writes, RecordError> {
        let pk = model.primary_key().id();
        let changes = record.changes();

        let mut payload: AttributeMap = changes
            .changed()
            .filter_map(|attr| record.values().get(attr).map(|value| (attr, value.clone())))
            .collect();
        for (attr, delta) in changes.deltas() {
            if !payload.contains(attr) {
                payload.insert(attr, delta.to_value());
            }
        }

        let invalid = |errors| {
            metrics::record_operation("engine", "save", "invalid");
            RecordError::Validation(errors)
        };

        let check = SaveCheck {
            is_new: record.is_new(),
            input_errors: record.input_errors(),
        };
        model.chain().check(model, &payload, check).map_err(invalid)?;

        let generated = match record.id() {
            Some(id) => id.clone(),
            None => self
                .ids
                .generate_id(model)
                .await
                .map_err(RecordError::IdGeneration)?,
        };
        payload.insert(pk, generated.clone());

        let saved = model
            .chain()
            .transform(model, payload, &self.hook_permits)
            .await
            .map_err(invalid)?;

        let mut writes = Writes {
            id: saved.get(pk).filter(|id| !id.is_null()).cloned().unwrap_or(generated),
            values: AttributeMap::new(),
            deltas: Vec::new(),
        };

        for (attr, value) in saved {
            let attribute = model.attribute(attr);
            if attr == pk || !attribute.is_persisted() {
                continue;
            }

            match changes.delta(attr) {
                Some(delta) if changes.is_changed(attr) => {
                    writes.values.insert(attr, value);
                    writes.deltas.push((attr, delta));
                }
                Some(_) => {
                    let delta = counter_delta(attribute.kind(), &value).ok_or_else(|| {
                        RecordError::Validation(ValidationErrors::single(
                            attribute.name(),
                            format!("attribute \"{}\" must be a {}", attribute.name(), attribute.kind()),
                        ))
                    })?;
                    if !delta.is_zero() {
                        writes.deltas.push((attr, delta));
                    }
                }
                None => {
                    writes.values.insert(attr, value);
                }
            }
        }

        Ok(writes)
    }

    /// Values of indexed attributes before this save, so stale pointers can
    /// be removed. A record the tiers do not know has no stale pointers.
    async fn previous_values(&self, model: &Model, id: &Value, indexed: &[AttrId]) -> Result<AttributeMap, RecordError> {
        match self.load(model, id, indexed).await {
            Ok(loaded) => Ok(loaded.values),
            Err(RecordError::NotFound { .. }) => Ok(AttributeMap::new()),
            Err(e) => Err(e),
        }
    }

    /// Durable save, then durable increments in order.
    ///
    /// Fails outright only while nothing has reached the durable tier. Once
    /// the record or an increment has landed, a failing increment cuts the
    /// deltas from that point on out of `writes` and comes back as
    /// [`Unapplied`].
    async fn write_durable(&self, model: &Model, writes: &mut Writes, is_new: bool) -> Result<Option<Unapplied>, RecordError> {
        let mut values = writes.values.filtered(|attr| model.attribute(attr).is_durable());
        let mut written = false;

        if is_new || !values.is_empty() {
            values.insert(model.primary_key().id(), writes.id.clone());
            log_step(Tier::Durable, "save", model, &writes.id);
            let result = self.tiers.durable.save(model, &values).await;
            metrics::record_result(Tier::Durable.as_str(), "save", &result);
            result.map_err(|e| durable_failure(model, &writes.id, e))?;
            written = true;
        }

        let mut failed = None;
        for (index, (attr, delta)) in writes.deltas.iter().enumerate() {
            if !model.attribute(*attr).is_durable() {
                continue;
            }
            log_step(Tier::Durable, "incr", model, &writes.id);
            let result = self.tiers.durable.incr(model, &writes.id, *attr, *delta).await;
            metrics::record_result(Tier::Durable.as_str(), "incr", &result);
            match result {
                Ok(()) => written = true,
                Err(e) => {
                    failed = Some((index, e));
                    break;
                }
            }
        }

        let Some((index, e)) = failed else {
            return Ok(None);
        };
        if !written {
            return Err(durable_failure(model, &writes.id, e));
        }

        error!(model = model.name(), id = %key_segment(&writes.id), error = %e, "Durable increment failed after the record was written");
        let counters = writes.deltas.split_off(index).into_iter().map(|(attr, _)| attr).collect();
        Ok(Some(Unapplied {
            counters,
            error: RecordError::DurableIncrement(e),
        }))
    }

    async fn write_cache(&self, model: &Model, writes: &Writes) -> Result<(), RecordError> {
        let mut values = writes.values.filtered(|attr| model.attribute(attr).is_cached());

        if !values.is_empty() {
            values.insert(model.primary_key().id(), writes.id.clone());
            log_step(Tier::Cache, "save", model, &writes.id);
            let result = self.tiers.cache.save(model, &values).await;
            metrics::record_result(Tier::Cache.as_str(), "save", &result);
            result.map_err(|e| cache_failure(model, &writes.id, e))?;
        }

        for (attr, delta) in &writes.deltas {
            if !model.attribute(*attr).is_cached() {
                continue;
            }
            log_step(Tier::Cache, "incr", model, &writes.id);
            let result = self.tiers.cache.incr(model, &writes.id, *attr, *delta).await;
            metrics::record_result(Tier::Cache.as_str(), "incr", &result);
            result.map_err(|e| cache_failure(model, &writes.id, e))?;
        }

        Ok(())
    }

    /// Point each changed indexed value at this record, dropping the pointer
    /// for the value it replaced when that pointer is still ours.
    async fn write_indexes(
        &self,
        model: &Model,
        id: &Value,
        values: &AttributeMap,
        indexed: &[AttrId],
        previous: &AttributeMap,
    ) -> Result<(), RecordError> {
        for attr in indexed {
            let value = values.get(*attr).filter(|v| !v.is_null());

            if let Some(old) = previous.get(*attr).filter(|old| !old.is_null() && Some(*old) != value) {
                self.release_pointer(model, id, *attr, old).await?;
            }

            if let Some(value) = value {
                log_step(Tier::Index, "save", model, id);
                let result = self.tiers.indexes.write_index(model, *attr, value, id).await;
                metrics::record_result(Tier::Index.as_str(), "save", &result);
                result.map_err(|e| index_failure(model, id, e))?;
            }
        }
        Ok(())
    }

    /// Delete the `(attribute, value)` pointer if it still references `id`.
    pub(super) async fn release_pointer(&self, model: &Model, id: &Value, attr: AttrId, value: &Value) -> Result<(), RecordError> {
        let owner = self
            .tiers
            .indexes
            .find_by_index(model, attr, value)
            .await
            .map_err(|e| index_failure(model, id, e))?;

        if owner.as_ref() == Some(id) {
            log_step(Tier::Index, "destroy", model, id);
            let result = self.tiers.indexes.delete_index(model, attr, value).await;
            metrics::record_result(Tier::Index.as_str(), "destroy", &result);
            result.map_err(|e| index_failure(model, id, e))?;
        }
        Ok(())
    }
}

/// A delta-only counter value after the save stage, in the counter's type.
fn counter_delta(kind: AttributeType, value: &Value) -> Option<Delta> {
    let delta = Delta::from_value(value)?;
    match kind {
        AttributeType::Integer => delta.as_i64().map(Delta::Int),
        _ => Some(Delta::Float(delta.as_f64())),
    }
}

pub(super) fn durable_failure(model: &Model, id: &Value, e: StorageError) -> RecordError {
    error!(model = model.name(), id = %key_segment(id), error = %e, "Durable write failed");
    RecordError::Durable(e)
}

pub(super) fn cache_failure(model: &Model, id: &Value, e: StorageError) -> RecordError {
    warn!(model = model.name(), id = %key_segment(id), error = %e, "Cache write failed after durable commit");
    RecordError::Cache(e)
}

pub(super) fn index_failure(model: &Model, id: &Value, e: StorageError) -> RecordError {
    warn!(model = model.name(), id = %key_segment(id), error = %e, "Index maintenance failed");
    RecordError::Index(e)
}
