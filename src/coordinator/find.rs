// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use serde_json::Value;

use super::RecordEngine;
use crate::error::RecordError;
use crate::metrics;
use crate::record::Record;
use crate::schema::{invalid_attribute, AttributeMap};

impl RecordEngine {
    /// Exact-match lookup through a secondary index.
    ///
    /// `value` is coerced to the attribute's type the way external input
    /// is, so `"5"` finds the record saved with an integer `5`. A value
    /// that does not fit the type is a validation error. Returns an
    /// unfetched handle.
    #[tracing::instrument(skip(self, value))]
    pub async fn find(&self, model: &str, attribute: &str, value: impl Into<Value>) -> Result<Option<Record>, RecordError> {
        let model = self.model(model)?;
        let attr = model
            .attribute_named(attribute)
            .ok_or_else(|| invalid_attribute(attribute))?;
        if !attr.is_indexed() {
            return Err(RecordError::InvalidOperation(format!(
                "attribute \"{}\" is not an index",
                attribute
            )));
        }
        let attr = attr.id();

        let mut data = AttributeMap::new();
        data.insert(attr, value.into());
        let (mut data, errors) = model.lookup(data);
        if !errors.is_empty() {
            return Err(RecordError::Validation(errors));
        }
        let Some(value) = data.remove(attr).filter(|v| !v.is_null()) else {
            return Ok(None);
        };

        let result = self.tiers.indexes.find_by_index(&model, attr, &value).await;
        metrics::record_result("index", "find", &result);
        Ok(result.map_err(RecordError::Index)?.map(|id| Record::with_id(model, id)))
    }
}
