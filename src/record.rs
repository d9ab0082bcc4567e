// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! A single record instance.
//!
//! Records are plain owned values: the [`RecordEngine`](crate::RecordEngine)
//! persists and hydrates them, everything else happens locally with no I/O.
//!
//! ```
//! use record_sync::schema::{AttributeSpec, AttributeType, ModelDefinition, ModelRegistry};
//! use record_sync::{RecordEngine, Tiers};
//! use serde_json::json;
//!
//! let registry = ModelRegistry::builder()
//!     .define(
//!         "Post",
//!         ModelDefinition::new("posts")
//!             .attribute("id", AttributeSpec::new(AttributeType::String).primary())
//!             .attribute("title", AttributeSpec::new(AttributeType::String))
//!             .attribute("views", AttributeSpec::new(AttributeType::Integer).counter()),
//!     )
//!     .unwrap()
//!     .build();
//! let engine = RecordEngine::new(registry, Tiers::in_memory());
//!
//! let mut post = engine.create("Post", json!({"title": "hello", "extra": 1})).unwrap();
//! assert!(post.is_new());
//! assert_eq!(post.get("title").unwrap(), Some(json!("hello")));
//! post.incr("views", 2).unwrap();
//! assert!(post.incr("title", 1).is_err());
//! ```

use std::sync::Arc;

use serde_json::{Map, Value};

use crate::changes::{ChangeTracker, Delta};
use crate::error::{RecordError, ValidationErrors};
use crate::schema::{invalid_attribute, AttrId, AttributeMap, AttributeType, Model, Selection};
use crate::transform::OutputOptions;

#[derive(Debug, Clone)]
pub struct Record {
    model: Arc<Model>,
    values: AttributeMap,
    changes: ChangeTracker,
    input_errors: ValidationErrors,
    destroyed: bool,
}

impl Record {
    pub(crate) fn new(model: Arc<Model>) -> Self {
        Self {
            model,
            values: AttributeMap::new(),
            changes: ChangeTracker::new(),
            input_errors: ValidationErrors::new(),
            destroyed: false,
        }
    }

    /// Handle on an existing record whose values have not been fetched.
    pub(crate) fn with_id(model: Arc<Model>, id: Value) -> Self {
        let mut record = Self::new(model);
        let pk = record.model.primary_key().id();
        record.values.insert(pk, id);
        record
    }

    #[must_use]
    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    /// Primary key, once known.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.values
            .get(self.model.primary_key().id())
            .filter(|v| !v.is_null())
    }

    /// True while the primary key is unknown.
    #[must_use]
    pub fn is_new(&self) -> bool {
        self.id().is_none()
    }

    #[must_use]
    pub fn is_destroyed(&self) -> bool {
        self.destroyed
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Mutation
    // ═══════════════════════════════════════════════════════════════════════

    /// Set one attribute from external input. Undeclared names are ignored.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) {
        let mut data = Map::new();
        data.insert(name.to_string(), value.into());
        self.apply_input(data, true);
    }

    /// Set one attribute, skipping the external-only input steps.
    pub fn set_raw(&mut self, name: &str, value: impl Into<Value>) {
        let mut data = Map::new();
        data.insert(name.to_string(), value.into());
        self.apply_input(data, false);
    }

    pub fn set_many(&mut self, data: Map<String, Value>) {
        self.apply_input(data, true);
    }

    pub fn set_many_raw(&mut self, data: Map<String, Value>) {
        self.apply_input(data, false);
    }

    fn apply_input(&mut self, data: Map<String, Value>, apply_external: bool) {
        let data = self.model.from_named(data);
        for id in data.keys() {
            self.input_errors.remove(self.model.attribute(id).name());
        }

        let (values, errors) = self.model.input(data, apply_external);
        self.input_errors.extend(errors);
        for (id, value) in values {
            self.values.insert(id, value);
            self.changes.mark(id);
        }
    }

    /// Add to a counter. The amount is accumulated and applied with the
    /// tiers' native increment on the next save.
    pub fn incr(&mut self, name: &str, amount: impl Into<Delta>) -> Result<(), RecordError> {
        self.add_delta(name, amount.into(), "incremented")
    }

    pub fn decr(&mut self, name: &str, amount: impl Into<Delta>) -> Result<(), RecordError> {
        self.add_delta(name, amount.into().negate(), "decremented")
    }

    fn add_delta(&mut self, name: &str, delta: Delta, verb: &str) -> Result<(), RecordError> {
        let attribute = self
            .model
            .attribute_named(name)
            .filter(|a| a.is_counter())
            .ok_or_else(|| RecordError::InvalidOperation(format!("only counters can be {}", verb)))?;

        let delta = match attribute.kind() {
            AttributeType::Integer => Delta::Int(delta.as_i64().ok_or_else(|| {
                RecordError::InvalidOperation(format!("counter \"{}\" only accepts integer amounts", name))
            })?),
            _ => Delta::Float(delta.as_f64()),
        };
        let id = attribute.id();
        self.changes.add_delta(id, delta);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Access
    // ═══════════════════════════════════════════════════════════════════════

    /// Read one attribute through the external output stage.
    pub fn get(&self, name: &str) -> Result<Option<Value>, RecordError> {
        self.get_with(name, &OutputOptions::default(), true)
    }

    /// Read one attribute, skipping the external-only output steps.
    pub fn get_raw(&self, name: &str) -> Result<Option<Value>, RecordError> {
        self.get_with(name, &OutputOptions::default(), false)
    }

    fn get_with(&self, name: &str, options: &OutputOptions, apply_external: bool) -> Result<Option<Value>, RecordError> {
        let id = self.model.id_of(name).ok_or_else(|| invalid_attribute(name))?;
        let mut named = self.output(&[id], options, apply_external);
        Ok(named.remove(name))
    }

    /// Values of the selection, through the external output stage.
    /// Attributes without a value are omitted.
    pub fn to_object(&self, selection: &Selection) -> Result<Map<String, Value>, RecordError> {
        self.to_object_with(selection, &OutputOptions::default())
    }

    pub fn to_object_with(&self, selection: &Selection, options: &OutputOptions) -> Result<Map<String, Value>, RecordError> {
        let ids = self.model.resolve(selection)?;
        Ok(self.output(&ids, options, true))
    }

    pub fn to_object_raw(&self, selection: &Selection) -> Result<Map<String, Value>, RecordError> {
        let ids = self.model.resolve(selection)?;
        Ok(self.output(&ids, &OutputOptions::default(), false))
    }

    fn output(&self, ids: &[AttrId], options: &OutputOptions, apply_external: bool) -> Map<String, Value> {
        let data: AttributeMap = ids
            .iter()
            .filter_map(|id| self.values.get(*id).map(|value| (*id, value.clone())))
            .collect();
        self.model.to_named(self.model.output(data, options, apply_external))
    }

    /// Names of attributes set since the last save or fetch.
    #[must_use]
    pub fn changed_attributes(&self) -> Vec<&str> {
        self.changes
            .changed()
            .map(|id| self.model.attribute(id).name())
            .collect()
    }

    /// Pending counter delta for `name`.
    #[must_use]
    pub fn pending_delta(&self, name: &str) -> Option<Delta> {
        self.model.id_of(name).and_then(|id| self.changes.delta(id))
    }

    /// Anything to save: changed values, counter deltas or input errors.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || !self.input_errors.is_empty()
    }

    /// Marshalling errors from external input, reported by the next save.
    #[must_use]
    pub fn input_errors(&self) -> &ValidationErrors {
        &self.input_errors
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Engine hooks
    // ═══════════════════════════════════════════════════════════════════════

    pub(crate) fn values(&self) -> &AttributeMap {
        &self.values
    }

    pub(crate) fn changes(&self) -> &ChangeTracker {
        &self.changes
    }

    /// Apply a committed save: assign the id, fold written deltas into known
    /// counter values and clear pending state. Deltas of `unapplied`
    /// counters stay pending for the next save.
    pub(crate) fn commit_save(&mut self, id: Value, applied: &[(AttrId, Delta)], unapplied: &[AttrId]) {
        let pk = self.model.primary_key().id();
        self.values.insert(pk, id);
        for (attr, delta) in applied {
            if let Some(current) = self.values.get(*attr) {
                if let Some(updated) = delta.apply_to(Some(current)) {
                    self.values.insert(*attr, updated);
                }
            }
        }
        self.changes.retain_deltas(unapplied);
    }

    /// Overwrite local values with fetched ones.
    pub(crate) fn merge_fetched(&mut self, data: AttributeMap) {
        for (id, value) in data {
            self.changes.unmark(id);
            self.values.insert(id, value);
        }
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.destroyed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSpec, ModelDefinition, ModelRegistry};
    use serde_json::json;

    fn model() -> Arc<Model> {
        ModelRegistry::builder()
            .define(
                "Model",
                ModelDefinition::new("models")
                    .attribute("id", AttributeSpec::new(AttributeType::String).primary())
                    .attribute("foo", AttributeSpec::new(AttributeType::String))
                    .attribute("bar", AttributeSpec::new(AttributeType::Integer))
                    .attribute("secret", AttributeSpec::new(AttributeType::String).hidden())
                    .attribute("role", AttributeSpec::new(AttributeType::String).guarded())
                    .attribute("count", AttributeSpec::new(AttributeType::Integer).counter())
                    .attribute("score", AttributeSpec::new(AttributeType::Float).counter())
                    .scope("public", ["foo", "secret"]),
            )
            .unwrap()
            .build()
            .model("Model")
            .unwrap()
    }

    #[test]
    fn test_new_until_primary_key_set() {
        let mut record = Record::new(model());
        assert!(record.is_new());
        record.set("id", "abc");
        assert!(!record.is_new());
        assert_eq!(record.id(), Some(&json!("abc")));

        let handle = Record::with_id(model(), json!("xyz"));
        assert!(!handle.is_new());
        assert!(!handle.has_changes());
    }

    #[test]
    fn test_set_ignores_undeclared_attributes() {
        let mut record = Record::new(model());
        record.set_many(json!({"foo": "a", "baz": "b"}).as_object().cloned().unwrap());
        assert_eq!(record.changed_attributes(), vec!["foo"]);
        assert_eq!(record.get("foo").unwrap(), Some(json!("a")));
    }

    #[test]
    fn test_get_unknown_attribute_fails() {
        let record = Record::new(model());
        let err = record.get("invalid").unwrap_err();
        assert_eq!(err.to_string(), "invalid attribute `invalid`");
        assert_eq!(record.get("foo").unwrap(), None);
    }

    #[test]
    fn test_guarded_only_settable_raw() {
        let mut record = Record::new(model());
        record.set("role", "admin");
        assert_eq!(record.get("role").unwrap(), None);
        record.set_raw("role", "admin");
        assert_eq!(record.get("role").unwrap(), Some(json!("admin")));
    }

    #[test]
    fn test_hidden_only_readable_raw() {
        let mut record = Record::new(model());
        record.set_many(json!({"foo": "a", "secret": "s"}).as_object().cloned().unwrap());

        let public = record.to_object(&Selection::scope("public")).unwrap();
        assert_eq!(Value::Object(public), json!({"foo": "a"}));
        let raw = record.to_object_raw(&Selection::scope("public")).unwrap();
        assert_eq!(Value::Object(raw), json!({"foo": "a", "secret": "s"}));
        assert_eq!(record.get_raw("secret").unwrap(), Some(json!("s")));
    }

    #[test]
    fn test_input_errors_replaced_by_later_input() {
        let mut record = Record::new(model());
        record.set("bar", "nope");
        assert_eq!(record.input_errors().get("bar"), Some("attribute \"bar\" must be a integer"));
        assert!(record.has_changes());

        record.set("bar", "12");
        assert!(record.input_errors().is_empty());
        assert_eq!(record.get("bar").unwrap(), Some(json!(12)));
    }

    #[test]
    fn test_incr_only_on_counters() {
        let mut record = Record::new(model());
        let err = record.incr("foo", 1).unwrap_err();
        assert_eq!(err.to_string(), "only counters can be incremented");
        let err = record.decr("foo", 1).unwrap_err();
        assert_eq!(err.to_string(), "only counters can be decremented");
        assert!(!record.has_changes());
    }

    #[test]
    fn test_counter_deltas_accumulate() {
        let mut record = Record::new(model());
        record.incr("count", 10).unwrap();
        record.decr("count", 5).unwrap();
        assert_eq!(record.pending_delta("count"), Some(Delta::Int(5)));
        assert!(record.changed_attributes().is_empty());

        record.incr("score", 9.0).unwrap();
        record.decr("score", 1.2).unwrap();
        let Some(Delta::Float(score)) = record.pending_delta("score") else {
            panic!("expected float delta");
        };
        assert!((score - 7.8).abs() < 1e-9);
    }

    #[test]
    fn test_integer_counter_rejects_fractions() {
        let mut record = Record::new(model());
        let err = record.incr("count", 1.5).unwrap_err();
        assert_eq!(err.to_string(), "counter \"count\" only accepts integer amounts");
        record.incr("count", 2.0).unwrap();
        assert_eq!(record.pending_delta("count"), Some(Delta::Int(2)));
    }

    #[test]
    fn test_set_keeps_pending_deltas() {
        let mut record = Record::new(model());
        record.incr("count", 3).unwrap();
        record.set("count", 10);
        assert_eq!(record.pending_delta("count"), Some(Delta::Int(3)));
        assert_eq!(record.changed_attributes(), vec!["count"]);
    }

    #[test]
    fn test_commit_folds_known_counters() {
        let model = model();
        let count = model.id_of("count").unwrap();
        let score = model.id_of("score").unwrap();

        let mut record = Record::new(Arc::clone(&model));
        record.set("count", 10);
        record.incr("count", 3).unwrap();
        record.incr("score", 1.5).unwrap();

        let deltas: Vec<_> = record.changes().deltas().collect();
        record.commit_save(json!("1"), &deltas, &[]);

        assert_eq!(record.get("count").unwrap(), Some(json!(13)));
        // Never known locally, so still unknown.
        assert_eq!(record.values().get(score), None);
        assert!(!record.has_changes());
        assert_eq!(record.id(), Some(&json!("1")));
        assert!(record.changes().delta(count).is_none());
    }

    #[test]
    fn test_commit_keeps_unapplied_deltas_pending() {
        let model = model();
        let count = model.id_of("count").unwrap();
        let score = model.id_of("score").unwrap();

        let mut record = Record::new(Arc::clone(&model));
        record.set("foo", "a");
        record.set("count", 10);
        record.incr("count", 3).unwrap();
        record.incr("score", 1.5).unwrap();

        record.commit_save(json!("1"), &[(count, Delta::Int(3))], &[score]);

        assert!(!record.is_new());
        assert!(record.changed_attributes().is_empty());
        assert_eq!(record.get("count").unwrap(), Some(json!(13)));
        assert_eq!(record.pending_delta("count"), None);
        assert_eq!(record.pending_delta("score"), Some(Delta::Float(1.5)));
        assert!(record.has_changes());
    }

    #[test]
    fn test_merge_fetched_unmarks() {
        let model = model();
        let mut record = Record::with_id(Arc::clone(&model), json!("1"));
        record.set("foo", "local");
        record.merge_fetched([(model.id_of("foo").unwrap(), json!("remote"))].into_iter().collect());
        assert_eq!(record.get("foo").unwrap(), Some(json!("remote")));
        assert!(record.changed_attributes().is_empty());
    }
}
