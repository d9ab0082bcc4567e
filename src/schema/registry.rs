// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::model::{Model, ModelDefinition};
use crate::codec::{JsonMarshaller, Marshaller};
use crate::error::RecordError;
use crate::validate::{RuleValidator, Validator};

/// Named models, validated and frozen.
#[derive(Debug, Default)]
pub struct ModelRegistry {
    models: HashMap<String, Arc<Model>>,
}

impl ModelRegistry {
    #[must_use]
    pub fn builder() -> ModelRegistryBuilder {
        ModelRegistryBuilder::default()
    }

    /// Look up a model by name.
    pub fn model(&self, name: &str) -> Result<Arc<Model>, RecordError> {
        self.models
            .get(name)
            .cloned()
            .ok_or_else(|| RecordError::InvalidOperation(format!("model \"{}\" has not been defined", name)))
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.models.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.models.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

/// Collects model definitions, validating each as it is added.
///
/// The marshaller and validator apply to models defined after they are set.
pub struct ModelRegistryBuilder {
    marshaller: Arc<dyn Marshaller>,
    validator: Arc<dyn Validator>,
    models: HashMap<String, Arc<Model>>,
}

impl Default for ModelRegistryBuilder {
    fn default() -> Self {
        Self {
            marshaller: Arc::new(JsonMarshaller),
            validator: Arc::new(RuleValidator),
            models: HashMap::new(),
        }
    }
}

impl ModelRegistryBuilder {
    #[must_use]
    pub fn marshaller(mut self, marshaller: impl Marshaller + 'static) -> Self {
        self.marshaller = Arc::new(marshaller);
        self
    }

    #[must_use]
    pub fn validator(mut self, validator: impl Validator + 'static) -> Self {
        self.validator = Arc::new(validator);
        self
    }

    /// Validate and add a model.
    pub fn define(mut self, name: &str, definition: ModelDefinition) -> Result<Self, RecordError> {
        if self.models.contains_key(name) {
            return Err(RecordError::Configuration(format!("model \"{}\" is already defined", name)));
        }
        let model = Model::build(
            name,
            definition,
            Arc::clone(&self.marshaller),
            Arc::clone(&self.validator),
        )?;
        debug!(model = %name, table = %model.table(), "Model defined");
        self.models.insert(name.to_string(), Arc::new(model));
        Ok(self)
    }

    #[must_use]
    pub fn build(self) -> ModelRegistry {
        ModelRegistry { models: self.models }
    }
}

impl std::fmt::Debug for ModelRegistryBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelRegistryBuilder")
            .field("models", &self.models.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}
