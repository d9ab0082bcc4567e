// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Validation capability run by the save stage.

use serde_json::Value;

use crate::error::ValidationErrors;
use crate::schema::{AttributeMap, Model};

pub trait Validator: Send + Sync {
    /// Check the values about to be saved. `None` means valid.
    fn validate(&self, model: &Model, data: &AttributeMap) -> Option<ValidationErrors>;
}

/// Enforces each attribute's declared [`Rules`](crate::schema::Rules).
///
/// Strings are bounded by character count, numbers by value. Nulls and
/// attributes absent from the data are not checked.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleValidator;

impl Validator for RuleValidator {
    fn validate(&self, model: &Model, data: &AttributeMap) -> Option<ValidationErrors> {
        let mut errors = ValidationErrors::new();

        for (id, value) in data.iter() {
            let attribute = model.attribute(id);
            let rules = attribute.rules();
            if rules.is_empty() {
                continue;
            }
            let name = attribute.name();

            match value {
                Value::String(s) => {
                    let len = s.chars().count() as f64;
                    if let Some(min) = rules.min.filter(|min| len < *min) {
                        errors.insert(name, format!("attribute \"{}\" must have a minimum of {} characters", name, min));
                    } else if let Some(max) = rules.max.filter(|max| len > *max) {
                        errors.insert(name, format!("attribute \"{}\" must have a maximum of {} characters", name, max));
                    }
                }
                Value::Number(n) => {
                    let Some(n) = n.as_f64() else { continue };
                    if let Some(min) = rules.min.filter(|min| n < *min) {
                        errors.insert(name, format!("attribute \"{}\" must be at least {}", name, min));
                    } else if let Some(max) = rules.max.filter(|max| n > *max) {
                        errors.insert(name, format!("attribute \"{}\" must be at most {}", name, max));
                    }
                }
                _ => {}
            }
        }

        if errors.is_empty() {
            None
        } else {
            Some(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSpec, AttributeType, ModelDefinition, ModelRegistry};
    use serde_json::json;
    use std::sync::Arc;

    fn model() -> Arc<Model> {
        ModelRegistry::builder()
            .define(
                "Model",
                ModelDefinition::new("models")
                    .attribute("id", AttributeSpec::new(AttributeType::String).primary())
                    .attribute("foo", AttributeSpec::new(AttributeType::String).min(5.0).max(8.0))
                    .attribute("age", AttributeSpec::new(AttributeType::Integer).min(0.0).max(150.0))
                    .attribute("free", AttributeSpec::new(AttributeType::String)),
            )
            .unwrap()
            .build()
            .model("Model")
            .unwrap()
    }

    fn data(model: &Model, values: &[(&str, Value)]) -> AttributeMap {
        values
            .iter()
            .map(|(name, value)| (model.id_of(name).unwrap(), value.clone()))
            .collect()
    }

    #[test]
    fn test_string_length_rules() {
        let model = model();

        let errors = RuleValidator.validate(&model, &data(&model, &[("foo", json!("abc"))])).unwrap();
        assert_eq!(errors.get("foo"), Some("attribute \"foo\" must have a minimum of 5 characters"));

        let errors = RuleValidator
            .validate(&model, &data(&model, &[("foo", json!("abcdefghij"))]))
            .unwrap();
        assert_eq!(errors.get("foo"), Some("attribute \"foo\" must have a maximum of 8 characters"));

        assert!(RuleValidator.validate(&model, &data(&model, &[("foo", json!("abcdef"))])).is_none());
    }

    #[test]
    fn test_characters_not_bytes() {
        let model = model();
        // five characters, ten bytes
        assert!(RuleValidator.validate(&model, &data(&model, &[("foo", json!("ééééé"))])).is_none());
    }

    #[test]
    fn test_numeric_rules() {
        let model = model();
        let errors = RuleValidator
            .validate(&model, &data(&model, &[("age", json!(-1)), ("foo", json!("abcdef"))]))
            .unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors.get("age"), Some("attribute \"age\" must be at least 0"));

        let errors = RuleValidator.validate(&model, &data(&model, &[("age", json!(200))])).unwrap();
        assert_eq!(errors.get("age"), Some("attribute \"age\" must be at most 150"));
    }

    #[test]
    fn test_unruled_and_null_values_pass() {
        let model = model();
        let values = data(&model, &[("free", json!("")), ("foo", Value::Null)]);
        assert!(RuleValidator.validate(&model, &values).is_none());
    }
}
