// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value};

use super::attribute::{Attribute, AttributeSpec};
use super::{AttrId, AttributeMap, Selection};
use crate::codec::Marshaller;
use crate::error::{RecordError, ValidationErrors};
use crate::transform::{OutputOptions, Transform, TransformChain};
use crate::validate::Validator;

/// A model as written down: table, attributes, scopes and transforms.
///
/// Loadable from configuration. Transforms and attribute hooks are code and
/// are attached with the builder methods.
///
/// ```
/// use record_sync::schema::ModelDefinition;
///
/// let definition: ModelDefinition = serde_json::from_str(r#"{
///     "table": "users",
///     "properties": {
///         "id": {"type": "string", "primary": true},
///         "name": {"type": "string", "cache": true}
///     },
///     "scopes": {"summary": ["name"]}
/// }"#).unwrap();
/// assert_eq!(definition.properties.len(), 2);
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelDefinition {
    pub table: String,
    #[serde(default)]
    pub properties: BTreeMap<String, AttributeSpec>,
    #[serde(default)]
    pub scopes: BTreeMap<String, Vec<String>>,
    #[serde(skip)]
    pub transforms: Vec<Transform>,
}

impl ModelDefinition {
    #[must_use]
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn attribute(mut self, name: impl Into<String>, spec: AttributeSpec) -> Self {
        self.properties.insert(name.into(), spec);
        self
    }

    #[must_use]
    pub fn scope<I, S>(mut self, name: impl Into<String>, attributes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes
            .insert(name.into(), attributes.into_iter().map(Into::into).collect());
        self
    }

    /// Append a model transform. Registration order is chain order.
    #[must_use]
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    /// Attach hooks to an attribute already declared (e.g. one loaded from
    /// configuration). Unknown names are ignored.
    #[must_use]
    pub fn with_hooks(
        mut self,
        name: &str,
        attach: impl FnOnce(AttributeSpec) -> AttributeSpec,
    ) -> Self {
        if let Some(spec) = self.properties.remove(name) {
            self.properties.insert(name.to_string(), attach(spec));
        }
        self
    }
}

/// A validated, immutable model.
pub struct Model {
    name: String,
    table: String,
    attributes: Vec<Attribute>,
    by_name: HashMap<String, AttrId>,
    primary: AttrId,
    scopes: BTreeMap<String, Vec<AttrId>>,
    chain: TransformChain,
}

impl Model {
    pub(crate) fn build(
        name: &str,
        definition: ModelDefinition,
        marshaller: Arc<dyn Marshaller>,
        validator: Arc<dyn Validator>,
    ) -> Result<Self, RecordError> {
        let config_err = |message: String| Err(RecordError::Configuration(message));

        if definition.table.trim().is_empty() {
            return config_err("`table` is not defined".to_string());
        }
        if definition.properties.len() > usize::from(u16::MAX) {
            return config_err(format!("model \"{}\" declares too many attributes", name));
        }

        let mut attributes = Vec::with_capacity(definition.properties.len());
        for (index, (attr_name, spec)) in definition.properties.into_iter().enumerate() {
            let Some(kind) = spec.kind else {
                return config_err(format!("attribute \"{}\" must have a type", attr_name));
            };
            if spec.counter && spec.indexed {
                return config_err(format!("counter attribute \"{}\" cannot be indexed", attr_name));
            }
            if spec.counter && !kind.is_numeric() {
                return config_err(format!(
                    "counter attribute \"{}\" must be an integer or float",
                    attr_name
                ));
            }
            attributes.push(Attribute {
                id: AttrId(index as u16),
                name: attr_name,
                kind,
                spec,
            });
        }

        let mut primaries = attributes.iter().filter(|a| a.is_primary());
        let primary = match (primaries.next(), primaries.next()) {
            (None, _) => return config_err("a primary key attribute is required".to_string()),
            (Some(_), Some(_)) => {
                return config_err("there must only be one primary key attribute".to_string())
            }
            (Some(pk), None) => pk,
        };
        if !primary.is_cached() {
            return config_err(format!("the primary key \"{}\" must be cached", primary.name()));
        }
        for (flag, set) in [
            ("cacheOnly", primary.is_cache_only()),
            ("counter", primary.is_counter()),
            ("virtual", primary.is_virtual()),
        ] {
            if set {
                return config_err(format!("the primary key \"{}\" cannot be {}", primary.name(), flag));
            }
        }
        let primary = primary.id();

        let by_name: HashMap<String, AttrId> = attributes
            .iter()
            .map(|a| (a.name.clone(), a.id))
            .collect();

        let mut scopes = BTreeMap::new();
        for (scope, names) in definition.scopes {
            let mut ids = Vec::with_capacity(names.len());
            for attr_name in names {
                match by_name.get(&attr_name) {
                    Some(id) => ids.push(*id),
                    None => {
                        return config_err(format!(
                            "scope \"{}\" references undefined attribute \"{}\"",
                            scope, attr_name
                        ))
                    }
                }
            }
            scopes.insert(scope, ids);
        }

        Ok(Self {
            name: name.to_string(),
            table: definition.table,
            attributes,
            by_name,
            primary,
            scopes,
            chain: TransformChain::new(marshaller, validator, definition.transforms),
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub fn primary_key(&self) -> &Attribute {
        &self.attributes[self.primary.index()]
    }

    /// The attribute behind `id`.
    ///
    /// # Panics
    ///
    /// If `id` was issued by a different model.
    #[must_use]
    pub fn attribute(&self, id: AttrId) -> &Attribute {
        &self.attributes[id.index()]
    }

    #[must_use]
    pub fn attribute_named(&self, name: &str) -> Option<&Attribute> {
        self.id_of(name).map(|id| self.attribute(id))
    }

    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<AttrId> {
        self.by_name.get(name).copied()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter()
    }

    pub fn indexed_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.iter().filter(|a| a.is_indexed())
    }

    #[must_use]
    pub fn has_indexes(&self) -> bool {
        self.indexed_attributes().next().is_some()
    }

    /// Whether the cache tier holds anything beyond the primary key.
    #[must_use]
    pub fn has_cached_attributes(&self) -> bool {
        self.attributes
            .iter()
            .any(|a| !a.is_primary() && a.is_persisted() && a.is_cached())
    }

    pub fn scope_names(&self) -> impl Iterator<Item = &str> {
        self.scopes.keys().map(String::as_str)
    }

    /// Resolve a selection to attribute ids, in selection order.
    pub fn resolve(&self, selection: &Selection) -> Result<Vec<AttrId>, RecordError> {
        match selection {
            Selection::All => Ok(self.attributes.iter().map(|a| a.id).collect()),
            Selection::Scope(scope) => self.scopes.get(scope).cloned().ok_or_else(|| {
                RecordError::InvalidOperation(format!("scope \"{}\" is not defined", scope))
            }),
            Selection::Attributes(names) => names
                .iter()
                .map(|name| self.id_of(name).ok_or_else(|| invalid_attribute(name)))
                .collect(),
        }
    }

    /// Map named values to ids, dropping names the model does not declare.
    #[must_use]
    pub fn from_named(&self, data: Map<String, Value>) -> AttributeMap {
        data.into_iter()
            .filter_map(|(name, value)| self.id_of(&name).map(|id| (id, value)))
            .collect()
    }

    #[must_use]
    pub fn to_named(&self, data: AttributeMap) -> Map<String, Value> {
        data.into_iter()
            .map(|(id, value)| (self.attribute(id).name.clone(), value))
            .collect()
    }

    #[must_use]
    pub fn chain(&self) -> &TransformChain {
        &self.chain
    }

    /// Input stage over this model's chain.
    pub fn input(&self, data: AttributeMap, apply_external: bool) -> (AttributeMap, ValidationErrors) {
        self.chain.input(self, data, apply_external)
    }

    /// Lookup-key input stage over this model's chain.
    pub fn lookup(&self, data: AttributeMap) -> (AttributeMap, ValidationErrors) {
        self.chain.lookup(self, data)
    }

    /// Output stage over this model's chain.
    #[must_use]
    pub fn output(&self, data: AttributeMap, options: &OutputOptions, apply_external: bool) -> AttributeMap {
        self.chain.output(self, data, options, apply_external)
    }
}

pub(crate) fn invalid_attribute(name: &str) -> RecordError {
    RecordError::InvalidOperation(format!("invalid attribute `{}`", name))
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("name", &self.name)
            .field("table", &self.table)
            .field("attributes", &self.attributes)
            .field("primary", &self.primary)
            .field("scopes", &self.scopes)
            .field("chain", &self.chain)
            .finish()
    }
}
