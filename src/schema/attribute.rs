// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Attribute descriptors.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use super::AttrId;
use crate::transform::{AsyncHook, BoxFuture, InputHook, OutputHook, OutputOptions};

/// Value types an attribute can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttributeType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    Datetime,
    Json,
}

impl AttributeType {
    #[must_use]
    pub fn is_numeric(self) -> bool {
        matches!(self, Self::Integer | Self::Float)
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Datetime => "datetime",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Length bounds for strings, value bounds for numbers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
pub struct Rules {
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

impl Rules {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

/// Per-attribute transform hooks. Attached in code, never deserialized.
#[derive(Clone, Default)]
pub struct AttributeHooks {
    pub input: Option<InputHook>,
    pub output: Option<OutputHook>,
    pub fetch: Option<AsyncHook>,
    pub save: Option<AsyncHook>,
}

impl AttributeHooks {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input.is_none() && self.output.is_none() && self.fetch.is_none() && self.save.is_none()
    }
}

impl fmt::Debug for AttributeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttributeHooks")
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .field("fetch", &self.fetch.is_some())
            .field("save", &self.save.is_some())
            .finish()
    }
}

/// Declared shape of one attribute, as written in a model definition.
///
/// Deserializes from the usual option object:
///
/// ```
/// use record_sync::schema::{AttributeSpec, AttributeType};
///
/// let spec: AttributeSpec = serde_json::from_str(
///     r#"{"type": "string", "indexed": true, "cacheOnly": true, "rules": {"min": 5}}"#,
/// ).unwrap();
/// assert_eq!(spec.kind, Some(AttributeType::String));
/// assert!(spec.is_cached());
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeSpec {
    #[serde(rename = "type", default)]
    pub kind: Option<AttributeType>,
    #[serde(default)]
    pub primary: bool,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub indexed: bool,
    #[serde(default)]
    pub guarded: bool,
    #[serde(default)]
    pub hidden: bool,
    #[serde(rename = "virtual", default)]
    pub is_virtual: bool,
    #[serde(default)]
    pub counter: bool,
    /// Unset means "not cached", except for the primary key which defaults
    /// to cached.
    #[serde(default)]
    pub cache: Option<bool>,
    #[serde(default)]
    pub cache_only: bool,
    #[serde(default)]
    pub rules: Rules,
    #[serde(skip)]
    pub hooks: AttributeHooks,
}

impl AttributeSpec {
    #[must_use]
    pub fn new(kind: AttributeType) -> Self {
        Self {
            kind: Some(kind),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn primary(mut self) -> Self {
        self.primary = true;
        self
    }

    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    #[must_use]
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    #[must_use]
    pub fn guarded(mut self) -> Self {
        self.guarded = true;
        self
    }

    #[must_use]
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    #[must_use]
    pub fn virtual_attr(mut self) -> Self {
        self.is_virtual = true;
        self
    }

    #[must_use]
    pub fn counter(mut self) -> Self {
        self.counter = true;
        self
    }

    #[must_use]
    pub fn cached(mut self) -> Self {
        self.cache = Some(true);
        self
    }

    #[must_use]
    pub fn uncached(mut self) -> Self {
        self.cache = Some(false);
        self
    }

    #[must_use]
    pub fn cache_only(mut self) -> Self {
        self.cache_only = true;
        self
    }

    #[must_use]
    pub fn min(mut self, min: f64) -> Self {
        self.rules.min = Some(min);
        self
    }

    #[must_use]
    pub fn max(mut self, max: f64) -> Self {
        self.rules.max = Some(max);
        self
    }

    /// Hook run on every value entering the record.
    /// The flag is true for external (user) input.
    #[must_use]
    pub fn on_input<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value, bool) -> Value + Send + Sync + 'static,
    {
        self.hooks.input = Some(Arc::new(hook));
        self
    }

    #[must_use]
    pub fn on_output<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value, &OutputOptions, bool) -> Value + Send + Sync + 'static,
    {
        self.hooks.output = Some(Arc::new(hook));
        self
    }

    /// Async hook run on values read from a tier. An `Err` fails the fetch.
    #[must_use]
    pub fn on_fetch<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.hooks.fetch = Some(boxed_hook(hook));
        self
    }

    /// Async hook run on values about to be written. An `Err` fails the save
    /// with the message recorded under this attribute.
    #[must_use]
    pub fn on_save<F, Fut>(mut self, hook: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        self.hooks.save = Some(boxed_hook(hook));
        self
    }

    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.cache_only || self.cache.unwrap_or(self.primary)
    }
}

fn boxed_hook<F, Fut>(hook: F) -> AsyncHook
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, String>> + Send + 'static,
{
    Arc::new(move |value: Value| -> BoxFuture<'static, Result<Value, String>> { Box::pin(hook(value)) })
}

/// A resolved attribute: its id, name, and validated descriptor.
#[derive(Debug, Clone)]
pub struct Attribute {
    pub(crate) id: AttrId,
    pub(crate) name: String,
    pub(crate) kind: AttributeType,
    pub(crate) spec: AttributeSpec,
}

impl Attribute {
    #[must_use]
    pub fn id(&self) -> AttrId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> AttributeType {
        self.kind
    }

    #[must_use]
    pub fn rules(&self) -> &Rules {
        &self.spec.rules
    }

    #[must_use]
    pub fn hooks(&self) -> &AttributeHooks {
        &self.spec.hooks
    }

    #[must_use]
    pub fn is_primary(&self) -> bool {
        self.spec.primary
    }

    #[must_use]
    pub fn is_required(&self) -> bool {
        self.spec.required
    }

    #[must_use]
    pub fn is_indexed(&self) -> bool {
        self.spec.indexed
    }

    #[must_use]
    pub fn is_guarded(&self) -> bool {
        self.spec.guarded
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.spec.hidden
    }

    #[must_use]
    pub fn is_virtual(&self) -> bool {
        self.spec.is_virtual
    }

    #[must_use]
    pub fn is_counter(&self) -> bool {
        self.spec.counter
    }

    /// Held in the cache tier (always true for cache-only attributes).
    #[must_use]
    pub fn is_cached(&self) -> bool {
        self.spec.is_cached()
    }

    #[must_use]
    pub fn is_cache_only(&self) -> bool {
        self.spec.cache_only
    }

    /// Stored in the durable tier.
    #[must_use]
    pub fn is_durable(&self) -> bool {
        !self.spec.cache_only && !self.spec.is_virtual
    }

    /// Stored in some tier at all. Virtual attributes live only in memory.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !self.spec.is_virtual
    }
}
