// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Value transform pipeline.
//!
//! Every value crossing a boundary passes through one of four stages:
//!
//! | Stage | When | Direction | Sync |
//! |-------|------|-----------|------|
//! | `input` | values set on a record | forward | yes |
//! | `output` | values read off a record | reverse | yes |
//! | `fetch` | values read from a tier | forward | no |
//! | `save` | values about to be written | forward | no |
//!
//! A model's chain is resolved once at definition:
//!
//! ```text
//! [guard, hide, marshal, check, model transforms..., attribute hooks]
//! ```
//!
//! Running `output` in reverse means attribute hooks see internal values
//! first and the marshaller and hidden-attribute filter run last.

mod chain;

pub use chain::{SaveCheck, TransformChain};

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use crate::error::ValidationErrors;
use crate::schema::{AttributeMap, Model};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Model-level input or fetch transform.
pub type ModelHook = Arc<dyn Fn(AttributeMap, &Model) -> AttributeMap + Send + Sync>;
/// Model-level output transform.
pub type ModelOutputHook = Arc<dyn Fn(AttributeMap, &Model, &OutputOptions) -> AttributeMap + Send + Sync>;
/// Model-level save transform. An `Err` fails the save.
pub type ModelSaveHook =
    Arc<dyn Fn(AttributeMap, &Model) -> BoxFuture<'static, Result<AttributeMap, ValidationErrors>> + Send + Sync>;

/// Attribute input hook. The flag is true for external input.
pub type InputHook = Arc<dyn Fn(Value, bool) -> Value + Send + Sync>;
/// Attribute output hook. The flag is true for external output.
pub type OutputHook = Arc<dyn Fn(Value, &OutputOptions, bool) -> Value + Send + Sync>;
/// Attribute fetch or save hook. `Err` carries the message for the attribute.
pub type AsyncHook = Arc<dyn Fn(Value) -> BoxFuture<'static, Result<Value, String>> + Send + Sync>;

/// Caller-supplied context forwarded to output transforms.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutputOptions {
    pub context: Value,
}

impl OutputOptions {
    #[must_use]
    pub fn with_context(context: Value) -> Self {
        Self { context }
    }
}

/// A model-level transform. Any stage left unset passes values through.
///
/// ```
/// use record_sync::transform::Transform;
///
/// let trim = Transform::new("trim").on_input(|mut data, model| {
///     if let Some(id) = model.id_of("name") {
///         if let Some(serde_json::Value::String(s)) = data.get_mut(id) {
///             *s = s.trim().to_string();
///         }
///     }
///     data
/// });
/// assert_eq!(trim.name(), "trim");
/// ```
#[derive(Clone, Default)]
pub struct Transform {
    name: String,
    pub(crate) input: Option<ModelHook>,
    pub(crate) output: Option<ModelOutputHook>,
    pub(crate) fetch: Option<ModelHook>,
    pub(crate) save: Option<ModelSaveHook>,
}

impl Transform {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn on_input<F>(mut self, f: F) -> Self
    where
        F: Fn(AttributeMap, &Model) -> AttributeMap + Send + Sync + 'static,
    {
        self.input = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_output<F>(mut self, f: F) -> Self
    where
        F: Fn(AttributeMap, &Model, &OutputOptions) -> AttributeMap + Send + Sync + 'static,
    {
        self.output = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_fetch<F>(mut self, f: F) -> Self
    where
        F: Fn(AttributeMap, &Model) -> AttributeMap + Send + Sync + 'static,
    {
        self.fetch = Some(Arc::new(f));
        self
    }

    #[must_use]
    pub fn on_save<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(AttributeMap, &Model) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<AttributeMap, ValidationErrors>> + Send + 'static,
    {
        let hook: ModelSaveHook = Arc::new(
            move |data: AttributeMap, model: &Model| -> BoxFuture<'static, Result<AttributeMap, ValidationErrors>> {
                Box::pin(f(data, model))
            },
        );
        self.save = Some(hook);
        self
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .field("input", &self.input.is_some())
            .field("output", &self.output.is_some())
            .field("fetch", &self.fetch.is_some())
            .field("save", &self.save.is_some())
            .finish()
    }
}
