// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use super::{AsyncHook, OutputOptions, Transform};
use crate::codec::Marshaller;
use crate::error::ValidationErrors;
use crate::schema::{AttributeHooks, AttributeMap, Model};
use crate::validate::Validator;

#[derive(Clone)]
enum Step {
    /// Strips guarded and virtual attributes from external input.
    Guard,
    /// Strips hidden attributes from external output.
    Hide,
    Marshal(Arc<dyn Marshaller>),
    /// Required attributes, validator rules and pending input errors.
    Check(Arc<dyn Validator>),
    Model(Transform),
    Attributes,
}

impl Step {
    fn label(&self) -> &str {
        match self {
            Self::Guard => "guard",
            Self::Hide => "hide",
            Self::Marshal(_) => "marshal",
            Self::Check(_) => "check",
            Self::Model(t) => t.name(),
            Self::Attributes => "attributes",
        }
    }
}

/// What the save stage needs to know about the record being saved.
#[derive(Debug, Clone, Copy)]
pub struct SaveCheck<'a> {
    pub is_new: bool,
    pub input_errors: &'a ValidationErrors,
}

/// A model's resolved stage pipeline. Cheap to clone.
#[derive(Clone)]
pub struct TransformChain {
    steps: Arc<[Step]>,
}

impl TransformChain {
    pub(crate) fn new(
        marshaller: Arc<dyn Marshaller>,
        validator: Arc<dyn Validator>,
        transforms: Vec<Transform>,
    ) -> Self {
        let mut steps = vec![
            Step::Guard,
            Step::Hide,
            Step::Marshal(marshaller),
            Step::Check(validator),
        ];
        steps.extend(transforms.into_iter().map(Step::Model));
        steps.push(Step::Attributes);
        Self { steps: steps.into() }
    }

    /// Run the input stage. Values the marshaller rejects are dropped and
    /// their messages returned alongside the accepted data.
    pub fn input(&self, model: &Model, data: AttributeMap, apply_external: bool) -> (AttributeMap, ValidationErrors) {
        self.run_input(model, data, apply_external, apply_external)
    }

    /// Input stage for lookup keys: values are coerced the way external
    /// input is, but guarded and virtual attributes are kept.
    pub fn lookup(&self, model: &Model, data: AttributeMap) -> (AttributeMap, ValidationErrors) {
        self.run_input(model, data, false, true)
    }

    fn run_input(&self, model: &Model, mut data: AttributeMap, guard: bool, apply_external: bool) -> (AttributeMap, ValidationErrors) {
        let mut errors = ValidationErrors::new();

        for step in self.steps.iter() {
            data = match step {
                Step::Guard if guard => {
                    data.retain(|id, _| {
                        let attribute = model.attribute(id);
                        !(attribute.is_guarded() || attribute.is_virtual())
                    });
                    data
                }
                Step::Marshal(marshaller) if apply_external => {
                    let mut accepted = AttributeMap::new();
                    for (id, value) in data {
                        let attribute = model.attribute(id);
                        match marshaller.unserialize(attribute, value) {
                            Ok(value) => {
                                accepted.insert(id, value);
                            }
                            Err(message) => errors.insert(attribute.name(), message),
                        }
                    }
                    accepted
                }
                Step::Model(transform) => match &transform.input {
                    Some(f) => f(data, model),
                    None => data,
                },
                Step::Attributes => map_hooks(model, data, |hooks| hooks.input.as_ref(), |hook, value| {
                    hook(value, apply_external)
                }),
                _ => data,
            };
        }

        (data, errors)
    }

    /// Run the output stage, last step first.
    pub fn output(&self, model: &Model, mut data: AttributeMap, options: &OutputOptions, apply_external: bool) -> AttributeMap {
        for step in self.steps.iter().rev() {
            data = match step {
                Step::Attributes => map_hooks(model, data, |hooks| hooks.output.as_ref(), |hook, value| {
                    hook(value, options, apply_external)
                }),
                Step::Model(transform) => match &transform.output {
                    Some(f) => f(data, model, options),
                    None => data,
                },
                Step::Marshal(marshaller) if apply_external => data
                    .into_iter()
                    .map(|(id, value)| (id, marshaller.serialize(model.attribute(id), value)))
                    .collect(),
                Step::Hide if apply_external => {
                    data.retain(|id, _| !model.attribute(id).is_hidden());
                    data
                }
                _ => data,
            };
        }
        data
    }

    /// Run the fetch stage over values read from a tier.
    pub async fn fetch(&self, model: &Model, mut data: AttributeMap, permits: &Arc<Semaphore>) -> Result<AttributeMap, ValidationErrors> {
        for step in self.steps.iter() {
            match step {
                Step::Model(transform) => {
                    if let Some(f) = &transform.fetch {
                        data = f(data, model);
                    }
                }
                Step::Attributes => {
                    data = run_async_hooks(model, data, |hooks| hooks.fetch.as_ref(), permits).await?;
                }
                _ => {}
            }
        }
        Ok(data)
    }

    /// Run the save stage. The first failing step ends the stage.
    pub async fn save(
        &self,
        model: &Model,
        data: AttributeMap,
        check: SaveCheck<'_>,
        permits: &Arc<Semaphore>,
    ) -> Result<AttributeMap, ValidationErrors> {
        self.check(model, &data, check)?;
        self.transform(model, data, permits).await
    }

    /// First half of the save stage: required attributes, validator rules
    /// and pending input errors. A new record's primary key is not checked,
    /// since one is generated when missing.
    pub fn check(&self, model: &Model, data: &AttributeMap, check: SaveCheck<'_>) -> Result<(), ValidationErrors> {
        for step in self.steps.iter() {
            if let Step::Check(validator) = step {
                check_values(model, data, check, validator.as_ref())?;
            }
        }
        Ok(())
    }

    /// Second half of the save stage: model save transforms, then attribute
    /// save hooks.
    pub async fn transform(&self, model: &Model, mut data: AttributeMap, permits: &Arc<Semaphore>) -> Result<AttributeMap, ValidationErrors> {
        for step in self.steps.iter() {
            match step {
                Step::Model(transform) => {
                    if let Some(f) = &transform.save {
                        data = f(data, model).await?;
                    }
                }
                Step::Attributes => {
                    data = run_async_hooks(model, data, |hooks| hooks.save.as_ref(), permits).await?;
                }
                _ => {}
            }
        }
        Ok(data)
    }
}

impl fmt::Debug for TransformChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.steps.iter().map(Step::label)).finish()
    }
}

fn check_values(
    model: &Model,
    data: &AttributeMap,
    check: SaveCheck<'_>,
    validator: &dyn Validator,
) -> Result<(), ValidationErrors> {
    let mut errors = check.input_errors.clone();

    if check.is_new {
        let pk = model.primary_key().id();
        for attribute in model.attributes().filter(|a| a.is_required() && a.id() != pk) {
            let missing = data.get(attribute.id()).map_or(true, |v| v.is_null());
            if missing {
                errors.insert(attribute.name(), format!("attribute \"{}\" is required", attribute.name()));
            }
        }
    }

    // Counter entries may be pending deltas rather than values.
    let plain = data.filtered(|id| !model.attribute(id).is_counter());
    if let Some(found) = validator.validate(model, &plain) {
        errors.extend(found);
    }

    errors.into_result(())
}

fn map_hooks<'h, H: ?Sized + 'h>(
    model: &'h Model,
    data: AttributeMap,
    select: impl Fn(&'h AttributeHooks) -> Option<&'h Arc<H>>,
    apply: impl Fn(&H, Value) -> Value,
) -> AttributeMap {
    data.into_iter()
        .map(|(id, value)| match select(model.attribute(id).hooks()) {
            Some(hook) => (id, apply(hook, value)),
            None => (id, value),
        })
        .collect()
}

/// Fan attribute hooks out as tasks, at most `permits` at a time.
///
/// Attributes without a hook pass through. The first failure aborts the
/// remaining tasks.
async fn run_async_hooks(
    model: &Model,
    data: AttributeMap,
    select: impl Fn(&AttributeHooks) -> Option<&AsyncHook>,
    permits: &Arc<Semaphore>,
) -> Result<AttributeMap, ValidationErrors> {
    let mut out = AttributeMap::new();
    let mut tasks = JoinSet::new();

    for (id, value) in data {
        match select(model.attribute(id).hooks()) {
            Some(hook) => {
                let hook = Arc::clone(hook);
                let permits = Arc::clone(permits);
                tasks.spawn(async move {
                    // A closed semaphore only means nobody is limiting us.
                    let _permit = permits.acquire_owned().await.ok();
                    (id, hook(value).await)
                });
            }
            None => {
                out.insert(id, value);
            }
        }
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((id, Ok(value))) => {
                out.insert(id, value);
            }
            Ok((id, Err(message))) => {
                tasks.abort_all();
                let name = model.attribute(id).name();
                debug!(model = %model.name(), attribute = %name, "Attribute hook failed: {}", message);
                return Err(ValidationErrors::single(name, message));
            }
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => {
                tasks.abort_all();
                return Err(ValidationErrors::single(model.name(), format!("hook task failed: {}", err)));
            }
        }
    }

    Ok(out)
}
