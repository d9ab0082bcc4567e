// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error types for record operations.
//!
//! Tier failures are split by the tier that produced them so a caller can
//! tell whether the durable write went through:
//!
//! | Variant | Durable state |
//! |---------|---------------|
//! | [`RecordError::Durable`] | untouched, record state preserved for retry |
//! | [`RecordError::DurableIncrement`] | record written, failed counters still pending |
//! | [`RecordError::Cache`] | committed, cache may be stale |
//! | [`RecordError::Index`] | committed, index pointers may be stale |

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::storage::traits::StorageError;

/// Attribute name → message map produced by validation and transform hooks.
///
/// ```
/// use record_sync::ValidationErrors;
///
/// let mut errors = ValidationErrors::new();
/// errors.insert("bar", "attribute \"bar\" is required");
/// assert_eq!(errors.get("bar"), Some("attribute \"bar\" is required"));
/// assert_eq!(errors.to_string(), "bar: attribute \"bar\" is required");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, String>);

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build an error map holding a single message.
    #[must_use]
    pub fn single(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.insert(attribute, message);
        errors
    }

    /// Add a message. The first message recorded for an attribute wins.
    pub fn insert(&mut self, attribute: impl Into<String>, message: impl Into<String>) {
        self.0.entry(attribute.into()).or_insert_with(|| message.into());
    }

    pub fn extend(&mut self, other: ValidationErrors) {
        for (attribute, message) in other.0 {
            self.insert(attribute, message);
        }
    }

    pub fn remove(&mut self, attribute: &str) -> Option<String> {
        self.0.remove(attribute)
    }

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&str> {
        self.0.get(attribute).map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, attribute: &str) -> bool {
        self.0.contains_key(attribute)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `Ok(value)` when empty, `Err(self)` otherwise.
    pub fn into_result<T>(self, value: T) -> Result<T, ValidationErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (attribute, message) in &self.0 {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", attribute, message)?;
            first = false;
        }
        Ok(())
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ValidationErrors {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut errors = Self::new();
        for (attribute, message) in iter {
            errors.insert(attribute, message);
        }
        errors
    }
}

#[derive(Error, Debug)]
pub enum RecordError {
    /// Bad model or attribute definition. Raised at definition time only.
    #[error("invalid model definition: {0}")]
    Configuration(String),

    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Programmer error, raised before any I/O.
    #[error("{0}")]
    InvalidOperation(String),

    #[error("{model} \"{id}\" was not found")]
    NotFound { model: String, id: String },

    #[error("the model primary key \"{attribute}\" must be set")]
    PrimaryKeyRequired { attribute: String },

    /// An attribute fetch hook failed.
    #[error("fetch transform failed: {0}")]
    Hook(ValidationErrors),

    #[error("durable tier error: {0}")]
    Durable(#[source] StorageError),

    /// A durable counter increment failed after the record itself was
    /// written. The counters not yet applied stay pending on the record.
    #[error("durable counter update failed after the record was written: {0}")]
    DurableIncrement(#[source] StorageError),

    /// The cache tier failed after the durable tier committed.
    #[error("cache tier error after durable commit: {0}")]
    Cache(#[source] StorageError),

    /// Index maintenance failed after the durable tier committed.
    #[error("index error: {0}")]
    Index(#[source] StorageError),

    #[error("id generation failed: {0}")]
    IdGeneration(#[source] StorageError),
}

impl RecordError {
    /// True when the durable tier holds the write despite this error.
    #[must_use]
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::DurableIncrement(_) | Self::Cache(_) | Self::Index(_))
    }

    /// Validation messages, if this is a validation failure.
    #[must_use]
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            Self::Validation(errors) | Self::Hook(errors) => Some(errors),
            _ => None,
        }
    }
}
