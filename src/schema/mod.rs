// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Attribute descriptor sets and the model registry.
//!
//! A model is defined once and then shared read-only behind an `Arc`. Every
//! attribute name is resolved at definition time into a dense [`AttrId`], and
//! everything past the public boundary works on [`AttributeMap`]s keyed by
//! those ids rather than on strings.
//!
//! ```
//! use record_sync::schema::{AttributeSpec, AttributeType, ModelDefinition, ModelRegistry};
//!
//! let registry = ModelRegistry::builder()
//!     .define(
//!         "User",
//!         ModelDefinition::new("users")
//!             .attribute("id", AttributeSpec::new(AttributeType::String).primary())
//!             .attribute("email", AttributeSpec::new(AttributeType::String).indexed())
//!             .attribute("logins", AttributeSpec::new(AttributeType::Integer).counter()),
//!     )
//!     .unwrap()
//!     .build();
//!
//! let user = registry.model("User").unwrap();
//! assert_eq!(user.primary_key().name(), "id");
//! ```

mod attribute;
mod model;
mod registry;

pub use attribute::{Attribute, AttributeHooks, AttributeSpec, AttributeType, Rules};
pub use model::{Model, ModelDefinition};
pub use registry::{ModelRegistry, ModelRegistryBuilder};

pub(crate) use model::invalid_attribute;

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Dense per-model attribute identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AttrId(pub(crate) u16);

impl AttrId {
    #[must_use]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for AttrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Attribute values keyed by [`AttrId`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeMap(BTreeMap<AttrId, Value>);

impl AttributeMap {
    #[must_use]
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn insert(&mut self, id: AttrId, value: Value) -> Option<Value> {
        self.0.insert(id, value)
    }

    #[must_use]
    pub fn get(&self, id: AttrId) -> Option<&Value> {
        self.0.get(&id)
    }

    pub fn get_mut(&mut self, id: AttrId) -> Option<&mut Value> {
        self.0.get_mut(&id)
    }

    pub fn remove(&mut self, id: AttrId) -> Option<Value> {
        self.0.remove(&id)
    }

    #[must_use]
    pub fn contains(&self, id: AttrId) -> bool {
        self.0.contains_key(&id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = AttrId> + '_ {
        self.0.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (AttrId, &Value)> {
        self.0.iter().map(|(id, value)| (*id, value))
    }

    pub fn retain(&mut self, mut keep: impl FnMut(AttrId, &Value) -> bool) {
        self.0.retain(|id, value| keep(*id, value));
    }

    /// Copy of the entries whose id passes `keep`.
    #[must_use]
    pub fn filtered(&self, mut keep: impl FnMut(AttrId) -> bool) -> Self {
        self.iter()
            .filter(|(id, _)| keep(*id))
            .map(|(id, value)| (id, value.clone()))
            .collect()
    }

    /// Insert every entry of `other`, overwriting existing ones.
    pub fn merge(&mut self, other: AttributeMap) {
        self.0.extend(other.0);
    }
}

impl FromIterator<(AttrId, Value)> for AttributeMap {
    fn from_iter<I: IntoIterator<Item = (AttrId, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl IntoIterator for AttributeMap {
    type Item = (AttrId, Value);
    type IntoIter = btree_map::IntoIter<AttrId, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl Extend<(AttrId, Value)> for AttributeMap {
    fn extend<I: IntoIterator<Item = (AttrId, Value)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

/// Which attributes an operation touches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    /// Every declared attribute.
    #[default]
    All,
    /// A named scope declared on the model.
    Scope(String),
    /// An explicit attribute list.
    Attributes(Vec<String>),
}

impl Selection {
    #[must_use]
    pub fn scope(name: impl Into<String>) -> Self {
        Self::Scope(name.into())
    }

    pub fn attributes<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Attributes(names.into_iter().map(Into::into).collect())
    }
}
