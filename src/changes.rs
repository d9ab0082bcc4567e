// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Pending mutations of one record: which attributes were set, and the
//! counter deltas accumulated since the last successful save.
//!
//! Deltas are kept apart from values so a save can hand them to the tiers'
//! native increments instead of overwriting concurrent updates.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::schema::AttrId;

/// A counter increment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Delta {
    Int(i64),
    Float(f64),
}

impl Delta {
    #[must_use]
    pub fn negate(self) -> Self {
        match self {
            Self::Int(n) => Self::Int(n.saturating_neg()),
            Self::Float(f) => Self::Float(-f),
        }
    }

    /// Sum of two deltas. Mixing kinds yields a float.
    #[must_use]
    pub fn combine(self, other: Delta) -> Self {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => Self::Int(a.saturating_add(b)),
            (a, b) => Self::Float(a.as_f64() + b.as_f64()),
        }
    }

    #[must_use]
    pub fn is_zero(self) -> bool {
        match self {
            Self::Int(n) => n == 0,
            Self::Float(f) => f == 0.0,
        }
    }

    #[must_use]
    pub fn as_f64(self) -> f64 {
        match self {
            Self::Int(n) => n as f64,
            Self::Float(f) => f,
        }
    }

    /// Integer form, if the delta has no fractional part.
    #[must_use]
    pub fn as_i64(self) -> Option<i64> {
        match self {
            Self::Int(n) => Some(n),
            Self::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
            Self::Float(_) => None,
        }
    }

    /// Apply to a known counter value. A missing or null value counts as zero.
    ///
    /// Returns `None` if `current` is not a number.
    #[must_use]
    pub fn apply_to(self, current: Option<&Value>) -> Option<Value> {
        let current = match current {
            None | Some(Value::Null) => return Some(self.to_value()),
            Some(Value::Number(n)) => n,
            Some(_) => return None,
        };
        match (current.as_i64(), self) {
            (Some(base), Self::Int(delta)) => Some(Value::from(base.saturating_add(delta))),
            _ => current.as_f64().map(|base| Value::from(base + self.as_f64())),
        }
    }

    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(Self::Int(i)),
                None => n.as_f64().map(Self::Float),
            },
            _ => None,
        }
    }

    #[must_use]
    pub fn to_value(self) -> Value {
        match self {
            Self::Int(n) => Value::from(n),
            Self::Float(f) => Value::from(f),
        }
    }
}

impl From<i64> for Delta {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<i32> for Delta {
    fn from(n: i32) -> Self {
        Self::Int(i64::from(n))
    }
}

impl From<f64> for Delta {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

/// Changed attributes plus accumulated counter deltas.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    changed: BTreeSet<AttrId>,
    deltas: BTreeMap<AttrId, Delta>,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&mut self, id: AttrId) {
        self.changed.insert(id);
    }

    pub fn unmark(&mut self, id: AttrId) {
        self.changed.remove(&id);
    }

    #[must_use]
    pub fn is_changed(&self, id: AttrId) -> bool {
        self.changed.contains(&id)
    }

    /// Fold `delta` into the pending delta for `id`. A delta that sums to
    /// zero is dropped.
    pub fn add_delta(&mut self, id: AttrId, delta: Delta) {
        let combined = match self.deltas.get(&id) {
            Some(existing) => existing.combine(delta),
            None => delta,
        };
        if combined.is_zero() {
            self.deltas.remove(&id);
        } else {
            self.deltas.insert(id, combined);
        }
    }

    #[must_use]
    pub fn delta(&self, id: AttrId) -> Option<Delta> {
        self.deltas.get(&id).copied()
    }

    pub fn changed(&self) -> impl Iterator<Item = AttrId> + '_ {
        self.changed.iter().copied()
    }

    pub fn deltas(&self) -> impl Iterator<Item = (AttrId, Delta)> + '_ {
        self.deltas.iter().map(|(id, delta)| (*id, *delta))
    }

    /// Nothing to save.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.deltas.is_empty()
    }

    pub fn clear(&mut self) {
        self.changed.clear();
        self.deltas.clear();
    }

    /// Clear the changed set and every delta except those of `keep`.
    pub fn retain_deltas(&mut self, keep: &[AttrId]) {
        self.changed.clear();
        self.deltas.retain(|id, _| keep.contains(id));
    }
}
