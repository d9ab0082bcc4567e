// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Conversion between wire values and internal attribute values.
//!
//! The input stage unserializes external values into the canonical internal
//! form for the attribute's type; the output stage serializes them back.
//!
//! | Type | Accepted on input | Internal form | External output |
//! |------|-------------------|---------------|-----------------|
//! | string | string, number, bool | string | string |
//! | integer | integral number, numeric string | i64 | i64 |
//! | float | number, numeric string | f64 | f64 |
//! | boolean | bool, `"true"`/`"false"` | bool | bool |
//! | date | `YYYY-MM-DD`, RFC 3339, epoch millis | `YYYY-MM-DD` | `YYYY-MM-DD` |
//! | datetime | RFC 3339, epoch millis | RFC 3339 (UTC, millis) | epoch millis |
//! | json | anything | as given | as given |
//!
//! `null` passes through unchanged for every type.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde_json::Value;

use crate::schema::{Attribute, AttributeType};

/// Marshalling capability injected into the input and output stages.
pub trait Marshaller: Send + Sync {
    /// Internal → external.
    fn serialize(&self, attribute: &Attribute, value: Value) -> Value;

    /// External → internal. `Err` carries the message recorded against the
    /// attribute.
    fn unserialize(&self, attribute: &Attribute, value: Value) -> Result<Value, String>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonMarshaller;

impl Marshaller for JsonMarshaller {
    fn serialize(&self, attribute: &Attribute, value: Value) -> Value {
        match (attribute.kind(), &value) {
            (AttributeType::Datetime, Value::String(s)) => match parse_datetime(s) {
                Some(dt) => Value::from(dt.timestamp_millis()),
                None => value,
            },
            _ => value,
        }
    }

    fn unserialize(&self, attribute: &Attribute, value: Value) -> Result<Value, String> {
        if value.is_null() {
            return Ok(value);
        }
        let kind = attribute.kind();
        coerce(kind, value).ok_or_else(|| type_error(attribute.name(), kind))
    }
}

fn type_error(name: &str, kind: AttributeType) -> String {
    format!("attribute \"{}\" must be a {}", name, kind)
}

fn coerce(kind: AttributeType, value: Value) -> Option<Value> {
    match kind {
        AttributeType::String => match value {
            Value::String(_) => Some(value),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        AttributeType::Integer => match &value {
            Value::Number(n) => match n.as_i64() {
                Some(_) => Some(value),
                None => n.as_f64().and_then(integral).map(Value::from),
            },
            Value::String(s) => s.trim().parse::<i64>().ok().map(Value::from),
            _ => None,
        },
        AttributeType::Float => match &value {
            Value::Number(n) => n.as_f64().map(Value::from),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::from),
            _ => None,
        },
        AttributeType::Boolean => match &value {
            Value::Bool(_) => Some(value),
            Value::String(s) => match s.as_str() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        AttributeType::Datetime => {
            let dt = match &value {
                Value::Number(n) => n.as_i64().and_then(DateTime::from_timestamp_millis),
                Value::String(s) => parse_datetime(s),
                _ => None,
            }?;
            Some(Value::String(dt.to_rfc3339_opts(SecondsFormat::Millis, true)))
        }
        AttributeType::Date => {
            let date = match &value {
                Value::Number(n) => n
                    .as_i64()
                    .and_then(DateTime::from_timestamp_millis)
                    .map(|dt| dt.date_naive()),
                Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .or_else(|| parse_datetime(s).map(|dt| dt.date_naive())),
                _ => None,
            }?;
            Some(Value::String(date.format("%Y-%m-%d").to_string()))
        }
        AttributeType::Json => Some(value),
    }
}

fn integral(f: f64) -> Option<i64> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(f as i64)
    } else {
        None
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}
