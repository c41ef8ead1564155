// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Typed variable values.
//!
//! Everything the binder, the validator, and the state store exchange is a
//! [`Value`]. Objects preserve insertion order so a Run document round-trips
//! byte-stable, and integers stay integers across persistence (a `1` written
//! to disk never comes back as `1.0` or `"1"`).

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed workflow value.
///
/// The untagged representation means Run documents and IPC payloads read as
/// plain JSON: `{"task": {"priority": 1}, "items": [{"id": "a"}]}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    String(String),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
}

impl Value {
    /// Human-readable name of this value's type (used in error messages).
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Integer(_) | Value::Float(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "array",
            Value::Object(_) => "object",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Look up a top-level key on an object value.
    ///
    /// Non-objects have no fields; full path access (`a.b[0].c`) lives in the
    /// engine's binder.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Render the value as it appears when spliced into a string template.
    ///
    /// Scalars render bare (`hello`, `42`, `true`); composites render as
    /// compact JSON so they stay machine-parseable.
    pub fn render(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Integer(n) => n.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            composite => serde_json::to_string(composite).unwrap_or_else(|_| "null".to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render())
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

/// Declared type in an output schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    String,
    Number,
    Bool,
    Object,
    Array,
}

impl ValueType {
    /// Check whether a value conforms to this declared type.
    ///
    /// `Number` accepts both integers and floats. `Null` conforms to nothing;
    /// optional outputs are expressed through `required = false`, not null.
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ValueType::String, Value::String(_))
                | (ValueType::Number, Value::Integer(_))
                | (ValueType::Number, Value::Float(_))
                | (ValueType::Bool, Value::Bool(_))
                | (ValueType::Object, Value::Object(_))
                | (ValueType::Array, Value::Array(_))
        )
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueType::String => write!(f, "string"),
            ValueType::Number => write!(f, "number"),
            ValueType::Bool => write!(f, "bool"),
            ValueType::Object => write!(f, "object"),
            ValueType::Array => write!(f, "array"),
        }
    }
}

#[cfg(test)]
#[path = "value_tests.rs"]
mod tests;
