// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Variable binder: `{{expr}}` resolution against a typed environment.
//!
//! The binder is the only path by which outputs of prior steps reach their
//! dependents. The cardinal rule: a template that is exactly one placeholder
//! binds to the value itself, type preserved, so an array of mappings flows
//! through a `foreach` without ever being stringified. Mixed text renders
//! each placeholder (JSON for composites) and concatenates.

use indexmap::IndexMap;
use meow_core::Value;
use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;

/// Regex for {{ expr }} placeholders
// Allow expect here as the regex is compile-time verified to be valid
#[allow(clippy::expect_used)]
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([^{}]+?)\s*\}\}").expect("constant regex pattern is valid")
});

/// Errors from variable binding
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("invalid path expression '{0}'")]
    Syntax(String),

    #[error("unknown variable '{0}'")]
    UnknownVariable(String),

    #[error("field access on non-map at '{path}' (found {actual})")]
    FieldOnNonMap { path: String, actual: String },

    #[error("index access on non-array at '{path}' (found {actual})")]
    IndexOnNonArray { path: String, actual: String },

    #[error("index {index} out of bounds at '{path}' (length {len})")]
    IndexOutOfBounds {
        path: String,
        index: usize,
        len: usize,
    },
}

/// A step's bound environment: run variables, the step's scope overlay, and
/// the `steps.<local-id>` outputs namespace, flattened into one map by the
/// scheduler before dispatch.
#[derive(Debug, Clone, Default)]
pub struct Env {
    vars: IndexMap<String, Value>,
}

impl Env {
    pub fn new(vars: IndexMap<String, Value>) -> Self {
        Self { vars }
    }

    /// Layer `overlay` on top, overriding colliding names.
    pub fn overlay(&mut self, overlay: &IndexMap<String, Value>) {
        for (key, value) in overlay {
            self.vars.insert(key.clone(), value.clone());
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Value) {
        self.vars.insert(name.into(), value);
    }

    pub fn vars(&self) -> &IndexMap<String, Value> {
        &self.vars
    }

    /// Resolve a path expression (`a.b.c`, `a[i].b`) to a value.
    pub fn lookup(&self, expr: &str) -> Result<Value, BindError> {
        let segments = parse_path(expr)?;
        let Some((first, rest)) = segments.split_first() else {
            return Err(BindError::Syntax(expr.to_string()));
        };

        let Segment::Field(root) = first else {
            return Err(BindError::Syntax(expr.to_string()));
        };
        let mut current = self
            .vars
            .get(root.as_str())
            .ok_or_else(|| BindError::UnknownVariable(root.clone()))?;

        let mut path_so_far = root.clone();
        for segment in rest {
            match segment {
                Segment::Field(name) => {
                    let map = current.as_object().ok_or_else(|| BindError::FieldOnNonMap {
                        path: path_so_far.clone(),
                        actual: current.type_name().to_string(),
                    })?;
                    current = map.get(name.as_str()).ok_or_else(|| {
                        BindError::UnknownVariable(format!("{}.{}", path_so_far, name))
                    })?;
                    path_so_far = format!("{}.{}", path_so_far, name);
                }
                Segment::Index(index) => {
                    let items =
                        current
                            .as_array()
                            .ok_or_else(|| BindError::IndexOnNonArray {
                                path: path_so_far.clone(),
                                actual: current.type_name().to_string(),
                            })?;
                    current = items.get(*index).ok_or_else(|| BindError::IndexOutOfBounds {
                        path: path_so_far.clone(),
                        index: *index,
                        len: items.len(),
                    })?;
                    path_so_far = format!("{}[{}]", path_so_far, index);
                }
            }
        }

        Ok(current.clone())
    }
}

#[derive(Debug, PartialEq)]
enum Segment {
    Field(String),
    Index(usize),
}

fn parse_path(expr: &str) -> Result<Vec<Segment>, BindError> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Err(BindError::Syntax(expr.to_string()));
    }

    let mut segments = Vec::new();
    let mut rest = expr;
    let mut expect_field = true;

    while !rest.is_empty() {
        if expect_field {
            let end = rest
                .char_indices()
                .find(|(_, c)| *c == '.' || *c == '[')
                .map(|(i, _)| i)
                .unwrap_or(rest.len());
            let name = &rest[..end];
            if name.is_empty() || !is_ident(name) {
                return Err(BindError::Syntax(expr.to_string()));
            }
            segments.push(Segment::Field(name.to_string()));
            rest = &rest[end..];
            expect_field = false;
        } else if let Some(after) = rest.strip_prefix('.') {
            rest = after;
            expect_field = true;
            if rest.is_empty() {
                return Err(BindError::Syntax(expr.to_string()));
            }
        } else if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| BindError::Syntax(expr.to_string()))?;
            let index: usize = after[..close]
                .trim()
                .parse()
                .map_err(|_| BindError::Syntax(expr.to_string()))?;
            segments.push(Segment::Index(index));
            rest = &after[close + 1..];
        } else {
            return Err(BindError::Syntax(expr.to_string()));
        }
    }

    Ok(segments)
}

fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Resolve one path expression with its type preserved.
pub fn bind_expr(env: &Env, expr: &str) -> Result<Value, BindError> {
    env.lookup(expr)
}

/// Bind a template string.
///
/// When the entire string is exactly one placeholder, the resolved value is
/// returned as-is (type preserved). Otherwise every placeholder renders to
/// its string form and the result is a string.
pub fn bind_string(env: &Env, template: &str) -> Result<Value, BindError> {
    let trimmed = template.trim();
    if let Some(captures) = PLACEHOLDER.captures(trimmed) {
        if let Some(whole) = captures.get(0) {
            if whole.start() == 0 && whole.end() == trimmed.len() {
                return env.lookup(&captures[1]);
            }
        }
    }

    let mut result = String::with_capacity(template.len());
    let mut last_end = 0;
    for captures in PLACEHOLDER.captures_iter(template) {
        let Some(whole) = captures.get(0) else {
            continue;
        };
        result.push_str(&template[last_end..whole.start()]);
        let value = env.lookup(&captures[1])?;
        result.push_str(&value.render());
        last_end = whole.end();
    }
    result.push_str(&template[last_end..]);
    Ok(Value::String(result))
}

/// Bind a template string and coerce the result to its rendered string form.
pub fn bind_to_string(env: &Env, template: &str) -> Result<String, BindError> {
    Ok(bind_string(env, template)?.render())
}

#[cfg(test)]
#[path = "binder_tests.rs"]
mod tests;
