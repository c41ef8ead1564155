// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Variable schema application.
//!
//! Before a run starts (and before every expansion that passes variables
//! into a template), the declared schemas are applied to the provided
//! values: defaults fill gaps, required variables must be present, and
//! declared types must match.

use indexmap::IndexMap;
use meow_core::template::Template;
use meow_core::Value;
use thiserror::Error;

/// Errors from variable resolution
#[derive(Debug, Error)]
pub enum VarError {
    #[error("missing required variable '{0}'")]
    MissingRequired(String),

    #[error("variable '{name}' expected {expected}, got {actual}")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

/// Apply a template's variable schemas to provided values.
///
/// Returns the resolved environment: provided values first (validated
/// against their schema), then defaults for anything absent. Provided
/// variables without a schema pass through untouched — templates receive
/// whatever their expansion hands them.
pub fn resolve_variables(
    template: &Template,
    provided: IndexMap<String, Value>,
) -> Result<IndexMap<String, Value>, VarError> {
    let mut resolved = provided;

    for (name, schema) in &template.variables {
        match resolved.get(name) {
            Some(value) => {
                if let Some(value_type) = schema.value_type {
                    if !value_type.matches(value) {
                        return Err(VarError::TypeMismatch {
                            name: name.clone(),
                            expected: value_type.to_string(),
                            actual: value.type_name().to_string(),
                        });
                    }
                }
            }
            None => {
                if let Some(default) = &schema.default {
                    resolved.insert(name.clone(), default.clone());
                } else if schema.required {
                    return Err(VarError::MissingRequired(name.clone()));
                }
            }
        }
    }

    Ok(resolved)
}

#[cfg(test)]
#[path = "vars_tests.rs"]
mod tests;
