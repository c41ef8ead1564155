// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output validator.
//!
//! Checks a candidate outputs mapping against a step's declared schema. The
//! failure message is written to be fed straight back to an agent: it names
//! every violation and the expected shape, so the re-prompt is actionable.

use indexmap::IndexMap;
use meow_core::step::OutputSchema;
use meow_core::Value;
use std::fmt;

/// All schema violations found in one candidate outputs mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFailure {
    pub reasons: Vec<String>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "output validation failed:")?;
        for reason in &self.reasons {
            writeln!(f, "- {}", reason)?;
        }
        Ok(())
    }
}

impl ValidationFailure {
    /// Message appended to the original prompt on re-injection.
    pub fn as_reprompt(&self) -> String {
        format!(
            "\n\nYour previous response did not pass output validation.\n{}\
             Report outputs again with `meow done --outputs-json '{{...}}'`.",
            self
        )
    }
}

/// Validate candidate outputs against the declared schema.
///
/// Unknown extra outputs are allowed and pass through; the schema constrains
/// only what it names.
pub fn validate_outputs(
    schema: &IndexMap<String, OutputSchema>,
    outputs: &IndexMap<String, Value>,
) -> Result<(), ValidationFailure> {
    let mut reasons = Vec::new();

    for (name, declared) in schema {
        match outputs.get(name) {
            None => {
                if declared.required {
                    reasons.push(format!(
                        "missing required output '{}' ({})",
                        name, declared.value_type
                    ));
                }
            }
            Some(value) => {
                if !declared.value_type.matches(value) {
                    reasons.push(format!(
                        "output '{}' expected {}, got {}",
                        name,
                        declared.value_type,
                        value.type_name()
                    ));
                }
            }
        }
    }

    if reasons.is_empty() {
        Ok(())
    } else {
        Err(ValidationFailure { reasons })
    }
}

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;
