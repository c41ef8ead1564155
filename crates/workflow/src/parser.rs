// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow parsing (TOML)

use indexmap::IndexMap;
use meow_core::parse_duration;
use meow_core::step::{BranchArm, StepPayload};
use meow_core::template::{StepDef, Template, WorkflowFile};
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during workflow parsing
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("workflow has no [main] template")]
    MissingMain,

    #[error("[main] must not be marked internal")]
    InternalMain,

    #[error("duplicate step id '{step}' in template '{template}'")]
    DuplicateStep { template: String, step: String },

    #[error("step '{step}' in template '{template}' needs unknown step '{need}'")]
    UnknownNeed {
        template: String,
        step: String,
        need: String,
    },

    #[error("invalid timeout on step '{step}' in template '{template}': {message}")]
    InvalidTimeout {
        template: String,
        step: String,
        message: String,
    },

    #[error("invalid format in template '{template}': {message}")]
    InvalidFormat { template: String, message: String },
}

/// Parse and validate a workflow from TOML content.
pub fn parse_workflow(content: &str) -> Result<WorkflowFile, ParseError> {
    let templates: IndexMap<String, Template> = toml::from_str(content)?;
    let file = WorkflowFile { templates };

    let main = file.main().ok_or(ParseError::MissingMain)?;
    if main.internal {
        return Err(ParseError::InternalMain);
    }

    for (table_name, template) in &file.templates {
        validate_template(table_name, template)?;
    }

    Ok(file)
}

/// Per-template validation: unique step ids, known `needs` edges, parseable
/// timeouts, and the same checks for inline branch arms.
fn validate_template(table_name: &str, template: &Template) -> Result<(), ParseError> {
    let mut ids = HashSet::new();
    for step in &template.steps {
        if !ids.insert(step.id.as_str()) {
            return Err(ParseError::DuplicateStep {
                template: table_name.to_string(),
                step: step.id.clone(),
            });
        }
    }

    for step in &template.steps {
        for need in &step.needs {
            if !ids.contains(need.as_str()) {
                return Err(ParseError::UnknownNeed {
                    template: table_name.to_string(),
                    step: step.id.clone(),
                    need: need.clone(),
                });
            }
        }
        validate_step(table_name, step)?;
    }

    Ok(())
}

fn validate_step(table_name: &str, step: &StepDef) -> Result<(), ParseError> {
    // Dots are the expansion namespace separator
    if step.id.is_empty() || step.id.contains('.') {
        return Err(ParseError::InvalidFormat {
            template: table_name.to_string(),
            message: format!("step id '{}' must be non-empty and must not contain '.'", step.id),
        });
    }

    if let Some(timeout) = &step.timeout {
        parse_duration(timeout).map_err(|message| ParseError::InvalidTimeout {
            template: table_name.to_string(),
            step: step.id.clone(),
            message,
        })?;
    }

    if let StepPayload::Branch {
        on_true,
        on_false,
        on_timeout,
        ..
    } = &step.payload
    {
        for arm in [on_true, on_false, on_timeout].into_iter().flatten() {
            validate_branch_arm(table_name, &step.id, arm)?;
        }
    }

    Ok(())
}

/// Inline branch arms form a nested template; apply the same checks.
fn validate_branch_arm(
    table_name: &str,
    branch_step: &str,
    arm: &BranchArm,
) -> Result<(), ParseError> {
    let BranchArm::Steps(defs) = arm else {
        return Ok(());
    };

    let mut ids = HashSet::new();
    for def in defs {
        if !ids.insert(def.id.as_str()) {
            return Err(ParseError::DuplicateStep {
                template: format!("{}.{}", table_name, branch_step),
                step: def.id.clone(),
            });
        }
    }
    for def in defs {
        for need in &def.needs {
            if !ids.contains(need.as_str()) {
                return Err(ParseError::UnknownNeed {
                    template: format!("{}.{}", table_name, branch_step),
                    step: def.id.clone(),
                    need: need.clone(),
                });
            }
        }
        validate_step(table_name, def)?;
    }
    Ok(())
}

#[cfg(test)]
#[path = "parser_tests.rs"]
mod tests;
