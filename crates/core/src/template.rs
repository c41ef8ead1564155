// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Workflow template definitions.
//!
//! These are the parsed, un-instantiated shapes a workflow file produces:
//! a `[main]` template plus optional internal sibling templates. The engine
//! instantiates [`StepDef`]s into runtime [`Step`](crate::step::Step)s at
//! run-start and again at every expansion.

use crate::id::StepId;
use crate::step::{OnError, Step, StepPayload, StepStatus};
use crate::value::{Value, ValueType};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Declared schema for one workflow variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableSchema {
    #[serde(default)]
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(
        rename = "type",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Definition of a single step inside a template.
///
/// The payload is flattened so step tables in workflow files stay flat:
/// `executor = "shell"` next to `command = "..."`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDef {
    pub id: String,
    #[serde(flatten)]
    pub payload: StepPayload,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub needs: Vec<String>,
    #[serde(default, skip_serializing_if = "is_default_on_error")]
    pub on_error: OnError,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
}

fn is_default_on_error(on_error: &OnError) -> bool {
    *on_error == OnError::Fail
}

impl StepDef {
    /// Instantiate this definition as a pending runtime step.
    ///
    /// `namespace` is the expansion parent (children get `<parent>.<local>`
    /// ids and their `needs` rewritten into the same namespace); pass `None`
    /// at run-start. `scope` is the variable overlay the expansion provides.
    pub fn instantiate(
        &self,
        namespace: Option<&StepId>,
        scope: IndexMap<String, Value>,
    ) -> Step {
        let id = match namespace {
            Some(parent) => parent.child(&self.id),
            None => StepId::new(self.id.clone()),
        };
        let needs = self
            .needs
            .iter()
            .map(|need| match namespace {
                Some(parent) => parent.child(need),
                None => StepId::new(need.clone()),
            })
            .collect();
        Step {
            id,
            payload: self.payload.clone(),
            needs,
            status: StepStatus::Pending,
            outputs: IndexMap::new(),
            error: None,
            on_error: self.on_error.clone(),
            timeout: self.timeout.clone(),
            scope,
            expanded_from: namespace.cloned(),
            expanded_into: Vec::new(),
            attempts: 0,
        }
    }
}

/// A named template: variables plus an ordered list of step definitions.
///
/// Step order in the file is cosmetic; execution order comes from `needs`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub name: String,
    #[serde(default)]
    pub internal: bool,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub variables: IndexMap<String, VariableSchema>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<StepDef>,
}

/// A parsed workflow file: the mandatory `main` template and any internal
/// sibling templates, keyed by their table name.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct WorkflowFile {
    pub templates: IndexMap<String, Template>,
}

impl WorkflowFile {
    /// The mandatory entry template.
    pub fn main(&self) -> Option<&Template> {
        self.templates.get("main")
    }

    /// Look up a local template by name (the `.name` reference form).
    pub fn local(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }
}

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;
