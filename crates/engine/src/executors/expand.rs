// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Expansion planning for expand, foreach, and branch steps.
//!
//! Planning is pure: given a template and a scope, produce the children
//! steps. The scheduler inserts them into the Run and persists in one write,
//! so a crash leaves either no children or all of them (idempotent
//! re-expansion is then a matter of running the same pure function again).

use indexmap::IndexMap;
use meow_core::step::{BranchArm, Step};
use meow_core::template::Template;
use meow_core::{StepId, Value};

/// Instantiate a template's steps as children of `parent`.
///
/// Child ids are `<parent>.<local>`, `needs` edges are rewritten into the
/// same namespace, and every child carries `scope` as its variable overlay.
pub fn plan_template(
    template: &Template,
    parent: &StepId,
    scope: IndexMap<String, Value>,
) -> Vec<Step> {
    template
        .steps
        .iter()
        .map(|def| def.instantiate(Some(parent), scope.clone()))
        .collect()
}

/// Instantiate one foreach iteration: the template's steps get ids under
/// `<parent>.<index>` with `{item_var: item, index_var: index}` layered onto
/// the scope.
///
/// The iteration prefix namespaces ids (and within-iteration `needs`) only.
/// No `<parent>.<index>` step exists; every created step links back to the
/// foreach step itself via `expanded_from`, so completion cascades reach it.
pub fn plan_iteration(
    template: &Template,
    parent: &StepId,
    base_scope: &IndexMap<String, Value>,
    item_var: &str,
    item: Value,
    index_var: &str,
    index: usize,
) -> Vec<Step> {
    let mut scope = base_scope.clone();
    scope.insert(item_var.to_string(), item);
    scope.insert(index_var.to_string(), Value::Integer(index as i64));
    let id_namespace = parent.child(&index.to_string());
    template
        .steps
        .iter()
        .map(|def| {
            let mut step = def.instantiate(Some(&id_namespace), scope.clone());
            step.expanded_from = Some(parent.clone());
            step
        })
        .collect()
}

/// Instantiate an inline branch arm under the branch step.
pub fn plan_inline_arm(
    arm: &[meow_core::template::StepDef],
    parent: &StepId,
    scope: IndexMap<String, Value>,
) -> Vec<Step> {
    arm.iter()
        .map(|def| def.instantiate(Some(parent), scope.clone()))
        .collect()
}

/// Whether an arm expands to nothing ("no children, immediately done").
pub fn arm_is_empty(arm: Option<&BranchArm>) -> bool {
    match arm {
        None => true,
        Some(BranchArm::Steps(defs)) => defs.is_empty(),
        Some(BranchArm::Template(_)) => false,
    }
}

#[cfg(test)]
#[path = "expand_tests.rs"]
mod tests;
