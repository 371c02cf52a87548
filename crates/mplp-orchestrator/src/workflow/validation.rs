//! Structural validation shared by the builder, engine and orchestrator.

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;

use std::collections::{HashMap, HashSet};

use crate::error::{OrchestratorError, Result};

use super::definition::{StepType, WorkflowDefinition, WorkflowStep, MAX_RETRIES};

fn invalid(message: impl Into<String>) -> OrchestratorError {
    OrchestratorError::Definition(message.into())
}

/// Validate a complete definition.
pub(crate) fn validate_definition(definition: &WorkflowDefinition) -> Result<()> {
    if definition.id.trim().is_empty() {
        return Err(invalid("Workflow must have an id"));
    }
    if definition.name.trim().is_empty() {
        return Err(invalid("Workflow must have a valid name"));
    }
    if definition.steps.is_empty() {
        return Err(invalid("Workflow must have at least one step"));
    }
    if definition.timeout.is_some_and(|t| t.is_zero()) {
        return Err(invalid("Workflow timeout must be positive"));
    }
    if let Some(retries) = definition.retries {
        check_retries(retries, "Workflow")?;
    }

    for step in &definition.steps {
        validate_step(step)?;
    }
    check_unique_ids(&definition.steps)?;
    validate_level(&definition.steps, false)
}

/// Validate one step subtree in isolation (shape only, not sibling references).
pub(crate) fn validate_step(step: &WorkflowStep) -> Result<()> {
    if step.id.trim().is_empty() {
        return Err(invalid("Step ID cannot be empty"));
    }
    if step.name.trim().is_empty() {
        return Err(invalid(format!("Step '{}' must have a name", step.id)));
    }
    if step.timeout.is_some_and(|t| t.is_zero()) {
        return Err(invalid(format!("Step '{}' timeout must be positive", step.id)));
    }

    let mut seen = HashSet::new();
    for dependency in &step.dependencies {
        if dependency.trim().is_empty() {
            return Err(invalid(format!("Step '{}' has an empty dependency", step.id)));
        }
        if dependency == &step.id {
            return Err(invalid(format!("Step '{}' cannot depend on itself", step.id)));
        }
        if !seen.insert(dependency.as_str()) {
            return Err(invalid(format!(
                "Step '{}' lists dependency '{}' twice",
                step.id, dependency
            )));
        }
    }

    match &step.step_type {
        StepType::Agent {
            agent_id,
            action,
            retries,
            ..
        } => {
            if agent_id.trim().is_empty() {
                return Err(invalid(format!("Step '{}' has an empty agent ID", step.id)));
            }
            if action.trim().is_empty() {
                return Err(invalid(format!("Step '{}' has an empty action", step.id)));
            }
            if let Some(retries) = retries {
                check_retries(*retries, &format!("Step '{}'", step.id))?;
            }
        }
        StepType::Parallel {
            steps, concurrency, ..
        } => {
            if steps.is_empty() {
                return Err(invalid(format!(
                    "Parallel step '{}' must have at least one step",
                    step.id
                )));
            }
            if *concurrency == Some(0) {
                return Err(invalid(format!(
                    "Parallel step '{}' concurrency must be at least 1",
                    step.id
                )));
            }
        }
        StepType::Sequential { steps } => {
            if steps.is_empty() {
                return Err(invalid(format!(
                    "Sequential step '{}' must have at least one step",
                    step.id
                )));
            }
        }
        StepType::Conditional { .. } => {}
        StepType::Loop { max_iterations, .. } => {
            if *max_iterations == Some(0) {
                return Err(invalid(format!(
                    "Loop step '{}' max iterations must be at least 1",
                    step.id
                )));
            }
        }
    }

    for child in step.step_type.children() {
        validate_step(child)?;
    }
    Ok(())
}

fn check_retries(retries: u32, owner: &str) -> Result<()> {
    if retries > MAX_RETRIES {
        return Err(invalid(format!(
            "{} retries must not exceed {}",
            owner, MAX_RETRIES
        )));
    }
    Ok(())
}

/// Reject any id that appears twice anywhere in the tree.
pub(crate) fn check_unique_ids(steps: &[WorkflowStep]) -> Result<()> {
    let mut seen = HashSet::new();
    for step in steps {
        for id in step.subtree_ids() {
            if !seen.insert(id) {
                return Err(invalid(format!("Duplicate step ID: {}", id)));
            }
        }
    }
    Ok(())
}

/// Check dependency references among `siblings`, then recurse.
///
/// In an ordered level (a sequential step) dependencies may only point at
/// earlier siblings. Branches and loop bodies form levels of their own, so
/// they cannot depend on anything.
fn validate_level(siblings: &[WorkflowStep], ordered: bool) -> Result<()> {
    let positions: HashMap<&str, usize> = siblings
        .iter()
        .enumerate()
        .map(|(index, step)| (step.id.as_str(), index))
        .collect();

    for (index, step) in siblings.iter().enumerate() {
        for dependency in &step.dependencies {
            let Some(&position) = positions.get(dependency.as_str()) else {
                return Err(invalid(format!(
                    "Step '{}' depends on non-existent step '{}'",
                    step.id, dependency
                )));
            };
            if ordered && position >= index {
                return Err(invalid(format!(
                    "Step '{}' in a sequence can only depend on earlier step, not '{}'",
                    step.id, dependency
                )));
            }
        }
    }

    if !ordered {
        detect_cycle(siblings, &positions)?;
    }

    for step in siblings {
        match &step.step_type {
            StepType::Agent { .. } => {}
            StepType::Parallel { steps, .. } => validate_level(steps, false)?,
            StepType::Sequential { steps } => validate_level(steps, true)?,
            StepType::Conditional {
                then_step,
                else_step,
                ..
            } => {
                validate_level(std::slice::from_ref(then_step.as_ref()), false)?;
                if let Some(else_step) = else_step {
                    validate_level(std::slice::from_ref(else_step.as_ref()), false)?;
                }
            }
            StepType::Loop { body, .. } => {
                validate_level(std::slice::from_ref(body.as_ref()), false)?
            }
        }
    }
    Ok(())
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

fn detect_cycle(siblings: &[WorkflowStep], positions: &HashMap<&str, usize>) -> Result<()> {
    let mut marks = vec![Mark::Unvisited; siblings.len()];
    let mut path = Vec::new();

    for start in 0..siblings.len() {
        if marks[start] == Mark::Unvisited {
            visit(start, siblings, positions, &mut marks, &mut path)?;
        }
    }
    Ok(())
}

fn visit(
    index: usize,
    siblings: &[WorkflowStep],
    positions: &HashMap<&str, usize>,
    marks: &mut [Mark],
    path: &mut Vec<usize>,
) -> Result<()> {
    marks[index] = Mark::InProgress;
    path.push(index);

    for dependency in &siblings[index].dependencies {
        let Some(&next) = positions.get(dependency.as_str()) else {
            continue;
        };
        match marks[next] {
            Mark::InProgress => {
                let start = path.iter().position(|&i| i == next).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..]
                    .iter()
                    .map(|&i| siblings[i].id.as_str())
                    .collect();
                cycle.push(siblings[next].id.as_str());
                return Err(invalid(format!(
                    "Circular dependency detected: {}",
                    cycle.join(" -> ")
                )));
            }
            Mark::Unvisited => visit(next, siblings, positions, marks, path)?,
            Mark::Done => {}
        }
    }

    path.pop();
    marks[index] = Mark::Done;
    Ok(())
}
