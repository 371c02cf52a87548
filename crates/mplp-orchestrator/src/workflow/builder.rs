//! Fluent workflow builder.

#[cfg(test)]
#[path = "builder_tests.rs"]
mod tests;

use std::collections::HashSet;
use std::time::Duration;

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::{OrchestratorError, Result};

use super::condition::Predicate;
use super::definition::{WorkflowDefinition, WorkflowStep, MAX_RETRIES};
use super::validation;

/// Builds a [`WorkflowDefinition`], validating every call as it is made.
///
/// ```ignore
/// let workflow = WorkflowBuilder::new("Review")
///     .agent("draft", "Draft", "writer", "write")?
///     .step(WorkflowStep::agent("review", "Review", "critic", "review").depends_on(["draft"]))?
///     .build()?;
/// ```
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    id: String,
    name: String,
    description: Option<String>,
    version: Option<String>,
    steps: Vec<WorkflowStep>,
    timeout: Option<Duration>,
    retries: Option<u32>,
    metadata: Map<String, Value>,
    step_ids: HashSet<String>,
}

impl WorkflowBuilder {
    /// Start a workflow with a generated id.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_id(name, Uuid::new_v4().to_string())
    }

    pub fn with_id(name: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: None,
            steps: Vec::new(),
            timeout: None,
            retries: None,
            metadata: Map::new(),
            step_ids: HashSet::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Result<Self> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(OrchestratorError::Definition(
                "Workflow version cannot be empty".to_string(),
            ));
        }
        self.version = Some(version);
        Ok(self)
    }

    /// Merge `metadata` into the existing metadata; later keys win.
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Result<Self> {
        if timeout.is_zero() {
            return Err(OrchestratorError::Definition(
                "Workflow timeout must be positive".to_string(),
            ));
        }
        self.timeout = Some(timeout);
        Ok(self)
    }

    pub fn retries(mut self, retries: u32) -> Result<Self> {
        if retries > MAX_RETRIES {
            return Err(OrchestratorError::Definition(format!(
                "Workflow retries must not exceed {}",
                MAX_RETRIES
            )));
        }
        self.retries = Some(retries);
        Ok(self)
    }

    /// Add a step of any kind.
    pub fn step(mut self, step: WorkflowStep) -> Result<Self> {
        validation::validate_step(&step)?;

        let mut incoming = HashSet::new();
        for id in step.subtree_ids() {
            if self.step_ids.contains(id) || !incoming.insert(id) {
                return Err(OrchestratorError::Definition(format!(
                    "Duplicate step ID: {}",
                    id
                )));
            }
        }

        self.step_ids
            .extend(incoming.into_iter().map(str::to_string));
        self.steps.push(step);
        Ok(self)
    }

    pub fn agent(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        agent_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Result<Self> {
        self.step(WorkflowStep::agent(id, name, agent_id, action))
    }

    pub fn parallel(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> Result<Self> {
        self.step(WorkflowStep::parallel(id, name, steps))
    }

    pub fn sequential(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> Result<Self> {
        self.step(WorkflowStep::sequential(id, name, steps))
    }

    pub fn condition(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: Predicate,
        then_step: WorkflowStep,
        else_step: Option<WorkflowStep>,
    ) -> Result<Self> {
        self.step(WorkflowStep::conditional(
            id, name, predicate, then_step, else_step,
        ))
    }

    pub fn repeat(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: Predicate,
        body: WorkflowStep,
        max_iterations: Option<u32>,
    ) -> Result<Self> {
        self.step(WorkflowStep::repeat(
            id,
            name,
            predicate,
            body,
            max_iterations,
        ))
    }

    /// Validate the whole graph and return an owned definition.
    pub fn build(&self) -> Result<WorkflowDefinition> {
        let definition = WorkflowDefinition {
            id: self.id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            version: self.version.clone(),
            steps: self.steps.clone(),
            timeout: self.timeout,
            retries: self.retries,
            metadata: self.metadata.clone(),
        };
        definition.validate()?;
        Ok(definition)
    }
}
