//! Per-execution state visible to predicates.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Execution context shared by the steps of one run.
///
/// Each step writes only under its own id, so concurrently running steps
/// never contend on the same key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: String,
    pub workflow_id: String,
    /// Caller-supplied workflow parameters.
    pub parameters: Map<String, Value>,
    /// Latest output of every completed step.
    pub outputs: HashMap<String, Value>,
    /// Completed body iterations per loop step.
    pub iterations: HashMap<String, u32>,
}

impl ExecutionContext {
    pub fn new(
        execution_id: impl Into<String>,
        workflow_id: impl Into<String>,
        parameters: Map<String, Value>,
    ) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            parameters,
            outputs: HashMap::new(),
            iterations: HashMap::new(),
        }
    }

    /// Get a step output, falling back to a workflow parameter.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.outputs.get(key).or_else(|| self.parameters.get(key))
    }

    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }

    /// Whether `step_id` has completed at least once.
    pub fn has_output(&self, step_id: &str) -> bool {
        self.outputs.contains_key(step_id)
    }

    /// Iterations completed so far by loop `loop_id`.
    pub fn iteration(&self, loop_id: &str) -> u32 {
        self.iterations.get(loop_id).copied().unwrap_or(0)
    }

    pub(crate) fn record_output(&mut self, step_id: &str, output: Value) {
        self.outputs.insert(step_id.to_string(), output);
    }

    pub(crate) fn set_iteration(&mut self, loop_id: &str, count: u32) {
        self.iterations.insert(loop_id.to_string(), count);
    }
}
