//! Bookkeeping for one in-flight execution.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::{Map, Value};

use mplp_core::EventBus;

use super::execution::{ExecutionFailure, StepStatus};
use super::record::ExecutionRecord;
use crate::agent::AgentInput;
use crate::events::{ProgressUpdate, WorkflowEvent};
use crate::workflow::{ConditionError, ExecutionContext, Predicate, WorkflowDefinition, WorkflowStep};

/// State threaded through every step future of one execution.
pub(crate) struct RunContext {
    pub(crate) execution_id: String,
    pub(crate) workflow_id: String,
    pub(crate) workflow_retries: Option<u32>,
    pub(crate) record: Arc<ExecutionRecord>,
    context: RwLock<ExecutionContext>,
    total_steps: usize,
    events: Arc<EventBus<WorkflowEvent>>,
}

impl RunContext {
    pub(crate) fn new(
        execution_id: &str,
        workflow: &WorkflowDefinition,
        parameters: Map<String, Value>,
        record: Arc<ExecutionRecord>,
        events: Arc<EventBus<WorkflowEvent>>,
    ) -> Self {
        Self {
            execution_id: execution_id.to_string(),
            workflow_id: workflow.id.clone(),
            workflow_retries: workflow.retries,
            record,
            context: RwLock::new(ExecutionContext::new(
                execution_id,
                workflow.id.clone(),
                parameters,
            )),
            total_steps: workflow.step_count(),
            events,
        }
    }

    pub(crate) fn emit(&self, event: WorkflowEvent) {
        self.events.emit(&event);
    }

    fn progress(&self, step_id: &str, status: StepStatus) {
        self.emit(WorkflowEvent::Progress(ProgressUpdate {
            execution_id: self.execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            step_id: step_id.to_string(),
            status,
            completed: self.record.finished_steps(),
            total: self.total_steps,
        }));
    }

    pub(crate) fn step_started(&self, step: &WorkflowStep) {
        self.record.start_step(&step.id);
        self.emit(WorkflowEvent::StepStarted {
            execution_id: self.execution_id.clone(),
            step_id: step.id.clone(),
        });
        self.progress(&step.id, StepStatus::Running);
    }

    pub(crate) fn step_completed(&self, step: &WorkflowStep, output: Value) {
        self.context.write().record_output(&step.id, output.clone());
        let result = self.record.complete_step(&step.id, output);
        self.emit(WorkflowEvent::StepCompleted {
            execution_id: self.execution_id.clone(),
            result,
        });
        self.progress(&step.id, StepStatus::Completed);
    }

    /// Record `failure` against `step`. A failure raised by a descendant is
    /// recorded on the parent with the child named in the message.
    pub(crate) fn step_failed(&self, step: &WorkflowStep, failure: &ExecutionFailure) {
        let result = match failure.step_id.as_deref() {
            Some(origin) if origin != step.id => {
                let mut wrapped = failure.clone();
                wrapped.message = format!("Child step '{}' failed: {}", origin, failure.message);
                self.record.fail_step(&step.id, &wrapped)
            }
            _ => self.record.fail_step(&step.id, failure),
        };
        let status = result.status;
        self.emit(WorkflowEvent::StepFailed {
            execution_id: self.execution_id.clone(),
            result,
            failure: failure.clone(),
        });
        self.progress(&step.id, status);
    }

    pub(crate) fn step_retrying(&self, step_id: &str, attempt: u32, delay: Duration, error: &str) {
        self.emit(WorkflowEvent::StepRetrying {
            execution_id: self.execution_id.clone(),
            step_id: step_id.to_string(),
            attempt,
            delay_ms: u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error: error.to_string(),
        });
    }

    /// Mark every step in `step`'s subtree that has no result yet as skipped.
    pub(crate) fn skip_subtree(&self, step: &WorkflowStep, reason: &str) {
        for step_id in step.subtree_ids() {
            if self.record.has_step(step_id) {
                continue;
            }
            let result = self.record.skip_step(step_id, reason);
            self.emit(WorkflowEvent::StepSkipped {
                execution_id: self.execution_id.clone(),
                result,
            });
            self.progress(step_id, StepStatus::Skipped);
        }
    }

    pub(crate) fn agent_input(&self, step_id: &str, step_parameters: &Map<String, Value>) -> AgentInput {
        let context = self.context.read();
        let mut parameters = context.parameters.clone();
        parameters.extend(step_parameters.clone());
        AgentInput {
            execution_id: self.execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            step_id: step_id.to_string(),
            parameters,
            outputs: context.outputs.clone(),
        }
    }

    pub(crate) fn evaluate(&self, predicate: &Predicate) -> Result<bool, ConditionError> {
        let context = self.context.read();
        predicate.evaluate(&context)
    }

    pub(crate) fn set_iteration(&self, loop_id: &str, count: u32) {
        self.context.write().set_iteration(loop_id, count);
    }
}
