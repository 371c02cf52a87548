//! Execution result types.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ErrorKind, OrchestratorError, Result};

/// Lifecycle of one workflow execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Lifecycle of one step within an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl StepStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped | StepStatus::Cancelled
        )
    }
}

/// Outcome of one step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_id: String,
    pub status: StepStatus,
    pub output: Option<Value>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Agent invocations made (0 for steps that never ran).
    pub attempt_count: u32,
}

impl StepResult {
    pub(crate) fn running(step_id: impl Into<String>) -> Self {
        Self {
            step_id: step_id.into(),
            status: StepStatus::Running,
            output: None,
            error: None,
            started_at: Utc::now(),
            completed_at: None,
            attempt_count: 0,
        }
    }

    pub(crate) fn skipped(step_id: impl Into<String>, reason: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            step_id: step_id.into(),
            status: StepStatus::Skipped,
            output: None,
            error: Some(reason.into()),
            started_at: now,
            completed_at: Some(now),
            attempt_count: 0,
        }
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// Structured cause of a failed or cancelled execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionFailure {
    pub kind: ErrorKind,
    /// Step that originally failed; `None` for execution-wide causes.
    pub step_id: Option<String>,
    pub message: String,
}

impl ExecutionFailure {
    pub fn new(kind: ErrorKind, step_id: Option<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            step_id,
            message: message.into(),
        }
    }

    pub(crate) fn step(kind: ErrorKind, step_id: &str, message: impl Into<String>) -> Self {
        Self::new(kind, Some(step_id.to_string()), message)
    }

    pub(crate) fn cancelled(step_id: &str) -> Self {
        Self::step(ErrorKind::Cancelled, step_id, "Step cancelled")
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.step_id {
            Some(step_id) => write!(f, "[{}] step '{}': {}", self.kind, step_id, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

impl From<ExecutionFailure> for OrchestratorError {
    fn from(failure: ExecutionFailure) -> Self {
        match failure.step_id {
            Some(step_id) => OrchestratorError::StepExecution {
                step_id,
                kind: failure.kind,
                message: failure.message,
            },
            None => OrchestratorError::Execution(failure.message),
        }
    }
}

/// Snapshot of one workflow execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub execution_id: String,
    pub workflow_id: String,
    pub status: ExecutionStatus,
    pub step_results: BTreeMap<String, StepResult>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<ExecutionFailure>,
}

impl WorkflowResult {
    pub(crate) fn started(execution_id: impl Into<String>, workflow_id: impl Into<String>) -> Self {
        Self {
            execution_id: execution_id.into(),
            workflow_id: workflow_id.into(),
            status: ExecutionStatus::Running,
            step_results: BTreeMap::new(),
            started_at: Utc::now(),
            completed_at: None,
            error: None,
        }
    }

    pub fn step(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.get(step_id)
    }

    /// Output of a completed step.
    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.step(step_id).and_then(|result| result.output.as_ref())
    }

    pub fn step_status(&self, step_id: &str) -> Option<StepStatus> {
        self.step(step_id).map(|result| result.status)
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }

    /// `Ok(self)` when completed, otherwise the failure as an error.
    pub fn into_result(self) -> Result<Self> {
        match self.status {
            ExecutionStatus::Completed => Ok(self),
            ExecutionStatus::Running | ExecutionStatus::Paused => Err(OrchestratorError::Usage(
                format!("Execution {} has not finished", self.execution_id),
            )),
            ExecutionStatus::Failed | ExecutionStatus::Cancelled => {
                Err(self.error.map(OrchestratorError::from).unwrap_or_else(|| {
                    OrchestratorError::Execution(format!(
                        "Execution {} did not complete",
                        self.execution_id
                    ))
                }))
            }
        }
    }
}

/// Per-call execution knobs.
#[derive(Debug, Clone, Default)]
pub struct ExecutionOptions {
    /// Caller-chosen execution id; a UUID is generated otherwise.
    pub execution_id: Option<String>,
    /// Overrides the workflow timeout.
    pub timeout: Option<Duration>,
    /// Cap on simultaneously running top-level steps.
    pub concurrency: Option<usize>,
}

impl ExecutionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_execution_id(mut self, execution_id: impl Into<String>) -> Self {
        self.execution_id = Some(execution_id.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_status_terminality() {
        assert!(!ExecutionStatus::Running.is_terminal());
        assert!(!ExecutionStatus::Paused.is_terminal());
        assert!(ExecutionStatus::Cancelled.is_terminal());
        assert!(!StepStatus::Pending.is_terminal());
        assert!(StepStatus::Skipped.is_terminal());
    }

    #[test]
    fn test_into_result_completed() {
        let mut result = WorkflowResult::started("e1", "wf");
        result.status = ExecutionStatus::Completed;
        let mut step = StepResult::running("s1");
        step.status = StepStatus::Completed;
        step.output = Some(json!({"ok": true}));
        result.step_results.insert("s1".to_string(), step);

        let result = result.into_result().unwrap();
        assert_eq!(result.output("s1"), Some(&json!({"ok": true})));
        assert_eq!(result.step_status("s1"), Some(StepStatus::Completed));
    }

    #[test]
    fn test_into_result_step_failure() {
        let mut result = WorkflowResult::started("e1", "wf");
        result.status = ExecutionStatus::Failed;
        result.error = Some(ExecutionFailure::step(ErrorKind::AgentFailed, "s2", "boom"));

        match result.into_result() {
            Err(OrchestratorError::StepExecution { step_id, kind, message }) => {
                assert_eq!(step_id, "s2");
                assert_eq!(kind, ErrorKind::AgentFailed);
                assert_eq!(message, "boom");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_into_result_execution_failure() {
        let mut result = WorkflowResult::started("e1", "wf");
        result.status = ExecutionStatus::Failed;
        result.error = Some(ExecutionFailure::new(ErrorKind::Timeout, None, "timed out"));
        assert!(matches!(result.into_result(), Err(OrchestratorError::Execution(_))));
    }

    #[test]
    fn test_into_result_running_is_usage_error() {
        let result = WorkflowResult::started("e1", "wf");
        assert!(matches!(result.into_result(), Err(OrchestratorError::Usage(_))));
    }

    #[test]
    fn test_failure_display() {
        let failure = ExecutionFailure::step(ErrorKind::Timeout, "s1", "slow");
        assert_eq!(failure.to_string(), "[timeout] step 's1': slow");
    }

    #[test]
    fn test_result_serializes_snake_case() {
        let result = WorkflowResult::started("e1", "wf");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "running");
        assert_eq!(json["execution_id"], "e1");
    }

    #[test]
    fn test_skipped_step_result() {
        let skipped = StepResult::skipped("s3", "Dependency 's1' failed");
        assert_eq!(skipped.status, StepStatus::Skipped);
        assert_eq!(skipped.attempt_count, 0);
        assert_eq!(skipped.duration_ms(), Some(0));
    }
}
