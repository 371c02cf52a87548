//! Live state of one execution: its result snapshot and control signals.

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::execution::{
    ExecutionFailure, ExecutionStatus, StepResult, StepStatus, WorkflowResult,
};
use crate::error::ErrorKind;

/// Why an execution's token was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CancelReason {
    User,
    Timeout,
    /// The future driving the execution was dropped.
    Dropped,
}

/// Cooperative control for one execution.
pub(crate) struct ExecutionControl {
    token: CancellationToken,
    reason: Mutex<Option<CancelReason>>,
    paused: watch::Sender<bool>,
}

impl ExecutionControl {
    fn new() -> Self {
        let (paused, _) = watch::channel(false);
        Self {
            token: CancellationToken::new(),
            reason: Mutex::new(None),
            paused,
        }
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Cancel the execution. The first reason recorded wins.
    pub(crate) fn cancel(&self, reason: CancelReason) {
        self.reason.lock().get_or_insert(reason);
        self.token.cancel();
    }

    pub(crate) fn cancel_reason(&self) -> Option<CancelReason> {
        *self.reason.lock()
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.send_replace(paused);
    }

    /// Block while paused. Returns `false` if `scope` is cancelled first.
    pub(crate) async fn wait_if_paused(&self, scope: &CancellationToken) -> bool {
        let mut paused = self.paused.subscribe();
        loop {
            if scope.is_cancelled() {
                return false;
            }
            if !*paused.borrow_and_update() {
                return true;
            }
            tokio::select! {
                _ = scope.cancelled() => return false,
                changed = paused.changed() => {
                    if changed.is_err() {
                        return true;
                    }
                }
            }
        }
    }
}

/// Shared record for one execution, kept in the engine's execution map.
pub(crate) struct ExecutionRecord {
    pub(crate) sequence: u64,
    pub(crate) control: ExecutionControl,
    result: RwLock<WorkflowResult>,
}

impl ExecutionRecord {
    pub(crate) fn new(sequence: u64, execution_id: &str, workflow_id: &str) -> Self {
        Self {
            sequence,
            control: ExecutionControl::new(),
            result: RwLock::new(WorkflowResult::started(execution_id, workflow_id)),
        }
    }

    pub(crate) fn snapshot(&self) -> WorkflowResult {
        self.result.read().clone()
    }

    pub(crate) fn status(&self) -> ExecutionStatus {
        self.result.read().status
    }

    /// Apply `transition` to the status under the write lock.
    pub(crate) fn transition<F>(&self, transition: F) -> Result<ExecutionStatus, ExecutionStatus>
    where
        F: FnOnce(ExecutionStatus) -> Option<ExecutionStatus>,
    {
        let mut result = self.result.write();
        match transition(result.status) {
            Some(next) => {
                result.status = next;
                Ok(next)
            }
            None => Err(result.status),
        }
    }

    /// Number of steps in a terminal state.
    pub(crate) fn finished_steps(&self) -> usize {
        self.result
            .read()
            .step_results
            .values()
            .filter(|step| step.status.is_terminal())
            .count()
    }

    pub(crate) fn has_step(&self, step_id: &str) -> bool {
        self.result.read().step_results.contains_key(step_id)
    }

    pub(crate) fn step_status(&self, step_id: &str) -> Option<StepStatus> {
        self.result.read().step_results.get(step_id).map(|step| step.status)
    }

    /// Mark every step still running as cancelled. Returns the affected ids.
    pub(crate) fn cancel_running_steps(&self) -> Vec<String> {
        let mut result = self.result.write();
        let now = Utc::now();
        let mut cancelled = Vec::new();
        for step in result.step_results.values_mut() {
            if !step.status.is_terminal() {
                step.status = StepStatus::Cancelled;
                step.error = Some("Step cancelled".to_string());
                step.completed_at = Some(now);
                cancelled.push(step.step_id.clone());
            }
        }
        cancelled
    }

    pub(crate) fn start_step(&self, step_id: &str) -> StepResult {
        let step = StepResult::running(step_id);
        self.result
            .write()
            .step_results
            .insert(step_id.to_string(), step.clone());
        step
    }

    pub(crate) fn set_attempts(&self, step_id: &str, attempts: u32) {
        if let Some(step) = self.result.write().step_results.get_mut(step_id) {
            step.attempt_count = attempts;
        }
    }

    pub(crate) fn complete_step(&self, step_id: &str, output: Value) -> StepResult {
        self.finish_step(step_id, |step| {
            step.status = StepStatus::Completed;
            step.output = Some(output);
            step.error = None;
        })
    }

    /// Record a failure. Cancellation marks the step `cancelled`, anything
    /// else `failed`.
    pub(crate) fn fail_step(&self, step_id: &str, failure: &ExecutionFailure) -> StepResult {
        self.finish_step(step_id, |step| {
            step.status = if failure.kind == ErrorKind::Cancelled {
                StepStatus::Cancelled
            } else {
                StepStatus::Failed
            };
            step.error = Some(failure.message.clone());
        })
    }

    pub(crate) fn skip_step(&self, step_id: &str, reason: &str) -> StepResult {
        let step = StepResult::skipped(step_id, reason);
        self.result
            .write()
            .step_results
            .insert(step_id.to_string(), step.clone());
        step
    }

    fn finish_step<F>(&self, step_id: &str, apply: F) -> StepResult
    where
        F: FnOnce(&mut StepResult),
    {
        let mut result = self.result.write();
        let step = result
            .step_results
            .entry(step_id.to_string())
            .or_insert_with(|| StepResult::running(step_id));
        apply(step);
        step.completed_at = Some(Utc::now());
        step.clone()
    }

    /// Seal the execution with its terminal status.
    pub(crate) fn finish(
        &self,
        status: ExecutionStatus,
        error: Option<ExecutionFailure>,
    ) -> WorkflowResult {
        let mut result = self.result.write();
        result.status = status;
        result.error = error;
        result.completed_at = Some(Utc::now());
        result.clone()
    }
}
