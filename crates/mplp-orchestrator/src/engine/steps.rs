//! Step dispatch and agent invocation.

use std::time::Duration;

use futures::future::BoxFuture;
use serde_json::{Map, Value};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::execution::ExecutionFailure;
use super::executor::ExecutionEngine;
use super::run::RunContext;
use crate::error::ErrorKind;
use crate::workflow::{StepType, WorkflowStep};

pub(crate) type StepOutcome = Result<Value, ExecutionFailure>;

impl ExecutionEngine {
    /// Run one step: wait out a pause, record the transition, dispatch by
    /// kind, and record the outcome.
    pub(crate) fn execute_step<'a>(
        &'a self,
        run: &'a RunContext,
        step: &'a WorkflowStep,
        scope: &'a CancellationToken,
    ) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            if !run.record.control.wait_if_paused(scope).await {
                run.skip_subtree(step, "Execution cancelled before step started");
                return Err(ExecutionFailure::cancelled(&step.id));
            }

            run.step_started(step);
            debug!(
                execution_id = %run.execution_id,
                step_id = %step.id,
                kind = %step.kind(),
                "Starting step: {}",
                step.name
            );

            let outcome = match step.timeout {
                Some(limit) if !matches!(step.step_type, StepType::Agent { .. }) => {
                    self.execute_bounded(run, step, limit, scope).await
                }
                _ => self.execute_step_inner(run, step, scope).await,
            };

            match &outcome {
                Ok(output) => run.step_completed(step, output.clone()),
                Err(failure) => run.step_failed(step, failure),
            }
            outcome
        })
    }

    /// Composite step with its own timeout: children run under a child token
    /// that is cancelled when the timeout fires.
    async fn execute_bounded(
        &self,
        run: &RunContext,
        step: &WorkflowStep,
        limit: Duration,
        scope: &CancellationToken,
    ) -> StepOutcome {
        let bounded = scope.child_token();
        let mut inner = self.execute_step_inner(run, step, &bounded);

        tokio::select! {
            outcome = &mut inner => outcome,
            _ = tokio::time::sleep(limit) => {
                warn!(
                    execution_id = %run.execution_id,
                    step_id = %step.id,
                    "Step timed out after {}ms, cancelling children",
                    limit.as_millis()
                );
                bounded.cancel();
                let _ = inner.await;
                Err(ExecutionFailure::step(
                    ErrorKind::Timeout,
                    &step.id,
                    format!("Step '{}' timed out after {}ms", step.id, limit.as_millis()),
                ))
            }
        }
    }

    /// Dispatch on the step kind.
    fn execute_step_inner<'a>(
        &'a self,
        run: &'a RunContext,
        step: &'a WorkflowStep,
        scope: &'a CancellationToken,
    ) -> BoxFuture<'a, StepOutcome> {
        Box::pin(async move {
            match &step.step_type {
                StepType::Agent {
                    agent_id,
                    action,
                    parameters,
                    retries,
                } => {
                    self.execute_agent_step(run, step, agent_id, action, parameters, *retries, scope)
                        .await
                }
                StepType::Parallel {
                    steps,
                    concurrency,
                    fail_fast,
                } => {
                    self.execute_parallel_steps(run, step, steps, *concurrency, *fail_fast, scope)
                        .await
                }
                StepType::Sequential { steps } => {
                    self.execute_sequential_steps(run, step, steps, scope).await
                }
                StepType::Conditional {
                    predicate,
                    then_step,
                    else_step,
                } => {
                    self.execute_conditional_step(
                        run,
                        step,
                        predicate,
                        then_step,
                        else_step.as_deref(),
                        scope,
                    )
                    .await
                }
                StepType::Loop {
                    predicate,
                    body,
                    max_iterations,
                } => {
                    self.execute_loop_step(run, step, predicate, body, *max_iterations, scope)
                        .await
                }
            }
        })
    }

    /// Invoke an agent, retrying with exponential backoff.
    ///
    /// The agent is resolved at dispatch time; a missing agent fails the
    /// step at once without retries. Each attempt is bounded by the step
    /// timeout.
    #[allow(clippy::too_many_arguments)]
    async fn execute_agent_step(
        &self,
        run: &RunContext,
        step: &WorkflowStep,
        agent_id: &str,
        action: &str,
        parameters: &Map<String, Value>,
        retries: Option<u32>,
        scope: &CancellationToken,
    ) -> StepOutcome {
        let Some(agent) = self.get_agent(agent_id) else {
            error!(
                execution_id = %run.execution_id,
                step_id = %step.id,
                agent_id,
                "Agent not found"
            );
            return Err(ExecutionFailure::step(
                ErrorKind::AgentNotFound,
                &step.id,
                format!("Agent not found: {}", agent_id),
            ));
        };

        let max_retries = retries
            .or(run.workflow_retries)
            .unwrap_or(self.config().default_retries);
        let attempt_timeout = step.timeout.unwrap_or_else(|| self.config().step_timeout());
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            run.record.set_attempts(&step.id, attempt);
            let input = run.agent_input(&step.id, parameters);

            info!(
                execution_id = %run.execution_id,
                step_id = %step.id,
                agent_id,
                attempt,
                "Executing agent step: {} with agent '{}'",
                step.id,
                agent_id
            );

            let started = Instant::now();
            let call = tokio::time::timeout(attempt_timeout, agent.execute(action, input));
            let outcome = tokio::select! {
                _ = scope.cancelled() => return Err(ExecutionFailure::cancelled(&step.id)),
                outcome = call => outcome,
            };
            self.performance
                .record(agent_id, started.elapsed(), matches!(outcome, Ok(Ok(_))));

            let (kind, message) = match outcome {
                Ok(Ok(output)) => {
                    debug!(step_id = %step.id, attempt, "Agent step completed successfully");
                    return Ok(output);
                }
                Ok(Err(e)) => (ErrorKind::AgentFailed, e.to_string()),
                Err(_) => (
                    ErrorKind::Timeout,
                    format!(
                        "Step '{}' timed out after {}ms",
                        step.id,
                        attempt_timeout.as_millis()
                    ),
                ),
            };

            if attempt > max_retries {
                let message = if attempt > 1 {
                    format!("{} (after {} attempts)", message, attempt)
                } else {
                    message
                };
                error!(
                    execution_id = %run.execution_id,
                    step_id = %step.id,
                    agent_id,
                    "Agent step failed: {}",
                    message
                );
                return Err(ExecutionFailure::step(kind, &step.id, message));
            }

            let delay = self.config().retry.delay_for(attempt);
            warn!(
                execution_id = %run.execution_id,
                step_id = %step.id,
                attempt,
                delay_ms = delay.as_millis() as u64,
                "Agent step attempt failed, retrying: {}",
                message
            );
            run.step_retrying(&step.id, attempt, delay, &message);

            tokio::select! {
                _ = scope.cancelled() => return Err(ExecutionFailure::cancelled(&step.id)),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
