//! Composite step implementations (parallel, sequential, conditional, loop).

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::execution::ExecutionFailure;
use super::executor::ExecutionEngine;
use super::run::RunContext;
use super::steps::StepOutcome;
use crate::error::ErrorKind;
use crate::workflow::{ConditionError, Predicate, WorkflowStep};

fn predicate_failure(step: &WorkflowStep, err: ConditionError) -> ExecutionFailure {
    ExecutionFailure::step(
        ErrorKind::PredicateFailed,
        &step.id,
        format!("Condition evaluation failed: {}", err),
    )
}

impl ExecutionEngine {
    /// Children run through the sibling scheduler. Output maps child id to
    /// child output.
    pub(crate) async fn execute_parallel_steps(
        &self,
        run: &RunContext,
        step: &WorkflowStep,
        children: &[WorkflowStep],
        concurrency: Option<usize>,
        fail_fast: bool,
        scope: &CancellationToken,
    ) -> StepOutcome {
        let limit = concurrency.unwrap_or(children.len()).max(1);
        info!(
            "Executing {} parallel steps in {} (limit {})",
            children.len(),
            step.id,
            limit
        );

        let outcome = self
            .run_graph(run, children, limit, fail_fast, scope)
            .await;
        if let Some(failure) = outcome.failure {
            return Err(failure);
        }
        Ok(Value::Object(outcome.outputs.into_iter().collect()))
    }

    /// Children run in declaration order; the first failure skips the rest.
    pub(crate) async fn execute_sequential_steps(
        &self,
        run: &RunContext,
        step: &WorkflowStep,
        children: &[WorkflowStep],
        scope: &CancellationToken,
    ) -> StepOutcome {
        info!("Executing {} sequential steps in {}", children.len(), step.id);

        let mut outputs = Vec::with_capacity(children.len());
        for (index, child) in children.iter().enumerate() {
            match self.execute_step(run, child, scope).await {
                Ok(output) => outputs.push(output),
                Err(failure) => {
                    let reason = format!("Previous step '{}' did not complete", child.id);
                    for rest in &children[index + 1..] {
                        run.skip_subtree(rest, &reason);
                    }
                    return Err(failure);
                }
            }
        }
        Ok(Value::Array(outputs))
    }

    /// Exactly one branch runs; the other is recorded as skipped.
    pub(crate) async fn execute_conditional_step(
        &self,
        run: &RunContext,
        step: &WorkflowStep,
        predicate: &Predicate,
        then_step: &WorkflowStep,
        else_step: Option<&WorkflowStep>,
        scope: &CancellationToken,
    ) -> StepOutcome {
        let decision = match run.evaluate(predicate) {
            Ok(decision) => decision,
            Err(err) => {
                error!(step_id = %step.id, "Condition evaluation failed: {}", err);
                run.skip_subtree(then_step, "Condition could not be evaluated");
                if let Some(else_step) = else_step {
                    run.skip_subtree(else_step, "Condition could not be evaluated");
                }
                return Err(predicate_failure(step, err));
            }
        };
        debug!(
            step_id = %step.id,
            condition = predicate.description().unwrap_or("<closure>"),
            decision,
            "Condition evaluated"
        );

        let (branch, chosen, skipped) = if decision {
            ("then", Some(then_step), else_step)
        } else {
            ("else", else_step, Some(then_step))
        };
        if let Some(skipped) = skipped {
            run.skip_subtree(skipped, &format!("Condition evaluated to {}", decision));
        }

        match chosen {
            Some(chosen) => {
                let result = self.execute_step(run, chosen, scope).await?;
                Ok(json!({ "branch": branch, "result": result }))
            }
            None => Ok(json!({ "branch": "none", "result": Value::Null })),
        }
    }

    /// Run `body` while the predicate holds. The predicate is checked once
    /// more after `max_iterations` bodies; still true means a runaway loop.
    pub(crate) async fn execute_loop_step(
        &self,
        run: &RunContext,
        step: &WorkflowStep,
        predicate: &Predicate,
        body: &WorkflowStep,
        max_iterations: Option<u32>,
        scope: &CancellationToken,
    ) -> StepOutcome {
        let max = max_iterations.unwrap_or(self.config().default_max_iterations);
        let mut outputs = Vec::new();
        let mut iteration = 0u32;

        loop {
            run.set_iteration(&step.id, iteration);
            let keep_going = run
                .evaluate(predicate)
                .map_err(|err| predicate_failure(step, err))?;
            if !keep_going {
                break;
            }
            if iteration >= max {
                error!(
                    execution_id = %run.execution_id,
                    step_id = %step.id,
                    "Loop still active after {} iterations",
                    max
                );
                return Err(ExecutionFailure::step(
                    ErrorKind::RunawayLoop,
                    &step.id,
                    format!("Loop '{}' exceeded {} iterations", step.id, max),
                ));
            }

            debug!(step_id = %step.id, iteration, "Running loop body");
            outputs.push(self.execute_step(run, body, scope).await?);
            iteration += 1;
        }

        if iteration == 0 {
            run.skip_subtree(body, "Loop condition was false");
        }
        Ok(Value::Array(outputs))
    }
}
