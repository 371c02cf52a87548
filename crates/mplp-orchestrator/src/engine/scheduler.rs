//! Dependency-aware scheduling of sibling steps.

use std::collections::HashMap;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::execution::ExecutionFailure;
use super::executor::ExecutionEngine;
use super::run::RunContext;
use crate::workflow::WorkflowStep;

/// Result of running one level of siblings.
pub(crate) struct GraphOutcome {
    /// Outputs of completed steps, in declaration order.
    pub(crate) outputs: Vec<(String, Value)>,
    /// First failure observed.
    pub(crate) failure: Option<ExecutionFailure>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Waiting,
    Ready,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl ExecutionEngine {
    /// Run `steps` as a DAG: a step starts once all its dependencies have
    /// completed, ready steps start by priority then declaration order, and
    /// at most `limit` run at once.
    ///
    /// A failure skips the failed step's transitive dependents. With
    /// `fail_fast` no further steps are started either; steps already in
    /// flight always run to completion.
    pub(crate) fn run_graph<'a>(
        &'a self,
        run: &'a RunContext,
        steps: &'a [WorkflowStep],
        limit: usize,
        fail_fast: bool,
        scope: &'a CancellationToken,
    ) -> BoxFuture<'a, GraphOutcome> {
        Box::pin(async move {
            let positions: HashMap<&str, usize> = steps
                .iter()
                .enumerate()
                .map(|(index, step)| (step.id.as_str(), index))
                .collect();

            let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); steps.len()];
            let mut unmet: Vec<usize> = vec![0; steps.len()];
            for (index, step) in steps.iter().enumerate() {
                for dependency in &step.dependencies {
                    if let Some(&parent) = positions.get(dependency.as_str()) {
                        dependents[parent].push(index);
                        unmet[index] += 1;
                    }
                }
            }

            let mut state = vec![NodeState::Waiting; steps.len()];
            let mut ready: Vec<usize> = Vec::new();
            for index in 0..steps.len() {
                if unmet[index] == 0 {
                    state[index] = NodeState::Ready;
                    ready.push(index);
                }
            }

            let mut outputs: Vec<Option<Value>> = vec![None; steps.len()];
            let mut failure: Option<ExecutionFailure> = None;
            let mut halted = false;
            let mut in_flight = FuturesUnordered::new();

            loop {
                if scope.is_cancelled() {
                    halted = true;
                }

                if !halted {
                    ready.sort_by(|&a, &b| {
                        steps[b]
                            .priority
                            .cmp(&steps[a].priority)
                            .then(a.cmp(&b))
                    });
                    while in_flight.len() < limit && !ready.is_empty() {
                        let index = ready.remove(0);
                        state[index] = NodeState::Running;
                        in_flight.push(async move {
                            (index, self.execute_step(run, &steps[index], scope).await)
                        });
                    }
                }

                let Some((index, outcome)) = in_flight.next().await else {
                    break;
                };

                match outcome {
                    Ok(output) => {
                        state[index] = NodeState::Completed;
                        outputs[index] = Some(output);
                        for &dependent in &dependents[index] {
                            unmet[dependent] -= 1;
                            if unmet[dependent] == 0 && state[dependent] == NodeState::Waiting {
                                state[dependent] = NodeState::Ready;
                                ready.push(dependent);
                            }
                        }
                    }
                    Err(err) => {
                        state[index] = NodeState::Failed;
                        let reason = format!("Dependency '{}' did not complete", steps[index].id);
                        skip_dependents(run, steps, &dependents, &mut state, index, &reason);
                        if fail_fast {
                            debug!(
                                execution_id = %run.execution_id,
                                step_id = %steps[index].id,
                                "Halting sibling scheduling after failure"
                            );
                            halted = true;
                        }
                        failure.get_or_insert(err);
                    }
                }
            }

            let reason = if scope.is_cancelled() {
                "Execution cancelled before step started"
            } else {
                "Not started after an earlier failure"
            };
            for (index, step) in steps.iter().enumerate() {
                if matches!(state[index], NodeState::Waiting | NodeState::Ready) {
                    state[index] = NodeState::Skipped;
                    run.skip_subtree(step, reason);
                }
            }

            GraphOutcome {
                outputs: steps
                    .iter()
                    .zip(outputs)
                    .filter_map(|(step, output)| output.map(|value| (step.id.clone(), value)))
                    .collect(),
                failure,
            }
        })
    }
}

fn skip_dependents(
    run: &RunContext,
    steps: &[WorkflowStep],
    dependents: &[Vec<usize>],
    state: &mut [NodeState],
    failed: usize,
    reason: &str,
) {
    let mut pending = dependents[failed].clone();
    while let Some(index) = pending.pop() {
        if matches!(state[index], NodeState::Waiting | NodeState::Ready) {
            state[index] = NodeState::Skipped;
            run.skip_subtree(&steps[index], reason);
            pending.extend(dependents[index].iter().copied());
        }
    }
}
