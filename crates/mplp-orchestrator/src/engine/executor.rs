//! Execution engine.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use mplp_config::OrchestratorConfig;
use mplp_core::{BaseRegistry, EventBus, RegistryError};

use super::execution::{
    ExecutionFailure, ExecutionOptions, ExecutionStatus, StepStatus, WorkflowResult,
};
use super::performance::{AgentPerformance, PerformanceTracker, SAMPLES_PER_AGENT};
use super::record::{CancelReason, ExecutionRecord};
use super::run::RunContext;
use crate::agent::Agent;
use crate::error::{ErrorKind, OrchestratorError, Result};
use crate::events::WorkflowEvent;
use crate::workflow::{WorkflowDefinition, WorkflowStep};

/// Runs workflow definitions against registered agents.
///
/// Executions stay in the engine's execution map after they finish so their
/// results can be queried; see [`ExecutionEngine::prune_executions`].
pub struct ExecutionEngine {
    agents: BaseRegistry<dyn Agent>,
    executions: DashMap<String, Arc<ExecutionRecord>>,
    pub(crate) performance: PerformanceTracker,
    events: Arc<EventBus<WorkflowEvent>>,
    config: OrchestratorConfig,
    sequence: AtomicU64,
}

impl ExecutionEngine {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        Self {
            agents: BaseRegistry::new(),
            executions: DashMap::new(),
            performance: PerformanceTracker::new(SAMPLES_PER_AGENT),
            events: Arc::new(EventBus::new()),
            config,
            sequence: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Engine event bus.
    pub fn events(&self) -> &Arc<EventBus<WorkflowEvent>> {
        &self.events
    }

    // ---- agents ----

    pub fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let agent_id = agent.id().to_string();
        self.agents.register(agent).map_err(|e| match e {
            RegistryError::EmptyId => OrchestratorError::Usage("Agent ID cannot be empty".to_string()),
            other => OrchestratorError::Usage(other.to_string()),
        })?;
        info!(agent_id = %agent_id, "Registered agent");
        Ok(())
    }

    pub fn unregister_agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        let removed = self.agents.unregister(agent_id).ok();
        if removed.is_some() {
            self.performance.forget(agent_id);
            info!(agent_id, "Unregistered agent");
        }
        removed
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.get(agent_id)
    }

    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.agents.contains(agent_id)
    }

    /// Registered agent ids, sorted.
    pub fn list_agents(&self) -> Vec<String> {
        self.agents.list_ids()
    }

    /// Attempt statistics over the agent's last 100 invocations.
    pub fn agent_performance(&self, agent_id: &str) -> Option<AgentPerformance> {
        self.performance.agent(agent_id)
    }

    // ---- execution ----

    /// Execute `workflow` to completion and return its final result.
    ///
    /// `parameters` must be a JSON object (or null). Definition and usage
    /// errors are returned before anything is recorded; step failures are
    /// reported through the returned result instead.
    ///
    /// Dropping the returned future before it resolves cancels the execution
    /// and records it as `cancelled`.
    pub async fn execute_workflow(
        &self,
        workflow: &WorkflowDefinition,
        parameters: Value,
        options: ExecutionOptions,
    ) -> Result<WorkflowResult> {
        workflow.validate()?;

        let parameters = match parameters {
            Value::Null => Map::new(),
            Value::Object(map) => map,
            other => {
                return Err(OrchestratorError::Usage(format!(
                    "Workflow parameters must be a JSON object, got {}",
                    other
                )));
            }
        };
        if options.concurrency == Some(0) {
            return Err(OrchestratorError::Usage(
                "Concurrency must be at least 1".to_string(),
            ));
        }
        if options.timeout.is_some_and(|t| t.is_zero()) {
            return Err(OrchestratorError::Usage(
                "Execution timeout must be positive".to_string(),
            ));
        }

        let execution_id = match options.execution_id {
            Some(id) if id.trim().is_empty() => {
                return Err(OrchestratorError::Usage(
                    "Execution ID cannot be empty".to_string(),
                ));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };

        let record = Arc::new(ExecutionRecord::new(
            self.sequence.fetch_add(1, Ordering::SeqCst),
            &execution_id,
            &workflow.id,
        ));
        match self.executions.entry(execution_id.clone()) {
            Entry::Occupied(_) => {
                return Err(OrchestratorError::Usage(format!(
                    "Execution ID already in use: {}",
                    execution_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
            }
        }

        info!(
            execution_id = %execution_id,
            workflow_id = %workflow.id,
            "Starting workflow: {}",
            workflow.name
        );
        self.events.emit(&WorkflowEvent::WorkflowStarted {
            execution_id: execution_id.clone(),
            workflow_id: workflow.id.clone(),
        });

        let run = RunContext::new(
            &execution_id,
            workflow,
            parameters,
            record.clone(),
            self.events.clone(),
        );
        let guard = ExecutionGuard {
            engine: self,
            run: &run,
            steps: &workflow.steps,
            armed: true,
        };
        let timeout = options
            .timeout
            .or(workflow.timeout)
            .or_else(|| self.config.workflow_timeout());
        let limit = options
            .concurrency
            .or((self.config.max_concurrent_steps > 0).then_some(self.config.max_concurrent_steps))
            .unwrap_or(usize::MAX);
        let scope = record.control.token().clone();

        let mut graph = self.run_graph(&run, &workflow.steps, limit, false, &scope);
        let outcome = match timeout {
            Some(limit) => {
                tokio::select! {
                    outcome = &mut graph => outcome,
                    _ = tokio::time::sleep(limit) => {
                        warn!(
                            execution_id = %execution_id,
                            "Workflow timed out after {}ms, cancelling",
                            limit.as_millis()
                        );
                        record.control.cancel(CancelReason::Timeout);
                        graph.await
                    }
                }
            }
            None => graph.await,
        };

        for step in &workflow.steps {
            run.skip_subtree(step, "Not reached");
        }

        // A cancel that lands after every step completed has nothing left to stop.
        let drained = outcome.failure.is_none()
            && workflow
                .steps
                .iter()
                .all(|step| record.step_status(&step.id) == Some(StepStatus::Completed));
        let reason = match record.control.cancel_reason() {
            Some(CancelReason::User) if drained => {
                debug!(
                    execution_id = %execution_id,
                    "Cancellation arrived after all steps completed, ignoring"
                );
                None
            }
            reason => reason,
        };

        let (status, failure) = match reason {
            Some(CancelReason::User | CancelReason::Dropped) => (
                ExecutionStatus::Cancelled,
                Some(ExecutionFailure::new(
                    ErrorKind::Cancelled,
                    None,
                    "Execution cancelled",
                )),
            ),
            Some(CancelReason::Timeout) => (
                ExecutionStatus::Failed,
                Some(ExecutionFailure::new(
                    ErrorKind::Timeout,
                    None,
                    format!(
                        "Workflow timed out after {}ms",
                        timeout.map_or(0, |t| t.as_millis())
                    ),
                )),
            ),
            None => match outcome.failure {
                Some(failure) => (ExecutionStatus::Failed, Some(failure)),
                None => (ExecutionStatus::Completed, None),
            },
        };

        let result = record.finish(status, failure);
        guard.disarm();
        let event = match result.status {
            ExecutionStatus::Completed => {
                info!(execution_id = %execution_id, "Workflow completed");
                WorkflowEvent::WorkflowCompleted(result.clone())
            }
            ExecutionStatus::Cancelled => {
                info!(execution_id = %execution_id, "Workflow cancelled");
                WorkflowEvent::WorkflowCancelled(result.clone())
            }
            _ => {
                error!(
                    execution_id = %execution_id,
                    "Workflow failed: {}",
                    result.error.as_ref().map(ToString::to_string).unwrap_or_default()
                );
                WorkflowEvent::WorkflowFailed(result.clone())
            }
        };
        self.events.emit(&event);

        if self.config.retain_executions > 0 {
            self.prune_executions(self.config.retain_executions);
        }
        Ok(result)
    }

    // ---- queries ----

    fn record(&self, execution_id: &str) -> Result<Arc<ExecutionRecord>> {
        self.executions
            .get(execution_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| OrchestratorError::ExecutionNotFound(execution_id.to_string()))
    }

    /// Current snapshot of an execution.
    pub fn get_execution(&self, execution_id: &str) -> Option<WorkflowResult> {
        self.executions
            .get(execution_id)
            .map(|entry| entry.value().snapshot())
    }

    /// All known executions, oldest first.
    pub fn list_executions(&self) -> Vec<WorkflowResult> {
        let mut records: Vec<Arc<ExecutionRecord>> = self
            .executions
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by_key(|record| record.sequence);
        records.iter().map(|record| record.snapshot()).collect()
    }

    /// Drop all but the `keep` most recent finished executions. Running and
    /// paused executions are never dropped. Returns how many were removed.
    pub fn prune_executions(&self, keep: usize) -> usize {
        let mut finished: Vec<(u64, String)> = self
            .executions
            .iter()
            .filter(|entry| entry.value().status().is_terminal())
            .map(|entry| (entry.value().sequence, entry.key().clone()))
            .collect();
        if finished.len() <= keep {
            return 0;
        }
        finished.sort_by(|a, b| b.0.cmp(&a.0));

        let mut removed = 0;
        for (_, execution_id) in finished.into_iter().skip(keep) {
            if self.executions.remove(&execution_id).is_some() {
                removed += 1;
            }
        }
        info!(removed, "Pruned finished executions");
        removed
    }

    // ---- control ----

    /// Stop dispatching new steps. In-flight agent calls keep running.
    pub fn pause_execution(&self, execution_id: &str) -> Result<()> {
        let record = self.record(execution_id)?;
        record
            .transition(|status| {
                (status == ExecutionStatus::Running).then_some(ExecutionStatus::Paused)
            })
            .map_err(|status| {
                OrchestratorError::Usage(format!(
                    "Cannot pause execution {} in status {:?}",
                    execution_id, status
                ))
            })?;
        record.control.set_paused(true);

        info!(execution_id, "Execution paused");
        self.events.emit(&WorkflowEvent::ExecutionPaused {
            execution_id: execution_id.to_string(),
        });
        Ok(())
    }

    pub fn resume_execution(&self, execution_id: &str) -> Result<()> {
        let record = self.record(execution_id)?;
        record
            .transition(|status| {
                (status == ExecutionStatus::Paused).then_some(ExecutionStatus::Running)
            })
            .map_err(|status| {
                OrchestratorError::Usage(format!(
                    "Cannot resume execution {} in status {:?}",
                    execution_id, status
                ))
            })?;
        record.control.set_paused(false);

        info!(execution_id, "Execution resumed");
        self.events.emit(&WorkflowEvent::ExecutionResumed {
            execution_id: execution_id.to_string(),
        });
        Ok(())
    }

    /// Cancel a running or paused execution. It finishes as `cancelled` once
    /// in-flight work has unwound.
    pub fn cancel_execution(&self, execution_id: &str) -> Result<()> {
        let record = self.record(execution_id)?;
        record
            .transition(|status| (!status.is_terminal()).then_some(status))
            .map_err(|status| {
                OrchestratorError::Usage(format!(
                    "Cannot cancel execution {} in status {:?}",
                    execution_id, status
                ))
            })?;
        record.control.cancel(CancelReason::User);
        info!(execution_id, "Execution cancellation requested");
        Ok(())
    }
}

/// Seals an execution as cancelled when the future running it is dropped
/// before it settles.
struct ExecutionGuard<'a> {
    engine: &'a ExecutionEngine,
    run: &'a RunContext,
    steps: &'a [WorkflowStep],
    armed: bool,
}

impl ExecutionGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        let record = &self.run.record;
        if !self.armed || record.status().is_terminal() {
            return;
        }

        record.control.cancel(CancelReason::Dropped);
        record.cancel_running_steps();
        for step in self.steps {
            self.run.skip_subtree(step, "Not reached");
        }
        let result = record.finish(
            ExecutionStatus::Cancelled,
            Some(ExecutionFailure::new(
                ErrorKind::Cancelled,
                None,
                "Execution dropped before it finished",
            )),
        );
        warn!(
            execution_id = %result.execution_id,
            "Execution dropped before it finished, marked cancelled"
        );
        self.engine
            .events
            .emit(&WorkflowEvent::WorkflowCancelled(result));

        if self.engine.config.retain_executions > 0 {
            self.engine
                .prune_executions(self.engine.config.retain_executions);
        }
    }
}

impl Default for ExecutionEngine {
    fn default() -> Self {
        Self::new()
    }
}
