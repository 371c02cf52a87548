//! Orchestrator façade.

use std::sync::Arc;

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use tracing::{info, warn};

use mplp_config::{Config, ConfigValidator, OrchestratorConfig};
use mplp_core::{EventBus, ListenerId};

use super::analytics::{SystemHealth, WorkflowAnalytics};
use super::audit::{AuditLog, AuditRecord};
use crate::agent::Agent;
use crate::engine::{
    AgentPerformance, ExecutionEngine, ExecutionOptions, ExecutionStatus, WorkflowResult,
};
use crate::error::{OrchestratorError, Result};
use crate::events::{names, ProgressUpdate, WorkflowEvent};
use crate::workflow::{WorkflowBuilder, WorkflowDefinition};

/// Entry point for registering agents and workflows and running them.
///
/// Agents live in the engine's registry only. Every engine event is
/// re-published on the orchestrator's own bus, so one subscription there sees
/// registry changes and execution progress alike.
pub struct Orchestrator {
    pub(super) workflows: DashMap<String, Arc<WorkflowDefinition>>,
    pub(super) templates: DashMap<String, Arc<WorkflowDefinition>>,
    pub(super) engine: ExecutionEngine,
    pub(super) events: Arc<EventBus<WorkflowEvent>>,
    pub(super) audit: AuditLog,
}

impl Orchestrator {
    pub fn new() -> Self {
        Self::with_config(OrchestratorConfig::default())
    }

    pub fn with_config(config: OrchestratorConfig) -> Self {
        let audit = AuditLog::new(config.audit_log_limit);
        let engine = ExecutionEngine::with_config(config);
        let events: Arc<EventBus<WorkflowEvent>> = Arc::new(EventBus::new());

        for name in names::ENGINE_EVENTS {
            let bus = Arc::clone(&events);
            engine.events().on(name, move |event| {
                bus.emit(event);
            });
        }

        Self {
            workflows: DashMap::new(),
            templates: DashMap::new(),
            engine,
            events,
            audit,
        }
    }

    /// Validate `config` and build an orchestrator from it. Validation
    /// warnings are logged.
    pub fn from_config(config: &Config) -> Result<Self> {
        let warnings = ConfigValidator::validate(config).into_result()?;
        for warning in warnings {
            warn!(path = %warning.path, "Config warning: {}", warning.message);
        }
        Ok(Self::with_config(config.orchestrator.clone()))
    }

    /// Start a new workflow definition.
    pub fn create_workflow(name: impl Into<String>) -> WorkflowBuilder {
        WorkflowBuilder::new(name)
    }

    pub fn engine(&self) -> &ExecutionEngine {
        &self.engine
    }

    /// Orchestrator event bus for arbitrary subscriptions.
    pub fn events(&self) -> &Arc<EventBus<WorkflowEvent>> {
        &self.events
    }

    pub fn on_progress<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&ProgressUpdate) + Send + Sync + 'static,
    {
        self.events.on(names::PROGRESS, move |event| {
            if let WorkflowEvent::Progress(update) = event {
                handler(update);
            }
        })
    }

    pub fn on_error<F>(&self, handler: F) -> ListenerId
    where
        F: Fn(&WorkflowEvent) + Send + Sync + 'static,
    {
        self.events.on(names::ERROR, handler)
    }

    pub(super) fn emit(&self, event: WorkflowEvent) {
        self.events.emit(&event);
    }

    /// The last `limit` audit records (all when `None`), oldest first.
    pub fn audit_log(&self, limit: Option<usize>) -> Vec<AuditRecord> {
        self.audit.recent(limit)
    }

    // ---- agents ----

    pub fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let agent_id = agent.id().to_string();
        if agent_id.trim().is_empty() {
            return Err(OrchestratorError::Usage(
                "Agent must have a valid ID".to_string(),
            ));
        }
        self.engine.register_agent(agent).map_err(|_| {
            OrchestratorError::Usage(format!("Agent {} is already registered", agent_id))
        })?;

        info!(agent_id = %agent_id, "Agent registered with orchestrator");
        self.audit.record("agent_registered", json!({ "agent_id": agent_id }));
        self.emit(WorkflowEvent::AgentRegistered { agent_id });
        Ok(())
    }

    pub fn unregister_agent(&self, agent_id: &str) -> Result<()> {
        self.engine
            .unregister_agent(agent_id)
            .ok_or_else(|| OrchestratorError::AgentNotFound(agent_id.to_string()))?;

        self.audit.record("agent_unregistered", json!({ "agent_id": agent_id }));
        self.emit(WorkflowEvent::AgentUnregistered {
            agent_id: agent_id.to_string(),
        });
        Ok(())
    }

    pub fn get_agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.engine.get_agent(agent_id)
    }

    /// Registered agent ids, sorted.
    pub fn list_agents(&self) -> Vec<String> {
        self.engine.list_agents()
    }

    // ---- workflows ----

    pub fn register_workflow(&self, workflow: WorkflowDefinition) -> Result<()> {
        workflow.validate()?;

        let workflow_id = workflow.id.clone();
        let details = json!({
            "workflow_id": workflow_id,
            "name": workflow.name,
            "step_count": workflow.step_count(),
        });
        match self.workflows.entry(workflow_id.clone()) {
            Entry::Occupied(_) => {
                return Err(OrchestratorError::Definition(format!(
                    "Workflow {} is already registered",
                    workflow_id
                )));
            }
            Entry::Vacant(slot) => {
                slot.insert(Arc::new(workflow));
            }
        }

        info!(workflow_id = %workflow_id, "Workflow registered");
        self.audit.record("workflow_registered", details);
        self.emit(WorkflowEvent::WorkflowRegistered { workflow_id });
        Ok(())
    }

    pub fn unregister_workflow(&self, workflow_id: &str) -> Result<()> {
        self.workflows
            .remove(workflow_id)
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;

        self.audit
            .record("workflow_unregistered", json!({ "workflow_id": workflow_id }));
        self.emit(WorkflowEvent::WorkflowUnregistered {
            workflow_id: workflow_id.to_string(),
        });
        Ok(())
    }

    pub fn get_workflow(&self, workflow_id: &str) -> Option<Arc<WorkflowDefinition>> {
        self.workflows
            .get(workflow_id)
            .map(|entry| Arc::clone(entry.value()))
    }

    /// Registered workflows, sorted by id.
    pub fn list_workflows(&self) -> Vec<Arc<WorkflowDefinition>> {
        let mut workflows: Vec<Arc<WorkflowDefinition>> = self
            .workflows
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        workflows.sort_by(|a, b| a.id.cmp(&b.id));
        workflows
    }

    // ---- execution ----

    /// Run a registered workflow.
    ///
    /// Every agent the workflow references must be registered; otherwise this
    /// fails with [`OrchestratorError::AgentNotFound`] before any step runs.
    pub async fn execute_workflow(
        &self,
        workflow_id: &str,
        parameters: Value,
        options: ExecutionOptions,
    ) -> Result<WorkflowResult> {
        let workflow = self
            .get_workflow(workflow_id)
            .ok_or_else(|| OrchestratorError::WorkflowNotFound(workflow_id.to_string()))?;

        if let Some(missing) = workflow
            .agent_ids()
            .into_iter()
            .find(|agent_id| !self.engine.has_agent(agent_id))
        {
            warn!(workflow_id, agent_id = %missing, "Workflow references unregistered agent");
            return Err(OrchestratorError::AgentNotFound(missing));
        }

        match self
            .engine
            .execute_workflow(&workflow, parameters, options)
            .await
        {
            Ok(result) => {
                if result.status == ExecutionStatus::Failed {
                    self.emit(WorkflowEvent::Error {
                        workflow_id: workflow_id.to_string(),
                        execution_id: Some(result.execution_id.clone()),
                        message: result
                            .error
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "Workflow failed".to_string()),
                    });
                }
                self.emit(WorkflowEvent::WorkflowExecuted(result.clone()));
                Ok(result)
            }
            Err(err) => {
                self.emit(WorkflowEvent::Error {
                    workflow_id: workflow_id.to_string(),
                    execution_id: None,
                    message: err.to_string(),
                });
                Err(err)
            }
        }
    }

    pub fn get_execution_status(&self, execution_id: &str) -> Result<WorkflowResult> {
        self.engine
            .get_execution(execution_id)
            .ok_or_else(|| OrchestratorError::ExecutionNotFound(execution_id.to_string()))
    }

    pub fn list_executions(&self) -> Vec<WorkflowResult> {
        self.engine.list_executions()
    }

    pub fn pause_execution(&self, execution_id: &str) -> Result<()> {
        self.engine.pause_execution(execution_id)
    }

    pub fn resume_execution(&self, execution_id: &str) -> Result<()> {
        self.engine.resume_execution(execution_id)
    }

    pub fn cancel_execution(&self, execution_id: &str) -> Result<()> {
        self.engine.cancel_execution(execution_id)
    }

    /// Statistics over recorded executions, optionally for one workflow.
    pub fn workflow_analytics(&self, workflow_id: Option<&str>) -> WorkflowAnalytics {
        let executions = self.engine.list_executions();
        WorkflowAnalytics::from_results(
            executions
                .iter()
                .filter(|result| workflow_id.is_none_or(|id| result.workflow_id == id)),
        )
    }

    /// Attempt statistics for one agent; `None` before its first call.
    pub fn agent_performance(&self, agent_id: &str) -> Option<AgentPerformance> {
        self.engine.agent_performance(agent_id)
    }

    /// Registry sizes plus execution and response-time figures for the last
    /// hour.
    pub fn system_health(&self) -> SystemHealth {
        let now = Utc::now();
        let window_start = now - chrono::Duration::hours(1);
        let executions = self.engine.list_executions();
        SystemHealth {
            agents: self.engine.list_agents().len(),
            workflows: self.workflows.len(),
            templates: self.templates.len(),
            average_response_ms: self.engine.performance.average_since(window_start),
            ..SystemHealth::from_executions(&executions, window_start, now)
        }
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}
