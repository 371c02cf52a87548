use super::*;
use crate::agent::EchoAgent;
use crate::engine::{ExecutionOptions, ExecutionStatus, StepStatus};
use crate::error::{ErrorKind, OrchestratorError};
use crate::events::{names, WorkflowEvent};
use crate::mock_agent::MockAgent;
use crate::workflow::{WorkflowBuilder, WorkflowDefinition, WorkflowStep};
use mplp_config::{Config, OrchestratorConfig};
use mplp_core::BusEvent;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;

fn single_step(id: &str, agent_id: &str) -> WorkflowDefinition {
    WorkflowBuilder::with_id("Single", id)
        .agent("s1", "Step 1", agent_id, "run")
        .unwrap()
        .build()
        .unwrap()
}

// ---- registries ----

#[test]
fn test_register_agent() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();

    assert_eq!(orchestrator.list_agents(), vec!["echo"]);
    assert!(orchestrator.get_agent("echo").is_some());
    assert!(orchestrator.engine().has_agent("echo"));
}

#[test]
fn test_register_agent_rejects_duplicate_and_empty() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();

    assert!(matches!(
        orchestrator.register_agent(Arc::new(EchoAgent::new("echo"))),
        Err(OrchestratorError::Usage(_))
    ));
    assert!(matches!(
        orchestrator.register_agent(Arc::new(EchoAgent::new("  "))),
        Err(OrchestratorError::Usage(_))
    ));
    assert_eq!(orchestrator.list_agents().len(), 1);
}

#[test]
fn test_unregister_agent() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();

    orchestrator.unregister_agent("echo").unwrap();
    assert!(orchestrator.list_agents().is_empty());
    assert!(!orchestrator.engine().has_agent("echo"));
    assert!(matches!(
        orchestrator.unregister_agent("echo"),
        Err(OrchestratorError::AgentNotFound(_))
    ));
}

#[test]
fn test_register_workflow() {
    let orchestrator = Orchestrator::new();
    orchestrator.register_workflow(single_step("b", "echo")).unwrap();
    orchestrator.register_workflow(single_step("a", "echo")).unwrap();

    let ids: Vec<String> = orchestrator
        .list_workflows()
        .iter()
        .map(|wf| wf.id.clone())
        .collect();
    assert_eq!(ids, vec!["a", "b"]);
    assert_eq!(orchestrator.get_workflow("a").unwrap().name, "Single");

    assert!(matches!(
        orchestrator.register_workflow(single_step("a", "echo")),
        Err(OrchestratorError::Definition(_))
    ));
}

#[test]
fn test_register_workflow_validates() {
    let orchestrator = Orchestrator::new();
    let invalid = WorkflowDefinition::new("wf", "Broken", vec![]);
    assert!(matches!(
        orchestrator.register_workflow(invalid),
        Err(OrchestratorError::Definition(_))
    ));
    assert!(orchestrator.list_workflows().is_empty());
}

#[test]
fn test_unregister_workflow() {
    let orchestrator = Orchestrator::new();
    orchestrator.register_workflow(single_step("wf", "echo")).unwrap();
    orchestrator.unregister_workflow("wf").unwrap();
    assert!(orchestrator.get_workflow("wf").is_none());
    assert!(matches!(
        orchestrator.unregister_workflow("wf"),
        Err(OrchestratorError::WorkflowNotFound(_))
    ));
}

#[test]
fn test_from_config_rejects_invalid() {
    let mut config = Config::default();
    config.orchestrator.default_step_timeout_ms = 0;
    assert!(matches!(
        Orchestrator::from_config(&config),
        Err(OrchestratorError::Config(_))
    ));

    let orchestrator = Orchestrator::from_config(&Config::default()).unwrap();
    assert_eq!(orchestrator.engine().config().default_max_iterations, 100);
}

// ---- execution ----

#[tokio::test]
async fn test_execute_echo_workflow() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();
    orchestrator.register_workflow(single_step("wf", "echo")).unwrap();

    let result = orchestrator
        .execute_workflow("wf", json!({"msg": "hi"}), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.step_status("s1"), Some(StepStatus::Completed));
    assert_eq!(result.output("s1"), Some(&json!({"msg": "hi"})));

    let status = orchestrator
        .get_execution_status(&result.execution_id)
        .unwrap();
    assert_eq!(status.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn test_execute_unknown_workflow() {
    let orchestrator = Orchestrator::new();
    let result = orchestrator
        .execute_workflow("missing", Value::Null, ExecutionOptions::default())
        .await;
    assert!(matches!(result, Err(OrchestratorError::WorkflowNotFound(_))));
}

#[tokio::test]
async fn test_execute_with_missing_agent_runs_nothing() {
    let orchestrator = Orchestrator::new();
    let present = Arc::new(MockAgent::new("present"));
    orchestrator.register_agent(present.clone()).unwrap();
    let wf = WorkflowBuilder::with_id("Two", "wf")
        .agent("s1", "Step 1", "present", "run")
        .unwrap()
        .step(WorkflowStep::agent("s2", "Step 2", "absent", "run").depends_on(["s1"]))
        .unwrap()
        .build()
        .unwrap();
    orchestrator.register_workflow(wf).unwrap();

    let result = orchestrator
        .execute_workflow("wf", Value::Null, ExecutionOptions::default())
        .await;
    match result {
        Err(OrchestratorError::AgentNotFound(agent_id)) => assert_eq!(agent_id, "absent"),
        other => panic!("expected AgentNotFound, got {:?}", other.map(|r| r.status)),
    }
    assert_eq!(present.call_count(), 0);
    assert!(orchestrator.list_executions().is_empty());
}

#[tokio::test]
async fn test_get_execution_status_unknown() {
    let orchestrator = Orchestrator::new();
    assert!(matches!(
        orchestrator.get_execution_status("nope"),
        Err(OrchestratorError::ExecutionNotFound(_))
    ));
    assert!(matches!(
        orchestrator.pause_execution("nope"),
        Err(OrchestratorError::ExecutionNotFound(_))
    ));
}

// ---- events ----

#[tokio::test]
async fn test_engine_events_are_republished() {
    let orchestrator = Orchestrator::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    for name in [
        names::AGENT_REGISTERED,
        names::WORKFLOW_REGISTERED,
        names::WORKFLOW_STARTED,
        names::STEP_COMPLETED,
        names::WORKFLOW_COMPLETED,
        names::WORKFLOW_EXECUTED,
    ] {
        let seen = seen.clone();
        orchestrator.events().on(name, move |event| {
            seen.lock().push(event.event_name());
        });
    }

    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();
    orchestrator.register_workflow(single_step("wf", "echo")).unwrap();
    orchestrator
        .execute_workflow("wf", Value::Null, ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(
        *seen.lock(),
        vec![
            "agent_registered",
            "workflow_registered",
            "workflow_started",
            "step_completed",
            "workflow_completed",
            "workflow_executed"
        ]
    );
}

#[tokio::test]
async fn test_on_progress_reports_each_step() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();
    let wf = WorkflowBuilder::with_id("Two", "wf")
        .agent("s1", "Step 1", "echo", "run")
        .unwrap()
        .agent("s2", "Step 2", "echo", "run")
        .unwrap()
        .build()
        .unwrap();
    orchestrator.register_workflow(wf).unwrap();

    let updates = Arc::new(Mutex::new(Vec::new()));
    {
        let updates = updates.clone();
        orchestrator.on_progress(move |update| {
            if update.status == StepStatus::Completed {
                updates.lock().push(update.percentage());
            }
        });
    }

    orchestrator
        .execute_workflow("wf", Value::Null, ExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(*updates.lock(), vec![50.0, 100.0]);
}

#[tokio::test]
async fn test_on_error_fires_for_failed_execution() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(MockAgent::new("bad").failing("boom")))
        .unwrap();
    orchestrator.register_workflow(single_step("wf", "bad")).unwrap();

    let errors = Arc::new(Mutex::new(Vec::new()));
    {
        let errors = errors.clone();
        orchestrator.on_error(move |event| {
            if let WorkflowEvent::Error { message, execution_id, .. } = event {
                errors.lock().push((message.clone(), execution_id.is_some()));
            }
        });
    }

    let result = orchestrator
        .execute_workflow("wf", Value::Null, ExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.error.unwrap().kind, ErrorKind::AgentFailed);

    let errors = errors.lock();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].0.contains("boom"));
    assert!(errors[0].1);
}

// ---- audit and analytics ----

#[tokio::test]
async fn test_audit_log_records_registry_changes() {
    let orchestrator = Orchestrator::with_config(OrchestratorConfig {
        audit_log_limit: 2,
        ..OrchestratorConfig::default()
    });
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();
    orchestrator.register_workflow(single_step("wf", "echo")).unwrap();
    orchestrator.unregister_workflow("wf").unwrap();

    let records = orchestrator.audit_log(None);
    let events: Vec<&str> = records.iter().map(|r| r.event.as_str()).collect();
    assert_eq!(events, vec!["workflow_registered", "workflow_unregistered"]);
    assert_eq!(records[0].details["step_count"], 1);
    assert_eq!(orchestrator.audit_log(Some(1)).len(), 1);
}

#[tokio::test]
async fn test_workflow_analytics() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();
    orchestrator
        .register_agent(Arc::new(MockAgent::new("bad").failing("boom")))
        .unwrap();
    orchestrator.register_workflow(single_step("good", "echo")).unwrap();
    orchestrator.register_workflow(single_step("flaky", "bad")).unwrap();

    for workflow_id in ["good", "good", "good", "flaky"] {
        orchestrator
            .execute_workflow(workflow_id, Value::Null, ExecutionOptions::default())
            .await
            .unwrap();
    }

    let all = orchestrator.workflow_analytics(None);
    assert_eq!(all.total_executions, 4);
    assert_eq!(all.completed, 3);
    assert_eq!(all.failed, 1);
    assert!((all.success_rate - 0.75).abs() < f64::EPSILON);
    assert_eq!(all.failure_reasons.len(), 1);
    assert!(all.failure_reasons.keys().all(|reason| reason.contains("boom")));

    let good = orchestrator.workflow_analytics(Some("good"));
    assert_eq!(good.total_executions, 3);
    assert!((good.success_rate - 1.0).abs() < f64::EPSILON);

    let none = orchestrator.workflow_analytics(Some("unknown"));
    assert_eq!(none.total_executions, 0);
    assert_eq!(none.success_rate, 0.0);
}

#[tokio::test]
async fn test_agent_registered_on_engine_is_runnable() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .engine()
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();
    orchestrator.register_workflow(single_step("wf", "echo")).unwrap();

    assert_eq!(orchestrator.list_agents(), vec!["echo"]);
    assert!(orchestrator.get_agent("echo").is_some());
    let result = orchestrator
        .execute_workflow("wf", Value::Null, ExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.status, ExecutionStatus::Completed);

    orchestrator.engine().unregister_agent("echo");
    assert!(orchestrator.get_agent("echo").is_none());
    assert!(matches!(
        orchestrator.unregister_agent("echo"),
        Err(OrchestratorError::AgentNotFound(_))
    ));
}

#[tokio::test]
async fn test_agent_performance() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();
    orchestrator
        .register_agent(Arc::new(MockAgent::new("bad").failing("boom")))
        .unwrap();
    orchestrator.register_workflow(single_step("good", "echo")).unwrap();
    orchestrator.register_workflow(single_step("broken", "bad")).unwrap();
    assert!(orchestrator.agent_performance("echo").is_none());

    for workflow_id in ["good", "good", "broken"] {
        orchestrator
            .execute_workflow(workflow_id, Value::Null, ExecutionOptions::default())
            .await
            .unwrap();
    }

    let echo = orchestrator.agent_performance("echo").unwrap();
    assert_eq!(echo.total_executions, 2);
    assert_eq!(echo.success_rate, 1.0);
    let bad = orchestrator.agent_performance("bad").unwrap();
    assert_eq!(bad.total_executions, 1);
    assert_eq!(bad.successful, 0);
    assert_eq!(bad.success_rate, 0.0);
}

#[tokio::test]
async fn test_system_health() {
    let orchestrator = Orchestrator::new();
    let empty = orchestrator.system_health();
    assert_eq!(empty.agents, 0);
    assert_eq!(empty.total_executions, 0);
    assert_eq!(empty.recent_success_rate, 0.0);
    assert_eq!(empty.average_response_ms, 0.0);

    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();
    orchestrator
        .register_agent(Arc::new(MockAgent::new("bad").failing("boom")))
        .unwrap();
    orchestrator.register_workflow(single_step("good", "echo")).unwrap();
    orchestrator.register_workflow(single_step("broken", "bad")).unwrap();
    orchestrator
        .register_template("tpl", single_step("tpl-wf", "echo"))
        .unwrap();

    for workflow_id in ["good", "broken"] {
        orchestrator
            .execute_workflow(workflow_id, Value::Null, ExecutionOptions::default())
            .await
            .unwrap();
    }

    let health = orchestrator.system_health();
    assert_eq!(health.agents, 2);
    assert_eq!(health.workflows, 2);
    assert_eq!(health.templates, 1);
    assert_eq!(health.total_executions, 2);
    assert_eq!(health.active_executions, 0);
    assert_eq!(health.recent_executions, 2);
    assert!((health.recent_success_rate - 0.5).abs() < f64::EPSILON);
    assert!(health.average_response_ms >= 0.0);
}
