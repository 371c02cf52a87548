//! End-to-end workflow tests through the orchestrator.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use mplp_orchestrator::{
    EchoAgent, ErrorKind, ExecutionEngine, ExecutionOptions, ExecutionStatus, MockAgent,
    Orchestrator, OrchestratorError, Predicate, StepStatus, WorkflowBuilder, WorkflowDefinition,
    WorkflowStep,
};

// ============================================================================
// Helpers
// ============================================================================

fn orchestrator_with(agents: Vec<Arc<MockAgent>>) -> Orchestrator {
    let orchestrator = Orchestrator::new();
    for agent in agents {
        orchestrator.register_agent(agent).unwrap();
    }
    orchestrator
}

async fn execute(orchestrator: &Orchestrator, workflow: WorkflowDefinition) -> mplp_orchestrator::WorkflowResult {
    let workflow_id = workflow.id.clone();
    orchestrator.register_workflow(workflow).unwrap();
    orchestrator
        .execute_workflow(&workflow_id, Value::Null, ExecutionOptions::default())
        .await
        .unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn scenario_echo_workflow_completes() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("echo")))
        .unwrap();
    let workflow = WorkflowBuilder::with_id("Echo", "wf1")
        .agent("s1", "Echo", "echo", "run")
        .unwrap()
        .build()
        .unwrap();
    orchestrator.register_workflow(workflow).unwrap();

    let result = orchestrator
        .execute_workflow("wf1", json!({"msg": "hi"}), ExecutionOptions::default())
        .await
        .unwrap();

    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(result.output("s1"), Some(&json!({"msg": "hi"})));
    assert!(result.is_success());
    assert!(result.clone().into_result().is_ok());
}

#[tokio::test]
async fn scenario_failed_dependency_is_never_attempted() {
    let thrower = Arc::new(MockAgent::new("thrower").failing("exploded"));
    let follower = Arc::new(MockAgent::new("follower"));
    let orchestrator = orchestrator_with(vec![thrower, follower.clone()]);
    let workflow = WorkflowBuilder::with_id("Chain", "wf2")
        .agent("s1", "First", "thrower", "run")
        .unwrap()
        .step(WorkflowStep::agent("s2", "Second", "follower", "run").depends_on(["s1"]))
        .unwrap()
        .build()
        .unwrap();

    let result = execute(&orchestrator, workflow).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.step_status("s1"), Some(StepStatus::Failed));
    assert_eq!(result.step_status("s2"), Some(StepStatus::Skipped));
    assert_eq!(follower.call_count(), 0);

    match result.into_result() {
        Err(OrchestratorError::StepExecution { step_id, kind, message }) => {
            assert_eq!(step_id, "s1");
            assert_eq!(kind, ErrorKind::AgentFailed);
            assert!(message.contains("exploded"));
        }
        other => panic!("expected step execution error, got {:?}", other.map(|r| r.status)),
    }
}

#[tokio::test]
async fn scenario_parallel_failure_keeps_sibling_results() {
    let ok = Arc::new(MockAgent::new("ok").with_response(json!({"done": true})));
    let bad = Arc::new(MockAgent::new("bad").failing("nope"));
    let orchestrator = orchestrator_with(vec![ok, bad]);
    let workflow = WorkflowBuilder::with_id("Fan", "wf3")
        .parallel(
            "fan",
            "Fan out",
            vec![
                WorkflowStep::agent("a", "A", "ok", "run"),
                WorkflowStep::agent("b", "B", "bad", "run"),
                WorkflowStep::agent("c", "C", "ok", "run"),
            ],
        )
        .unwrap()
        .build()
        .unwrap();

    let result = execute(&orchestrator, workflow).await;

    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.step_status("fan"), Some(StepStatus::Failed));
    assert_eq!(result.step_status("b"), Some(StepStatus::Failed));
    assert_eq!(result.output("a"), Some(&json!({"done": true})));
    assert_eq!(result.output("c"), Some(&json!({"done": true})));
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn builder_rejects_cycles_and_dangling_dependencies() {
    let cyclic = WorkflowBuilder::with_id("Cycle", "wf")
        .step(WorkflowStep::agent("a", "A", "echo", "run").depends_on(["b"]))
        .unwrap()
        .step(WorkflowStep::agent("b", "B", "echo", "run").depends_on(["a"]))
        .unwrap()
        .build();
    match cyclic {
        Err(OrchestratorError::Definition(message)) => {
            assert!(message.contains("Circular dependency"));
        }
        other => panic!("expected definition error, got {:?}", other.map(|w| w.id)),
    }

    let dangling = WorkflowBuilder::with_id("Dangling", "wf")
        .step(WorkflowStep::agent("a", "A", "echo", "run").depends_on(["ghost"]))
        .unwrap()
        .build();
    assert!(matches!(dangling, Err(OrchestratorError::Definition(_))));

    let duplicate = WorkflowBuilder::with_id("Dup", "wf")
        .agent("a", "A", "echo", "run")
        .unwrap()
        .agent("a", "A again", "echo", "run");
    assert!(matches!(duplicate, Err(OrchestratorError::Definition(_))));
}

#[tokio::test]
async fn engine_rejects_raw_cyclic_definition() {
    let engine = ExecutionEngine::new();
    engine.register_agent(Arc::new(EchoAgent::new("echo"))).unwrap();
    let workflow = WorkflowDefinition::new(
        "wf",
        "Raw",
        vec![
            WorkflowStep::agent("a", "A", "echo", "run").depends_on(["b"]),
            WorkflowStep::agent("b", "B", "echo", "run").depends_on(["a"]),
        ],
    );

    let result = engine
        .execute_workflow(&workflow, Value::Null, ExecutionOptions::default())
        .await;
    assert!(matches!(result, Err(OrchestratorError::Definition(_))));
    assert!(engine.list_executions().is_empty());
}

#[tokio::test]
async fn sequential_children_run_in_declaration_order() {
    let agent = Arc::new(MockAgent::new("worker").with_delay(Duration::from_millis(5)));
    let orchestrator = orchestrator_with(vec![agent.clone()]);
    let workflow = WorkflowBuilder::with_id("Seq", "wf")
        .sequential(
            "seq",
            "Seq",
            vec![
                WorkflowStep::agent("first", "1", "worker", "run"),
                WorkflowStep::agent("second", "2", "worker", "run"),
                WorkflowStep::agent("third", "3", "worker", "run"),
            ],
        )
        .unwrap()
        .build()
        .unwrap();

    let result = execute(&orchestrator, workflow).await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(agent.completion_order(), vec!["first", "second", "third"]);
    assert_eq!(agent.max_in_flight(), 1);
}

#[tokio::test]
async fn parallel_concurrency_limit_is_never_exceeded() {
    let agent = Arc::new(MockAgent::new("worker").with_delay(Duration::from_millis(20)));
    let orchestrator = orchestrator_with(vec![agent.clone()]);
    let children = (1..=6)
        .map(|n| WorkflowStep::agent(format!("w{n}"), format!("Worker {n}"), "worker", "run"))
        .collect();
    let workflow = WorkflowBuilder::with_id("Bounded", "wf")
        .step(WorkflowStep::parallel("fan", "Fan out", children).with_concurrency(2))
        .unwrap()
        .build()
        .unwrap();

    let result = execute(&orchestrator, workflow).await;
    assert_eq!(result.status, ExecutionStatus::Completed);
    assert_eq!(agent.call_count(), 6);
    assert!(agent.max_in_flight() <= 2);
}

#[tokio::test]
async fn runaway_loop_stops_at_bound() {
    let agent = Arc::new(MockAgent::new("worker"));
    let orchestrator = orchestrator_with(vec![agent.clone()]);
    let workflow = WorkflowBuilder::with_id("Loop", "wf")
        .repeat(
            "spin",
            "Spin",
            Predicate::always(true),
            WorkflowStep::agent("body", "Body", "worker", "run"),
            Some(3),
        )
        .unwrap()
        .build()
        .unwrap();

    let result = execute(&orchestrator, workflow).await;
    assert_eq!(result.status, ExecutionStatus::Failed);
    assert_eq!(result.error.unwrap().kind, ErrorKind::RunawayLoop);
    assert_eq!(agent.call_count(), 3);
}

#[tokio::test]
async fn unregistered_agent_runs_zero_steps() {
    let present = Arc::new(MockAgent::new("present"));
    let orchestrator = orchestrator_with(vec![present.clone()]);
    let workflow = WorkflowBuilder::with_id("Missing", "wf")
        .agent("s1", "Present", "present", "run")
        .unwrap()
        .agent("s2", "Absent", "absent", "run")
        .unwrap()
        .build()
        .unwrap();
    orchestrator.register_workflow(workflow).unwrap();

    let result = orchestrator
        .execute_workflow("wf", Value::Null, ExecutionOptions::default())
        .await;
    assert!(matches!(result, Err(OrchestratorError::AgentNotFound(_))));
    assert_eq!(present.call_count(), 0);
}

#[tokio::test]
async fn templates_instantiate_runnable_workflows() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_agent(Arc::new(EchoAgent::new("writer")))
        .unwrap();
    let template = WorkflowBuilder::with_id("Draft", "draft-template")
        .step(
            WorkflowStep::agent("draft", "Draft {{topic}}", "{{agent}}", "write")
                .with_parameter("topic", json!("{{topic}}")),
        )
        .unwrap()
        .build()
        .unwrap();
    orchestrator.register_template("draft", template).unwrap();

    let workflow = orchestrator
        .create_from_template(
            "draft",
            "draft-rust",
            mplp_orchestrator::TemplateParams::new()
                .with_value("topic", json!("rust"))
                .with_value("agent", json!("writer")),
        )
        .unwrap();
    orchestrator.register_workflow(workflow).unwrap();

    let result = orchestrator
        .execute_workflow("draft-rust", Value::Null, ExecutionOptions::default())
        .await
        .unwrap();
    assert_eq!(result.output("draft"), Some(&json!({"topic": "rust"})));
}
