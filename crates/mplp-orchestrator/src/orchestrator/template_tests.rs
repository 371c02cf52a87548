use super::*;
use crate::workflow::WorkflowBuilder;

fn review_template() -> WorkflowDefinition {
    WorkflowBuilder::with_id("Review", "review-template")
        .description("Draft then review")
        .step(
            WorkflowStep::agent("draft", "Draft {{topic}}", "{{writer}}", "write")
                .with_parameter("topic", json!("{{topic}}"))
                .with_parameter("tags", json!(["{{topic}}", "fixed"]))
                .with_parameter("limit", json!(3)),
        )
        .unwrap()
        .step(
            WorkflowStep::sequential(
                "finish",
                "Finish",
                vec![WorkflowStep::agent("check", "Check {{missing}}", "critic", "review")],
            )
            .depends_on(["draft"]),
        )
        .unwrap()
        .build()
        .unwrap()
}

#[test]
fn test_create_from_template_substitutes() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_template("review", review_template())
        .unwrap();

    let params = TemplateParams::new()
        .with_value("topic", json!("rust"))
        .with_value("writer", json!("writer-1"))
        .with_metadata("owner", json!("docs"));
    let workflow = orchestrator
        .create_from_template("review", "wf-rust", params)
        .unwrap();

    assert_eq!(workflow.id, "wf-rust");
    assert_eq!(workflow.name, "Review (wf-rust)");
    assert_eq!(workflow.metadata.get("owner"), Some(&json!("docs")));
    assert_eq!(workflow.metadata.get("template_id"), Some(&json!("review")));
    assert!(workflow.metadata.contains_key("created_at"));

    let draft = workflow.find_step("draft").unwrap();
    assert_eq!(draft.name, "Draft rust");
    match &draft.step_type {
        StepType::Agent {
            agent_id,
            parameters,
            ..
        } => {
            assert_eq!(agent_id, "writer-1");
            assert_eq!(parameters.get("topic"), Some(&json!("rust")));
            assert_eq!(parameters.get("tags"), Some(&json!(["rust", "fixed"])));
            assert_eq!(parameters.get("limit"), Some(&json!(3)));
        }
        other => panic!("unexpected {other:?}"),
    }

    // Unknown placeholders survive; nested steps are visited.
    assert_eq!(workflow.find_step("check").unwrap().name, "Check {{missing}}");
}

#[test]
fn test_template_name_override_and_isolation() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_template("review", review_template())
        .unwrap();

    let workflow = orchestrator
        .create_from_template(
            "review",
            "wf-a",
            TemplateParams::new()
                .with_name("Custom")
                .with_value("writer", json!("w")),
        )
        .unwrap();
    assert_eq!(workflow.name, "Custom");

    // The stored template is untouched.
    let again = orchestrator
        .create_from_template("review", "wf-b", TemplateParams::new())
        .unwrap();
    assert_eq!(again.find_step("draft").unwrap().name, "Draft {{topic}}");
}

#[test]
fn test_unknown_template() {
    let orchestrator = Orchestrator::new();
    let result = orchestrator.create_from_template("nope", "wf", TemplateParams::new());
    assert!(matches!(result, Err(OrchestratorError::WorkflowNotFound(_))));
}

#[test]
fn test_list_templates_and_audit() {
    let orchestrator = Orchestrator::new();
    orchestrator
        .register_template("review", review_template())
        .unwrap();
    assert!(orchestrator.register_template("", review_template()).is_err());

    let templates = orchestrator.list_templates();
    assert_eq!(templates.len(), 1);
    assert_eq!(templates[0].id, "review");
    assert_eq!(templates[0].description.as_deref(), Some("Draft then review"));

    orchestrator
        .create_from_template("review", "wf", TemplateParams::new())
        .unwrap();
    let events: Vec<String> = orchestrator
        .audit_log(None)
        .into_iter()
        .map(|record| record.event)
        .collect();
    assert_eq!(
        events,
        vec!["template_registered", "workflow_created_from_template"]
    );
}
