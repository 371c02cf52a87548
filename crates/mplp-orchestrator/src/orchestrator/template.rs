//! Workflow templates with `{{key}}` placeholders.

#[cfg(test)]
#[path = "template_tests.rs"]
mod tests;

use std::sync::Arc;

use chrono::Utc;
use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::info;

use super::service::Orchestrator;
use crate::error::{OrchestratorError, Result};
use crate::events::WorkflowEvent;
use crate::workflow::{StepType, WorkflowDefinition, WorkflowStep};

const PLACEHOLDER: &str = r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}";

/// Inputs for [`Orchestrator::create_from_template`].
#[derive(Debug, Clone, Default)]
pub struct TemplateParams {
    /// Overrides the default `"{template name} ({workflow id})"`.
    pub name: Option<String>,
    /// Merged over the template's metadata.
    pub metadata: Map<String, Value>,
    /// Placeholder values.
    pub values: Map<String, Value>,
}

impl TemplateParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn with_value(mut self, key: impl Into<String>, value: Value) -> Self {
        self.values.insert(key.into(), value);
        self
    }
}

/// Listing entry for a registered template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSummary {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
}

struct Substitution<'a> {
    pattern: Regex,
    values: &'a Map<String, Value>,
}

impl Substitution<'_> {
    fn apply(&self, text: &str) -> String {
        self.pattern
            .replace_all(text, |caps: &Captures<'_>| match self.values.get(&caps[1]) {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => caps[0].to_string(),
            })
            .into_owned()
    }

    fn apply_value(&self, value: &mut Value) {
        match value {
            Value::String(s) => *s = self.apply(s),
            Value::Array(items) => items.iter_mut().for_each(|item| self.apply_value(item)),
            Value::Object(map) => map.values_mut().for_each(|item| self.apply_value(item)),
            _ => {}
        }
    }

    fn apply_step(&self, step: &mut WorkflowStep) {
        step.name = self.apply(&step.name);
        if let StepType::Agent {
            agent_id,
            action,
            parameters,
            ..
        } = &mut step.step_type
        {
            *agent_id = self.apply(agent_id);
            *action = self.apply(action);
            parameters.values_mut().for_each(|value| self.apply_value(value));
        }
        for child in step.step_type.children_mut() {
            self.apply_step(child);
        }
    }
}

impl Orchestrator {
    /// Register a reusable definition under `template_id`. Re-registering an
    /// id replaces the previous template.
    pub fn register_template(&self, template_id: &str, template: WorkflowDefinition) -> Result<()> {
        if template_id.trim().is_empty() {
            return Err(OrchestratorError::Usage(
                "Template ID cannot be empty".to_string(),
            ));
        }
        template.validate()?;

        let name = template.name.clone();
        self.templates
            .insert(template_id.to_string(), Arc::new(template));

        info!(template_id, "Workflow template registered");
        self.audit.record(
            "template_registered",
            json!({ "template_id": template_id, "name": name }),
        );
        self.emit(WorkflowEvent::TemplateRegistered {
            template_id: template_id.to_string(),
        });
        Ok(())
    }

    /// Registered templates, sorted by id.
    pub fn list_templates(&self) -> Vec<TemplateSummary> {
        let mut templates: Vec<TemplateSummary> = self
            .templates
            .iter()
            .map(|entry| TemplateSummary {
                id: entry.key().clone(),
                name: entry.value().name.clone(),
                description: entry.value().description.clone(),
            })
            .collect();
        templates.sort_by(|a, b| a.id.cmp(&b.id));
        templates
    }

    /// Instantiate a template as a new, unregistered definition.
    ///
    /// `{{key}}` placeholders in step names, agent ids, actions and string
    /// parameter values are replaced from `params.values`; unknown keys are
    /// left as they are.
    pub fn create_from_template(
        &self,
        template_id: &str,
        workflow_id: &str,
        params: TemplateParams,
    ) -> Result<WorkflowDefinition> {
        if workflow_id.trim().is_empty() {
            return Err(OrchestratorError::Usage(
                "Workflow ID cannot be empty".to_string(),
            ));
        }
        let template = self
            .templates
            .get(template_id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| {
                OrchestratorError::WorkflowNotFound(format!("Template not found: {}", template_id))
            })?;

        let mut workflow = WorkflowDefinition::clone(&template);
        workflow.id = workflow_id.to_string();
        workflow.name = params
            .name
            .clone()
            .unwrap_or_else(|| format!("{} ({})", template.name, workflow_id));
        workflow.metadata.extend(params.metadata.clone());
        workflow
            .metadata
            .insert("template_id".to_string(), json!(template_id));
        workflow
            .metadata
            .insert("created_from".to_string(), json!(template_id));
        workflow
            .metadata
            .insert("created_at".to_string(), json!(Utc::now().to_rfc3339()));

        let substitution = Substitution {
            pattern: Regex::new(PLACEHOLDER)
                .map_err(|e| OrchestratorError::Definition(e.to_string()))?,
            values: &params.values,
        };
        for step in &mut workflow.steps {
            substitution.apply_step(step);
        }
        workflow.validate()?;

        self.audit.record(
            "workflow_created_from_template",
            json!({
                "template_id": template_id,
                "workflow_id": workflow_id,
                "values": Value::Object(params.values.clone()),
            }),
        );
        Ok(workflow)
    }
}
