//! Agent contract.
//!
//! An agent is anything that can perform named actions. The engine only ever
//! sees this trait; registration happens through the engine or orchestrator.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use mplp_core::Registerable;

/// Errors returned by an agent invocation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Agent execution failed: {0}")]
    ExecutionFailed(String),
}

/// Input handed to an agent for one step attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentInput {
    pub execution_id: String,
    pub workflow_id: String,
    pub step_id: String,
    /// Workflow parameters overlaid with the step's own parameters.
    pub parameters: Map<String, Value>,
    /// Outputs of steps completed so far, by step id.
    pub outputs: HashMap<String, Value>,
}

impl AgentInput {
    /// Look up one parameter.
    pub fn parameter(&self, key: &str) -> Option<&Value> {
        self.parameters.get(key)
    }

    /// Output of an earlier step.
    pub fn output(&self, step_id: &str) -> Option<&Value> {
        self.outputs.get(step_id)
    }
}

/// A capability that workflow steps dispatch to.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Registry id. Must be non-empty and unique within an engine.
    fn id(&self) -> &str;

    /// Perform `action`. Returning `Err` counts as a failed attempt.
    async fn execute(&self, action: &str, input: AgentInput) -> Result<Value, AgentError>;
}

impl Registerable for dyn Agent {
    fn registry_id(&self) -> &str {
        self.id()
    }
}

/// Agent that answers every action with its input parameters.
pub struct EchoAgent {
    id: String,
}

impl EchoAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, _action: &str, input: AgentInput) -> Result<Value, AgentError> {
        Ok(Value::Object(input.parameters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_echo_agent_returns_parameters() {
        let agent = EchoAgent::new("echo");
        let mut input = AgentInput::default();
        input.parameters.insert("msg".to_string(), json!("hi"));

        let output = agent.execute("say", input).await.unwrap();
        assert_eq!(output, json!({"msg": "hi"}));
        assert_eq!(agent.id(), "echo");
    }

    #[test]
    fn test_agent_registry_id() {
        let agent: std::sync::Arc<dyn Agent> = std::sync::Arc::new(EchoAgent::new("writer"));
        assert_eq!(agent.registry_id(), "writer");
    }

    #[test]
    fn test_agent_input_lookups() {
        let mut input = AgentInput::default();
        input.parameters.insert("topic".to_string(), json!("rust"));
        input.outputs.insert("fetch".to_string(), json!([1, 2]));

        assert_eq!(input.parameter("topic"), Some(&json!("rust")));
        assert_eq!(input.output("fetch"), Some(&json!([1, 2])));
        assert!(input.output("missing").is_none());
    }

    #[test]
    fn test_agent_error_display() {
        let err = AgentError::UnsupportedAction("fly".to_string());
        assert_eq!(err.to_string(), "Unsupported action: fly");
    }
}
