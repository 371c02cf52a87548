//! Orchestrator error types.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use mplp_config::ConfigError;

/// Errors surfaced by the builder, engine and orchestrator.
///
/// Each failure category has its own variant so callers can tell a broken
/// definition from a missing agent or a failed run.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// Invalid workflow definition (duplicate id, dangling dependency, cycle, malformed step).
    #[error("Invalid workflow definition: {0}")]
    Definition(String),

    /// Execution failed without a single failing step (e.g. workflow timeout or cancellation).
    #[error("Workflow execution failed: {0}")]
    Execution(String),

    /// A step failed terminally.
    #[error("Step '{step_id}' failed ({kind}): {message}")]
    StepExecution {
        step_id: String,
        kind: ErrorKind,
        message: String,
    },

    /// Agent not registered.
    #[error("Agent not found: {0}")]
    AgentNotFound(String),

    /// Workflow (or template) not registered.
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Unknown execution id.
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Invalid arguments to a public API call.
    #[error("Invalid usage: {0}")]
    Usage(String),

    /// Configuration problem.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Result type for orchestrator operations.
pub type Result<T> = std::result::Result<T, OrchestratorError>;

/// Cause of a step-level execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The referenced agent is not registered.
    AgentNotFound,
    /// The agent returned an error on every attempt.
    AgentFailed,
    /// A step or workflow timeout fired.
    Timeout,
    /// A conditional/loop predicate returned an error.
    PredicateFailed,
    /// A loop hit `max_iterations` with its predicate still true.
    RunawayLoop,
    /// The step was interrupted by cancellation.
    Cancelled,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AgentNotFound => "agent_not_found",
            ErrorKind::AgentFailed => "agent_failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::PredicateFailed => "predicate_failed",
            ErrorKind::RunawayLoop => "runaway_loop",
            ErrorKind::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_definition_error_display() {
        let err = OrchestratorError::Definition("Duplicate step ID: s1".to_string());
        assert!(err.to_string().contains("Invalid workflow definition"));
        assert!(err.to_string().contains("s1"));
    }

    #[test]
    fn test_step_execution_error_display() {
        let err = OrchestratorError::StepExecution {
            step_id: "s2".to_string(),
            kind: ErrorKind::Timeout,
            message: "timed out after 50ms".to_string(),
        };
        let display = err.to_string();
        assert!(display.contains("s2"));
        assert!(display.contains("timeout"));
        assert!(display.contains("50ms"));
    }

    #[test]
    fn test_not_found_variants_are_distinct() {
        let agent = OrchestratorError::AgentNotFound("echo".to_string());
        let workflow = OrchestratorError::WorkflowNotFound("wf".to_string());
        assert!(matches!(agent, OrchestratorError::AgentNotFound(_)));
        assert!(matches!(workflow, OrchestratorError::WorkflowNotFound(_)));
        assert_ne!(agent.to_string(), workflow.to_string());
    }

    #[test]
    fn test_error_kind_serializes_snake_case() {
        let json = serde_json::to_string(&ErrorKind::RunawayLoop).unwrap();
        assert_eq!(json, "\"runaway_loop\"");
        assert_eq!(ErrorKind::AgentNotFound.to_string(), "agent_not_found");
    }

    #[test]
    fn test_config_error_from() {
        let err = OrchestratorError::from(ConfigError::EnvVarNotSet("X".to_string()));
        assert!(matches!(err, OrchestratorError::Config(_)));
    }
}
