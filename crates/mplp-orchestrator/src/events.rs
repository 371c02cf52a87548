//! Lifecycle events published by the engine and the orchestrator.

use serde::Serialize;

use mplp_core::BusEvent;

use crate::engine::{ExecutionFailure, StepResult, StepStatus, WorkflowResult};

/// Event channel names.
pub mod names {
    pub const WORKFLOW_STARTED: &str = "workflow_started";
    pub const WORKFLOW_COMPLETED: &str = "workflow_completed";
    pub const WORKFLOW_FAILED: &str = "workflow_failed";
    pub const WORKFLOW_CANCELLED: &str = "workflow_cancelled";
    pub const EXECUTION_PAUSED: &str = "execution_paused";
    pub const EXECUTION_RESUMED: &str = "execution_resumed";
    pub const STEP_STARTED: &str = "step_started";
    pub const STEP_COMPLETED: &str = "step_completed";
    pub const STEP_FAILED: &str = "step_failed";
    pub const STEP_SKIPPED: &str = "step_skipped";
    pub const STEP_RETRYING: &str = "step_retrying";
    pub const PROGRESS: &str = "progress";

    pub const AGENT_REGISTERED: &str = "agent_registered";
    pub const AGENT_UNREGISTERED: &str = "agent_unregistered";
    pub const WORKFLOW_REGISTERED: &str = "workflow_registered";
    pub const WORKFLOW_UNREGISTERED: &str = "workflow_unregistered";
    pub const TEMPLATE_REGISTERED: &str = "template_registered";
    pub const WORKFLOW_EXECUTED: &str = "workflow_executed";
    pub const ERROR: &str = "error";

    /// Everything the engine emits; the orchestrator forwards these.
    pub const ENGINE_EVENTS: [&str; 12] = [
        WORKFLOW_STARTED,
        WORKFLOW_COMPLETED,
        WORKFLOW_FAILED,
        WORKFLOW_CANCELLED,
        EXECUTION_PAUSED,
        EXECUTION_RESUMED,
        STEP_STARTED,
        STEP_COMPLETED,
        STEP_FAILED,
        STEP_SKIPPED,
        STEP_RETRYING,
        PROGRESS,
    ];
}

/// Progress snapshot emitted on every step status transition.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressUpdate {
    pub execution_id: String,
    pub workflow_id: String,
    pub step_id: String,
    pub status: StepStatus,
    /// Steps in a terminal state.
    pub completed: usize,
    /// Steps in the workflow tree.
    pub total: usize,
}

impl ProgressUpdate {
    pub fn percentage(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.completed.min(self.total) as f64 / self.total as f64) * 100.0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        execution_id: String,
        workflow_id: String,
    },
    WorkflowCompleted(WorkflowResult),
    WorkflowFailed(WorkflowResult),
    WorkflowCancelled(WorkflowResult),
    ExecutionPaused {
        execution_id: String,
    },
    ExecutionResumed {
        execution_id: String,
    },
    StepStarted {
        execution_id: String,
        step_id: String,
    },
    StepCompleted {
        execution_id: String,
        result: StepResult,
    },
    StepFailed {
        execution_id: String,
        result: StepResult,
        failure: ExecutionFailure,
    },
    StepSkipped {
        execution_id: String,
        result: StepResult,
    },
    StepRetrying {
        execution_id: String,
        step_id: String,
        /// The attempt that just failed (1-based).
        attempt: u32,
        delay_ms: u64,
        error: String,
    },
    Progress(ProgressUpdate),

    AgentRegistered {
        agent_id: String,
    },
    AgentUnregistered {
        agent_id: String,
    },
    WorkflowRegistered {
        workflow_id: String,
    },
    WorkflowUnregistered {
        workflow_id: String,
    },
    TemplateRegistered {
        template_id: String,
    },
    WorkflowExecuted(WorkflowResult),
    Error {
        workflow_id: String,
        execution_id: Option<String>,
        message: String,
    },
}

impl BusEvent for WorkflowEvent {
    fn event_name(&self) -> &'static str {
        match self {
            WorkflowEvent::WorkflowStarted { .. } => names::WORKFLOW_STARTED,
            WorkflowEvent::WorkflowCompleted(_) => names::WORKFLOW_COMPLETED,
            WorkflowEvent::WorkflowFailed(_) => names::WORKFLOW_FAILED,
            WorkflowEvent::WorkflowCancelled(_) => names::WORKFLOW_CANCELLED,
            WorkflowEvent::ExecutionPaused { .. } => names::EXECUTION_PAUSED,
            WorkflowEvent::ExecutionResumed { .. } => names::EXECUTION_RESUMED,
            WorkflowEvent::StepStarted { .. } => names::STEP_STARTED,
            WorkflowEvent::StepCompleted { .. } => names::STEP_COMPLETED,
            WorkflowEvent::StepFailed { .. } => names::STEP_FAILED,
            WorkflowEvent::StepSkipped { .. } => names::STEP_SKIPPED,
            WorkflowEvent::StepRetrying { .. } => names::STEP_RETRYING,
            WorkflowEvent::Progress(_) => names::PROGRESS,
            WorkflowEvent::AgentRegistered { .. } => names::AGENT_REGISTERED,
            WorkflowEvent::AgentUnregistered { .. } => names::AGENT_UNREGISTERED,
            WorkflowEvent::WorkflowRegistered { .. } => names::WORKFLOW_REGISTERED,
            WorkflowEvent::WorkflowUnregistered { .. } => names::WORKFLOW_UNREGISTERED,
            WorkflowEvent::TemplateRegistered { .. } => names::TEMPLATE_REGISTERED,
            WorkflowEvent::WorkflowExecuted(_) => names::WORKFLOW_EXECUTED,
            WorkflowEvent::Error { .. } => names::ERROR,
        }
    }
}

impl WorkflowEvent {
    /// Execution this event belongs to, if any.
    pub fn execution_id(&self) -> Option<&str> {
        match self {
            WorkflowEvent::WorkflowStarted { execution_id, .. }
            | WorkflowEvent::ExecutionPaused { execution_id }
            | WorkflowEvent::ExecutionResumed { execution_id }
            | WorkflowEvent::StepStarted { execution_id, .. }
            | WorkflowEvent::StepCompleted { execution_id, .. }
            | WorkflowEvent::StepFailed { execution_id, .. }
            | WorkflowEvent::StepSkipped { execution_id, .. }
            | WorkflowEvent::StepRetrying { execution_id, .. } => Some(execution_id),
            WorkflowEvent::Progress(update) => Some(&update.execution_id),
            WorkflowEvent::WorkflowCompleted(result)
            | WorkflowEvent::WorkflowFailed(result)
            | WorkflowEvent::WorkflowCancelled(result)
            | WorkflowEvent::WorkflowExecuted(result) => Some(&result.execution_id),
            WorkflowEvent::Error { execution_id, .. } => execution_id.as_deref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_names() {
        let event = WorkflowEvent::StepStarted {
            execution_id: "e1".to_string(),
            step_id: "s1".to_string(),
        };
        assert_eq!(event.event_name(), "step_started");
        assert_eq!(event.execution_id(), Some("e1"));

        let event = WorkflowEvent::AgentRegistered {
            agent_id: "echo".to_string(),
        };
        assert_eq!(event.event_name(), "agent_registered");
        assert_eq!(event.execution_id(), None);
    }

    #[test]
    fn test_progress_percentage() {
        let update = ProgressUpdate {
            execution_id: "e1".to_string(),
            workflow_id: "wf".to_string(),
            step_id: "s1".to_string(),
            status: StepStatus::Completed,
            completed: 1,
            total: 4,
        };
        assert_eq!(update.percentage(), 25.0);
    }

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = WorkflowEvent::Error {
            workflow_id: "wf".to_string(),
            execution_id: None,
            message: "boom".to_string(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["message"], "boom");
    }

    #[test]
    fn test_engine_events_are_unique() {
        let mut all = names::ENGINE_EVENTS.to_vec();
        all.sort_unstable();
        all.dedup();
        assert_eq!(all.len(), names::ENGINE_EVENTS.len());
    }
}
