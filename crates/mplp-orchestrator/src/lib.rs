//! # MPLP Orchestrator
//!
//! Multi-agent workflow orchestration.
//!
//! ## Components
//!
//! - [`WorkflowBuilder`] - Fluent, validating construction of workflow definitions
//! - [`ExecutionEngine`] - Dependency-aware execution of agent, parallel,
//!   sequential, conditional and loop steps with retries, timeouts and
//!   cooperative pause/resume/cancel
//! - [`Orchestrator`] - Façade holding the workflow registry, templates,
//!   audit log, analytics and health figures on top of one engine
//!
//! Engine and orchestrator publish [`WorkflowEvent`]s on their own
//! [`mplp_core::EventBus`].

pub mod agent;
pub mod engine;
pub mod error;
pub mod events;
pub mod mock_agent;
pub mod orchestrator;
pub mod workflow;

pub use agent::{Agent, AgentError, AgentInput, EchoAgent};
pub use engine::{
    AgentPerformance, ExecutionEngine, ExecutionFailure, ExecutionOptions, ExecutionStatus, StepResult, StepStatus,
    WorkflowResult,
};
pub use error::{ErrorKind, OrchestratorError, Result};
pub use events::{ProgressUpdate, WorkflowEvent};
pub use mock_agent::MockAgent;
pub use orchestrator::{
    AuditRecord, Orchestrator, SystemHealth, TemplateParams, TemplateSummary, WorkflowAnalytics,
};
pub use workflow::{
    Condition, ConditionError, ExecutionContext, ExpressionCondition, Predicate, StepKind,
    StepPriority, StepType, WorkflowBuilder, WorkflowDefinition, WorkflowStep,
};
