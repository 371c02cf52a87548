//! Workflow model: definitions, predicates, validation and the builder.

pub mod builder;
pub mod condition;
pub mod context;
pub mod definition;
pub(crate) mod validation;

pub use builder::WorkflowBuilder;
pub use condition::{Condition, ConditionError, ExpressionCondition, Predicate};
pub use context::ExecutionContext;
pub use definition::{
    StepKind, StepPriority, StepType, WorkflowDefinition, WorkflowStep, MAX_RETRIES,
};
