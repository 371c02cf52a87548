//! Workflow execution engine.
//!
//! [`ExecutionEngine`] owns the agent registry and the execution map. Step
//! futures are boxed so composite steps can recurse, and all steps of one
//! execution share a single cancellation token and pause signal.

mod composite;
pub mod execution;
mod executor;
mod performance;
mod record;
mod run;
mod scheduler;
mod steps;

#[cfg(test)]
#[path = "executor_tests.rs"]
mod tests;

pub use execution::{
    ExecutionFailure, ExecutionOptions, ExecutionStatus, StepResult, StepStatus, WorkflowResult,
};
pub use executor::ExecutionEngine;
pub use performance::AgentPerformance;
