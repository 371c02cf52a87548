//! Workflow definition types.

#[cfg(test)]
#[path = "definition_tests.rs"]
mod tests;

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::Result;

use super::condition::Predicate;
use super::validation;

/// Upper bound accepted for any retry count.
pub const MAX_RETRIES: u32 = 100;

/// Immutable description of a workflow.
///
/// Definitions can be built by hand, but [`crate::WorkflowBuilder`] validates
/// as it goes. The engine re-validates every definition before running it.
#[derive(Debug, Clone)]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub version: Option<String>,
    /// Top-level steps. Dependencies between them form a DAG.
    pub steps: Vec<WorkflowStep>,
    /// Bound on the whole execution.
    pub timeout: Option<Duration>,
    /// Retries for agent steps that do not set their own.
    pub retries: Option<u32>,
    pub metadata: Map<String, Value>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: None,
            version: None,
            steps,
            timeout: None,
            retries: None,
            metadata: Map::new(),
        }
    }

    /// Check structure, id uniqueness and dependency graphs.
    pub fn validate(&self) -> Result<()> {
        validation::validate_definition(self)
    }

    /// Find a step anywhere in the tree.
    pub fn find_step(&self, step_id: &str) -> Option<&WorkflowStep> {
        self.all_steps().into_iter().find(|step| step.id == step_id)
    }

    /// Every step in the tree, parents before children.
    pub fn all_steps(&self) -> Vec<&WorkflowStep> {
        let mut out = Vec::new();
        for step in &self.steps {
            step.collect(&mut out);
        }
        out
    }

    /// Number of steps in the tree.
    pub fn step_count(&self) -> usize {
        self.steps.iter().map(WorkflowStep::tree_size).sum()
    }

    /// Ids of every agent referenced anywhere in the tree.
    pub fn agent_ids(&self) -> BTreeSet<String> {
        self.all_steps()
            .into_iter()
            .filter_map(|step| match &step.step_type {
                StepType::Agent { agent_id, .. } => Some(agent_id.clone()),
                _ => None,
            })
            .collect()
    }
}

/// Scheduling priority used to order steps that become ready together.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StepPriority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

/// A node in the workflow tree.
#[derive(Debug, Clone)]
pub struct WorkflowStep {
    /// Unique across the whole definition.
    pub id: String,
    pub name: String,
    pub step_type: StepType,
    /// Ids of sibling steps that must complete first.
    pub dependencies: Vec<String>,
    pub priority: StepPriority,
    /// Agent steps: per-attempt bound. Composite steps: bound on the whole step.
    pub timeout: Option<Duration>,
}

/// Step variants.
#[derive(Debug, Clone)]
pub enum StepType {
    /// Dispatch `action` to a registered agent.
    Agent {
        agent_id: String,
        action: String,
        /// Overlaid on the workflow parameters for this step.
        parameters: Map<String, Value>,
        retries: Option<u32>,
    },
    /// Run children concurrently, honoring their sibling dependencies.
    Parallel {
        steps: Vec<WorkflowStep>,
        /// At most this many children run at once (default: all).
        concurrency: Option<usize>,
        /// Stop starting new children after the first failure.
        fail_fast: bool,
    },
    /// Run children one after another in declaration order.
    Sequential { steps: Vec<WorkflowStep> },
    /// Run exactly one branch.
    Conditional {
        predicate: Predicate,
        then_step: Box<WorkflowStep>,
        else_step: Option<Box<WorkflowStep>>,
    },
    /// Run `body` while `predicate` holds, at most `max_iterations` times.
    Loop {
        predicate: Predicate,
        body: Box<WorkflowStep>,
        max_iterations: Option<u32>,
    },
}

/// Discriminant of [`StepType`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepKind {
    Agent,
    Parallel,
    Sequential,
    Conditional,
    Loop,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Agent => "agent",
            StepKind::Parallel => "parallel",
            StepKind::Sequential => "sequential",
            StepKind::Conditional => "conditional",
            StepKind::Loop => "loop",
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StepType {
    pub fn kind(&self) -> StepKind {
        match self {
            StepType::Agent { .. } => StepKind::Agent,
            StepType::Parallel { .. } => StepKind::Parallel,
            StepType::Sequential { .. } => StepKind::Sequential,
            StepType::Conditional { .. } => StepKind::Conditional,
            StepType::Loop { .. } => StepKind::Loop,
        }
    }

    /// Direct children, in declaration order.
    pub fn children(&self) -> Vec<&WorkflowStep> {
        match self {
            StepType::Agent { .. } => Vec::new(),
            StepType::Parallel { steps, .. } | StepType::Sequential { steps } => {
                steps.iter().collect()
            }
            StepType::Conditional {
                then_step,
                else_step,
                ..
            } => std::iter::once(then_step.as_ref())
                .chain(else_step.as_deref())
                .collect(),
            StepType::Loop { body, .. } => vec![body.as_ref()],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Vec<&mut WorkflowStep> {
        match self {
            StepType::Agent { .. } => Vec::new(),
            StepType::Parallel { steps, .. } | StepType::Sequential { steps } => {
                steps.iter_mut().collect()
            }
            StepType::Conditional {
                then_step,
                else_step,
                ..
            } => std::iter::once(then_step.as_mut())
                .chain(else_step.as_deref_mut())
                .collect(),
            StepType::Loop { body, .. } => vec![body.as_mut()],
        }
    }
}

impl WorkflowStep {
    fn with_type(id: impl Into<String>, name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            step_type,
            dependencies: Vec::new(),
            priority: StepPriority::default(),
            timeout: None,
        }
    }

    /// Agent step with no parameters.
    pub fn agent(
        id: impl Into<String>,
        name: impl Into<String>,
        agent_id: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        Self::with_type(
            id,
            name,
            StepType::Agent {
                agent_id: agent_id.into(),
                action: action.into(),
                parameters: Map::new(),
                retries: None,
            },
        )
    }

    /// Parallel step, unbounded and fail-fast.
    pub fn parallel(id: impl Into<String>, name: impl Into<String>, steps: Vec<WorkflowStep>) -> Self {
        Self::with_type(
            id,
            name,
            StepType::Parallel {
                steps,
                concurrency: None,
                fail_fast: true,
            },
        )
    }

    pub fn sequential(
        id: impl Into<String>,
        name: impl Into<String>,
        steps: Vec<WorkflowStep>,
    ) -> Self {
        Self::with_type(id, name, StepType::Sequential { steps })
    }

    pub fn conditional(
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: Predicate,
        then_step: WorkflowStep,
        else_step: Option<WorkflowStep>,
    ) -> Self {
        Self::with_type(
            id,
            name,
            StepType::Conditional {
                predicate,
                then_step: Box::new(then_step),
                else_step: else_step.map(Box::new),
            },
        )
    }

    /// Loop step; named `repeat` since `loop` is a keyword.
    pub fn repeat(
        id: impl Into<String>,
        name: impl Into<String>,
        predicate: Predicate,
        body: WorkflowStep,
        max_iterations: Option<u32>,
    ) -> Self {
        Self::with_type(
            id,
            name,
            StepType::Loop {
                predicate,
                body: Box::new(body),
                max_iterations,
            },
        )
    }

    pub fn depends_on<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(dependencies.into_iter().map(Into::into));
        self
    }

    pub fn with_priority(mut self, priority: StepPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Set one agent parameter. No effect on non-agent steps.
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        if let StepType::Agent { parameters, .. } = &mut self.step_type {
            parameters.insert(key.into(), value);
        }
        self
    }

    /// Set the agent retry count. No effect on non-agent steps.
    pub fn with_retries(mut self, retries: u32) -> Self {
        if let StepType::Agent { retries: slot, .. } = &mut self.step_type {
            *slot = Some(retries);
        }
        self
    }

    /// Cap concurrent children. No effect on non-parallel steps.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        if let StepType::Parallel { concurrency, .. } = &mut self.step_type {
            *concurrency = Some(limit);
        }
        self
    }

    /// Toggle fail-fast. No effect on non-parallel steps.
    pub fn with_fail_fast(mut self, enabled: bool) -> Self {
        if let StepType::Parallel { fail_fast, .. } = &mut self.step_type {
            *fail_fast = enabled;
        }
        self
    }

    pub fn kind(&self) -> StepKind {
        self.step_type.kind()
    }

    /// Number of steps in this subtree, including itself.
    pub fn tree_size(&self) -> usize {
        1 + self
            .step_type
            .children()
            .into_iter()
            .map(WorkflowStep::tree_size)
            .sum::<usize>()
    }

    pub(crate) fn collect<'a>(&'a self, out: &mut Vec<&'a WorkflowStep>) {
        out.push(self);
        for child in self.step_type.children() {
            child.collect(out);
        }
    }

    /// Ids in this subtree, parents first.
    pub fn subtree_ids(&self) -> Vec<&str> {
        let mut steps = Vec::new();
        self.collect(&mut steps);
        steps.into_iter().map(|step| step.id.as_str()).collect()
    }
}
