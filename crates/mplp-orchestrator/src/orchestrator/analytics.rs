//! Execution statistics.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::engine::{ExecutionStatus, WorkflowResult};

/// Aggregate view over recorded executions.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WorkflowAnalytics {
    pub total_executions: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// Running or paused.
    pub active: usize,
    /// `completed / total_executions`, 0 when nothing ran.
    pub success_rate: f64,
    /// Mean wall time of completed executions.
    pub average_duration_ms: f64,
    /// Failure message to occurrence count.
    pub failure_reasons: BTreeMap<String, usize>,
    pub last_execution: Option<DateTime<Utc>>,
}

impl WorkflowAnalytics {
    pub(crate) fn from_results<'a, I>(results: I) -> Self
    where
        I: IntoIterator<Item = &'a WorkflowResult>,
    {
        let mut analytics = Self::default();
        let mut durations = Vec::new();

        for result in results {
            analytics.total_executions += 1;
            analytics.last_execution = analytics.last_execution.max(Some(result.started_at));
            match result.status {
                ExecutionStatus::Completed => {
                    analytics.completed += 1;
                    if let Some(ms) = result.duration_ms() {
                        durations.push(ms as f64);
                    }
                }
                ExecutionStatus::Failed => {
                    analytics.failed += 1;
                    let reason = result
                        .error
                        .as_ref()
                        .map(|failure| failure.message.clone())
                        .unwrap_or_else(|| "Unknown error".to_string());
                    *analytics.failure_reasons.entry(reason).or_insert(0) += 1;
                }
                ExecutionStatus::Cancelled => analytics.cancelled += 1,
                ExecutionStatus::Running | ExecutionStatus::Paused => analytics.active += 1,
            }
        }

        if analytics.total_executions > 0 {
            analytics.success_rate = analytics.completed as f64 / analytics.total_executions as f64;
        }
        if !durations.is_empty() {
            analytics.average_duration_ms = durations.iter().sum::<f64>() / durations.len() as f64;
        }
        analytics
    }
}

/// Point-in-time overview of registries and recent activity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SystemHealth {
    pub agents: usize,
    pub workflows: usize,
    pub templates: usize,
    pub total_executions: usize,
    /// Running or paused.
    pub active_executions: usize,
    /// Executions started inside the window.
    pub recent_executions: usize,
    /// `completed / recent_executions`, 0 when nothing started recently.
    pub recent_success_rate: f64,
    /// Mean agent attempt time inside the window.
    pub average_response_ms: f64,
    pub checked_at: DateTime<Utc>,
}

impl SystemHealth {
    /// Execution figures only; registry counts and response time are zero.
    pub(crate) fn from_executions(
        executions: &[WorkflowResult],
        window_start: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Self {
        let recent: Vec<&WorkflowResult> = executions
            .iter()
            .filter(|result| result.started_at >= window_start)
            .collect();
        let recent_completed = recent
            .iter()
            .filter(|result| result.status == ExecutionStatus::Completed)
            .count();

        Self {
            agents: 0,
            workflows: 0,
            templates: 0,
            total_executions: executions.len(),
            active_executions: executions
                .iter()
                .filter(|result| !result.status.is_terminal())
                .count(),
            recent_executions: recent.len(),
            recent_success_rate: if recent.is_empty() {
                0.0
            } else {
                recent_completed as f64 / recent.len() as f64
            },
            average_response_ms: 0.0,
            checked_at: now,
        }
    }
}
