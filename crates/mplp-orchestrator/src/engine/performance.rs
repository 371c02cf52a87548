//! Rolling per-agent attempt metrics.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;

/// Attempts kept per agent.
pub(crate) const SAMPLES_PER_AGENT: usize = 100;

#[derive(Debug, Clone)]
struct AttemptSample {
    duration_ms: f64,
    success: bool,
    at: DateTime<Utc>,
}

/// Summary of an agent's most recent attempts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentPerformance {
    pub agent_id: String,
    /// Attempts in the window (at most 100).
    pub total_executions: usize,
    pub successful: usize,
    pub success_rate: f64,
    pub average_execution_ms: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

pub(crate) struct PerformanceTracker {
    samples: DashMap<String, VecDeque<AttemptSample>>,
    capacity: usize,
}

impl PerformanceTracker {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            samples: DashMap::new(),
            capacity,
        }
    }

    /// Record one finished agent attempt. Cancelled attempts are not recorded.
    pub(crate) fn record(&self, agent_id: &str, elapsed: Duration, success: bool) {
        if self.capacity == 0 {
            return;
        }
        let mut samples = self.samples.entry(agent_id.to_string()).or_default();
        if samples.len() == self.capacity {
            samples.pop_front();
        }
        samples.push_back(AttemptSample {
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            success,
            at: Utc::now(),
        });
    }

    /// `None` when the agent has no recorded attempts.
    pub(crate) fn agent(&self, agent_id: &str) -> Option<AgentPerformance> {
        let samples = self.samples.get(agent_id)?;
        if samples.is_empty() {
            return None;
        }

        let total = samples.len();
        let successful = samples.iter().filter(|sample| sample.success).count();
        let elapsed: f64 = samples.iter().map(|sample| sample.duration_ms).sum();
        Some(AgentPerformance {
            agent_id: agent_id.to_string(),
            total_executions: total,
            successful,
            success_rate: successful as f64 / total as f64,
            average_execution_ms: elapsed / total as f64,
            last_execution: samples.back().map(|sample| sample.at),
        })
    }

    /// Mean attempt time across all agents for attempts at or after `since`;
    /// 0 when there are none.
    pub(crate) fn average_since(&self, since: DateTime<Utc>) -> f64 {
        let (sum, count) = self
            .samples
            .iter()
            .flat_map(|entry| {
                entry
                    .value()
                    .iter()
                    .filter(|sample| sample.at >= since)
                    .map(|sample| sample.duration_ms)
                    .collect::<Vec<_>>()
            })
            .fold((0.0, 0usize), |(sum, count), ms| (sum + ms, count + 1));
        if count == 0 { 0.0 } else { sum / count as f64 }
    }

    /// Drop an agent's history.
    pub(crate) fn forget(&self, agent_id: &str) {
        self.samples.remove(agent_id);
    }
}
