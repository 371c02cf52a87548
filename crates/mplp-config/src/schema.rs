//! Configuration schema definitions.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Scheduling defaults applied when a workflow or step leaves a knob unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Per-attempt timeout for agent steps without their own timeout.
    #[serde(default = "default_step_timeout_ms")]
    pub default_step_timeout_ms: u64,

    /// Whole-execution timeout for workflows without their own timeout.
    #[serde(default)]
    pub default_workflow_timeout_ms: Option<u64>,

    /// Retries for agent steps when neither the step nor the workflow sets any.
    #[serde(default)]
    pub default_retries: u32,

    #[serde(default)]
    pub retry: RetryConfig,

    /// Cap on simultaneously running top-level steps (0 = unbounded).
    #[serde(default)]
    pub max_concurrent_steps: usize,

    /// Iteration bound for loop steps without `max_iterations`.
    #[serde(default = "default_max_iterations")]
    pub default_max_iterations: u32,

    /// Terminal executions kept in memory (0 = keep all).
    #[serde(default)]
    pub retain_executions: usize,

    /// Audit records kept by the orchestrator.
    #[serde(default = "default_audit_log_limit")]
    pub audit_log_limit: usize,
}

fn default_step_timeout_ms() -> u64 {
    300_000
}

fn default_max_iterations() -> u32 {
    100
}

fn default_audit_log_limit() -> usize {
    1000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            default_step_timeout_ms: default_step_timeout_ms(),
            default_workflow_timeout_ms: None,
            default_retries: 0,
            retry: RetryConfig::default(),
            max_concurrent_steps: 0,
            default_max_iterations: default_max_iterations(),
            retain_executions: 0,
            audit_log_limit: default_audit_log_limit(),
        }
    }
}

impl OrchestratorConfig {
    /// Default per-attempt step timeout.
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.default_step_timeout_ms)
    }

    /// Default workflow timeout, if any.
    pub fn workflow_timeout(&self) -> Option<Duration> {
        self.default_workflow_timeout_ms.map(Duration::from_millis)
    }
}

/// Exponential backoff between retry attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Delay before the first retry.
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound for any single delay.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based): `base * 2^(retry - 1)`,
    /// capped at `max_delay_ms`.
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exponent = retry.saturating_sub(1).min(32);
        let delay = self.base_delay_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}
