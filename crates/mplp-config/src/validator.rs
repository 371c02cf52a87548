//! Configuration validation.

#[cfg(test)]
#[path = "validator_tests.rs"]
mod tests;

use crate::error::ConfigError;
use crate::schema::Config;

/// Validation result.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    /// Turn the first error into a [`ConfigError`], if any.
    pub fn into_result(self) -> Result<Vec<ValidationWarning>, ConfigError> {
        match self.errors.into_iter().next() {
            Some(error) => Err(ConfigError::InvalidValue {
                field: error.path,
                message: error.message,
            }),
            None => Ok(self.warnings),
        }
    }
}

/// A validation error.
#[derive(Debug)]
pub struct ValidationError {
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// A validation warning.
#[derive(Debug)]
pub struct ValidationWarning {
    pub path: String,
    pub message: String,
}

impl ValidationWarning {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration.
    pub fn validate(config: &Config) -> ValidationResult {
        let mut result = ValidationResult::default();

        Self::validate_timeouts(config, &mut result);
        Self::validate_retry(config, &mut result);
        Self::validate_limits(config, &mut result);
        Self::validate_logging(config, &mut result);

        result
    }

    fn validate_timeouts(config: &Config, result: &mut ValidationResult) {
        let orchestrator = &config.orchestrator;

        if orchestrator.default_step_timeout_ms == 0 {
            result.add_error(ValidationError::new(
                "orchestrator.default_step_timeout_ms",
                "default_step_timeout_ms must be greater than 0",
            ));
        }

        if orchestrator.default_workflow_timeout_ms == Some(0) {
            result.add_error(ValidationError::new(
                "orchestrator.default_workflow_timeout_ms",
                "default_workflow_timeout_ms must be greater than 0 when set",
            ));
        }

        if let Some(workflow_ms) = orchestrator.default_workflow_timeout_ms {
            if workflow_ms > 0 && workflow_ms < orchestrator.default_step_timeout_ms {
                result.add_warning(ValidationWarning::new(
                    "orchestrator.default_workflow_timeout_ms",
                    "workflow timeout is shorter than the default step timeout",
                ));
            }
        }
    }

    fn validate_retry(config: &Config, result: &mut ValidationResult) {
        let orchestrator = &config.orchestrator;

        if orchestrator.retry.base_delay_ms > orchestrator.retry.max_delay_ms {
            result.add_error(ValidationError::new(
                "orchestrator.retry.base_delay_ms",
                "base_delay_ms must not exceed max_delay_ms",
            ));
        }

        if orchestrator.default_retries > 10 {
            result.add_warning(ValidationWarning::new(
                "orchestrator.default_retries",
                "default_retries is very high (>10), failing agents will be retried for a long time",
            ));
        }
    }

    fn validate_limits(config: &Config, result: &mut ValidationResult) {
        let orchestrator = &config.orchestrator;

        if orchestrator.default_max_iterations == 0 {
            result.add_error(ValidationError::new(
                "orchestrator.default_max_iterations",
                "default_max_iterations must be greater than 0",
            ));
        }

        if orchestrator.audit_log_limit == 0 {
            result.add_warning(ValidationWarning::new(
                "orchestrator.audit_log_limit",
                "audit_log_limit is 0, registry changes will not be audited",
            ));
        }
    }

    fn validate_logging(config: &Config, result: &mut ValidationResult) {
        if config.logging.level.trim().is_empty() {
            result.add_error(ValidationError::new(
                "logging.level",
                "level cannot be empty",
            ));
        }
    }
}
