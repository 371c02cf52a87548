//! Predicates for conditional and loop steps.
//!
//! Predicates are synchronous and see a snapshot of the execution context
//! taken when the decision is made.

#[cfg(test)]
#[path = "condition_tests.rs"]
mod tests;

use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use super::context::ExecutionContext;

/// Error raised by a predicate that cannot decide.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct ConditionError(pub String);

/// A yes/no decision over the execution context.
///
/// Implemented for any `Fn(&ExecutionContext) -> bool`; implement it directly
/// when evaluation can fail.
pub trait Condition: Send + Sync {
    fn evaluate(&self, context: &ExecutionContext) -> Result<bool, ConditionError>;
}

impl<F> Condition for F
where
    F: Fn(&ExecutionContext) -> bool + Send + Sync,
{
    fn evaluate(&self, context: &ExecutionContext) -> Result<bool, ConditionError> {
        Ok(self(context))
    }
}

/// Shareable predicate with an optional human-readable description.
#[derive(Clone)]
pub struct Predicate {
    condition: Arc<dyn Condition>,
    description: Option<String>,
}

impl Predicate {
    pub fn new<C>(condition: C) -> Self
    where
        C: Condition + 'static,
    {
        Self {
            condition: Arc::new(condition),
            description: None,
        }
    }

    /// Predicate backed by an [`ExpressionCondition`]; the expression doubles
    /// as the description.
    pub fn expression(expression: impl Into<String>) -> Self {
        let condition = ExpressionCondition::new(expression);
        let description = condition.expression().to_string();
        Self::new(condition).with_description(description)
    }

    /// Constant predicate.
    pub fn always(value: bool) -> Self {
        Self::new(move |_: &ExecutionContext| value).with_description(value.to_string())
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn evaluate(&self, context: &ExecutionContext) -> Result<bool, ConditionError> {
        self.condition.evaluate(context)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

/// Small expression language over context values.
///
/// Supported forms:
/// - `key` - truthy check
/// - `!key` - falsy check
/// - `key == value`, `key != value` - string comparison
/// - `key > n`, `key >= n`, `key < n`, `key <= n` - numeric comparison
///
/// `key` names a step output or workflow parameter; `key.a.b` descends into
/// object fields.
#[derive(Debug, Clone)]
pub struct ExpressionCondition {
    expression: String,
}

const OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];

impl ExpressionCondition {
    pub fn new(expression: impl Into<String>) -> Self {
        Self {
            expression: expression.into(),
        }
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    fn lookup<'a>(context: &'a ExecutionContext, path: &str) -> Option<&'a Value> {
        let mut parts = path.split('.');
        let mut value = context.get(parts.next()?)?;
        for part in parts {
            value = match value {
                Value::Object(map) => map.get(part)?,
                Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(value)
    }

    fn truthy(value: Option<&Value>) -> bool {
        match value {
            None | Some(Value::Null) => false,
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
            Some(Value::String(s)) => !s.is_empty(),
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(_)) => true,
        }
    }

    fn as_text(value: &Value) -> String {
        match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        }
    }

    fn compare(
        &self,
        left: Option<&Value>,
        operator: &str,
        right: &str,
    ) -> Result<bool, ConditionError> {
        match operator {
            "==" => Ok(left.is_some_and(|v| Self::as_text(v) == right)),
            "!=" => Ok(left.is_none_or(|v| Self::as_text(v) != right)),
            _ => {
                let threshold: f64 = right.parse().map_err(|_| {
                    ConditionError(format!(
                        "'{}' is not a number in expression '{}'",
                        right, self.expression
                    ))
                })?;
                let Some(actual) = left.and_then(Value::as_f64) else {
                    return Ok(false);
                };
                Ok(match operator {
                    ">=" => actual >= threshold,
                    "<=" => actual <= threshold,
                    ">" => actual > threshold,
                    _ => actual < threshold,
                })
            }
        }
    }
}

impl Condition for ExpressionCondition {
    fn evaluate(&self, context: &ExecutionContext) -> Result<bool, ConditionError> {
        let expression = self.expression.trim();
        if expression.is_empty() {
            return Err(ConditionError("empty expression".to_string()));
        }

        for operator in OPERATORS {
            if let Some((left, right)) = expression.split_once(operator) {
                let left = left.trim();
                if left.is_empty() {
                    return Err(ConditionError(format!(
                        "missing left operand in expression '{}'",
                        self.expression
                    )));
                }
                let right = right.trim().trim_matches('"');
                return self.compare(Self::lookup(context, left), operator, right);
            }
        }

        if let Some(negated) = expression.strip_prefix('!') {
            return Ok(!Self::truthy(Self::lookup(context, negated.trim())));
        }
        Ok(Self::truthy(Self::lookup(context, expression)))
    }
}
