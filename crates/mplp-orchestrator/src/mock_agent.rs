//! Scriptable agent for tests and demos.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;

use crate::agent::{Agent, AgentError, AgentInput};

/// One recorded invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub action: String,
    pub step_id: String,
    pub input: AgentInput,
}

/// Agent with configurable responses, failures and latency.
///
/// Without a configured response it echoes the input parameters. Calls,
/// completion order and the peak number of concurrent invocations are
/// recorded for assertions.
pub struct MockAgent {
    id: String,
    default_response: Option<Value>,
    responses: Mutex<HashMap<String, Value>>,
    delay: Duration,
    fail_always: Option<String>,
    failures_remaining: AtomicU32,
    calls: Mutex<Vec<MockCall>>,
    completed: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockAgent {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            default_response: None,
            responses: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            fail_always: None,
            failures_remaining: AtomicU32::new(0),
            calls: Mutex::new(Vec::new()),
            completed: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    /// Respond with `value` to every action.
    pub fn with_response(mut self, value: Value) -> Self {
        self.default_response = Some(value);
        self
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every call with `message`.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_always = Some(message.into());
        self
    }

    /// Fail the first `times` calls, then succeed.
    pub fn failing_times(self, times: u32) -> Self {
        self.failures_remaining.store(times, Ordering::SeqCst);
        self
    }

    /// Respond with `value` to `action` only.
    pub fn set_response(&self, action: &str, value: Value) {
        self.responses.lock().insert(action.to_string(), value);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    /// Step ids in the order their calls finished.
    pub fn completion_order(&self) -> Vec<String> {
        self.completed.lock().clone()
    }

    /// Highest number of calls observed running at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn respond(&self, action: &str, input: AgentInput) -> Result<Value, AgentError> {
        if let Some(message) = &self.fail_always {
            return Err(AgentError::ExecutionFailed(message.clone()));
        }
        let failed = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(AgentError::ExecutionFailed(format!(
                "scripted failure for step {}",
                input.step_id
            )));
        }
        if let Some(value) = self.responses.lock().get(action) {
            return Ok(value.clone());
        }
        Ok(self
            .default_response
            .clone()
            .unwrap_or(Value::Object(input.parameters)))
    }
}

struct InFlightGuard<'a>(&'a AtomicUsize);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Agent for MockAgent {
    fn id(&self) -> &str {
        &self.id
    }

    async fn execute(&self, action: &str, input: AgentInput) -> Result<Value, AgentError> {
        self.calls.lock().push(MockCall {
            action: action.to_string(),
            step_id: input.step_id.clone(),
            input: input.clone(),
        });

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(&self.in_flight);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let step_id = input.step_id.clone();
        let result = self.respond(action, input);
        self.completed.lock().push(step_id);
        result
    }
}
