use crate::common::types::{StepId, StepKind, StepParams, StepSpec, StepStatus};
use crate::utils::duration_ms;
use crate::utils::error::WakeError;
use log::error;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

pub type SuccessCallback = Arc<dyn Fn(&Value) + Send + Sync>;
pub type FailureCallback = Arc<dyn Fn(&WakeError) + Send + Sync>;

/// Caller-owned side-effect hooks. Never persisted.
#[derive(Clone, Default)]
pub struct StepHooks {
    pub on_success: Option<SuccessCallback>,
    pub on_failure: Option<FailureCallback>,
}

impl StepHooks {
    pub fn on_success(mut self, callback: impl Fn(&Value) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn on_failure(mut self, callback: impl Fn(&WakeError) + Send + Sync + 'static) -> Self {
        self.on_failure = Some(Arc::new(callback));
        self
    }
}

impl fmt::Debug for StepHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepHooks")
            .field("on_success", &self.on_success.is_some())
            .field("on_failure", &self.on_failure.is_some())
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: StepKind,
    pub description: String,
    pub status: StepStatus,
    pub params: StepParams,
    pub dependencies: Vec<StepId>,
    pub retry_count: u32,
    pub max_retries: u32,
    #[serde(default, with = "duration_ms::option")]
    pub timeout: Option<Duration>,
    #[serde(skip)]
    pub hooks: StepHooks,
}

impl Step {
    pub fn new(spec: StepSpec) -> Self {
        Step {
            id: spec.id,
            name: spec.name,
            kind: spec.kind,
            description: spec.description,
            status: StepStatus::Pending,
            params: spec.params,
            dependencies: spec.dependencies,
            retry_count: 0,
            max_retries: spec.max_retries,
            timeout: spec.timeout,
            hooks: spec.hooks,
        }
    }

    /// A step is critical unless its params say `"critical": false`.
    pub fn is_critical(&self) -> bool {
        !matches!(self.params.get("critical"), Some(Value::Bool(false)))
    }

    pub fn can_retry(&self) -> bool {
        self.retry_count < self.max_retries
    }

    pub fn increment_retries(&mut self) {
        self.retry_count += 1;
    }

    pub fn dependencies_met(&self, completed: &[StepId]) -> bool {
        self.dependencies.iter().all(|dep| completed.contains(dep))
    }

    pub fn reset(&mut self) {
        self.status = StepStatus::Pending;
        self.retry_count = 0;
    }

    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    pub fn param_u64(&self, key: &str) -> Option<u64> {
        self.params.get(key).and_then(Value::as_u64)
    }

    pub(crate) fn notify_success(&self, result: &Value) {
        if let Some(callback) = &self.hooks.on_success {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(result))).is_err() {
                error!("Step {}: on_success hook panicked", self.id);
            }
        }
    }

    pub(crate) fn notify_failure(&self, failure: &WakeError) {
        if let Some(callback) = &self.hooks.on_failure {
            if panic::catch_unwind(AssertUnwindSafe(|| callback(failure))).is_err() {
                error!("Step {}: on_failure hook panicked", self.id);
            }
        }
    }
}
