//! Execution traces: the immutable audit record of one atomic execution.
//!
//! A trace is assembled by the kernel through `TraceBuilder` and frozen by
//! `build()`. `ExecutionTrace` exposes getters only; once a trace has been
//! handed out nothing can change it.
//!
//! Fields fall into two groups:
//!
//! - **deterministic**: descriptor, success, failure code, exception type and
//!   the policy decisions that admitted the run. These must reproduce for a
//!   deterministic task and input.
//! - **observational**: ids, timestamps, runtime, output, error text, metadata
//!   and the timeout classification. These vary run to run and are masked in
//!   the canonical form.

use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::{
    descriptor::OperationDescriptor,
    error::{KlError, KlResult},
    policy::PolicyDecision,
};

/// Stable failure identifiers shared by traces and run results.
///
/// A trace only ever carries `Ok`, `TaskException` or `KernelError`.
/// `InvalidInput` and `PolicyDenied` are reported by the ordered runner for
/// steps that never reached the kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    Ok,
    TaskException,
    InvalidInput,
    KernelError,
    PolicyDenied,
}

impl FailureCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCode::Ok => "OK",
            FailureCode::TaskException => "TASK_EXCEPTION",
            FailureCode::InvalidInput => "INVALID_INPUT",
            FailureCode::KernelError => "KERNEL_ERROR",
            FailureCode::PolicyDenied => "POLICY_DENIED",
        }
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Post-hoc timeout label.
///
/// Computed after the task has returned by comparing `runtime_ms` with the
/// configured limit. It never interrupts a task and never changes `success`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeoutClassification {
    pub limit_ms: f64,
    pub exceeded: bool,
}

impl TimeoutClassification {
    pub fn classify(limit_ms: f64, runtime_ms: f64) -> Self {
        Self {
            limit_ms,
            exceeded: runtime_ms > limit_ms,
        }
    }
}

/// Format a timestamp the way every trace serializes it: RFC 3339, UTC,
/// millisecond precision, trailing `Z`.
pub fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One frozen execution record.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionTrace {
    descriptor: OperationDescriptor,
    success: bool,
    failure_code: FailureCode,
    exception_type: Option<String>,
    policy_decisions: Vec<PolicyDecision>,

    trace_id: String,
    parent_trace_id: Option<String>,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    runtime_ms: f64,
    output: Value,
    error: Option<String>,
    metadata: Map<String, Value>,
    timeout: Option<TimeoutClassification>,
}

impl ExecutionTrace {
    pub fn descriptor(&self) -> &OperationDescriptor {
        &self.descriptor
    }

    pub fn success(&self) -> bool {
        self.success
    }

    pub fn failure_code(&self) -> FailureCode {
        self.failure_code
    }

    pub fn exception_type(&self) -> Option<&str> {
        self.exception_type.as_deref()
    }

    /// Decisions that admitted this execution, in evaluation order.
    pub fn policy_decisions(&self) -> &[PolicyDecision] {
        &self.policy_decisions
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn parent_trace_id(&self) -> Option<&str> {
        self.parent_trace_id.as_deref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn runtime_ms(&self) -> f64 {
        self.runtime_ms
    }

    /// The task's result. `Value::Null` when the task failed.
    pub fn output(&self) -> &Value {
        &self.output
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn timeout(&self) -> Option<TimeoutClassification> {
        self.timeout
    }

    /// True when a timeout limit applied and the run went past it.
    pub fn timed_out(&self) -> bool {
        self.timeout.map(|t| t.exceeded).unwrap_or(false)
    }

    /// JSON-compatible mapping of the full trace.
    ///
    /// Keys are emitted in sorted order. Keys are additive across versions;
    /// existing keys are never renamed.
    pub fn describe(&self) -> Value {
        json!({
            "trace_id": self.trace_id,
            "parent_trace_id": self.parent_trace_id,
            "descriptor": self.descriptor,
            "success": self.success,
            "failure_code": self.failure_code,
            "exception_type": self.exception_type,
            "policy_decisions": self.policy_decisions,
            "output": self.output,
            "error": self.error,
            "started_at": format_timestamp(&self.started_at),
            "finished_at": format_timestamp(&self.finished_at),
            "runtime_ms": self.runtime_ms,
            "metadata": self.metadata,
            "timeout": self.timeout,
        })
    }
}

impl Serialize for ExecutionTrace {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.describe().serialize(serializer)
    }
}

/// Assembles an `ExecutionTrace`. Only `build()` produces a trace, and the
/// builder is consumed in the process.
#[derive(Debug, Clone)]
pub struct TraceBuilder {
    descriptor: OperationDescriptor,
    trace_id: String,
    started_at: DateTime<Utc>,
    parent_trace_id: Option<String>,
    policy_decisions: Vec<PolicyDecision>,
    metadata: Map<String, Value>,
    outcome: Option<Outcome>,
    finished_at: Option<DateTime<Utc>>,
    runtime_ms: f64,
    timeout: Option<TimeoutClassification>,
}

#[derive(Debug, Clone)]
enum Outcome {
    Succeeded(Value),
    Failed {
        code: FailureCode,
        exception_type: Option<String>,
        error: String,
    },
}

impl TraceBuilder {
    pub fn new(
        descriptor: OperationDescriptor,
        trace_id: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            descriptor,
            trace_id: trace_id.into(),
            started_at,
            parent_trace_id: None,
            policy_decisions: Vec::new(),
            metadata: Map::new(),
            outcome: None,
            finished_at: None,
            runtime_ms: 0.0,
            timeout: None,
        }
    }

    pub fn parent_trace_id(mut self, parent: Option<String>) -> Self {
        self.parent_trace_id = parent;
        self
    }

    pub fn policy_decisions(mut self, decisions: Vec<PolicyDecision>) -> Self {
        self.policy_decisions = decisions;
        self
    }

    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn succeeded(mut self, output: Value) -> Self {
        self.outcome = Some(Outcome::Succeeded(output));
        self
    }

    pub fn failed(
        mut self,
        code: FailureCode,
        exception_type: Option<String>,
        error: impl Into<String>,
    ) -> Self {
        self.outcome = Some(Outcome::Failed {
            code,
            exception_type,
            error: error.into(),
        });
        self
    }

    pub fn finished(mut self, finished_at: DateTime<Utc>, runtime_ms: f64) -> Self {
        self.finished_at = Some(finished_at);
        self.runtime_ms = runtime_ms;
        self
    }

    pub fn timeout(mut self, timeout: Option<TimeoutClassification>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Validate and freeze.
    ///
    /// Fails with `KlError::TraceConstruction` when the trace id is empty, no
    /// outcome or finish time was recorded, the finish time precedes the start,
    /// the runtime is negative or not finite, or a failed outcome carries a code
    /// a trace may not hold.
    pub fn build(self) -> KlResult<ExecutionTrace> {
        if self.trace_id.trim().is_empty() {
            return Err(construction("trace id is empty"));
        }
        let finished_at = self
            .finished_at
            .ok_or_else(|| construction("finish time was never recorded"))?;
        if finished_at < self.started_at {
            return Err(construction(format!(
                "finish time {} precedes start time {}",
                format_timestamp(&finished_at),
                format_timestamp(&self.started_at)
            )));
        }
        if !self.runtime_ms.is_finite() || self.runtime_ms < 0.0 {
            return Err(construction(format!("runtime {} ms is not valid", self.runtime_ms)));
        }

        let (success, failure_code, exception_type, output, error) = match self.outcome {
            None => return Err(construction("task outcome was never recorded")),
            Some(Outcome::Succeeded(output)) => (true, FailureCode::Ok, None, output, None),
            Some(Outcome::Failed { code, exception_type, error }) => {
                if !matches!(code, FailureCode::TaskException | FailureCode::KernelError) {
                    return Err(construction(format!("failure code {code} cannot be traced")));
                }
                (false, code, exception_type, Value::Null, Some(error))
            }
        };

        Ok(ExecutionTrace {
            descriptor: self.descriptor,
            success,
            failure_code,
            exception_type,
            policy_decisions: self.policy_decisions,
            trace_id: self.trace_id,
            parent_trace_id: self.parent_trace_id,
            started_at: self.started_at,
            finished_at,
            runtime_ms: self.runtime_ms,
            output,
            error,
            metadata: self.metadata,
            timeout: self.timeout,
        })
    }

    /// Freeze a `KERNEL_ERROR` trace without validation.
    ///
    /// Used when `build()` rejected the assembled fields: the kernel still owes
    /// its caller exactly one trace. The task outcome is discarded and the
    /// construction failure becomes the trace's error.
    pub fn into_kernel_fault(self, reason: impl Into<String>) -> ExecutionTrace {
        let finished_at = self
            .finished_at
            .filter(|at| *at >= self.started_at)
            .unwrap_or(self.started_at);
        let runtime_ms = if self.runtime_ms.is_finite() && self.runtime_ms >= 0.0 {
            self.runtime_ms
        } else {
            0.0
        };

        ExecutionTrace {
            descriptor: self.descriptor,
            success: false,
            failure_code: FailureCode::KernelError,
            exception_type: Some("KernelError".to_string()),
            policy_decisions: self.policy_decisions,
            trace_id: self.trace_id,
            parent_trace_id: self.parent_trace_id,
            started_at: self.started_at,
            finished_at,
            runtime_ms,
            output: Value::Null,
            error: Some(reason.into()),
            metadata: self.metadata,
            timeout: self.timeout,
        }
    }
}

fn construction(reason: impl Into<String>) -> KlError {
    KlError::TraceConstruction {
        reason: reason.into(),
    }
}
