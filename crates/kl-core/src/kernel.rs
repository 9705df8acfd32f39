//! The kernel: exactly-once execution of a single task.
//!
//! The kernel has no policy logic and no orchestration. For every call it
//!
//!   stamp start → invoke task once → stamp finish → freeze one trace
//!
//! Task failures, whether an `Err` return or a panic, are folded into the
//! trace and never reach the caller. If the trace itself cannot be built, the
//! kernel still returns exactly one trace, marked `KERNEL_ERROR`.
//!
//! There is no timeout enforcement. A task that never returns never returns
//! to the kernel. A configured timeout only labels the finished trace.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use chrono::{DateTime, Duration, Utc};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use kl_contracts::{
    descriptor::OperationDescriptor,
    policy::PolicyDecision,
    trace::{ExecutionTrace, FailureCode, TimeoutClassification, TraceBuilder},
};

use crate::{
    clock::{FixedClock, SequentialTraceIds, SystemClock, UuidTraceIds},
    traits::{Clock, Task, TaskError, TraceIdSource},
};

/// Pass-through data the kernel stamps onto a trace without interpreting it.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub parent_trace_id: Option<String>,
    /// Decisions that admitted this execution.
    pub policy_decisions: Vec<PolicyDecision>,
    pub metadata: Map<String, Value>,
    /// Limit for post-hoc timeout classification.
    pub timeout_seconds: Option<f64>,
}

/// Minimal execution engine.
///
/// Holds no per-execution state, so one kernel may serve any number of
/// executions, from several threads when the tasks are reentrant.
pub struct Kernel {
    clock: Box<dyn Clock>,
    ids: Box<dyn TraceIdSource>,
}

impl Kernel {
    /// A kernel on the system clock with random trace ids.
    pub fn new() -> Self {
        Self::with_sources(Box::new(SystemClock::new()), Box::new(UuidTraceIds))
    }

    pub fn with_sources(clock: Box<dyn Clock>, ids: Box<dyn TraceIdSource>) -> Self {
        Self { clock, ids }
    }

    /// A kernel whose traces are fully reproducible: every timestamp is `at`,
    /// `runtime_ms` is `0.0`, and trace ids run `trace-0001`, `trace-0002`, …
    pub fn deterministic(at: DateTime<Utc>) -> Self {
        Self::with_sources(
            Box::new(FixedClock::new(at)),
            Box::new(SequentialTraceIds::new("trace")),
        )
    }

    /// Execute `task` once under `descriptor` and return its trace.
    pub fn execute(
        &self,
        descriptor: &OperationDescriptor,
        task: &dyn Task,
        arguments: &Value,
    ) -> ExecutionTrace {
        self.execute_with(descriptor, task, arguments, ExecuteOptions::default())
    }

    /// Execute with lineage, admitting decisions, metadata and a timeout label.
    ///
    /// The descriptor is not re-validated and no policy is consulted here;
    /// admission is the caller's job.
    pub fn execute_with(
        &self,
        descriptor: &OperationDescriptor,
        task: &dyn Task,
        arguments: &Value,
        options: ExecuteOptions,
    ) -> ExecutionTrace {
        let trace_id = self.ids.next_id();
        let started_at = self.clock.now();
        let t0 = self.clock.monotonic_ms();

        debug!(
            trace_id = %trace_id,
            operation_id = %descriptor.operation_id(),
            effect = %descriptor.effect(),
            "kernel invoking task"
        );

        // The only call site of `Task::call` in the workspace.
        let outcome = invoke_once(task, arguments);

        // The finish stamp follows the monotonic reading, so a wall clock
        // stepping backwards mid-task cannot precede the start stamp.
        let runtime_ms = self.clock.monotonic_ms() - t0;
        let finished_at = finish_stamp(started_at, runtime_ms);

        let timeout = options
            .timeout_seconds
            .map(|seconds| TimeoutClassification::classify(seconds * 1000.0, runtime_ms));
        if let Some(t) = timeout.filter(|t| t.exceeded) {
            warn!(
                trace_id = %trace_id,
                operation_id = %descriptor.operation_id(),
                runtime_ms,
                limit_ms = t.limit_ms,
                "task exceeded its timeout; classified, not interrupted"
            );
        }

        let builder = TraceBuilder::new(descriptor.clone(), trace_id.clone(), started_at)
            .parent_trace_id(options.parent_trace_id)
            .policy_decisions(options.policy_decisions)
            .metadata(options.metadata)
            .finished(finished_at, runtime_ms)
            .timeout(timeout);

        let builder = match outcome {
            Ok(output) => builder.succeeded(output),
            Err(err) => {
                warn!(
                    trace_id = %trace_id,
                    operation_id = %descriptor.operation_id(),
                    exception_type = %err.kind,
                    error = %err.message,
                    "task failed"
                );
                builder.failed(FailureCode::TaskException, Some(err.kind.clone()), err.to_string())
            }
        };

        match builder.clone().build() {
            Ok(trace) => {
                debug!(
                    trace_id = %trace_id,
                    success = trace.success(),
                    runtime_ms = trace.runtime_ms(),
                    "kernel produced trace"
                );
                trace
            }
            Err(e) => {
                warn!(
                    trace_id = %trace_id,
                    operation_id = %descriptor.operation_id(),
                    error = %e,
                    "trace construction failed; emitting kernel fault trace"
                );
                builder.into_kernel_fault(e.to_string())
            }
        }
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

/// `started_at` advanced by the elapsed monotonic time. An invalid runtime
/// leaves the stamp at `started_at`; `build()` reports the runtime itself.
fn finish_stamp(started_at: DateTime<Utc>, runtime_ms: f64) -> DateTime<Utc> {
    if !runtime_ms.is_finite() || runtime_ms < 0.0 {
        return started_at;
    }
    let elapsed = Duration::microseconds((runtime_ms * 1000.0).round() as i64);
    started_at.checked_add_signed(elapsed).unwrap_or(started_at)
}

/// Call the task exactly once, converting a panic into a `TaskError`.
fn invoke_once(task: &dyn Task, arguments: &Value) -> Result<Value, TaskError> {
    match panic::catch_unwind(AssertUnwindSafe(|| task.call(arguments))) {
        Ok(result) => result,
        Err(payload) => Err(TaskError::new("panic", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
