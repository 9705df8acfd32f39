//! Core trait definitions for the KL execution model.
//!
//! These traits mark the seams of the harness:
//!
//! - `Task`         : untrusted unit of work, invoked exactly once per execution
//! - `PolicyGate`   : trusted pure gate, evaluated before a task may run
//! - `TraceSink`    : append-only consumer of finished traces
//! - `Clock`        : time source, swapped for a fixed clock in deterministic mode
//! - `TraceIdSource`: trace identifier source, likewise swappable

use std::fmt;
use std::marker::PhantomData;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use kl_contracts::{
    descriptor::OperationDescriptor, error::KlResult, policy::PolicyDecision,
    trace::ExecutionTrace,
};

/// A failure reported by a task.
///
/// Task error hierarchies are flattened to a type name (`kind`) and a message
/// when they cross into the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskError {
    pub kind: String,
    pub message: String,
}

impl TaskError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Capture any error value, naming it by its unqualified type name.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        Self::new(short_type_name::<E>(), err.to_string())
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for TaskError {}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// A unit of work the kernel can invoke.
///
/// `call` receives the step's argument bundle. The kernel calls it exactly
/// once per execution and catches both `Err` returns and panics; nothing a
/// task does escapes the kernel as an error.
pub trait Task: Send + Sync {
    fn call(&self, arguments: &Value) -> Result<Value, TaskError>;
}

/// Adapter turning a closure with a serializable result into a `Task`.
///
/// Results that cannot be represented as JSON become the marker string
/// `"<unserializable: ...>"` rather than a failure.
pub struct FnTask<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

/// Wrap a closure as a `Task`.
///
/// ```rust,ignore
/// let add = task_fn(|args: &Value| {
///     let a = args["a"].as_i64().unwrap_or(0);
///     let b = args["b"].as_i64().unwrap_or(0);
///     Ok::<_, TaskError>(a + b)
/// });
/// ```
pub fn task_fn<F, T>(f: F) -> FnTask<F, T>
where
    F: Fn(&Value) -> Result<T, TaskError> + Send + Sync,
    T: Serialize,
{
    FnTask {
        f,
        _output: PhantomData,
    }
}

impl<F, T> Task for FnTask<F, T>
where
    F: Fn(&Value) -> Result<T, TaskError> + Send + Sync,
    T: Serialize,
{
    fn call(&self, arguments: &Value) -> Result<Value, TaskError> {
        let output = (self.f)(arguments)?;
        Ok(serde_json::to_value(&output)
            .unwrap_or_else(|e| Value::String(format!("<unserializable: {e}>"))))
    }
}

/// The policy gate: decides whether an operation may run, from its
/// descriptor alone.
///
/// Implementations must be pure. The same descriptor always yields the same
/// decision, evaluation has no side effects, and it never fails: an
/// unrecognized or empty effect is a denial, not an error.
pub trait PolicyGate: Send + Sync {
    fn evaluate(&self, descriptor: &OperationDescriptor) -> PolicyDecision;
}

/// Append-only consumer of traces produced by the runner.
///
/// A failed write halts the run: a step whose trace cannot be recorded is
/// reported as a kernel fault.
pub trait TraceSink: Send + Sync {
    fn record(&self, trace: &ExecutionTrace) -> KlResult<()>;
}

/// Time source for the kernel.
pub trait Clock: Send + Sync {
    /// Wall-clock time stamped on traces.
    fn now(&self) -> DateTime<Utc>;

    /// Monotonic reading in milliseconds. Only differences are meaningful.
    fn monotonic_ms(&self) -> f64;
}

/// Source of unique trace identifiers.
pub trait TraceIdSource: Send + Sync {
    fn next_id(&self) -> String;
}
