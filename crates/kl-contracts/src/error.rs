//! Error types for the KL execution kernel.
//!
//! Only structurally invalid input surfaces as a `KlError`. Task failures are
//! never errors at this level: the kernel folds them into an `ExecutionTrace`.

use thiserror::Error;

use crate::trace::ExecutionTrace;

/// The unified error type for the KL crates.
#[derive(Debug, Error)]
pub enum KlError {
    /// A descriptor field failed its construction invariant.
    #[error("invalid descriptor: field '{field}' {reason}")]
    InvalidDescriptor { field: String, reason: String },

    /// A runner step is structurally malformed and was never attempted.
    #[error("invalid step at index {index}: {reason}")]
    InvalidStep { index: usize, reason: String },

    /// A policy gate refused a single-step execution.
    #[error("execution blocked by policy '{policy_name}': {reason}")]
    PolicyViolation { policy_name: String, reason: String },

    /// The kernel could not assemble a well-formed trace.
    #[error("trace construction failed: {reason}")]
    TraceConstruction { reason: String },

    /// A trace sink refused an entry.
    #[error("audit write failed: {reason}")]
    AuditWriteFailed { reason: String },

    /// A step ran but its trace could not be recorded. The trace is kept.
    #[error("trace was produced but not recorded: {reason}")]
    TraceNotRecorded {
        reason: String,
        trace: Box<ExecutionTrace>,
    },

    /// A configuration document is missing or malformed.
    #[error("configuration error: {reason}")]
    ConfigError { reason: String },
}

/// Convenience alias used throughout the KL crates.
pub type KlResult<T> = Result<T, KlError>;
