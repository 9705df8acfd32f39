//! Aggregate outcome of an ordered run.

use serde::Serialize;

use crate::{
    policy::PolicyDecision,
    trace::{ExecutionTrace, FailureCode},
};

/// What an ordered run did and, if it stopped early, where and why.
///
/// `traces` holds one entry per step that reached the kernel, in step order.
/// Steps after a failure are never attempted and leave no trace. A step
/// refused by policy never reaches the kernel either, so on `PolicyDenied`
/// the last trace belongs to the step before the failing index.
#[derive(Debug, Clone, Serialize)]
pub struct CaelResult {
    pub traces: Vec<ExecutionTrace>,
    pub failure_code: FailureCode,
    pub failure_message: Option<String>,
    pub failed_step_index: Option<usize>,
    /// The decision that halted the run, when `failure_code` is `PolicyDenied`.
    pub denial: Option<PolicyDecision>,
}

impl CaelResult {
    pub fn completed(traces: Vec<ExecutionTrace>) -> Self {
        Self {
            traces,
            failure_code: FailureCode::Ok,
            failure_message: None,
            failed_step_index: None,
            denial: None,
        }
    }

    pub fn invalid_input(index: Option<usize>, message: impl Into<String>) -> Self {
        Self {
            traces: Vec::new(),
            failure_code: FailureCode::InvalidInput,
            failure_message: Some(message.into()),
            failed_step_index: index,
            denial: None,
        }
    }

    pub fn policy_denied(traces: Vec<ExecutionTrace>, index: usize, decision: PolicyDecision) -> Self {
        Self {
            traces,
            failure_code: FailureCode::PolicyDenied,
            failure_message: Some(decision.reason.clone()),
            failed_step_index: Some(index),
            denial: Some(decision),
        }
    }

    /// A step ran and failed. The failing step's trace must already be the
    /// last element of `traces`.
    pub fn step_failed(
        traces: Vec<ExecutionTrace>,
        index: usize,
        code: FailureCode,
        message: Option<String>,
    ) -> Self {
        Self {
            traces,
            failure_code: code,
            failure_message: message,
            failed_step_index: Some(index),
            denial: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.failure_code == FailureCode::Ok
    }

    /// Number of steps that reached the kernel.
    pub fn steps_executed(&self) -> usize {
        self.traces.len()
    }

    pub fn last_trace(&self) -> Option<&ExecutionTrace> {
        self.traces.last()
    }
}
