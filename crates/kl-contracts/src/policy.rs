//! Policy decision type.
//!
//! A policy gate consumes an `OperationDescriptor` and produces a
//! `PolicyDecision`. Anything other than `allowed = true` keeps the task from
//! running.

use serde::{Deserialize, Serialize};

/// The outcome of one policy evaluation.
///
/// Created fresh per evaluation and never mutated. Allowed decisions are
/// embedded in the trace of the execution they admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Stable name of the gate that decided, e.g. `"default_safe_policy"`.
    pub policy_name: String,
    pub allowed: bool,
    /// Human-readable justification, written to traces and run results.
    pub reason: String,
}

impl PolicyDecision {
    pub fn allow(policy_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            policy_name: policy_name.into(),
            allowed: true,
            reason: reason.into(),
        }
    }

    pub fn deny(policy_name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            policy_name: policy_name.into(),
            allowed: false,
            reason: reason.into(),
        }
    }
}
