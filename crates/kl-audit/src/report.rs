//! Audit reports: a trace wrapped for storage or forwarding.

use serde::Serialize;
use serde_json::{json, Map, Value};

use kl_contracts::trace::{format_timestamp, ExecutionTrace};

use crate::canonical::digest;

/// A serializable report over one finished trace.
///
/// `run_id` is the trace id and `created_at` the trace's start time. Both are
/// fixed at build time; the report does not hold the trace itself, only its
/// `describe()` mapping.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub run_id: String,
    pub trace: Value,
    #[serde(rename = "generated_at")]
    pub created_at: String,
    pub trace_digest: String,
    pub metadata: Map<String, Value>,
}

impl AuditReport {
    /// Stable external shape. `created_at` is published as `generated_at`.
    pub fn describe(&self) -> Value {
        json!({
            "run_id": self.run_id,
            "trace": self.trace,
            "generated_at": self.created_at,
            "trace_digest": self.trace_digest,
            "metadata": self.metadata,
        })
    }
}

/// Wrap a finished trace in an `AuditReport`.
pub fn build_audit_report(
    trace: &ExecutionTrace,
    metadata: Option<Map<String, Value>>,
) -> AuditReport {
    AuditReport {
        run_id: trace.trace_id().to_string(),
        trace: trace.describe(),
        created_at: format_timestamp(&trace.started_at()),
        trace_digest: digest(trace),
        metadata: metadata.unwrap_or_default(),
    }
}
