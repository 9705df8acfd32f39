//! Canonical trace form and its SHA-256 digest.
//!
//! The canonical form keeps every deterministic field of a trace and replaces
//! each observational field with [`OBSERVATIONAL_PLACEHOLDER`]. Two
//! executions of the same descriptor whose tasks behave identically therefore
//! canonicalize to the same value, whatever their ids, timestamps, outputs or
//! metadata.
//!
//! Keys are sorted: `serde_json::Map` is ordered, and this workspace does not
//! enable `preserve_order`.

use serde_json::Value;
use sha2::{Digest, Sha256};

use kl_contracts::trace::ExecutionTrace;

pub const OBSERVATIONAL_PLACEHOLDER: &str = "<observational>";

/// Trace keys excluded from equivalence.
pub const OBSERVATIONAL_FIELDS: [&str; 9] = [
    "trace_id",
    "parent_trace_id",
    "started_at",
    "finished_at",
    "runtime_ms",
    "output",
    "error",
    "metadata",
    "timeout",
];

pub fn to_canonical_form(trace: &ExecutionTrace) -> Value {
    let mut canonical = trace.describe();
    if let Value::Object(fields) = &mut canonical {
        for key in OBSERVATIONAL_FIELDS {
            fields.insert(
                key.to_string(),
                Value::String(OBSERVATIONAL_PLACEHOLDER.to_string()),
            );
        }
    }
    canonical
}

/// Lowercase hex SHA-256 of the compact canonical form.
pub fn digest(trace: &ExecutionTrace) -> String {
    sha256_hex(to_canonical_form(trace).to_string().as_bytes())
}

pub(crate) fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}
