//! # kl-audit
//!
//! Audit tooling over finished traces.
//!
//! ## Overview
//!
//! - `to_canonical_form` / `digest`: the equivalence view of a trace, with
//!   observational fields masked, and its SHA-256.
//! - `build_audit_report`: a trace wrapped for storage or forwarding.
//! - `InMemoryTraceLog`: a `TraceSink` that links every recorded trace to the
//!   previous one by SHA-256. Tampering with any entry breaks the chain and
//!   is detected by `verify_chain`.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kl_audit::{digest, InMemoryTraceLog};
//!
//! let log = InMemoryTraceLog::new("run-001");
//! let result = Cael::new(gate).with_sink(Box::new(log.clone())).run(&steps);
//!
//! assert!(log.verify_integrity());
//! let digests: Vec<String> = result.traces.iter().map(digest).collect();
//! ```

pub mod canonical;
pub mod chain;
pub mod event;
pub mod memory;
pub mod report;

pub use canonical::{digest, to_canonical_form, OBSERVATIONAL_FIELDS, OBSERVATIONAL_PLACEHOLDER};
pub use chain::{hash_entry, verify_chain};
pub use event::{TraceLog, TraceLogEntry, GENESIS_HASH};
pub use memory::InMemoryTraceLog;
pub use report::{build_audit_report, AuditReport};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{TimeZone, Utc};
    use serde_json::{json, Map, Value};

    use kl_contracts::{
        descriptor::OperationDescriptor,
        policy::PolicyDecision,
        trace::{ExecutionTrace, FailureCode},
    };
    use kl_core::{
        cael::{Cael, Step},
        kernel::{ExecuteOptions, Kernel},
        traits::{task_fn, PolicyGate, Task, TaskError, TraceSink},
    };

    use super::*;

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn desc(op: &str, effect: &str) -> OperationDescriptor {
        OperationDescriptor::new(op, "math", effect).unwrap()
    }

    fn echo() -> impl Task {
        task_fn(|args: &Value| Ok(args.clone()))
    }

    fn failing() -> impl Task {
        task_fn(|_: &Value| Err::<Value, _>(TaskError::new("ValueError", "bad input")))
    }

    fn kernel_at(hour: u32) -> Kernel {
        Kernel::deterministic(Utc.with_ymd_and_hms(2025, 3, 1, hour, 0, 0).unwrap())
    }

    fn trace_with(kernel: &Kernel, args: Value, metadata: Map<String, Value>) -> ExecutionTrace {
        let options = ExecuteOptions {
            metadata,
            ..ExecuteOptions::default()
        };
        kernel.execute_with(&desc("math.add", "pure"), &echo(), &args, options)
    }

    fn simple_trace(args: Value) -> ExecutionTrace {
        kernel_at(12).execute(&desc("math.add", "pure"), &echo(), &args)
    }

    struct AllowAll;

    impl PolicyGate for AllowAll {
        fn evaluate(&self, _descriptor: &OperationDescriptor) -> PolicyDecision {
            PolicyDecision::allow("allow_all", "test gate")
        }
    }

    // ── Canonical form and digest ─────────────────────────────────────────────

    #[test]
    fn test_canonical_form_masks_observational_fields() {
        let mut metadata = Map::new();
        metadata.insert("caller".to_string(), json!("test"));
        let trace = trace_with(&kernel_at(12), json!({"a": 1}), metadata);

        let canonical = to_canonical_form(&trace);

        for key in OBSERVATIONAL_FIELDS {
            assert_eq!(canonical[key], json!(OBSERVATIONAL_PLACEHOLDER), "{key} must be masked");
        }
        assert_eq!(canonical["success"], json!(true));
        assert_eq!(canonical["failure_code"], json!("OK"));
        assert_eq!(canonical["exception_type"], Value::Null);
        assert_eq!(canonical["descriptor"]["operation_id"], json!("math.add"));
        assert_eq!(canonical["policy_decisions"], json!([]));
    }

    #[test]
    fn test_canonical_form_keys_sorted() {
        let canonical = to_canonical_form(&simple_trace(json!({})));
        let keys: Vec<&String> = canonical.as_object().unwrap().keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    /// Different clocks, ids, outputs and metadata: same digest.
    #[test]
    fn test_digest_ignores_observational_differences() {
        let mut metadata = Map::new();
        metadata.insert("run".to_string(), json!(1));
        let a = trace_with(&Kernel::new(), json!({"a": 1}), metadata);
        let b = trace_with(&kernel_at(3), json!({"a": 2}), Map::new());

        assert_ne!(a.trace_id(), b.trace_id());
        assert_ne!(a.output(), b.output());
        assert_eq!(digest(&a), digest(&b));

        let d = digest(&a);
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn test_digest_distinguishes_deterministic_fields() {
        let kernel = kernel_at(12);
        let ok = kernel.execute(&desc("math.add", "pure"), &echo(), &json!({}));
        let failed = kernel.execute(&desc("math.add", "pure"), &failing(), &json!({}));
        let other_effect = kernel.execute(&desc("math.add", "read"), &echo(), &json!({}));

        assert_eq!(failed.failure_code(), FailureCode::TaskException);
        assert_ne!(digest(&ok), digest(&failed));
        assert_ne!(digest(&ok), digest(&other_effect));
    }

    #[test]
    fn test_deterministic_kernel_reproduces_full_trace() {
        let a = simple_trace(json!({"x": 1}));
        let b = simple_trace(json!({"x": 1}));
        assert_eq!(a.describe(), b.describe());
        assert_eq!(a.runtime_ms(), 0.0);
    }

    // ── Audit report ──────────────────────────────────────────────────────────

    #[test]
    fn test_audit_report_fields() {
        let trace = simple_trace(json!({}));
        let mut metadata = Map::new();
        metadata.insert("tenant".to_string(), json!("acme"));

        let report = build_audit_report(&trace, Some(metadata));

        assert_eq!(report.run_id, trace.trace_id());
        assert_eq!(report.created_at, "2025-03-01T12:00:00.000Z");
        assert_eq!(report.trace_digest, digest(&trace));

        let described = report.describe();
        assert_eq!(described["generated_at"], json!("2025-03-01T12:00:00.000Z"));
        assert!(described.get("created_at").is_none());
        assert_eq!(described["trace"]["descriptor"]["domain"], json!("math"));
        assert_eq!(described["metadata"]["tenant"], json!("acme"));
        assert_eq!(serde_json::to_value(&report).unwrap(), described);
    }

    #[test]
    fn test_audit_report_default_metadata() {
        let report = build_audit_report(&simple_trace(json!({})), None);
        assert!(report.metadata.is_empty());
    }

    // ── Hash chain ────────────────────────────────────────────────────────────

    fn filled_log(run_id: &str, n: i64) -> InMemoryTraceLog {
        let log = InMemoryTraceLog::new(run_id);
        let kernel = kernel_at(12);
        for i in 0..n {
            let trace = kernel.execute(&desc("math.add", "pure"), &echo(), &json!({ "i": i }));
            log.record(&trace).unwrap();
        }
        log
    }

    #[test]
    fn test_hash_chain_integrity() {
        let log = filled_log("run-integrity", 3);
        assert_eq!(log.len(), 3);
        assert!(log.verify_integrity(), "chain must be valid after sequential records");
    }

    /// Swapping in a trace with a different output keeps the digest but
    /// breaks the entry hash.
    #[test]
    fn test_tamper_detection() {
        let log = filled_log("run-tamper", 3);
        let forged = simple_trace(json!({ "i": 99 }));

        {
            let mut state = log.state.lock().unwrap();
            assert_eq!(state.entries[0].trace_digest, digest(&forged));
            state.entries[0].trace = forged;
        }

        assert!(!log.verify_integrity(), "chain must detect a replaced trace");
    }

    #[test]
    fn test_genesis_hash() {
        let log = filled_log("run-genesis", 1);
        let exported = log.export_log();
        assert_eq!(exported.entries[0].prev_hash, GENESIS_HASH);
    }

    #[test]
    fn test_sequence_and_links() {
        let exported = filled_log("run-seq", 3).export_log();
        for (idx, entry) in exported.entries.iter().enumerate() {
            assert_eq!(entry.sequence, idx as u64);
            if idx > 0 {
                assert_eq!(entry.prev_hash, exported.entries[idx - 1].this_hash);
            }
        }
        assert_eq!(exported.terminal_hash, exported.entries[2].this_hash);
        assert!(verify_chain(&exported.entries));
    }

    #[test]
    fn test_verify_empty() {
        let log = InMemoryTraceLog::new("run-empty");
        assert!(log.is_empty());
        assert!(log.verify_integrity());
        assert!(verify_chain(&[]));
        assert_eq!(log.export_log().terminal_hash, "");
    }

    #[test]
    fn test_hash_entry_commits_to_run_id() {
        let trace = simple_trace(json!({}));
        assert_ne!(
            hash_entry("run-a", 0, &trace, GENESIS_HASH),
            hash_entry("run-b", 0, &trace, GENESIS_HASH)
        );
    }

    // ── Runner integration ────────────────────────────────────────────────────

    #[test]
    fn test_runner_records_every_executed_step() {
        let log = InMemoryTraceLog::new("run-cael");
        let cael = Cael::new(Box::new(AllowAll))
            .with_kernel(kernel_at(12))
            .with_sink(Box::new(log.clone()));

        let steps = vec![
            Step::new(desc("a", "pure"), Arc::new(echo()), json!({})),
            Step::new(desc("b", "pure"), Arc::new(failing()), json!({})),
            Step::new(desc("c", "pure"), Arc::new(echo()), json!({})),
        ];
        let result = cael.run(&steps);

        assert_eq!(result.failure_code, FailureCode::TaskException);
        assert_eq!(log.len(), 2);
        assert!(log.verify_integrity());

        let exported = log.export_log();
        for (entry, trace) in exported.entries.iter().zip(&result.traces) {
            assert_eq!(entry.trace.trace_id(), trace.trace_id());
            assert_eq!(entry.trace_digest, digest(trace));
        }
        assert_eq!(
            result.traces[1].parent_trace_id(),
            Some(result.traces[0].trace_id())
        );
    }
}
