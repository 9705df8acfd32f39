//! # kl-policy
//!
//! Policy gates for the KL runner.
//!
//! ## Overview
//!
//! - [`DefaultSafePolicy`] allows the effects `pure`, `read` and `ai`
//!   (trimmed, any case) and denies every other value.
//! - [`TomlPolicyGate`] evaluates an ordered rule list loaded from TOML. The
//!   first matching rule wins; with no match the descriptor is denied.
//!
//! Both implement [`PolicyGate`](kl_core::traits::PolicyGate) and are pure:
//! the same descriptor always receives the same decision.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use kl_policy::{DefaultSafePolicy, TomlPolicyGate};
//!
//! let cael = Cael::new(Box::new(DefaultSafePolicy));
//! let scoped = Cael::new(Box::new(TomlPolicyGate::from_file(path)?));
//! ```

pub mod engine;
pub mod rule;
pub mod safe;

pub use engine::TomlPolicyGate;
pub use rule::{PolicyConfig, PolicyRule, RuleVerdict};
pub use safe::{DefaultSafePolicy, DEFAULT_SAFE_POLICY_NAME};

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use serde_json::{json, Value};

    use kl_contracts::{descriptor::OperationDescriptor, error::KlError, trace::FailureCode};
    use kl_core::{
        cael::{Cael, Step},
        traits::{PolicyGate, Task, TaskError},
    };

    use crate::{DefaultSafePolicy, TomlPolicyGate, DEFAULT_SAFE_POLICY_NAME};

    // ── Helpers ───────────────────────────────────────────────────────────────

    fn desc(op: &str, domain: &str, effect: &str) -> OperationDescriptor {
        OperationDescriptor::new(op, domain, effect).unwrap()
    }

    struct Counting {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl Task for Counting {
        fn call(&self, _arguments: &Value) -> Result<Value, TaskError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(TaskError::new("RuntimeError", "boom"))
            } else {
                Ok(json!("ok"))
            }
        }
    }

    fn counting_step(op: &str, effect: &str, fail: bool) -> (Step, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let task = Arc::new(Counting {
            calls: calls.clone(),
            fail,
        });
        (Step::new(desc(op, "test", effect), task, json!({})), calls)
    }

    // ── 1. default safe policy ────────────────────────────────────────────────

    #[test]
    fn test_safe_effects_allowed() {
        for effect in ["pure", "read", "ai"] {
            let decision = DefaultSafePolicy.evaluate(&desc("op", "d", effect));
            assert!(decision.allowed, "effect {effect} should be allowed");
            assert_eq!(decision.policy_name, DEFAULT_SAFE_POLICY_NAME);
            assert_eq!(
                decision.reason,
                format!("effect '{effect}' is allowed under default_safe_policy")
            );
        }
    }

    #[test]
    fn test_safe_effects_match_trimmed_and_case_folded() {
        for (effect, normalized) in [("PURE", "pure"), (" read", "read"), ("Ai ", "ai")] {
            let decision = DefaultSafePolicy.evaluate(&desc("op", "d", effect));
            assert!(decision.allowed, "effect {effect:?} should be allowed");
            assert_eq!(
                decision.reason,
                format!("effect '{normalized}' is allowed under default_safe_policy")
            );
        }
    }

    #[test]
    fn test_unsafe_and_unknown_effects_denied() {
        for (effect, normalized) in [
            ("io", "io"),
            ("external", "external"),
            (" IO ", "io"),
            ("Network", "network"),
            ("teleport", "teleport"),
        ] {
            let decision = DefaultSafePolicy.evaluate(&desc("op", "d", effect));
            assert!(!decision.allowed, "effect {effect:?} should be denied");
            assert_eq!(
                decision.reason,
                format!("effect '{normalized}' is not allowed under default_safe_policy")
            );
        }
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let d = desc("net.fetch", "web", "io");
        let first = DefaultSafePolicy.evaluate(&d);
        let second = DefaultSafePolicy.evaluate(&d);
        assert_eq!(first, second);
    }

    // ── 2. default policy inside the runner ───────────────────────────────────

    /// [pure, io]: the io step is denied before its task runs.
    #[test]
    fn test_runner_denies_io_step() {
        let (a, a_calls) = counting_step("math.add", "pure", false);
        let (b, b_calls) = counting_step("fs.write", "io", false);

        let result = Cael::new(Box::new(DefaultSafePolicy)).run(&[a, b]);

        assert_eq!(result.failure_code, FailureCode::PolicyDenied);
        assert_eq!(result.failed_step_index, Some(1));
        assert_eq!(
            result.failure_message.as_deref(),
            Some("effect 'io' is not allowed under default_safe_policy")
        );
        assert_eq!(result.traces.len(), 1);
        assert!(result.traces[0].success());
        assert_eq!(a_calls.load(Ordering::SeqCst), 1);
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    /// [ok, fail, ok]: the third step never runs.
    #[test]
    fn test_runner_stops_on_task_failure() {
        let (a, _) = counting_step("a", "pure", false);
        let (b, _) = counting_step("b", "read", true);
        let (c, c_calls) = counting_step("c", "ai", false);

        let result = Cael::new(Box::new(DefaultSafePolicy)).run(&[a, b, c]);

        assert_eq!(result.failure_code, FailureCode::TaskException);
        assert_eq!(result.failed_step_index, Some(1));
        assert_eq!(result.traces.len(), 2);
        assert_eq!(c_calls.load(Ordering::SeqCst), 0);
    }

    // ── 3. TOML gate ──────────────────────────────────────────────────────────

    #[test]
    fn test_toml_deny_by_default() {
        let gate = TomlPolicyGate::from_toml_str("rules = []").unwrap();
        let decision = gate.evaluate(&desc("math.add", "math", "pure"));

        assert!(!decision.allowed);
        assert_eq!(decision.policy_name, "toml_policy");
        assert!(
            decision.reason.contains("denied by default"),
            "expected 'denied by default' in reason, got: {}",
            decision.reason
        );
    }

    #[test]
    fn test_toml_first_match_wins() {
        let toml = r#"
            name = "tenant_policy"

            [[rules]]
            id = "deny-billing-io"
            domain = "billing"
            effect = "io"
            verdict = "deny"
            reason = "billing steps may not touch I/O"

            [[rules]]
            id = "allow-io"
            effect = "io"
            verdict = "allow"
        "#;

        let gate = TomlPolicyGate::from_toml_str(toml).unwrap();

        let billing = gate.evaluate(&desc("invoice.save", "billing", "io"));
        assert!(!billing.allowed);
        assert_eq!(billing.policy_name, "tenant_policy");
        assert_eq!(billing.reason, "billing steps may not touch I/O");

        let reports = gate.evaluate(&desc("report.save", "reports", "io"));
        assert!(reports.allowed);
        assert_eq!(reports.reason, "allowed by rule 'allow-io'");
    }

    #[test]
    fn test_toml_operation_prefix_match() {
        let toml = r#"
            [[rules]]
            id = "deny-fs"
            operation_id = "fs.*"
            verdict = "deny"

            [[rules]]
            id = "allow-rest"
            verdict = "allow"
        "#;

        let gate = TomlPolicyGate::from_toml_str(toml).unwrap();

        let write = gate.evaluate(&desc("fs.write", "storage", "pure"));
        assert!(!write.allowed);
        assert_eq!(write.reason, "denied by rule 'deny-fs'");
        assert!(gate.evaluate(&desc("fsck", "storage", "pure")).allowed);
        assert!(gate.evaluate(&desc("net.fetch", "web", "io")).allowed);
    }

    #[test]
    fn test_toml_gate_in_runner() {
        let toml = r#"
            [[rules]]
            id = "allow-pure"
            effect = "pure"
            verdict = "allow"
        "#;
        let (a, _) = counting_step("a", "pure", false);
        let (b, b_calls) = counting_step("b", "ai", false);

        let gate = TomlPolicyGate::from_toml_str(toml).unwrap();
        let result = Cael::new(Box::new(gate)).run(&[a, b]);

        assert_eq!(result.failure_code, FailureCode::PolicyDenied);
        assert_eq!(result.failed_step_index, Some(1));
        assert_eq!(result.denial.unwrap().policy_name, "toml_policy");
        assert_eq!(b_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_toml_parse_error() {
        let result = TomlPolicyGate::from_toml_str("this is not valid toml ][[[");

        match result {
            Err(KlError::ConfigError { reason }) => {
                assert!(
                    reason.contains("failed to parse policy TOML"),
                    "expected parse error message, got: {reason}"
                );
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }

    #[test]
    fn test_toml_unknown_verdict_rejected() {
        let toml = r#"
            [[rules]]
            id = "maybe"
            verdict = "require-approval"
        "#;
        assert!(matches!(
            TomlPolicyGate::from_toml_str(toml),
            Err(KlError::ConfigError { .. })
        ));
    }

    #[test]
    fn test_missing_policy_file() {
        let path = std::path::Path::new("/nonexistent/kl-policy.toml");
        match TomlPolicyGate::from_file(path) {
            Err(KlError::ConfigError { reason }) => {
                assert!(reason.contains("failed to read policy file"));
            }
            other => panic!("expected ConfigError, got {:?}", other),
        }
    }
}
