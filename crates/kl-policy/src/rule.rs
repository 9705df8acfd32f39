//! Rule types and the TOML policy schema.
//!
//! A `PolicyConfig` holds an ordered list of `PolicyRule`s. The first rule
//! whose patterns all match a descriptor decides; with no match the gate
//! denies.

use serde::{Deserialize, Serialize};

use kl_contracts::descriptor::OperationDescriptor;

/// What a matching rule decides.
///
/// ```toml
/// verdict = "allow"
/// verdict = "deny"
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RuleVerdict {
    Allow,
    Deny,
}

/// A single rule loaded from TOML.
///
/// Each pattern is either `"*"` (matches anything) or an exact,
/// case-sensitive value. `operation_id` additionally accepts a trailing `*`
/// as a prefix match, so `"fs.*"` covers `fs.read` and `fs.write`.
/// Omitted patterns default to `"*"`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyRule {
    /// Stable identifier, quoted in decision reasons.
    pub id: String,

    #[serde(default)]
    pub description: String,

    #[serde(default = "wildcard")]
    pub effect: String,

    #[serde(default = "wildcard")]
    pub domain: String,

    #[serde(default = "wildcard")]
    pub operation_id: String,

    pub verdict: RuleVerdict,

    /// Reason reported on the decision. Defaults to a sentence naming the rule.
    pub reason: Option<String>,
}

fn wildcard() -> String {
    "*".to_string()
}

impl PolicyRule {
    /// True when every pattern of this rule matches `descriptor`.
    pub fn matches(&self, descriptor: &OperationDescriptor) -> bool {
        exact_or_any(&self.effect, descriptor.effect())
            && exact_or_any(&self.domain, descriptor.domain())
            && prefix_or_any(&self.operation_id, descriptor.operation_id())
    }

    pub fn reason(&self) -> String {
        match (&self.reason, self.verdict) {
            (Some(reason), _) => reason.clone(),
            (None, RuleVerdict::Allow) => format!("allowed by rule '{}'", self.id),
            (None, RuleVerdict::Deny) => format!("denied by rule '{}'", self.id),
        }
    }
}

fn exact_or_any(pattern: &str, value: &str) -> bool {
    pattern == "*" || pattern == value
}

fn prefix_or_any(pattern: &str, value: &str) -> bool {
    match pattern.strip_suffix('*') {
        Some(prefix) => value.starts_with(prefix),
        None => pattern == value,
    }
}

/// The top-level TOML document.
///
/// ```toml
/// name = "tenant_policy"
///
/// [[rules]]
/// id = "deny-billing-io"
/// domain = "billing"
/// effect = "io"
/// verdict = "deny"
/// reason = "billing steps may not touch I/O"
///
/// [[rules]]
/// id = "allow-pure"
/// effect = "pure"
/// verdict = "allow"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Reported as `policy_name` on every decision.
    #[serde(default = "default_policy_name")]
    pub name: String,

    /// Ordered. First match wins.
    #[serde(default)]
    pub rules: Vec<PolicyRule>,
}

fn default_policy_name() -> String {
    "toml_policy".to_string()
}
