//! TOML-driven rule gate.
//!
//! Evaluation:
//!
//! 1. Iterate rules in declaration order.
//! 2. The first rule whose `effect`, `domain` and `operation_id` patterns all
//!    match decides, using its verdict and reason.
//! 3. No match → deny, naming the descriptor's operation and effect.

use std::path::Path;

use tracing::{debug, warn};

use kl_contracts::{
    descriptor::OperationDescriptor,
    error::{KlError, KlResult},
    policy::PolicyDecision,
};
use kl_core::traits::PolicyGate;

use crate::rule::{PolicyConfig, RuleVerdict};

/// A `PolicyGate` backed by a TOML rule list.
///
/// ```rust,ignore
/// let gate = TomlPolicyGate::from_file(Path::new("policies/tenant.toml"))?;
/// let cael = Cael::new(Box::new(gate));
/// ```
#[derive(Debug)]
pub struct TomlPolicyGate {
    config: PolicyConfig,
}

impl TomlPolicyGate {
    pub fn new(config: PolicyConfig) -> Self {
        Self { config }
    }

    /// Parse `s` as a `PolicyConfig`.
    ///
    /// Returns `KlError::ConfigError` if the TOML is malformed or does not fit
    /// the schema.
    pub fn from_toml_str(s: &str) -> KlResult<Self> {
        let config: PolicyConfig = toml::from_str(s).map_err(|e| KlError::ConfigError {
            reason: format!("failed to parse policy TOML: {}", e),
        })?;
        Ok(Self { config })
    }

    /// Read and parse a policy file.
    pub fn from_file(path: &Path) -> KlResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| KlError::ConfigError {
            reason: format!("failed to read policy file '{}': {}", path.display(), e),
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }
}

impl PolicyGate for TomlPolicyGate {
    fn evaluate(&self, descriptor: &OperationDescriptor) -> PolicyDecision {
        let name = &self.config.name;

        let Some(rule) = self.config.rules.iter().find(|r| r.matches(descriptor)) else {
            warn!(
                policy = %name,
                operation_id = %descriptor.operation_id(),
                effect = %descriptor.effect(),
                "no policy rule matched; denying by default"
            );
            return PolicyDecision::deny(
                name.as_str(),
                format!(
                    "denied by default: no policy rule matched operation '{}' with effect '{}'",
                    descriptor.operation_id(),
                    descriptor.effect()
                ),
            );
        };

        debug!(
            policy = %name,
            rule_id = %rule.id,
            operation_id = %descriptor.operation_id(),
            "rule matched"
        );

        match rule.verdict {
            RuleVerdict::Allow => PolicyDecision::allow(name.as_str(), rule.reason()),
            RuleVerdict::Deny => PolicyDecision::deny(name.as_str(), rule.reason()),
        }
    }
}
