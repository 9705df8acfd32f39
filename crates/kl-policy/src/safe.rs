//! The default effect-based gate.

use tracing::debug;

use kl_contracts::{
    descriptor::{Effect, OperationDescriptor},
    policy::PolicyDecision,
};
use kl_core::traits::PolicyGate;

/// Name reported on every decision made by [`DefaultSafePolicy`].
pub const DEFAULT_SAFE_POLICY_NAME: &str = "default_safe_policy";

/// Allows `pure`, `read` and `ai`; denies everything else.
///
/// The effect tag is classified with [`Effect::parse`], so surrounding
/// whitespace and case are ignored. Unknown tags are denied.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultSafePolicy;

impl DefaultSafePolicy {
    pub fn is_safe_effect(effect: &Effect) -> bool {
        matches!(effect, Effect::Pure | Effect::Read | Effect::Ai)
    }
}

impl PolicyGate for DefaultSafePolicy {
    fn evaluate(&self, descriptor: &OperationDescriptor) -> PolicyDecision {
        let effect = descriptor.effect_class();
        let allowed = Self::is_safe_effect(&effect);
        debug!(
            operation_id = %descriptor.operation_id(),
            effect = %effect,
            allowed,
            "default safe policy evaluated"
        );

        if allowed {
            PolicyDecision::allow(
                DEFAULT_SAFE_POLICY_NAME,
                format!("effect '{effect}' is allowed under {DEFAULT_SAFE_POLICY_NAME}"),
            )
        } else {
            PolicyDecision::deny(
                DEFAULT_SAFE_POLICY_NAME,
                format!("effect '{effect}' is not allowed under {DEFAULT_SAFE_POLICY_NAME}"),
            )
        }
    }
}
