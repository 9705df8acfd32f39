//! Per-request execution context and runner configuration.
//!
//! An `ExecutionContext` attaches caller identity and a few coarse policy
//! flags to a run. The runner consults the flags before a step reaches the
//! kernel and copies the identity into each trace's metadata.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Coarse per-request permissions and the timeout used for classification.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionPolicy {
    #[serde(default)]
    pub allow_network: bool,
    #[serde(default)]
    pub allow_filesystem: bool,
    /// Limit used to label traces as timed out. Never enforced.
    #[serde(default)]
    pub timeout_seconds: Option<f64>,
}

/// Identity and policy for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub user_id: String,
    pub request_id: String,
    /// Absent means the default policy: no network, no filesystem, no timeout.
    #[serde(default)]
    pub policy: Option<ExecutionPolicy>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(user_id: impl Into<String>, request_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            request_id: request_id.into(),
            policy: None,
            metadata: Map::new(),
        }
    }

    pub fn with_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn policy_or_default(&self) -> ExecutionPolicy {
        self.policy.clone().unwrap_or_default()
    }

    /// The block merged into trace metadata under the `"context"` key.
    pub fn to_trace_metadata(&self) -> Value {
        let policy = self.policy_or_default();
        json!({
            "user_id": self.user_id,
            "request_id": self.request_id,
            "policy": policy,
            "metadata": self.metadata,
        })
    }
}

/// Static configuration for the ordered runner.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CaelConfig {
    /// Timeout used for classification when neither the step nor the context
    /// names one.
    #[serde(default)]
    pub default_timeout_seconds: Option<f64>,
}
