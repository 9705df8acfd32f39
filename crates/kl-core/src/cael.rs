//! CAEL: the ordered, stop-on-first-failure runner.
//!
//! A run has two passes:
//!
//! 1. **Validation.** Every step is checked structurally before anything
//!    executes. The first malformed step ends the run with `INVALID_INPUT`
//!    and no traces.
//! 2. **Execution.** Steps run strictly in index order:
//!
//!      gate.evaluate → context flags → kernel.execute → sink.record
//!
//!    A denial stops the run before the kernel is invoked for that step. A
//!    failed trace stops the run after it is appended. Nothing after the
//!    failing index is attempted.
//!
//! The gate is injected; there is no process-wide default instance.

use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use kl_contracts::{
    context::{CaelConfig, ExecutionContext},
    descriptor::OperationDescriptor,
    error::{KlError, KlResult},
    policy::PolicyDecision,
    run::CaelResult,
    trace::{ExecutionTrace, FailureCode},
};

use crate::{
    kernel::{ExecuteOptions, Kernel},
    traits::{PolicyGate, Task, TraceSink},
};

/// Name reported on decisions derived from the attached `ExecutionContext`.
pub const CONTEXT_POLICY_NAME: &str = "execution_context";

/// One scheduled unit of work: descriptor, task and argument bundle, plus
/// optional capability flags, timeout override and trace metadata.
#[derive(Clone)]
pub struct Step {
    pub descriptor: OperationDescriptor,
    pub task: Arc<dyn Task>,
    /// Must be a JSON object or null.
    pub arguments: Value,
    pub needs_network: bool,
    pub needs_filesystem: bool,
    /// Overrides the context and config timeouts for this step.
    pub timeout_seconds: Option<f64>,
    pub metadata: Map<String, Value>,
}

impl Step {
    pub fn new(descriptor: OperationDescriptor, task: Arc<dyn Task>, arguments: Value) -> Self {
        Self {
            descriptor,
            task,
            arguments,
            needs_network: false,
            needs_filesystem: false,
            timeout_seconds: None,
            metadata: Map::new(),
        }
    }

    pub fn needs_network(mut self) -> Self {
        self.needs_network = true;
        self
    }

    pub fn needs_filesystem(mut self) -> Self {
        self.needs_filesystem = true;
        self
    }

    pub fn with_timeout_seconds(mut self, seconds: f64) -> Self {
        self.timeout_seconds = Some(seconds);
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Structural checks run before any step of a run executes.
    fn validate(&self, index: usize) -> KlResult<()> {
        self.descriptor.validate().map_err(|e| KlError::InvalidStep {
            index,
            reason: e.to_string(),
        })?;
        if !(self.arguments.is_object() || self.arguments.is_null()) {
            return Err(KlError::InvalidStep {
                index,
                reason: "arguments must be a JSON object or null".to_string(),
            });
        }
        if let Some(seconds) = self.timeout_seconds {
            if !seconds.is_finite() || seconds < 0.0 {
                return Err(KlError::InvalidStep {
                    index,
                    reason: format!("timeout of {seconds} seconds is not valid"),
                });
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Step")
            .field("descriptor", &self.descriptor)
            .field("arguments", &self.arguments)
            .field("needs_network", &self.needs_network)
            .field("needs_filesystem", &self.needs_filesystem)
            .field("timeout_seconds", &self.timeout_seconds)
            .finish_non_exhaustive()
    }
}

/// The ordered runner.
pub struct Cael {
    kernel: Kernel,
    gate: Box<dyn PolicyGate>,
    config: CaelConfig,
    context: Option<ExecutionContext>,
    sink: Option<Box<dyn TraceSink>>,
}

impl Cael {
    /// A runner over a system-clock kernel, gated by `gate`.
    pub fn new(gate: Box<dyn PolicyGate>) -> Self {
        Self {
            kernel: Kernel::new(),
            gate,
            config: CaelConfig::default(),
            context: None,
            sink: None,
        }
    }

    pub fn with_kernel(mut self, kernel: Kernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn with_config(mut self, config: CaelConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_context(mut self, context: ExecutionContext) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_sink(mut self, sink: Box<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Run `steps` in order, stopping at the first failure.
    ///
    /// Never panics and never returns an error: every outcome, including
    /// malformed input, is described by the returned `CaelResult`.
    pub fn run(&self, steps: &[Step]) -> CaelResult {
        if steps.is_empty() {
            warn!("run rejected: step list is empty");
            return CaelResult::invalid_input(None, "step list is empty");
        }

        for (index, step) in steps.iter().enumerate() {
            if let Err(e) = step.validate(index) {
                warn!(step = index, error = %e, "run rejected during validation");
                return CaelResult::invalid_input(Some(index), e.to_string());
            }
        }

        let mut traces: Vec<ExecutionTrace> = Vec::with_capacity(steps.len());

        for (index, step) in steps.iter().enumerate() {
            let operation_id = step.descriptor.operation_id();
            debug!(step = index, operation_id = %operation_id, "run step starting");

            let decisions = match self.admit(step) {
                Ok(decisions) => decisions,
                Err(denial) => {
                    warn!(
                        step = index,
                        operation_id = %operation_id,
                        policy = %denial.policy_name,
                        reason = %denial.reason,
                        "policy denied step; halting run"
                    );
                    return CaelResult::policy_denied(traces, index, denial);
                }
            };

            let parent = traces.last().map(|t| t.trace_id().to_string());
            let trace = self.execute_admitted(step, decisions, parent);
            let recorded = self.record(&trace);
            let failure = if !trace.success() {
                Some((trace.failure_code(), trace.error().map(str::to_string)))
            } else {
                recorded
                    .err()
                    .map(|e| (FailureCode::KernelError, Some(e.to_string())))
            };
            traces.push(trace);

            if let Some((code, message)) = failure {
                warn!(
                    step = index,
                    operation_id = %operation_id,
                    failure_code = %code,
                    "step failed; halting run"
                );
                return CaelResult::step_failed(traces, index, code, message);
            }
        }

        info!(steps = traces.len(), "run completed");
        CaelResult::completed(traces)
    }

    /// Validate, gate and execute a single step.
    ///
    /// Unlike `run`, refusal here is a hard error: malformed input returns
    /// `KlError::InvalidStep` and a denial returns `KlError::PolicyViolation`.
    /// A task failure is still an `Ok` trace with `success = false`. If the
    /// sink refuses the trace, the task has already run and the trace comes
    /// back inside `KlError::TraceNotRecorded`.
    pub fn execute(&self, step: &Step) -> KlResult<ExecutionTrace> {
        step.validate(0)?;
        let decisions = self.admit(step).map_err(|denial| KlError::PolicyViolation {
            policy_name: denial.policy_name,
            reason: denial.reason,
        })?;
        let trace = self.execute_admitted(step, decisions, None);
        if let Err(e) = self.record(&trace) {
            warn!(
                trace_id = %trace.trace_id(),
                operation_id = %step.descriptor.operation_id(),
                error = %e,
                "trace sink refused executed step"
            );
            return Err(KlError::TraceNotRecorded {
                reason: e.to_string(),
                trace: Box::new(trace),
            });
        }
        Ok(trace)
    }

    /// Gate first, then the context's capability flags.
    ///
    /// Returns every allowing decision, or the first denial.
    fn admit(&self, step: &Step) -> Result<Vec<PolicyDecision>, PolicyDecision> {
        let decision = self.gate.evaluate(&step.descriptor);
        if !decision.allowed {
            return Err(decision);
        }
        let mut decisions = vec![decision];

        if let Some(ctx) = &self.context {
            if step.needs_network || step.needs_filesystem {
                let policy = ctx.policy_or_default();
                if step.needs_network && !policy.allow_network {
                    return Err(PolicyDecision::deny(
                        CONTEXT_POLICY_NAME,
                        "operation requires network access but the execution policy forbids it",
                    ));
                }
                if step.needs_filesystem && !policy.allow_filesystem {
                    return Err(PolicyDecision::deny(
                        CONTEXT_POLICY_NAME,
                        "operation requires filesystem access but the execution policy forbids it",
                    ));
                }
                decisions.push(PolicyDecision::allow(
                    CONTEXT_POLICY_NAME,
                    "requested capabilities are permitted by the execution policy",
                ));
            }
        }

        Ok(decisions)
    }

    fn execute_admitted(
        &self,
        step: &Step,
        decisions: Vec<PolicyDecision>,
        parent_trace_id: Option<String>,
    ) -> ExecutionTrace {
        let mut metadata = step.metadata.clone();
        if let Some(ctx) = &self.context {
            metadata.insert("context".to_string(), ctx.to_trace_metadata());
        }

        let options = ExecuteOptions {
            parent_trace_id,
            policy_decisions: decisions,
            metadata,
            timeout_seconds: self.timeout_for(step),
        };
        self.kernel
            .execute_with(&step.descriptor, step.task.as_ref(), &step.arguments, options)
    }

    /// Per-step override, then the context policy, then the config default.
    fn timeout_for(&self, step: &Step) -> Option<f64> {
        step.timeout_seconds
            .or_else(|| {
                self.context
                    .as_ref()
                    .and_then(|ctx| ctx.policy.as_ref())
                    .and_then(|p| p.timeout_seconds)
            })
            .or(self.config.default_timeout_seconds)
    }

    fn record(&self, trace: &ExecutionTrace) -> KlResult<()> {
        match &self.sink {
            Some(sink) => sink.record(trace),
            None => Ok(()),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
