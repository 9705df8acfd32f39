//! # kl-contracts
//!
//! Shared types for the KL execution kernel: operation descriptors, policy
//! decisions, execution traces, run results, execution context and errors.
//!
//! All crates in the workspace import from here. No execution logic lives in
//! this crate.

pub mod context;
pub mod descriptor;
pub mod error;
pub mod policy;
pub mod run;
pub mod trace;

pub use context::{CaelConfig, ExecutionContext, ExecutionPolicy};
pub use descriptor::{Effect, OperationDescriptor};
pub use error::{KlError, KlResult};
pub use policy::PolicyDecision;
pub use run::CaelResult;
pub use trace::{ExecutionTrace, FailureCode, TimeoutClassification, TraceBuilder};
