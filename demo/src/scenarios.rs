//! Demo scenarios: each builds a step list, runs it through `Cael` with a
//! hash-chained trace log attached, and prints the outcome.

use std::path::PathBuf;

use chrono::{TimeZone, Utc};
use serde_json::json;

use kl_audit::{digest, InMemoryTraceLog, TraceLog};
use kl_contracts::{error::KlResult, run::CaelResult};
use kl_core::{
    cael::{Cael, Step},
    kernel::Kernel,
    traits::PolicyGate,
};
use kl_policy::{DefaultSafePolicy, TomlPolicyGate};

use crate::operations::{
    add_descriptor, add_task, report_descriptor, report_task, smooth_descriptor, smooth_task,
    trajectory_descriptor, trajectory_task,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    Success,
    StopOnFailure,
    PolicyDenied,
}

impl Scenario {
    pub const ALL: [Scenario; 3] = [
        Scenario::Success,
        Scenario::StopOnFailure,
        Scenario::PolicyDenied,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Scenario::Success => "success",
            Scenario::StopOnFailure => "stop-on-failure",
            Scenario::PolicyDenied => "policy-denied",
        }
    }

    fn summary(self) -> &'static str {
        match self {
            Scenario::Success => "three pure steps, all allowed, all succeed",
            Scenario::StopOnFailure => "second step raises; third step never runs",
            Scenario::PolicyDenied => "second step declares effect 'io'; the gate refuses it",
        }
    }

    fn steps(self) -> KlResult<Vec<Step>> {
        let add = Step::new(add_descriptor()?, add_task(), json!({"a": 1, "b": 2}));
        let smooth = Step::new(
            smooth_descriptor()?,
            smooth_task(),
            json!({"values": [1.0, 4.0, 2.0, 8.0, 5.0], "window": 3}),
        );
        let trajectory = |dt: f64| -> KlResult<Step> {
            Ok(Step::new(
                trajectory_descriptor()?,
                trajectory_task(),
                json!({"x0": 0.0, "v0": 1.0, "dt": dt, "steps": 4, "force": 2.0, "mass": 1.0}),
            ))
        };
        let report = Step::new(
            report_descriptor()?,
            report_task(),
            json!({"title": "smoothing"}),
        );

        Ok(match self {
            Scenario::Success => vec![add, smooth, trajectory(0.5)?],
            Scenario::StopOnFailure => vec![add, trajectory(0.0)?, smooth],
            Scenario::PolicyDenied => vec![smooth, report, add],
        })
    }
}

/// Options shared by every scenario in one invocation.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// TOML rule file replacing the default safe policy.
    pub policy: Option<PathBuf>,
    /// Fixed clock and sequential trace ids.
    pub deterministic: bool,
}

impl Settings {
    fn gate(&self) -> KlResult<Box<dyn PolicyGate>> {
        let gate: Box<dyn PolicyGate> = match &self.policy {
            Some(path) => Box::new(TomlPolicyGate::from_file(path)?),
            None => Box::new(DefaultSafePolicy),
        };
        Ok(gate)
    }

    fn kernel(&self) -> Kernel {
        if self.deterministic {
            let epoch = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single();
            Kernel::deterministic(epoch.unwrap_or_default())
        } else {
            Kernel::new()
        }
    }
}

pub struct Outcome {
    pub result: CaelResult,
    pub log: TraceLog,
    pub chain_valid: bool,
}

pub fn run(scenario: Scenario, settings: &Settings) -> KlResult<Outcome> {
    let log = InMemoryTraceLog::new(scenario.name());
    let cael = Cael::new(settings.gate()?)
        .with_kernel(settings.kernel())
        .with_sink(Box::new(log.clone()));

    let result = cael.run(&scenario.steps()?);

    Ok(Outcome {
        result,
        chain_valid: log.verify_integrity(),
        log: log.export_log(),
    })
}

pub fn run_and_print(scenario: Scenario, settings: &Settings) -> KlResult<()> {
    println!("=== Scenario: {} ===", scenario.name());
    println!("  {}", scenario.summary());
    println!();

    let outcome = run(scenario, settings)?;
    let result = &outcome.result;

    for (index, trace) in result.traces.iter().enumerate() {
        println!("  [{}] {}  digest={}", index, trace.descriptor().operation_id(), digest(trace));
        println!("{:#}", trace.describe());
        println!();
    }

    println!("  failure_code      : {}", result.failure_code);
    match result.failed_step_index {
        Some(index) => println!("  failed_step_index : {}", index),
        None => println!("  failed_step_index : -"),
    }
    if let Some(message) = &result.failure_message {
        println!("  failure_message   : {}", message);
    }
    println!("  steps executed    : {}", result.steps_executed());
    if let Some(last) = result.last_trace() {
        println!("  last operation    : {}", last.descriptor().operation_id());
    }
    println!("  traces recorded   : {}", outcome.log.entries.len());
    println!("  chain valid       : {}", outcome.chain_valid);
    println!("  terminal hash     : {}", outcome.log.terminal_hash);
    println!();

    Ok(())
}
