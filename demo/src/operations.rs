//! Deterministic demo operations.
//!
//! Small numeric routines exercised through the runner. They favour
//! structure and traceability over performance. Every failure is a
//! `TaskError` with kind `ValueError`, so the resulting traces carry
//! `TASK_EXCEPTION`.

use std::sync::Arc;

use serde_json::Value;

use kl_contracts::{descriptor::OperationDescriptor, error::KlResult};
use kl_core::traits::{task_fn, Task, TaskError};

fn value_error(message: impl Into<String>) -> TaskError {
    TaskError::new("ValueError", message)
}

fn number(args: &Value, key: &str) -> Result<f64, TaskError> {
    args[key]
        .as_f64()
        .ok_or_else(|| value_error(format!("argument '{key}' must be a number")))
}

// ── math.add ──────────────────────────────────────────────────────────────────

pub fn add_descriptor() -> KlResult<OperationDescriptor> {
    OperationDescriptor::builder("math.add", "math", "pure")
        .constraint("scope", "integers")
        .build()
}

pub fn add_task() -> Arc<dyn Task> {
    Arc::new(task_fn(|args: &Value| {
        let a = args["a"]
            .as_i64()
            .ok_or_else(|| value_error("argument 'a' must be an integer"))?;
        let b = args["b"]
            .as_i64()
            .ok_or_else(|| value_error("argument 'b' must be an integer"))?;
        a.checked_add(b)
            .ok_or_else(|| value_error("integer overflow"))
    }))
}

// ── foundations.smooth ────────────────────────────────────────────────────────

pub fn smooth_descriptor() -> KlResult<OperationDescriptor> {
    OperationDescriptor::builder("foundations.smooth", "signal", "pure")
        .constraint("format", "list of floats")
        .build()
}

/// Centered moving average. Edges average over the values available.
pub fn smooth_measurements(values: &[f64], window: usize) -> Result<Vec<f64>, TaskError> {
    if window < 1 {
        return Err(value_error("window must be >= 1"));
    }
    let half = window / 2;
    Ok((0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(values.len());
            let slice = &values[start..end];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect())
}

pub fn smooth_task() -> Arc<dyn Task> {
    Arc::new(task_fn(|args: &Value| {
        let values = args["values"]
            .as_array()
            .ok_or_else(|| value_error("argument 'values' must be a list"))?
            .iter()
            .map(|v| v.as_f64().ok_or_else(|| value_error("values must be numbers")))
            .collect::<Result<Vec<f64>, _>>()?;
        let window = args["window"].as_u64().unwrap_or(3) as usize;
        smooth_measurements(&values, window)
    }))
}

// ── foundations.trajectory ────────────────────────────────────────────────────

pub fn trajectory_descriptor() -> KlResult<OperationDescriptor> {
    OperationDescriptor::builder("foundations.trajectory", "physics", "pure")
        .constraint("integrator", "semi-implicit euler")
        .build()
}

/// Positions under constant force, initial position included.
pub fn integrate_trajectory(
    x0: f64,
    v0: f64,
    dt: f64,
    steps: u64,
    force: f64,
    mass: f64,
) -> Result<Vec<f64>, TaskError> {
    if dt <= 0.0 {
        return Err(value_error("dt must be positive"));
    }
    if steps < 1 {
        return Err(value_error("steps must be at least 1"));
    }
    if mass == 0.0 {
        return Err(value_error("mass must be non-zero"));
    }

    let accel = force / mass;
    let (mut x, mut v) = (x0, v0);
    let mut positions = vec![x];
    for _ in 0..steps {
        v += accel * dt;
        x += v * dt;
        positions.push(x);
    }
    Ok(positions)
}

pub fn trajectory_task() -> Arc<dyn Task> {
    Arc::new(task_fn(|args: &Value| {
        let steps = args["steps"]
            .as_u64()
            .ok_or_else(|| value_error("argument 'steps' must be a non-negative integer"))?;
        integrate_trajectory(
            number(args, "x0")?,
            number(args, "v0")?,
            number(args, "dt")?,
            steps,
            number(args, "force")?,
            number(args, "mass")?,
        )
    }))
}

// ── report.write ──────────────────────────────────────────────────────────────

pub fn report_descriptor() -> KlResult<OperationDescriptor> {
    OperationDescriptor::builder("report.write", "reports", "io")
        .constraint("target", "stdout")
        .build()
}

/// Renders a one-line report. Declared `io`, so the default gate refuses it.
pub fn report_task() -> Arc<dyn Task> {
    Arc::new(task_fn(|args: &Value| {
        let title = args["title"].as_str().unwrap_or("untitled");
        Ok(format!("report '{title}' rendered"))
    }))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn smooth_averages_over_available_edges() {
        let out = smooth_measurements(&[1.0, 2.0, 3.0, 4.0], 3).unwrap();
        assert_eq!(out, vec![1.5, 2.0, 3.0, 3.5]);
        assert!(smooth_measurements(&[], 3).unwrap().is_empty());
        assert_eq!(smooth_measurements(&[1.0], 0).unwrap_err().kind, "ValueError");
    }

    #[test]
    fn trajectory_under_constant_force() {
        let positions = integrate_trajectory(0.0, 0.0, 1.0, 2, 2.0, 1.0).unwrap();
        assert_eq!(positions, vec![0.0, 2.0, 6.0]);
        assert!(integrate_trajectory(0.0, 0.0, 0.0, 2, 1.0, 1.0).is_err());
        assert!(integrate_trajectory(0.0, 0.0, 1.0, 2, 1.0, 0.0).is_err());
    }

    #[test]
    fn add_task_reports_bad_arguments() {
        let task = add_task();
        assert_eq!(task.call(&json!({"a": 1, "b": 2})).unwrap(), json!(3));
        let err = task.call(&json!({"a": "one", "b": 2})).unwrap_err();
        assert_eq!(err.to_string(), "ValueError: argument 'a' must be an integer");
    }
}
