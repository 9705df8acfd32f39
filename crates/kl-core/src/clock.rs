//! Clock and trace-id sources.
//!
//! Production kernels use `SystemClock` and `UuidTraceIds`. Deterministic
//! runs swap in `FixedClock` and `SequentialTraceIds`, which make every
//! observational field reproducible and pin `runtime_ms` to `0.0`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::traits::{Clock, TraceIdSource};

/// Wall clock plus a monotonic `Instant` for elapsed time.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// A clock frozen at one instant. Elapsed time is always zero.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    at: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.at
    }

    fn monotonic_ms(&self) -> f64 {
        0.0
    }
}

/// Random v4 UUIDs.
#[derive(Debug, Clone, Copy, Default)]
pub struct UuidTraceIds;

impl TraceIdSource for UuidTraceIds {
    fn next_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

/// `prefix-0001`, `prefix-0002`, … in call order.
#[derive(Debug)]
pub struct SequentialTraceIds {
    prefix: String,
    next: AtomicU64,
}

impl SequentialTraceIds {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            next: AtomicU64::new(1),
        }
    }
}

impl TraceIdSource for SequentialTraceIds {
    fn next_id(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        format!("{}-{:04}", self.prefix, n)
    }
}
