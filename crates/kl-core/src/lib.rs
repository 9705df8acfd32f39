//! # kl-core
//!
//! The execution runtime of the KL model.
//!
//! This crate provides:
//! - The seam traits (`Task`, `PolicyGate`, `TraceSink`, `Clock`, `TraceIdSource`)
//! - The `Kernel`, which invokes one task exactly once and always yields a trace
//! - `Cael`, the ordered runner that gates each step and stops at the first failure
//!
//! ## Usage
//!
//! ```rust,ignore
//! use kl_core::{Cael, Step, task_fn};
//!
//! let cael = Cael::new(Box::new(DefaultSafePolicy));
//! let result = cael.run(&[Step::new(descriptor, Arc::new(task_fn(add)), args)]);
//! ```

pub mod cael;
pub mod clock;
pub mod kernel;
pub mod traits;

pub use cael::{Cael, Step, CONTEXT_POLICY_NAME};
pub use clock::{FixedClock, SequentialTraceIds, SystemClock, UuidTraceIds};
pub use kernel::{ExecuteOptions, Kernel};
pub use traits::{task_fn, Clock, FnTask, PolicyGate, Task, TaskError, TraceIdSource, TraceSink};
