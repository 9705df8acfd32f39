//! In-memory, hash-chained `TraceSink`.
//!
//! `InMemoryTraceLog` keeps entries in a `Vec` behind `Arc<Mutex<_>>`. Clones
//! share the same chain, so a caller can hand one clone to the runner and
//! keep another to export or verify afterwards.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tracing::{debug, info};

use kl_contracts::{
    error::{KlError, KlResult},
    trace::ExecutionTrace,
};
use kl_core::traits::TraceSink;

use crate::{
    canonical::digest,
    chain::{hash_entry, verify_chain},
    event::{TraceLog, TraceLogEntry, GENESIS_HASH},
};

// ── Internal mutable state ────────────────────────────────────────────────────

pub(crate) struct LogState {
    pub(crate) entries: Vec<TraceLogEntry>,
    pub(crate) sequence: u64,
    /// `this_hash` of the last entry, or `GENESIS_HASH`.
    pub(crate) last_hash: String,
}

// ── Public log ────────────────────────────────────────────────────────────────

/// Append-only trace log for one run, chained with SHA-256.
#[derive(Clone)]
pub struct InMemoryTraceLog {
    run_id: String,
    pub(crate) state: Arc<Mutex<LogState>>,
}

impl InMemoryTraceLog {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            state: Arc::new(Mutex::new(LogState {
                entries: Vec::new(),
                sequence: 0,
                last_hash: GENESIS_HASH.to_string(),
            })),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every entry recorded so far.
    ///
    /// `terminal_hash` is the last entry's `this_hash`, or empty.
    pub fn export_log(&self) -> TraceLog {
        let state = self.lock();
        let terminal_hash = state
            .entries
            .last()
            .map(|e| e.this_hash.clone())
            .unwrap_or_default();

        TraceLog {
            run_id: self.run_id.clone(),
            entries: state.entries.clone(),
            finalized_at: Utc::now(),
            terminal_hash,
        }
    }

    pub fn verify_integrity(&self) -> bool {
        verify_chain(&self.lock().entries)
    }

    /// Reads tolerate a poisoned lock; the chain itself is still verifiable.
    fn lock(&self) -> MutexGuard<'_, LogState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── TraceSink impl ────────────────────────────────────────────────────────────

impl TraceSink for InMemoryTraceLog {
    /// Fails with `AuditWriteFailed` only when the lock is poisoned.
    fn record(&self, trace: &ExecutionTrace) -> KlResult<()> {
        let mut state = self.state.lock().map_err(|e| KlError::AuditWriteFailed {
            reason: format!("trace log lock poisoned: {}", e),
        })?;

        let prev_hash = state.last_hash.clone();
        let sequence = state.sequence;
        let this_hash = hash_entry(&self.run_id, sequence, trace, &prev_hash);

        state.entries.push(TraceLogEntry {
            sequence,
            run_id: self.run_id.clone(),
            trace: trace.clone(),
            trace_digest: digest(trace),
            prev_hash,
            this_hash: this_hash.clone(),
        });
        state.sequence += 1;
        state.last_hash = this_hash;

        debug!(
            run_id = %self.run_id,
            sequence,
            trace_id = %trace.trace_id(),
            "trace recorded"
        );
        if !trace.success() {
            info!(
                run_id = %self.run_id,
                sequence,
                failure_code = %trace.failure_code(),
                "failed trace recorded"
            );
        }

        Ok(())
    }
}
