//! Trace log entry and sealed log types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use kl_contracts::trace::ExecutionTrace;

/// `prev_hash` of the first entry in every chain: 64 hex zeros.
pub const GENESIS_HASH: &str =
    "0000000000000000000000000000000000000000000000000000000000000000";

/// One link in a run's SHA-256 hash chain.
///
/// `this_hash` commits to the run id, the sequence number, the previous
/// entry's hash and the full serialized trace. Changing any of them breaks
/// this entry and every later `prev_hash`.
#[derive(Debug, Clone, Serialize)]
pub struct TraceLogEntry {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    pub run_id: String,

    pub trace: ExecutionTrace,

    /// Canonical digest of `trace`, for equivalence checks across runs.
    pub trace_digest: String,

    /// `this_hash` of the previous entry, or `GENESIS_HASH`.
    pub prev_hash: String,

    pub this_hash: String,
}

/// A run's entries, exported in chain order.
#[derive(Debug, Clone, Serialize)]
pub struct TraceLog {
    pub run_id: String,

    pub entries: Vec<TraceLogEntry>,

    pub finalized_at: DateTime<Utc>,

    /// `this_hash` of the last entry. Empty when no trace was recorded.
    pub terminal_hash: String,
}
