//! Hash-chain primitives.
//!
//! Hash input layout (bytes, in order):
//!   1. run_id as UTF-8 bytes
//!   2. sequence as 8-byte little-endian
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. compact JSON of `trace.describe()`

use sha2::{Digest, Sha256};

use kl_contracts::trace::ExecutionTrace;

use crate::{
    canonical::digest,
    event::{TraceLogEntry, GENESIS_HASH},
};

/// Lowercase 64-char hex hash of one chain entry.
pub fn hash_entry(run_id: &str, sequence: u64, trace: &ExecutionTrace, prev_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(run_id.as_bytes());
    hasher.update(sequence.to_le_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(trace.describe().to_string().as_bytes());

    hex::encode(hasher.finalize())
}

/// True when every entry links to its predecessor (or `GENESIS_HASH`), its
/// sequence matches its position, and both its stored digest and hash match
/// values recomputed from its fields. An empty chain is valid.
pub fn verify_chain(entries: &[TraceLogEntry]) -> bool {
    let mut expected_prev = GENESIS_HASH.to_string();

    for (position, entry) in entries.iter().enumerate() {
        if entry.sequence != position as u64 || entry.prev_hash != expected_prev {
            return false;
        }
        if entry.trace_digest != digest(&entry.trace) {
            return false;
        }
        let recomputed = hash_entry(&entry.run_id, entry.sequence, &entry.trace, &entry.prev_hash);
        if entry.this_hash != recomputed {
            return false;
        }
        expected_prev = entry.this_hash.clone();
    }

    true
}
