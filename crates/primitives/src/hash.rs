//! Double-SHA256, the identity function for headers and transactions.

use ember_consensus::Hash256;
use sha2::{Digest, Sha256};

/// One SHA-256 round.
pub fn sha256(data: &[u8]) -> Hash256 {
    finish(Sha256::new().chain_update(data))
}

/// Two SHA-256 rounds; every header and transaction in the store is
/// keyed by this.
pub fn sha256d(data: &[u8]) -> Hash256 {
    finish(Sha256::new().chain_update(sha256(data)))
}

fn finish(hasher: Sha256) -> Hash256 {
    let mut out = [0u8; 32];
    out.copy_from_slice(&hasher.finalize());
    out
}
