//! An ancestor-rooted header sequence with precomputed work.

use std::sync::Arc;

use ember_consensus::Checkpoint;
use ember_pow::difficulty::header_work;
use ember_primitives::BlockHeader;
use primitive_types::U256;

use crate::error::ChainError;

/// Ordered headers above an indexed fork point. Each element's previous
/// hash is the hash of its predecessor; the first element's parent is the
/// fork point. Branch heights begin at `height() + 1`.
#[derive(Clone, Debug)]
pub struct HeaderBranch {
    fork_point: Checkpoint,
    headers: Vec<Arc<BlockHeader>>,
    work: U256,
}

impl HeaderBranch {
    /// An empty branch: the candidate already exists, or it is an orphan.
    pub fn empty() -> Self {
        Self {
            fork_point: Checkpoint::new(0, [0u8; 32]),
            headers: Vec::new(),
            work: U256::zero(),
        }
    }

    /// Build a branch over `headers`, summing each header's implied work.
    pub fn new(
        fork_point: Checkpoint,
        headers: Vec<Arc<BlockHeader>>,
    ) -> Result<Self, ChainError> {
        debug_assert!(headers
            .first()
            .map(|first| first.prev_block == fork_point.hash)
            .unwrap_or(true));
        let mut work = U256::zero();
        for header in &headers {
            work = work.saturating_add(header_work(header.bits)?);
        }
        Ok(Self {
            fork_point,
            headers,
            work,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn headers(&self) -> &[Arc<BlockHeader>] {
        &self.headers
    }

    pub fn fork_point(&self) -> &Checkpoint {
        &self.fork_point
    }

    /// Height of the fork point; the branch occupies heights above it.
    pub fn height(&self) -> u32 {
        self.fork_point.height
    }

    pub fn top(&self) -> Option<&Arc<BlockHeader>> {
        self.headers.last()
    }

    pub fn top_height(&self) -> u32 {
        self.fork_point.height + self.headers.len() as u32
    }

    /// Total proof-of-work implied by the branch headers.
    pub fn work(&self) -> &U256 {
        &self.work
    }
}
