//! Transient forest of not-yet-committed headers.
//!
//! Entries form trees rooted at indexed headers. A header enters the pool
//! only after passing validation as a rejected (insufficient-work) branch
//! tip, so pooled interiors are always pre-checked. Nothing here may
//! duplicate an indexed header; the organizer guarantees that under the
//! high-priority lock.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use ember_consensus::{Checkpoint, Hash256};
use ember_primitives::BlockHeader;

use crate::error::ChainError;
use crate::fast_chain::FastChain;
use crate::header_branch::HeaderBranch;

struct PooledHeader {
    header: Arc<BlockHeader>,
    parent: Hash256,
    height: Option<u32>,
}

#[derive(Default)]
struct PoolState {
    entries: HashMap<Hash256, PooledHeader>,
    children: HashMap<Hash256, Vec<Hash256>>,
}

#[derive(Default)]
pub struct HeaderPool {
    state: RwLock<PoolState>,
}

impl HeaderPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.read().entries.len()
    }

    pub fn exists(&self, hash: &Hash256) -> bool {
        self.read().entries.contains_key(hash)
    }

    pub fn get(&self, hash: &Hash256) -> Option<Arc<BlockHeader>> {
        self.read().entries.get(hash).map(|entry| Arc::clone(&entry.header))
    }

    /// Insert a header at the given height. No-op when already pooled.
    pub fn add(&self, header: Arc<BlockHeader>, height: u32) {
        let hash = header.hash();
        let mut state = self.write();
        if state.entries.contains_key(&hash) {
            return;
        }
        let parent = header.prev_block;
        state.entries.insert(
            hash,
            PooledHeader {
                header,
                parent,
                height: Some(height),
            },
        );
        state.children.entry(parent).or_default().push(hash);
    }

    /// Detach a single entry whose header reached the chain index. Pooled
    /// children keep their parent pointer and now root at the indexed
    /// header itself.
    pub fn detach(&self, hash: &Hash256) {
        let mut state = self.write();
        if let Some(entry) = state.entries.remove(hash) {
            if let Some(siblings) = state.children.get_mut(&entry.parent) {
                siblings.retain(|child| child != hash);
                if siblings.is_empty() {
                    state.children.remove(&entry.parent);
                }
            }
        }
    }

    /// Delete the entry and every pooled descendant whose only path to an
    /// indexed root passed through it.
    pub fn remove(&self, hash: &Hash256) {
        let mut state = self.write();
        let mut pending = vec![*hash];
        while let Some(next) = pending.pop() {
            if let Some(entry) = state.entries.remove(&next) {
                if let Some(siblings) = state.children.get_mut(&entry.parent) {
                    siblings.retain(|child| child != &next);
                    if siblings.is_empty() {
                        state.children.remove(&entry.parent);
                    }
                }
            }
            if let Some(children) = state.children.remove(&next) {
                pending.extend(children);
            }
        }
    }

    /// Evict entries at or below a confirmed height; their branches can no
    /// longer out-work the chain that buried them.
    pub fn prune(&self, height: u32) {
        let stale: Vec<Hash256> = {
            let state = self.read();
            state
                .entries
                .iter()
                .filter(|(_, entry)| entry.height.map(|at| at <= height).unwrap_or(false))
                .map(|(hash, _)| *hash)
                .collect()
        };
        for hash in stale {
            self.remove(&hash);
        }
    }

    /// Assemble the maximal ancestor-rooted branch terminating at `header`.
    ///
    /// Returns the empty branch when the header is already indexed, already
    /// pooled at a known height, or an orphan (parent neither pooled nor
    /// indexed). Only safe against concurrent mutation under the organizer's
    /// high-priority lock.
    pub fn get_branch<C: FastChain>(
        &self,
        chain: &C,
        header: Arc<BlockHeader>,
    ) -> Result<HeaderBranch, ChainError> {
        let hash = header.hash();
        if chain.is_indexed(&hash)? {
            return Ok(HeaderBranch::empty());
        }
        {
            let state = self.read();
            if let Some(entry) = state.entries.get(&hash) {
                if entry.height.is_some() {
                    return Ok(HeaderBranch::empty());
                }
            }
        }

        let mut headers = vec![header];
        loop {
            let parent_hash = headers[0].prev_block;
            // Only a parent on a chain index can serve as the fork point;
            // headers popped by an earlier reorganization are stored but
            // walk through the pool like any other branch interior.
            if chain.is_indexed(&parent_hash)? {
                let parent = chain
                    .get_header(&parent_hash)?
                    .ok_or(ChainError::OperationFailed)?;
                let fork_point = Checkpoint::new(parent.height, parent_hash);
                return HeaderBranch::new(fork_point, headers);
            }
            let pooled = {
                let state = self.read();
                state
                    .entries
                    .get(&parent_hash)
                    .map(|entry| Arc::clone(&entry.header))
            };
            match pooled {
                Some(parent) => headers.insert(0, parent),
                // Orphan: cannot be organized until the parent arrives.
                None => return Ok(HeaderBranch::empty()),
            }
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, PoolState> {
        self.state.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, PoolState> {
        self.state.write().unwrap_or_else(|err| err.into_inner())
    }
}
