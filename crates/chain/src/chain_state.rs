//! Rolling window of recent header metadata.
//!
//! Context-dependent header rules (median-time-past, retarget consistency,
//! version floors) are evaluated against this window, promoted header by
//! header across a branch. The core reads chain state; it never mutates
//! the store through it.

use std::sync::Arc;

use ember_consensus::constants::MEDIAN_TIME_PAST_WINDOW;
use ember_consensus::{Checkpoint, ConsensusParams};
use ember_pow::difficulty::{next_work_required, DifficultyError, HeaderInfo};
use ember_primitives::BlockHeader;

use crate::error::{ChainError, HeaderError};
use crate::fast_chain::FastChain;

#[derive(Clone)]
pub struct ChainState {
    params: Arc<ConsensusParams>,
    /// Contiguous suffix of the chain ending at the current tip.
    window: Vec<HeaderInfo>,
    capacity: usize,
}

impl ChainState {
    /// Load the window ending at `tip` by walking stored parent links.
    pub fn from_chain<C: FastChain>(
        chain: &C,
        tip: &Checkpoint,
        params: Arc<ConsensusParams>,
    ) -> Result<Self, ChainError> {
        let capacity = (params.retarget_interval as usize).max(MEDIAN_TIME_PAST_WINDOW);
        let mut window = Vec::with_capacity(capacity);
        let mut cursor = tip.hash;
        while window.len() < capacity {
            let entry = match chain.get_header(&cursor)? {
                Some(entry) => entry,
                None => break,
            };
            window.push(HeaderInfo {
                height: entry.height,
                time: entry.header.time as i64,
                bits: entry.header.bits,
            });
            if entry.height == 0 {
                break;
            }
            cursor = entry.header.prev_block;
        }
        window.reverse();
        Ok(Self {
            params,
            window,
            capacity,
        })
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Height the next organized header would occupy.
    pub fn next_height(&self) -> u32 {
        self.window
            .last()
            .map(|info| info.height + 1)
            .unwrap_or(0)
    }

    /// Median timestamp of the most recent headers.
    pub fn median_time_past(&self) -> i64 {
        let start = self.window.len().saturating_sub(MEDIAN_TIME_PAST_WINDOW);
        let mut times: Vec<i64> = self.window[start..].iter().map(|info| info.time).collect();
        if times.is_empty() {
            return 0;
        }
        times.sort_unstable();
        times[times.len() / 2]
    }

    /// Compact bits the next header must carry.
    pub fn work_required(&self) -> Result<u32, ChainError> {
        next_work_required(&self.window, &self.params).map_err(|err| match err {
            DifficultyError::Compact(_) => ChainError::Header(HeaderError::InvalidTarget),
            _ => ChainError::OperationFailed,
        })
    }

    /// Version floor active at the next height.
    pub fn minimum_version(&self) -> i32 {
        self.params.minimum_version(self.next_height())
    }

    /// Slide the window forward over an accepted header.
    pub fn promote(&mut self, header: &BlockHeader, height: u32) {
        self.window.push(HeaderInfo {
            height,
            time: header.time as i64,
            bits: header.bits,
        });
        if self.window.len() > self.capacity {
            let excess = self.window.len() - self.capacity;
            self.window.drain(..excess);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_store::ChainStore;
    use ember_consensus::{chain_params, Network};
    use ember_storage::memory::MemoryStore;
    use ember_pow::difficulty::target_to_compact;

    fn test_params() -> Arc<ConsensusParams> {
        Arc::new(chain_params(Network::Regtest).consensus)
    }

    fn header(prev: [u8; 32], time: u32, bits: u32, nonce: u32) -> Arc<BlockHeader> {
        Arc::new(BlockHeader {
            version: 1,
            prev_block: prev,
            merkle_root: [0u8; 32],
            time,
            bits,
            nonce,
        })
    }

    #[test]
    fn window_loads_and_promotes() {
        let params = test_params();
        let bits = target_to_compact(&params.pow_limit);
        let chain = ChainStore::new(Arc::new(MemoryStore::new()));
        let genesis = header([0u8; 32], 1_000, bits, 0);
        chain.initialize(&genesis).expect("initialize");

        let tip = Checkpoint::new(0, genesis.hash());
        let mut state =
            ChainState::from_chain(&chain, &tip, Arc::clone(&params)).expect("state");
        assert_eq!(state.next_height(), 1);
        assert_eq!(state.median_time_past(), 1_000);
        assert_eq!(state.work_required().expect("bits"), bits);

        let next = header(genesis.hash(), 1_600, bits, 1);
        state.promote(&next, 1);
        assert_eq!(state.next_height(), 2);
        assert_eq!(state.median_time_past(), 1_600);
    }

    #[test]
    fn median_uses_recent_window_only() {
        let params = test_params();
        let bits = target_to_compact(&params.pow_limit);
        let chain = ChainStore::new(Arc::new(MemoryStore::new()));
        let genesis = header([0u8; 32], 0, bits, 0);
        chain.initialize(&genesis).expect("initialize");

        let tip = Checkpoint::new(0, genesis.hash());
        let mut state = ChainState::from_chain(&chain, &tip, params).expect("state");
        let mut prev = genesis.hash();
        for index in 1..=20u32 {
            let next = header(prev, index * 100, bits, index);
            prev = next.hash();
            state.promote(&next, index);
        }
        // Median of times 1000..=2000 stepping 100.
        assert_eq!(state.median_time_past(), 1_500);
    }
}
