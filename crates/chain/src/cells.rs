//! Lock-free snapshot cells for chain tops, fork point and work.
//!
//! Written once per commit while the prioritized mutex is held; read at
//! any time. Readers may observe a slightly stale snapshot, never a torn
//! one.

use arc_swap::ArcSwap;
use ember_consensus::Checkpoint;
use primitive_types::U256;
use std::sync::Arc;

use crate::error::ChainError;
use crate::fast_chain::FastChain;

pub struct ChainCells {
    fork_point: ArcSwap<Checkpoint>,
    candidate_work: ArcSwap<U256>,
    confirmed_work: ArcSwap<U256>,
    candidate_top: ArcSwap<Checkpoint>,
    confirmed_top: ArcSwap<Checkpoint>,
}

impl ChainCells {
    pub fn load<C: FastChain>(chain: &C) -> Result<Self, ChainError> {
        let cells = Self {
            fork_point: ArcSwap::from_pointee(Checkpoint::new(0, [0u8; 32])),
            candidate_work: ArcSwap::from_pointee(U256::zero()),
            confirmed_work: ArcSwap::from_pointee(U256::zero()),
            candidate_top: ArcSwap::from_pointee(Checkpoint::new(0, [0u8; 32])),
            confirmed_top: ArcSwap::from_pointee(Checkpoint::new(0, [0u8; 32])),
        };
        cells.refresh(chain)?;
        Ok(cells)
    }

    /// Recompute every cell from the store. Called with the write lock
    /// held so snapshots advance in commit order.
    pub fn refresh<C: FastChain>(&self, chain: &C) -> Result<(), ChainError> {
        let fork = chain.fork_point()?;
        let unbounded = U256::MAX;
        let candidate = chain.get_work(&unbounded, fork.height, true)?;
        let confirmed = chain.get_work(&unbounded, fork.height, false)?;
        self.fork_point.store(Arc::new(fork));
        self.candidate_work.store(Arc::new(candidate));
        self.confirmed_work.store(Arc::new(confirmed));
        self.candidate_top.store(Arc::new(chain.get_top(true)?));
        self.confirmed_top.store(Arc::new(chain.get_top(false)?));
        Ok(())
    }

    /// Highest header common to the candidate and confirmed chains.
    pub fn fork_point(&self) -> Checkpoint {
        **self.fork_point.load()
    }

    /// Candidate-chain work above the fork point.
    pub fn candidate_work(&self) -> U256 {
        **self.candidate_work.load()
    }

    /// Confirmed-chain work above the fork point.
    pub fn confirmed_work(&self) -> U256 {
        **self.confirmed_work.load()
    }

    pub fn candidate_top(&self) -> Checkpoint {
        **self.candidate_top.load()
    }

    pub fn confirmed_top(&self) -> Checkpoint {
        **self.confirmed_top.load()
    }

    /// The candidate chain out-works the confirmed chain above the fork.
    pub fn is_reorganizable(&self) -> bool {
        self.candidate_work() > self.confirmed_work()
    }
}
