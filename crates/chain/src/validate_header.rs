//! Header validation against accumulated chain state.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ember_consensus::ConsensusParams;
use ember_pow::difficulty::{compact_to_u256, hash_meets_target};
use ember_pow::proof::proof_of_work_hash;
use ember_primitives::BlockHeader;
use primitive_types::U256;
use rayon::prelude::*;

use crate::chain_state::ChainState;
use crate::error::{ChainError, HeaderError};
use crate::fast_chain::{block_state, FastChain};
use crate::header_branch::HeaderBranch;

pub struct HeaderValidator<C> {
    chain: Arc<C>,
    priority: Arc<rayon::ThreadPool>,
    params: Arc<ConsensusParams>,
    scrypt: bool,
}

impl<C: FastChain> HeaderValidator<C> {
    pub fn new(
        chain: Arc<C>,
        priority: Arc<rayon::ThreadPool>,
        params: Arc<ConsensusParams>,
        scrypt: bool,
    ) -> Self {
        Self {
            chain,
            priority,
            params,
            scrypt,
        }
    }

    /// Checks independent of chain state: target sanity, proof of work,
    /// wall-clock timestamp bound.
    pub fn check(&self, header: &BlockHeader) -> Result<(), ChainError> {
        let target =
            compact_to_u256(header.bits).map_err(|_| HeaderError::InvalidTarget)?;
        let limit = U256::from_little_endian(&self.params.pow_limit);
        if target.is_zero() || target > limit {
            return Err(HeaderError::InvalidTarget.into());
        }

        let proof = proof_of_work_hash(&header.consensus_encode(), self.scrypt);
        if !hash_meets_target(&proof, &target) {
            return Err(HeaderError::InvalidProofOfWork.into());
        }

        if header.time as i64 > wall_clock() + self.params.max_future_drift {
            return Err(HeaderError::FuturisticTimestamp.into());
        }
        Ok(())
    }

    /// Checks dependent on chain state, promoted across the branch:
    /// median-time-past, retarget consistency and version floors. Proof
    /// re-verification of branch interiors fans out on the priority pool.
    pub fn accept(&self, branch: &HeaderBranch) -> Result<(), ChainError> {
        let fork_state = self.chain.get_block_state(&branch.fork_point().hash)?;
        if fork_state & block_state::FAILED != 0 {
            return Err(HeaderError::InvalidatedAncestor.into());
        }

        let scrypt = self.scrypt;
        self.priority.install(|| {
            branch.headers().par_iter().try_for_each(|header| {
                let target = compact_to_u256(header.bits)
                    .map_err(|_| ChainError::Header(HeaderError::InvalidTarget))?;
                let proof = proof_of_work_hash(&header.consensus_encode(), scrypt);
                if !hash_meets_target(&proof, &target) {
                    return Err(ChainError::Header(HeaderError::InvalidProofOfWork));
                }
                Ok(())
            })
        })?;

        let mut state = ChainState::from_chain(
            &*self.chain,
            branch.fork_point(),
            Arc::clone(&self.params),
        )?;
        let mut height = branch.height();
        for header in branch.headers() {
            height += 1;
            let stored = self.chain.get_block_state(&header.hash())?;
            if stored & block_state::FAILED != 0 {
                return Err(HeaderError::InvalidatedAncestor.into());
            }
            self.accept_one(header, &state)?;
            state.promote(header, height);
        }
        Ok(())
    }

    fn accept_one(&self, header: &BlockHeader, state: &ChainState) -> Result<(), ChainError> {
        if header.version < state.minimum_version() {
            return Err(HeaderError::InvalidVersion.into());
        }
        if header.time as i64 <= state.median_time_past() {
            return Err(HeaderError::TimestampTooEarly.into());
        }
        if header.bits != state.work_required()? {
            return Err(HeaderError::IncorrectTarget.into());
        }
        Ok(())
    }
}

fn wall_clock() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}
