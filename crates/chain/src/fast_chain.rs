//! The store interface consumed by the organizers.

use std::sync::Arc;

use ember_consensus::{Checkpoint, Hash256};
use ember_primitives::{BlockHeader, OutPoint, Transaction, TxOut};
use primitive_types::U256;

use crate::error::ChainError;

/// Validation state flags of an indexed header.
pub mod block_state {
    /// Present on the candidate chain index.
    pub const CANDIDATE: u8 = 1 << 0;
    /// Present on the confirmed chain index.
    pub const CONFIRMED: u8 = 1 << 1;
    /// Header validation succeeded.
    pub const VALID: u8 = 1 << 2;
    /// Header was explicitly invalidated; branches over it are rejected.
    pub const FAILED: u8 = 1 << 3;
}

/// A header known to the store at a definite height.
#[derive(Clone, Debug)]
pub struct IndexedHeader {
    pub header: Arc<BlockHeader>,
    pub height: u32,
    /// Cumulative work from genesis through this header.
    pub work: U256,
    pub state: u8,
}

/// Outcome of a candidate-chain rewrite.
#[derive(Clone, Debug)]
pub struct HeaderReorganization {
    pub fork_point: Checkpoint,
    /// Headers pushed onto the candidate chain, ascending by height.
    pub incoming: Vec<Arc<BlockHeader>>,
    /// Headers popped off the candidate chain, ascending by height.
    pub outgoing: Vec<Arc<BlockHeader>>,
}

/// Indexed chain reads and the small set of mutations the organizers drive.
///
/// Writers are serialized externally by the prioritized mutex; reads are
/// safe at any time and may observe either side of an in-flight commit.
pub trait FastChain: Send + Sync {
    /// True if the hash is a stored header with a definite height.
    fn is_indexed(&self, hash: &Hash256) -> Result<bool, ChainError>;

    fn get_header(&self, hash: &Hash256) -> Result<Option<IndexedHeader>, ChainError>;

    fn get_header_at(&self, height: u32, candidate: bool)
        -> Result<Option<IndexedHeader>, ChainError>;

    /// Top of the candidate or confirmed chain.
    fn get_top(&self, candidate: bool) -> Result<Checkpoint, ChainError>;

    /// State flags of a stored header, zero when unknown.
    fn get_block_state(&self, hash: &Hash256) -> Result<u8, ChainError>;

    /// Cumulative work strictly above `above_height` on the selected index,
    /// short-circuiting once the sum exceeds `overcome`.
    fn get_work(&self, overcome: &U256, above_height: u32, candidate: bool)
        -> Result<U256, ChainError>;

    /// Greatest-height header common to the candidate and confirmed chains.
    fn fork_point(&self) -> Result<Checkpoint, ChainError>;

    /// Atomically replace the candidate chain above the fork point.
    fn reorganize(
        &self,
        fork_point: &Checkpoint,
        headers: &[Arc<BlockHeader>],
    ) -> Result<HeaderReorganization, ChainError>;

    /// Commit an unconfirmed transaction.
    fn store(&self, tx: &Transaction) -> Result<(), ChainError>;

    /// Mark a stored header failed so future branches over it are rejected.
    fn invalidate(&self, hash: &Hash256) -> Result<(), ChainError>;

    /// True if the transaction is already stored.
    fn tx_exists(&self, hash: &Hash256) -> Result<bool, ChainError>;

    /// Resolve the output a prevout references, if stored.
    fn get_output(&self, outpoint: &OutPoint) -> Result<Option<TxOut>, ChainError>;
}
