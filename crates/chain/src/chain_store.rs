//! Indexed header/transaction store backing the organizers.
//!
//! Record layout per header: 80-byte consensus encoding, little-endian
//! height, big-endian cumulative work, state flags. Height indexes map
//! big-endian heights to hashes so prefix scans stay ordered.

use std::sync::Arc;

use ember_consensus::{Checkpoint, Hash256};
use ember_pow::difficulty::header_work;
use ember_primitives::{BlockHeader, OutPoint, Transaction, TxOut};
use ember_storage::{Column, KeyValueStore, WriteBatch};
use primitive_types::U256;

use crate::error::ChainError;
use crate::fast_chain::{block_state, FastChain, HeaderReorganization, IndexedHeader};

const HEADER_ENTRY_SIZE: usize = 80 + 4 + 32 + 1;
const META_CANDIDATE_TOP: &[u8] = b"candidate_top";
const META_CONFIRMED_TOP: &[u8] = b"confirmed_top";

pub struct ChainStore<S> {
    store: Arc<S>,
}

impl<S: KeyValueStore> ChainStore<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// True once a genesis header has been committed.
    pub fn is_initialized(&self) -> Result<bool, ChainError> {
        Ok(self.store.get(Column::Meta, META_CANDIDATE_TOP)?.is_some())
    }

    /// Seed an empty store with the genesis header on both indexes.
    pub fn initialize(&self, genesis: &BlockHeader) -> Result<(), ChainError> {
        let hash = genesis.hash();
        let work = header_work(genesis.bits)?;
        let state = block_state::CANDIDATE | block_state::CONFIRMED | block_state::VALID;
        let mut batch = WriteBatch::new();
        put_header_entry(&mut batch, &hash, genesis, 0, &work, state);
        batch.put(Column::CandidateIndex, 0u32.to_be_bytes(), hash.to_vec());
        batch.put(Column::ConfirmedIndex, 0u32.to_be_bytes(), hash.to_vec());
        batch.put(Column::Meta, META_CANDIDATE_TOP, 0u32.to_be_bytes().to_vec());
        batch.put(Column::Meta, META_CONFIRMED_TOP, 0u32.to_be_bytes().to_vec());
        self.store.write_batch(&batch)?;
        Ok(())
    }

    /// Promote candidate index entries through `height` onto the confirmed
    /// index. The confirmation path (facade) drives this once block data is
    /// fully validated.
    pub fn confirm_to(&self, height: u32) -> Result<(), ChainError> {
        let confirmed_top = self.top_height(false)?;
        let candidate_top = self.top_height(true)?;
        if height <= confirmed_top {
            return Ok(());
        }
        if height > candidate_top {
            return Err(ChainError::OperationFailed);
        }

        let mut batch = WriteBatch::new();
        for at in (confirmed_top + 1)..=height {
            let hash = self
                .index_hash(at, true)?
                .ok_or(ChainError::OperationFailed)?;
            let mut entry = self
                .read_entry(&hash)?
                .ok_or(ChainError::OperationFailed)?;
            entry.state |= block_state::CONFIRMED;
            put_header_entry(
                &mut batch,
                &hash,
                &entry.header,
                entry.height,
                &entry.work,
                entry.state,
            );
            batch.put(Column::ConfirmedIndex, at.to_be_bytes(), hash.to_vec());
        }
        batch.put(Column::Meta, META_CONFIRMED_TOP, height.to_be_bytes().to_vec());
        self.store.write_batch(&batch)?;
        Ok(())
    }

    /// Drop a stored unconfirmed transaction (confirmation/eviction path).
    pub fn remove_transaction(&self, hash: &Hash256) -> Result<(), ChainError> {
        self.store.delete(Column::Transaction, hash)?;
        Ok(())
    }

    pub fn get_transaction(&self, hash: &Hash256) -> Result<Option<Transaction>, ChainError> {
        let bytes = match self.store.get(Column::Transaction, hash)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let tx = Transaction::consensus_decode(&bytes).map_err(|_| ChainError::OperationFailed)?;
        Ok(Some(tx))
    }

    fn read_entry(&self, hash: &Hash256) -> Result<Option<IndexedHeader>, ChainError> {
        let bytes = match self.store.get(Column::Header, hash)? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        decode_header_entry(&bytes).map(Some)
    }

    fn index_hash(&self, height: u32, candidate: bool) -> Result<Option<Hash256>, ChainError> {
        let column = index_column(candidate);
        let bytes = match self.store.get(column, &height.to_be_bytes())? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        if bytes.len() != 32 {
            return Err(ChainError::OperationFailed);
        }
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&bytes);
        Ok(Some(hash))
    }

    fn top_height(&self, candidate: bool) -> Result<u32, ChainError> {
        let key = if candidate {
            META_CANDIDATE_TOP
        } else {
            META_CONFIRMED_TOP
        };
        let bytes = self
            .store
            .get(Column::Meta, key)?
            .ok_or(ChainError::OperationFailed)?;
        if bytes.len() != 4 {
            return Err(ChainError::OperationFailed);
        }
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }
}

impl<S: KeyValueStore> FastChain for ChainStore<S> {
    fn is_indexed(&self, hash: &Hash256) -> Result<bool, ChainError> {
        let state = self.get_block_state(hash)?;
        Ok(state & (block_state::CANDIDATE | block_state::CONFIRMED) != 0)
    }

    fn get_header(&self, hash: &Hash256) -> Result<Option<IndexedHeader>, ChainError> {
        self.read_entry(hash)
    }

    fn get_header_at(
        &self,
        height: u32,
        candidate: bool,
    ) -> Result<Option<IndexedHeader>, ChainError> {
        match self.index_hash(height, candidate)? {
            Some(hash) => self.read_entry(&hash),
            None => Ok(None),
        }
    }

    fn get_top(&self, candidate: bool) -> Result<Checkpoint, ChainError> {
        let height = self.top_height(candidate)?;
        let hash = self
            .index_hash(height, candidate)?
            .ok_or(ChainError::OperationFailed)?;
        Ok(Checkpoint::new(height, hash))
    }

    fn get_block_state(&self, hash: &Hash256) -> Result<u8, ChainError> {
        Ok(self.read_entry(hash)?.map(|entry| entry.state).unwrap_or(0))
    }

    fn get_work(
        &self,
        overcome: &U256,
        above_height: u32,
        candidate: bool,
    ) -> Result<U256, ChainError> {
        let top = self.top_height(candidate)?;
        let mut sum = U256::zero();
        if top <= above_height {
            return Ok(sum);
        }
        // Top down, stopping at the height or the work level, whichever
        // comes first.
        for height in ((above_height + 1)..=top).rev() {
            let hash = self
                .index_hash(height, candidate)?
                .ok_or(ChainError::OperationFailed)?;
            let entry = self
                .read_entry(&hash)?
                .ok_or(ChainError::OperationFailed)?;
            sum = sum.saturating_add(header_work(entry.header.bits)?);
            if sum > *overcome {
                break;
            }
        }
        Ok(sum)
    }

    fn fork_point(&self) -> Result<Checkpoint, ChainError> {
        let mut height = self.top_height(true)?.min(self.top_height(false)?);
        loop {
            let candidate = self
                .index_hash(height, true)?
                .ok_or(ChainError::OperationFailed)?;
            let confirmed = self
                .index_hash(height, false)?
                .ok_or(ChainError::OperationFailed)?;
            if candidate == confirmed {
                return Ok(Checkpoint::new(height, candidate));
            }
            height = height.checked_sub(1).ok_or(ChainError::OperationFailed)?;
        }
    }

    fn reorganize(
        &self,
        fork_point: &Checkpoint,
        headers: &[Arc<BlockHeader>],
    ) -> Result<HeaderReorganization, ChainError> {
        let fork_entry = self
            .read_entry(&fork_point.hash)?
            .ok_or(ChainError::OperationFailed)?;
        if fork_entry.height != fork_point.height || headers.is_empty() {
            return Err(ChainError::OperationFailed);
        }
        if headers[0].prev_block != fork_point.hash {
            return Err(ChainError::OperationFailed);
        }

        let top = self.top_height(true)?;
        let mut batch = WriteBatch::new();

        let mut outgoing = Vec::new();
        for height in (fork_point.height + 1)..=top {
            let hash = self
                .index_hash(height, true)?
                .ok_or(ChainError::OperationFailed)?;
            let mut entry = self
                .read_entry(&hash)?
                .ok_or(ChainError::OperationFailed)?;
            entry.state &= !block_state::CANDIDATE;
            put_header_entry(
                &mut batch,
                &hash,
                &entry.header,
                entry.height,
                &entry.work,
                entry.state,
            );
            batch.delete(Column::CandidateIndex, height.to_be_bytes());
            outgoing.push(entry.header);
        }

        let mut incoming = Vec::new();
        let mut parent_work = fork_entry.work;
        for (offset, header) in headers.iter().enumerate() {
            let height = fork_point.height + 1 + offset as u32;
            let hash = header.hash();
            parent_work = parent_work.saturating_add(header_work(header.bits)?);
            let state = self.get_block_state(&hash)?
                | block_state::CANDIDATE
                | block_state::VALID;
            put_header_entry(&mut batch, &hash, header, height, &parent_work, state);
            batch.put(Column::CandidateIndex, height.to_be_bytes(), hash.to_vec());
            incoming.push(Arc::clone(header));
        }

        let new_top = fork_point.height + headers.len() as u32;
        batch.put(Column::Meta, META_CANDIDATE_TOP, new_top.to_be_bytes().to_vec());
        self.store.write_batch(&batch)?;

        Ok(HeaderReorganization {
            fork_point: *fork_point,
            incoming,
            outgoing,
        })
    }

    fn store(&self, tx: &Transaction) -> Result<(), ChainError> {
        let hash = tx.txid();
        self.store
            .put(Column::Transaction, &hash, &tx.consensus_encode())?;
        Ok(())
    }

    fn invalidate(&self, hash: &Hash256) -> Result<(), ChainError> {
        let mut entry = self
            .read_entry(hash)?
            .ok_or(ChainError::OperationFailed)?;
        entry.state = (entry.state | block_state::FAILED) & !block_state::VALID;
        let mut batch = WriteBatch::new();
        put_header_entry(
            &mut batch,
            hash,
            &entry.header,
            entry.height,
            &entry.work,
            entry.state,
        );
        self.store.write_batch(&batch)?;
        Ok(())
    }

    fn tx_exists(&self, hash: &Hash256) -> Result<bool, ChainError> {
        Ok(self.store.get(Column::Transaction, hash)?.is_some())
    }

    fn get_output(&self, outpoint: &OutPoint) -> Result<Option<TxOut>, ChainError> {
        let tx = match self.get_transaction(&outpoint.hash)? {
            Some(tx) => tx,
            None => return Ok(None),
        };
        Ok(tx.vout.get(outpoint.index as usize).cloned())
    }
}

fn index_column(candidate: bool) -> Column {
    if candidate {
        Column::CandidateIndex
    } else {
        Column::ConfirmedIndex
    }
}

fn put_header_entry(
    batch: &mut WriteBatch,
    hash: &Hash256,
    header: &BlockHeader,
    height: u32,
    work: &U256,
    state: u8,
) {
    let mut value = Vec::with_capacity(HEADER_ENTRY_SIZE);
    value.extend_from_slice(&header.consensus_encode());
    value.extend_from_slice(&height.to_le_bytes());
    value.extend_from_slice(&work.to_big_endian());
    value.push(state);
    batch.put(Column::Header, *hash, value);
}

fn decode_header_entry(bytes: &[u8]) -> Result<IndexedHeader, ChainError> {
    if bytes.len() != HEADER_ENTRY_SIZE {
        return Err(ChainError::OperationFailed);
    }
    let header =
        BlockHeader::consensus_decode(&bytes[..80]).map_err(|_| ChainError::OperationFailed)?;
    let height = u32::from_le_bytes([bytes[80], bytes[81], bytes[82], bytes[83]]);
    let mut work_bytes = [0u8; 32];
    work_bytes.copy_from_slice(&bytes[84..116]);
    Ok(IndexedHeader {
        header: Arc::new(header),
        height,
        work: U256::from_big_endian(&work_bytes),
        state: bytes[116],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_storage::memory::MemoryStore;

    const EASY_BITS: u32 = 0x207fffff;

    fn header(prev: Hash256, nonce: u32) -> Arc<BlockHeader> {
        Arc::new(BlockHeader {
            version: 1,
            prev_block: prev,
            merkle_root: [0u8; 32],
            time: 1_000_000,
            bits: EASY_BITS,
            nonce,
        })
    }

    fn seeded_store() -> (ChainStore<MemoryStore>, Arc<BlockHeader>) {
        let chain = ChainStore::new(Arc::new(MemoryStore::new()));
        let genesis = header([0u8; 32], 0);
        chain.initialize(&genesis).expect("initialize");
        (chain, genesis)
    }

    #[test]
    fn initialize_seeds_both_tops() {
        let (chain, genesis) = seeded_store();
        let candidate = chain.get_top(true).expect("candidate top");
        let confirmed = chain.get_top(false).expect("confirmed top");
        assert_eq!(candidate.height, 0);
        assert_eq!(candidate.hash, genesis.hash());
        assert_eq!(confirmed, candidate);
        assert!(chain.is_indexed(&genesis.hash()).expect("indexed"));
    }

    #[test]
    fn reorganize_extends_and_rewrites() {
        let (chain, genesis) = seeded_store();
        let fork = Checkpoint::new(0, genesis.hash());

        let first = header(genesis.hash(), 1);
        let second = header(first.hash(), 2);
        let reorg = chain
            .reorganize(&fork, &[Arc::clone(&first), Arc::clone(&second)])
            .expect("extend");
        assert!(reorg.outgoing.is_empty());
        assert_eq!(reorg.incoming.len(), 2);
        assert_eq!(chain.get_top(true).expect("top").hash, second.hash());

        // Replace the branch above genesis with a longer one.
        let other1 = header(genesis.hash(), 10);
        let other2 = header(other1.hash(), 11);
        let other3 = header(other2.hash(), 12);
        let reorg = chain
            .reorganize(
                &fork,
                &[Arc::clone(&other1), Arc::clone(&other2), Arc::clone(&other3)],
            )
            .expect("replace");
        assert_eq!(reorg.outgoing.len(), 2);
        assert_eq!(reorg.outgoing[0].hash(), first.hash());
        assert_eq!(reorg.outgoing[1].hash(), second.hash());
        assert_eq!(chain.get_top(true).expect("top").height, 3);

        // Replaced headers remain stored but leave the chain index.
        let state = chain.get_block_state(&first.hash()).expect("state");
        assert_eq!(state & block_state::CANDIDATE, 0);
        assert!(!chain.is_indexed(&first.hash()).expect("unindexed"));
        assert!(chain.get_header(&first.hash()).expect("stored").is_some());
    }

    #[test]
    fn get_work_sums_above_height() {
        let (chain, genesis) = seeded_store();
        let fork = Checkpoint::new(0, genesis.hash());
        let first = header(genesis.hash(), 1);
        let second = header(first.hash(), 2);
        chain
            .reorganize(&fork, &[first, second])
            .expect("extend");

        let per_header = header_work(EASY_BITS).expect("work");
        let unbounded = U256::MAX;
        let sum = chain.get_work(&unbounded, 0, true).expect("work above 0");
        assert_eq!(sum, per_header * U256::from(2u64));
        let sum = chain.get_work(&unbounded, 1, true).expect("work above 1");
        assert_eq!(sum, per_header);
        let sum = chain.get_work(&unbounded, 2, true).expect("work above top");
        assert_eq!(sum, U256::zero());

        // Short-circuits once the overcome level is exceeded.
        let overcome = U256::zero();
        let partial = chain.get_work(&overcome, 0, true).expect("short");
        assert_eq!(partial, per_header);
    }

    #[test]
    fn confirm_to_promotes_candidates() {
        let (chain, genesis) = seeded_store();
        let fork = Checkpoint::new(0, genesis.hash());
        let first = header(genesis.hash(), 1);
        chain.reorganize(&fork, &[Arc::clone(&first)]).expect("extend");

        chain.confirm_to(1).expect("confirm");
        let confirmed = chain.get_top(false).expect("confirmed top");
        assert_eq!(confirmed.height, 1);
        assert_eq!(confirmed.hash, first.hash());
        let state = chain.get_block_state(&first.hash()).expect("state");
        assert_ne!(state & block_state::CONFIRMED, 0);
        assert_eq!(chain.fork_point().expect("fork").height, 1);
    }

    #[test]
    fn invalidate_sets_failed_state() {
        let (chain, genesis) = seeded_store();
        chain.invalidate(&genesis.hash()).expect("invalidate");
        let state = chain.get_block_state(&genesis.hash()).expect("state");
        assert_ne!(state & block_state::FAILED, 0);
        assert_eq!(state & block_state::VALID, 0);
    }

    #[test]
    fn transactions_roundtrip() {
        let (chain, _) = seeded_store();
        let tx = Transaction {
            version: 1,
            vin: vec![ember_primitives::TxIn {
                prevout: OutPoint {
                    hash: [0x44; 32],
                    index: 0,
                },
                script_sig: Vec::new(),
                sequence: u32::MAX,
            }],
            vout: vec![TxOut {
                value: 1_000,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        };
        let hash = tx.txid();
        assert!(!chain.tx_exists(&hash).expect("missing"));
        chain.store(&tx).expect("store");
        assert!(chain.tx_exists(&hash).expect("stored"));
        let output = chain
            .get_output(&OutPoint { hash, index: 0 })
            .expect("output")
            .expect("present");
        assert_eq!(output.value, 1_000);
        chain.remove_transaction(&hash).expect("remove");
        assert!(!chain.tx_exists(&hash).expect("removed"));
    }
}
