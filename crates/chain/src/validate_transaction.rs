//! Transaction validation against chain state and stored prevouts.

use std::collections::HashSet;
use std::sync::Arc;

use ember_consensus::constants::{LOCKTIME_THRESHOLD, MAX_SCRIPT_SIZE, MAX_TX_SIZE};
use ember_consensus::ConsensusParams;
use ember_primitives::Transaction;
use rayon::prelude::*;

use crate::chain_state::ChainState;
use crate::error::{ChainError, TransactionError};
use crate::fast_chain::FastChain;

/// Metadata populated during acceptance and consumed by policy and
/// connect stages.
#[derive(Clone, Copy, Debug)]
pub struct TransactionMetadata {
    pub fees: u64,
    pub serialized_size: usize,
    pub signature_operations: usize,
}

pub struct TransactionValidator<C> {
    chain: Arc<C>,
    priority: Arc<rayon::ThreadPool>,
    params: Arc<ConsensusParams>,
}

impl<C: FastChain> TransactionValidator<C> {
    pub fn new(
        chain: Arc<C>,
        priority: Arc<rayon::ThreadPool>,
        params: Arc<ConsensusParams>,
    ) -> Self {
        Self {
            chain,
            priority,
            params,
        }
    }

    /// Checks independent of chain state: structure, amount bounds, null
    /// inputs, duplicates, size.
    pub fn check(&self, tx: &Transaction, max_money: u64) -> Result<(), ChainError> {
        if tx.vin.is_empty() || tx.vout.is_empty() {
            return Err(TransactionError::EmptyTransaction.into());
        }
        if tx.serialized_size() > MAX_TX_SIZE {
            return Err(TransactionError::OversizedTransaction.into());
        }
        if tx.is_coinbase() {
            return Err(TransactionError::Coinbase.into());
        }

        let mut total: u64 = 0;
        for output in &tx.vout {
            if output.value < 0 || output.value as u64 > max_money {
                return Err(TransactionError::ValueOutOfRange.into());
            }
            total = total
                .checked_add(output.value as u64)
                .ok_or(TransactionError::ValueOutOfRange)?;
            if total > max_money {
                return Err(TransactionError::ValueOutOfRange.into());
            }
        }

        let mut seen = HashSet::with_capacity(tx.vin.len());
        for input in &tx.vin {
            if input.prevout.is_null() {
                return Err(TransactionError::NullInput.into());
            }
            if !seen.insert(input.prevout) {
                return Err(TransactionError::DuplicateInput.into());
            }
        }
        Ok(())
    }

    /// Checks dependent on chain state and prevouts. Prevout population
    /// fans out across the priority pool; the result carries the metadata
    /// needed by fee policy and connect.
    pub fn accept(&self, tx: &Transaction) -> Result<TransactionMetadata, ChainError> {
        let state = ChainState::from_chain(
            &*self.chain,
            &self.chain.get_top(false)?,
            Arc::clone(&self.params),
        )?;
        if !is_final(tx, state.next_height(), state.median_time_past()) {
            return Err(TransactionError::NonFinal.into());
        }

        let chain = &self.chain;
        let values: Vec<i64> = self.priority.install(|| {
            tx.vin
                .par_iter()
                .map(|input| {
                    let output = chain
                        .get_output(&input.prevout)?
                        .ok_or(TransactionError::MissingInput)?;
                    Ok(output.value)
                })
                .collect::<Result<Vec<i64>, ChainError>>()
        })?;

        let mut value_in: u64 = 0;
        for value in values {
            if value < 0 {
                return Err(TransactionError::ValueOutOfRange.into());
            }
            value_in = value_in
                .checked_add(value as u64)
                .ok_or(TransactionError::ValueOutOfRange)?;
        }
        let value_out: u64 = tx.vout.iter().map(|output| output.value as u64).sum();
        if value_in < value_out {
            return Err(TransactionError::NegativeFee.into());
        }

        Ok(TransactionMetadata {
            fees: value_in - value_out,
            serialized_size: tx.serialized_size(),
            signature_operations: tx.signature_operations(),
        })
    }

    /// Checks that include script metadata. Evaluation proper lives in the
    /// script engine; this bounds what the engine would be handed.
    pub fn connect(
        &self,
        tx: &Transaction,
        _metadata: &TransactionMetadata,
    ) -> Result<(), ChainError> {
        for input in &tx.vin {
            if input.script_sig.len() > MAX_SCRIPT_SIZE {
                return Err(TransactionError::OversizedScript.into());
            }
        }
        for output in &tx.vout {
            if output.script_pubkey.len() > MAX_SCRIPT_SIZE {
                return Err(TransactionError::OversizedScript.into());
            }
        }
        Ok(())
    }
}

/// BIP113-style finality: a locktime binds until the next height or the
/// median time past, unless every input opts out with a final sequence.
fn is_final(tx: &Transaction, next_height: u32, median_time_past: i64) -> bool {
    if tx.lock_time == 0 {
        return true;
    }
    let threshold_ok = if tx.lock_time < LOCKTIME_THRESHOLD {
        tx.lock_time < next_height
    } else {
        (tx.lock_time as i64) <= median_time_past
    };
    if threshold_ok {
        return true;
    }
    tx.vin.iter().all(|input| input.sequence == u32::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain_store::ChainStore;
    use ember_consensus::{chain_params, Network};
    use ember_primitives::{BlockHeader, OutPoint, TxIn, TxOut};
    use ember_storage::memory::MemoryStore;

    const EASY_BITS: u32 = 0x207fffff;
    const MAX_MONEY: u64 = ember_consensus::money::MAX_MONEY as u64;

    fn setup() -> (Arc<ChainStore<MemoryStore>>, TransactionValidator<ChainStore<MemoryStore>>) {
        let chain = Arc::new(ChainStore::new(Arc::new(MemoryStore::new())));
        let genesis = BlockHeader {
            version: 1,
            prev_block: [0u8; 32],
            merkle_root: [0u8; 32],
            time: 1_000_000,
            bits: EASY_BITS,
            nonce: 0,
        };
        chain.initialize(&genesis).expect("initialize");
        let pool = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(2)
                .build()
                .expect("pool"),
        );
        let params = Arc::new(chain_params(Network::Regtest).consensus);
        let validator = TransactionValidator::new(Arc::clone(&chain), pool, params);
        (chain, validator)
    }

    fn funding_tx(value: i64) -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint {
                    hash: [0x77; 32],
                    index: 0,
                },
                script_sig: vec![0x51],
                sequence: u32::MAX,
            }],
            vout: vec![TxOut {
                value,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    fn spend_of(parent: &Transaction, value: i64) -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint {
                    hash: parent.txid(),
                    index: 0,
                },
                script_sig: vec![0x51],
                sequence: u32::MAX,
            }],
            vout: vec![TxOut {
                value,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    #[test]
    fn check_rejects_structural_failures() {
        let (_, validator) = setup();

        let empty = Transaction {
            version: 1,
            vin: Vec::new(),
            vout: Vec::new(),
            lock_time: 0,
        };
        assert_eq!(
            validator.check(&empty, MAX_MONEY),
            Err(ChainError::Transaction(TransactionError::EmptyTransaction))
        );

        let mut coinbase = funding_tx(1_000);
        coinbase.vin[0].prevout = OutPoint::null();
        assert_eq!(
            validator.check(&coinbase, MAX_MONEY),
            Err(ChainError::Transaction(TransactionError::Coinbase))
        );

        let mut rich = funding_tx(1_000);
        rich.vout[0].value = MAX_MONEY as i64 + 1;
        assert_eq!(
            validator.check(&rich, MAX_MONEY),
            Err(ChainError::Transaction(TransactionError::ValueOutOfRange))
        );

        let mut doubled = funding_tx(1_000);
        doubled.vin.push(doubled.vin[0].clone());
        assert_eq!(
            validator.check(&doubled, MAX_MONEY),
            Err(ChainError::Transaction(TransactionError::DuplicateInput))
        );

        assert!(validator.check(&funding_tx(1_000), MAX_MONEY).is_ok());
    }

    #[test]
    fn accept_populates_fees_from_store() {
        let (chain, validator) = setup();
        let parent = funding_tx(10_000);
        chain.store(&parent).expect("store parent");

        let child = spend_of(&parent, 9_000);
        let metadata = validator.accept(&child).expect("accept");
        assert_eq!(metadata.fees, 1_000);
        assert_eq!(metadata.serialized_size, child.serialized_size());

        let orphan = spend_of(&funding_tx(5), 1);
        assert_eq!(
            validator.accept(&orphan).unwrap_err(),
            ChainError::Transaction(TransactionError::MissingInput)
        );

        let overdrawn = spend_of(&parent, 20_000);
        assert_eq!(
            validator.accept(&overdrawn).unwrap_err(),
            ChainError::Transaction(TransactionError::NegativeFee)
        );
    }

    #[test]
    fn locked_transaction_is_not_final() {
        let (chain, validator) = setup();
        let parent = funding_tx(10_000);
        chain.store(&parent).expect("store parent");

        let mut locked = spend_of(&parent, 9_000);
        locked.lock_time = 100;
        locked.vin[0].sequence = 0;
        assert_eq!(
            validator.accept(&locked).unwrap_err(),
            ChainError::Transaction(TransactionError::NonFinal)
        );

        // A final sequence opts out of the locktime.
        let mut opted_out = spend_of(&parent, 9_000);
        opted_out.lock_time = 100;
        assert!(validator.accept(&opted_out).is_ok());
    }

    #[test]
    fn connect_bounds_script_sizes() {
        let (_, validator) = setup();
        let metadata = TransactionMetadata {
            fees: 0,
            serialized_size: 0,
            signature_operations: 0,
        };
        let mut tx = funding_tx(1_000);
        assert!(validator.connect(&tx, &metadata).is_ok());
        tx.vout[0].script_pubkey = vec![0u8; MAX_SCRIPT_SIZE + 1];
        assert_eq!(
            validator.connect(&tx, &metadata),
            Err(ChainError::Transaction(TransactionError::OversizedScript))
        );
    }
}
