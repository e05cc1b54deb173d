//! Single-writer transaction admission pipeline.
//!
//! check, existence, accept, policy, connect, store. Organization holds
//! the low-priority side of the prioritized mutex and blocks on a
//! single-use completion signal while the validation chain runs on the
//! priority pool; the calling thread is the serialization point, so the
//! pool is never exhausted by waiting organizers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::bounded;
use ember_consensus::ConsensusParams;
use ember_primitives::Transaction;
use tracing::{debug, error};

use crate::error::ChainError;
use crate::fast_chain::FastChain;
use crate::priority_mutex::PriorityMutex;
use crate::settings::Settings;
use crate::subscriber::Notifier;
use crate::transaction_pool::TransactionPool;
use crate::validate_transaction::{TransactionMetadata, TransactionValidator};

pub struct TransactionOrganizer<C> {
    chain: Arc<C>,
    mutex: Arc<PriorityMutex>,
    stopped: Arc<AtomicBool>,
    settings: Arc<Settings>,
    pool: Arc<TransactionPool>,
    validator: Arc<TransactionValidator<C>>,
    priority: Arc<rayon::ThreadPool>,
    notifier: Arc<Notifier>,
}

impl<C: FastChain + 'static> TransactionOrganizer<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<C>,
        mutex: Arc<PriorityMutex>,
        priority: Arc<rayon::ThreadPool>,
        pool: Arc<TransactionPool>,
        notifier: Arc<Notifier>,
        params: Arc<ConsensusParams>,
        settings: Arc<Settings>,
    ) -> Self {
        let validator = Arc::new(TransactionValidator::new(
            Arc::clone(&chain),
            Arc::clone(&priority),
            params,
        ));
        Self {
            chain,
            mutex,
            stopped: Arc::new(AtomicBool::new(true)),
            settings,
            pool,
            validator,
            priority,
            notifier,
        }
    }

    pub fn stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    pub fn start(&self) {
        self.stopped.store(false, Ordering::Release);
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }

    /// Drive one transaction to a terminal outcome.
    pub fn organize(&self, tx: Arc<Transaction>, max_money: u64) -> Result<(), ChainError> {
        // Checks that are independent of chain state.
        self.validator.check(&tx, max_money)?;

        let guard = self.mutex.lock_low_priority();

        if self.stopped() {
            return Err(ChainError::ServiceStopped);
        }

        // The pool is safe for filtering only, so protect by the lock.
        // This locates unconfirmed transactions discovered since startup.
        if self.pool.exists(&*self.chain, &tx.txid())? {
            return Err(ChainError::DuplicateTransaction);
        }

        // Single-use completion signal. The validation chain may use all
        // threads of the priority pool; this thread waits so a result
        // always lands on a non-priority thread.
        let (signal, resume) = bounded(1);
        {
            let validator = Arc::clone(&self.validator);
            let chain = Arc::clone(&self.chain);
            let settings = Arc::clone(&self.settings);
            let stopped = Arc::clone(&self.stopped);
            let notifier = Arc::clone(&self.notifier);
            let tx = Arc::clone(&tx);
            self.priority.spawn(move || {
                let result =
                    accept_sequence(&validator, &*chain, &settings, &stopped, &notifier, tx);
                let _ = signal.send(result);
            });
        }
        let result = resume.recv().map_err(|_| ChainError::OperationFailed)?;

        drop(guard);

        // The caller's handler runs outside the critical section.
        result
    }
}

fn accept_sequence<C: FastChain>(
    validator: &TransactionValidator<C>,
    chain: &C,
    settings: &Settings,
    stopped: &AtomicBool,
    notifier: &Notifier,
    tx: Arc<Transaction>,
) -> Result<(), ChainError> {
    // Checks that are dependent on chain state and prevouts.
    let accepted = validator.accept(&tx);
    if stopped.load(Ordering::Acquire) {
        return Err(ChainError::ServiceStopped);
    }
    let metadata = accepted?;

    // Policy.
    if !sufficient_fee(settings, &tx, &metadata) {
        return Err(ChainError::InsufficientFee);
    }

    // Policy.
    if is_dusty(&tx, settings.minimum_output_satoshis) {
        return Err(ChainError::DustyTransaction);
    }

    // Checks that include script metadata.
    validator.connect(&tx, &metadata)?;
    if stopped.load(Ordering::Acquire) {
        return Err(ChainError::ServiceStopped);
    }

    if let Err(err) = chain.store(&tx) {
        error!("failure writing transaction to store, is now corrupted: {err}");
        return Err(err);
    }

    notifier.notify_transaction(tx);
    Ok(())
}

/// Require at least one satoshi per transaction if any fee is configured.
fn sufficient_fee(settings: &Settings, tx: &Transaction, metadata: &TransactionMetadata) -> bool {
    let byte_fee = settings.byte_fee_satoshis;
    let sigop_fee = settings.sigop_fee_satoshis;

    // Guard against summing signed values by testing independently.
    if byte_fee == 0.0 && sigop_fee == 0.0 {
        return true;
    }

    let byte = if byte_fee > 0.0 {
        byte_fee as f64 * metadata.serialized_size as f64
    } else {
        0.0
    };
    let sigop = if sigop_fee > 0.0 {
        sigop_fee as f64 * metadata.signature_operations as f64
    } else {
        0.0
    };

    let price = ((byte + sigop) as u64).max(1);
    let paid = metadata.fees;
    if paid >= price {
        return true;
    }

    debug!(
        bytes = metadata.serialized_size,
        sigops = metadata.signature_operations,
        price,
        paid,
        "transaction fee below price"
    );
    false
}

/// Reject outputs below the configured dust threshold.
fn is_dusty(tx: &Transaction, minimum_output_satoshis: u64) -> bool {
    tx.vout
        .iter()
        .any(|output| (output.value as u64) < minimum_output_satoshis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_primitives::{OutPoint, TxIn, TxOut};

    fn transaction() -> Transaction {
        Transaction {
            version: 1,
            vin: vec![TxIn {
                prevout: OutPoint {
                    hash: [0x55; 32],
                    index: 0,
                },
                script_sig: vec![0x51],
                sequence: u32::MAX,
            }],
            vout: vec![TxOut {
                value: 600,
                script_pubkey: vec![0x51],
            }],
            lock_time: 0,
        }
    }

    fn metadata_for(tx: &Transaction, fees: u64) -> TransactionMetadata {
        TransactionMetadata {
            fees,
            serialized_size: tx.serialized_size(),
            signature_operations: tx.signature_operations(),
        }
    }

    #[test]
    fn zero_configured_fees_accept_anything() {
        let settings = Settings {
            byte_fee_satoshis: 0.0,
            sigop_fee_satoshis: 0.0,
            ..Settings::default()
        };
        let tx = transaction();
        assert!(sufficient_fee(&settings, &tx, &metadata_for(&tx, 0)));
    }

    #[test]
    fn fee_exactly_at_price_accepts() {
        let settings = Settings {
            byte_fee_satoshis: 1.0,
            sigop_fee_satoshis: 0.0,
            ..Settings::default()
        };
        let tx = transaction();
        let price = tx.serialized_size() as u64;
        assert!(sufficient_fee(&settings, &tx, &metadata_for(&tx, price)));
        assert!(!sufficient_fee(&settings, &tx, &metadata_for(&tx, price - 1)));
    }

    #[test]
    fn configured_fee_floors_at_one_satoshi() {
        // A fractional byte fee rounds the price down, but never to zero.
        let settings = Settings {
            byte_fee_satoshis: 0.001,
            sigop_fee_satoshis: 0.0,
            ..Settings::default()
        };
        let tx = transaction();
        assert!(!sufficient_fee(&settings, &tx, &metadata_for(&tx, 0)));
        assert!(sufficient_fee(&settings, &tx, &metadata_for(&tx, 1)));
    }

    #[test]
    fn dust_threshold_applies_per_output() {
        let tx = transaction();
        assert!(is_dusty(&tx, 601));
        assert!(!is_dusty(&tx, 600));
        assert!(!is_dusty(&tx, 0));
    }
}
