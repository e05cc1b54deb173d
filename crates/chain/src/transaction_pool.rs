//! Transient set of unconfirmed transaction identities.
//!
//! Membership is the union of the in-memory set and the store's
//! unconfirmed transaction table; the organizer relies on the store side
//! after commit, while explicit add/remove belong to the facade's
//! confirmation path.

use std::collections::HashSet;
use std::sync::RwLock;

use ember_consensus::Hash256;

use crate::error::ChainError;
use crate::fast_chain::FastChain;

#[derive(Default)]
pub struct TransactionPool {
    hashes: RwLock<HashSet<Hash256>>,
}

impl TransactionPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self) -> usize {
        self.read().len()
    }

    /// Hash-based membership, consulting the store for transactions
    /// committed since startup. Safe under the organizer's low-priority
    /// lock.
    pub fn exists<C: FastChain>(&self, chain: &C, hash: &Hash256) -> Result<bool, ChainError> {
        if self.read().contains(hash) {
            return Ok(true);
        }
        chain.tx_exists(hash)
    }

    pub fn add(&self, hash: Hash256) {
        self.write().insert(hash);
    }

    pub fn remove(&self, hash: &Hash256) {
        self.write().remove(hash);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashSet<Hash256>> {
        self.hashes.read().unwrap_or_else(|err| err.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<Hash256>> {
        self.hashes.write().unwrap_or_else(|err| err.into_inner())
    }
}
