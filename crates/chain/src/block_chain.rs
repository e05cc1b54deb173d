//! Thread-safe chain facade.
//!
//! Owns the store, the pools, both organizers, the notifier and the
//! snapshot cells. Reads are lock-free against the cells; writes funnel
//! through the organizers and the prioritized mutex.

use std::sync::{Arc, RwLock};

use ember_consensus::{ChainParams, Checkpoint, ConsensusParams, Hash256};
use ember_primitives::{BlockHeader, Transaction};
use ember_storage::KeyValueStore;
use primitive_types::U256;

use crate::cells::ChainCells;
use crate::chain_store::ChainStore;
use crate::error::ChainError;
use crate::fast_chain::{FastChain, IndexedHeader};
use crate::header_organizer::HeaderOrganizer;
use crate::header_pool::HeaderPool;
use crate::priority_mutex::PriorityMutex;
use crate::settings::Settings;
use crate::subscriber::{HeaderHandler, Notifier, TransactionHandler};
use crate::transaction_organizer::TransactionOrganizer;
use crate::transaction_pool::TransactionPool;

pub struct BlockChain<S: KeyValueStore + 'static> {
    store: Arc<ChainStore<S>>,
    header_pool: Arc<HeaderPool>,
    transaction_pool: Arc<TransactionPool>,
    mutex: Arc<PriorityMutex>,
    dispatch: rayon::ThreadPool,
    header_organizer: Arc<HeaderOrganizer<ChainStore<S>>>,
    transaction_organizer: Arc<TransactionOrganizer<ChainStore<S>>>,
    header_sinks: Arc<RwLock<Vec<HeaderHandler>>>,
    transaction_sinks: Arc<RwLock<Vec<TransactionHandler>>>,
    notifier: Arc<Notifier>,
    cells: Arc<ChainCells>,
    params: Arc<ConsensusParams>,
}

impl<S: KeyValueStore + 'static> BlockChain<S> {
    /// Open a chain over the given backend, seeding the genesis header
    /// when the store is empty.
    pub fn open(
        backend: Arc<S>,
        genesis: &BlockHeader,
        params: ChainParams,
        settings: Settings,
    ) -> Result<Self, ChainError> {
        // The caller's genesis must belong to the configured network.
        debug_assert!(
            params.consensus.hash_genesis_block == [0u8; 32]
                || params.consensus.hash_genesis_block == genesis.hash()
        );
        let store = Arc::new(ChainStore::new(backend));
        if !store.is_initialized()? {
            store.initialize(genesis)?;
        }

        let priority = Arc::new(
            rayon::ThreadPoolBuilder::new()
                .num_threads(settings.priority_threads)
                .thread_name(|index| format!("chain-priority-{index}"))
                .build()
                .map_err(|_| ChainError::OperationFailed)?,
        );
        let dispatch = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.dispatch_threads)
            .thread_name(|index| format!("chain-dispatch-{index}"))
            .build()
            .map_err(|_| ChainError::OperationFailed)?;

        let header_sinks: Arc<RwLock<Vec<HeaderHandler>>> = Arc::new(RwLock::new(Vec::new()));
        let transaction_sinks: Arc<RwLock<Vec<TransactionHandler>>> =
            Arc::new(RwLock::new(Vec::new()));
        let notifier = Arc::new(Notifier::new(
            Arc::clone(&header_sinks),
            Arc::clone(&transaction_sinks),
        ));

        let mutex = Arc::new(PriorityMutex::new());
        let header_pool = Arc::new(HeaderPool::new());
        let transaction_pool = Arc::new(TransactionPool::new());
        let cells = Arc::new(ChainCells::load(&*store)?);
        let params = Arc::new(params.consensus);
        let settings = Arc::new(settings);

        let header_organizer = Arc::new(HeaderOrganizer::new(
            Arc::clone(&store),
            Arc::clone(&mutex),
            Arc::clone(&priority),
            Arc::clone(&header_pool),
            Arc::clone(&cells),
            Arc::clone(&notifier),
            Arc::clone(&params),
            settings.scrypt,
        ));
        let transaction_organizer = Arc::new(TransactionOrganizer::new(
            Arc::clone(&store),
            Arc::clone(&mutex),
            Arc::clone(&priority),
            Arc::clone(&transaction_pool),
            Arc::clone(&notifier),
            Arc::clone(&params),
            Arc::clone(&settings),
        ));

        Ok(Self {
            store,
            header_pool,
            transaction_pool,
            mutex,
            dispatch,
            header_organizer,
            transaction_organizer,
            header_sinks,
            transaction_sinks,
            notifier,
            cells,
            params,
        })
    }

    // Startup and shutdown.
    // ------------------------------------------------------------------

    /// Start both organizers.
    pub fn start(&self) {
        self.header_organizer.start();
        self.transaction_organizer.start();
    }

    /// Signal organize work to stop. In-flight store writes are not rolled
    /// back; pending pipelines yield `ServiceStopped` without touching
    /// storage.
    pub fn stop(&self) {
        self.header_organizer.stop();
        self.transaction_organizer.stop();
    }

    /// Stop organizers and drain the notifier queue.
    pub fn close(&self) {
        self.stop();
        self.notifier.stop();
    }

    // Organizers.
    // ------------------------------------------------------------------

    /// Validate and organize a header into the header pool and store.
    pub fn organize_header(&self, header: Arc<BlockHeader>) -> Result<(), ChainError> {
        self.header_organizer.organize(header)
    }

    /// As `organize_header`, dispatched on the general pool; the handler
    /// is invoked exactly once with the result.
    pub fn organize_header_with(
        &self,
        header: Arc<BlockHeader>,
        handler: impl FnOnce(Result<(), ChainError>) + Send + 'static,
    ) {
        let organizer = Arc::clone(&self.header_organizer);
        self.dispatch.spawn(move || handler(organizer.organize(header)));
    }

    /// Validate and organize a transaction into the pool and store.
    pub fn organize_transaction(&self, tx: Arc<Transaction>) -> Result<(), ChainError> {
        self.transaction_organizer.organize(tx, self.params.max_money)
    }

    /// As `organize_transaction`, dispatched on the general pool; the
    /// handler is invoked exactly once with the result.
    pub fn organize_transaction_with(
        &self,
        tx: Arc<Transaction>,
        handler: impl FnOnce(Result<(), ChainError>) + Send + 'static,
    ) {
        let organizer = Arc::clone(&self.transaction_organizer);
        let max_money = self.params.max_money;
        self.dispatch
            .spawn(move || handler(organizer.organize(tx, max_money)));
    }

    // Confirmation path.
    // ------------------------------------------------------------------

    /// Promote the candidate chain through `height` onto the confirmed
    /// index and drop header pool entries the promotion buried.
    pub fn confirm_to(&self, height: u32) -> Result<(), ChainError> {
        let guard = self.mutex.lock_high_priority();
        let result = self.store.confirm_to(height);
        if result.is_ok() {
            self.header_pool.prune(height);
            self.cells.refresh(&*self.store)?;
        }
        drop(guard);
        result
    }

    /// Evict confirmed transactions from the pool and the unconfirmed
    /// table. Pool membership is owned here, not by the organizer.
    pub fn remove_transactions(&self, hashes: &[Hash256]) -> Result<(), ChainError> {
        let guard = self.mutex.lock_low_priority();
        for hash in hashes {
            self.transaction_pool.remove(hash);
            self.store.remove_transaction(hash)?;
        }
        drop(guard);
        Ok(())
    }

    // Subscribers.
    // ------------------------------------------------------------------

    /// Subscribe to header reorganizations: `(fork_height, incoming,
    /// outgoing)` in commit order.
    pub fn subscribe_headers(
        &self,
        handler: impl Fn(u32, &[Arc<BlockHeader>], &[Arc<BlockHeader>]) + Send + Sync + 'static,
    ) {
        self.header_sinks
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .push(Box::new(handler));
    }

    /// Subscribe to pool admissions, one call per stored transaction.
    pub fn subscribe_transactions(
        &self,
        handler: impl Fn(&Arc<Transaction>) + Send + Sync + 'static,
    ) {
        self.transaction_sinks
            .write()
            .unwrap_or_else(|err| err.into_inner())
            .push(Box::new(handler));
    }

    // Properties.
    // ------------------------------------------------------------------
    // Reads below are lock-free snapshots; they may trail an in-flight
    // commit but are never torn.

    pub fn top_candidate(&self) -> Checkpoint {
        self.cells.candidate_top()
    }

    pub fn top_confirmed(&self) -> Checkpoint {
        self.cells.confirmed_top()
    }

    /// Highest common block between the candidate and confirmed chains.
    pub fn fork_point(&self) -> Checkpoint {
        self.cells.fork_point()
    }

    pub fn candidate_work(&self) -> U256 {
        self.cells.candidate_work()
    }

    pub fn confirmed_work(&self) -> U256 {
        self.cells.confirmed_work()
    }

    /// The candidate chain has greater work than the confirmed chain.
    pub fn is_reorganizable(&self) -> bool {
        self.cells.is_reorganizable()
    }

    pub fn header_pool_size(&self) -> usize {
        self.header_pool.size()
    }

    pub fn header_pooled(&self, hash: &Hash256) -> bool {
        self.header_pool.exists(hash)
    }

    pub fn transaction_pooled(&self, hash: &Hash256) -> Result<bool, ChainError> {
        self.transaction_pool.exists(&*self.store, hash)
    }

    pub fn get_header(&self, hash: &Hash256) -> Result<Option<IndexedHeader>, ChainError> {
        self.store.get_header(hash)
    }

    pub fn get_block_state(&self, hash: &Hash256) -> Result<u8, ChainError> {
        self.store.get_block_state(hash)
    }

    /// Mark a stored header failed; later branches over it are rejected.
    pub fn invalidate(&self, hash: &Hash256) -> Result<(), ChainError> {
        let guard = self.mutex.lock_high_priority();
        let result = self.store.invalidate(hash);
        drop(guard);
        result
    }

    /// Direct store access for callers that need richer reads.
    pub fn store(&self) -> &Arc<ChainStore<S>> {
        &self.store
    }
}

impl<S: KeyValueStore + 'static> Drop for BlockChain<S> {
    fn drop(&mut self) {
        self.close();
    }
}
