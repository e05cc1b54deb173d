//! Single-writer header admission pipeline.
//!
//! check, branch, accept, compare work, then reorganize or pool. The
//! entire organization runs under the high-priority side of the
//! prioritized mutex; the result is reported after the lock is released.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ember_consensus::ConsensusParams;
use ember_primitives::BlockHeader;
use tracing::error;

use crate::cells::ChainCells;
use crate::error::ChainError;
use crate::fast_chain::FastChain;
use crate::header_pool::HeaderPool;
use crate::priority_mutex::PriorityMutex;
use crate::subscriber::Notifier;
use crate::validate_header::HeaderValidator;

pub struct HeaderOrganizer<C> {
    chain: Arc<C>,
    mutex: Arc<PriorityMutex>,
    stopped: AtomicBool,
    pool: Arc<HeaderPool>,
    validator: HeaderValidator<C>,
    cells: Arc<ChainCells>,
    notifier: Arc<Notifier>,
}

impl<C: FastChain> HeaderOrganizer<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        chain: Arc<C>,
        mutex: Arc<PriorityMutex>,
        priority: Arc<rayon::ThreadPool>,
        pool: Arc<HeaderPool>,
        cells: Arc<ChainCells>,
        notifier: Arc<Notifier>,
        params: Arc<ConsensusParams>,
        scrypt: bool,
    ) -> Self {
        let validator = HeaderValidator::new(Arc::clone(&chain), priority, params, scrypt);
        Self {
            chain,
            mutex,
            stopped: AtomicBool::new(true),
            pool,
            validator,
            cells,
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

    /// Drive one header to a terminal outcome.
    pub fn organize(&self, header: Arc<BlockHeader>) -> Result<(), ChainError> {
        if self.stopped() {
            return Err(ChainError::ServiceStopped);
        }

        // Checks that are independent of chain state.
        self.validator.check(&header)?;

        let guard = self.mutex.lock_high_priority();
        let result = self.organize_locked(header);
        drop(guard);

        // The caller's handler runs outside the critical section.
        result
    }

    fn organize_locked(&self, header: Arc<BlockHeader>) -> Result<(), ChainError> {
        // The pool is safe for branch assembly only under this lock.
        let branch = self.pool.get_branch(&*self.chain, header)?;

        // Already indexed, already pooled, or an orphan awaiting its
        // parent: nothing to organize.
        if branch.is_empty() {
            return Err(ChainError::DuplicateBlock);
        }

        // Checks that are dependent on chain state.
        let accepted = self.validator.accept(&branch);
        if self.stopped() {
            return Err(ChainError::ServiceStopped);
        }
        // A rejected branch tip is not pooled.
        accepted?;

        // The top header is valid even if the branch has insufficient work.
        let work = branch.work();
        let required_work = self.chain.get_work(work, branch.height(), true)?;

        // Consensus: equal work loses, first seen wins. Only the tip is
        // pooled; extensions re-derive the interior via parent links.
        if *work <= required_work {
            let top = Arc::clone(branch.top().expect("branch is not empty"));
            self.pool.add(top, branch.top_height());
            return Err(ChainError::InsufficientWork);
        }

        let reorg = match self.chain.reorganize(branch.fork_point(), branch.headers()) {
            Ok(reorg) => reorg,
            Err(err) => {
                error!("failure writing header to store, is now corrupted: {err}");
                return Err(err);
            }
        };

        // Committed headers leave the pool; popped headers re-enter it so
        // a later branch can walk back through them to the fork point.
        // Caches and subscribers observe commits in lock order.
        for header in &reorg.incoming {
            self.pool.detach(&header.hash());
        }
        for (index, header) in reorg.outgoing.iter().enumerate() {
            self.pool
                .add(Arc::clone(header), reorg.fork_point.height + 1 + index as u32);
        }
        self.cells.refresh(&*self.chain)?;
        self.notifier.notify_reorganization(&reorg);
        Ok(())
    }
}
