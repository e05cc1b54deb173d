//! Subscriber notification fan-out.
//!
//! Organizers enqueue events while holding the write lock, so delivery
//! order matches commit order. A dedicated thread drains the queue and
//! invokes sinks off the critical path.

use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use crossbeam_channel::{unbounded, Sender};
use ember_primitives::{BlockHeader, Transaction};

use crate::fast_chain::HeaderReorganization;

/// Receives `(fork_height, incoming, outgoing)` per reorganization.
pub type HeaderHandler = Box<dyn Fn(u32, &[Arc<BlockHeader>], &[Arc<BlockHeader>]) + Send + Sync>;
/// Receives each transaction admitted to the pool.
pub type TransactionHandler = Box<dyn Fn(&Arc<Transaction>) + Send + Sync>;

enum Event {
    Reorganized {
        fork_height: u32,
        incoming: Vec<Arc<BlockHeader>>,
        outgoing: Vec<Arc<BlockHeader>>,
    },
    Stored(Arc<Transaction>),
    Stop,
}

pub struct Notifier {
    sender: Sender<Event>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Notifier {
    pub fn new(
        header_sinks: Arc<RwLock<Vec<HeaderHandler>>>,
        transaction_sinks: Arc<RwLock<Vec<TransactionHandler>>>,
    ) -> Self {
        let (sender, receiver) = unbounded();
        let worker = std::thread::Builder::new()
            .name("chain-notify".into())
            .spawn(move || {
                while let Ok(event) = receiver.recv() {
                    match event {
                        Event::Reorganized {
                            fork_height,
                            incoming,
                            outgoing,
                        } => {
                            let sinks =
                                header_sinks.read().unwrap_or_else(|err| err.into_inner());
                            for sink in sinks.iter() {
                                sink(fork_height, &incoming, &outgoing);
                            }
                        }
                        Event::Stored(tx) => {
                            let sinks = transaction_sinks
                                .read()
                                .unwrap_or_else(|err| err.into_inner());
                            for sink in sinks.iter() {
                                sink(&tx);
                            }
                        }
                        Event::Stop => break,
                    }
                }
            })
            .ok();
        Self {
            sender,
            worker: Mutex::new(worker),
        }
    }

    pub fn notify_reorganization(&self, reorg: &HeaderReorganization) {
        let _ = self.sender.send(Event::Reorganized {
            fork_height: reorg.fork_point.height,
            incoming: reorg.incoming.clone(),
            outgoing: reorg.outgoing.clone(),
        });
    }

    pub fn notify_transaction(&self, tx: Arc<Transaction>) {
        let _ = self.sender.send(Event::Stored(tx));
    }

    /// Drain outstanding events and join the dispatch thread.
    pub fn stop(&self) {
        let _ = self.sender.send(Event::Stop);
        let handle = {
            let mut worker = self.worker.lock().unwrap_or_else(|err| err.into_inner());
            worker.take()
        };
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        self.stop();
    }
}
