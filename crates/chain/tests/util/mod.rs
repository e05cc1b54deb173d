//! Shared harness for organize pipeline tests.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ember_chain::{BlockChain, Settings};
use ember_consensus::{chain_params, ChainParams, Network};
use ember_pow::difficulty::{compact_to_u256, hash_meets_target, target_to_compact};
use ember_pow::proof::proof_of_work_hash;
use ember_primitives::{BlockHeader, OutPoint, Transaction, TxIn, TxOut};
use ember_storage::memory::MemoryStore;

pub struct Harness {
    pub chain: Arc<BlockChain<MemoryStore>>,
    pub backend: Arc<MemoryStore>,
    pub genesis: Arc<BlockHeader>,
    pub bits: u32,
}

pub fn open_settings() -> Settings {
    Settings {
        byte_fee_satoshis: 0.0,
        sigop_fee_satoshis: 0.0,
        minimum_output_satoshis: 0,
        scrypt: false,
        priority_threads: 2,
        dispatch_threads: 1,
    }
}

pub fn harness() -> Harness {
    harness_with(open_settings())
}

pub fn harness_with(settings: Settings) -> Harness {
    let params: ChainParams = chain_params(Network::Regtest);
    let bits = target_to_compact(&params.consensus.pow_limit);
    let genesis = mine(BlockHeader {
        version: 1,
        prev_block: [0u8; 32],
        merkle_root: [0u8; 32],
        time: now() - 100_000,
        bits,
        nonce: 0,
    });
    let backend = Arc::new(MemoryStore::new());
    let chain = Arc::new(
        BlockChain::open(Arc::clone(&backend), &genesis, params, settings).expect("open chain"),
    );
    chain.start();
    Harness {
        chain,
        backend,
        genesis,
        bits,
    }
}

pub fn now() -> u32 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as u32)
        .unwrap_or(0)
}

/// Grind the nonce until the proof hash meets the declared target.
pub fn mine(mut header: BlockHeader) -> Arc<BlockHeader> {
    let target = compact_to_u256(header.bits).expect("target");
    while !hash_meets_target(&proof_of_work_hash(&header.consensus_encode(), false), &target) {
        header.nonce += 1;
    }
    Arc::new(header)
}

/// A mined child of `parent`, salted so sibling chains diverge.
pub fn child_of(parent: &BlockHeader, bits: u32, salt: u8) -> Arc<BlockHeader> {
    mine(BlockHeader {
        version: 1,
        prev_block: parent.hash(),
        merkle_root: [salt; 32],
        time: parent.time + 600,
        bits,
        nonce: 0,
    })
}

/// Organize a run of `count` children above `parent`, asserting success.
pub fn extend(
    harness: &Harness,
    parent: &Arc<BlockHeader>,
    count: usize,
    salt: u8,
) -> Vec<Arc<BlockHeader>> {
    let mut headers = Vec::with_capacity(count);
    let mut tip = Arc::clone(parent);
    for _ in 0..count {
        let next = child_of(&tip, harness.bits, salt);
        harness
            .chain
            .organize_header(Arc::clone(&next))
            .expect("extend candidate chain");
        tip = Arc::clone(&next);
        headers.push(next);
    }
    headers
}

pub fn funding_tx(tag: u8, value: i64) -> Transaction {
    Transaction {
        version: 1,
        vin: vec![TxIn {
            prevout: OutPoint {
                hash: [tag; 32],
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

pub fn spend_of(parent: &Transaction, value: i64) -> Transaction {
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
