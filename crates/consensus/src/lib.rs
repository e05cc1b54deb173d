//! Network parameters, money bounds and consensus constants.

pub mod constants;
pub mod money;
pub mod params;

pub type Hash256 = [u8; 32];

pub use params::{chain_params, ChainParams, Checkpoint, ConsensusParams, Network};
