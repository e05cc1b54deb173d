//! Per-network chain parameters.

use crate::money::MAX_MONEY;
use crate::Hash256;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Network {
    Mainnet,
    Testnet,
    Regtest,
}

impl Network {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "mainnet" => Some(Network::Mainnet),
            "testnet" => Some(Network::Testnet),
            "regtest" => Some(Network::Regtest),
            _ => None,
        }
    }
}

/// A known (height, hash) pair on a chain.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: Hash256,
}

impl Checkpoint {
    pub fn new(height: u32, hash: Hash256) -> Self {
        Self { height, hash }
    }
}

/// A block version floor that activates at a fixed height.
#[derive(Clone, Copy, Debug)]
pub struct VersionUpgrade {
    pub version: i32,
    pub activation_height: u32,
}

#[derive(Clone, Debug)]
pub struct ConsensusParams {
    /// Hash of the genesis block header.
    pub hash_genesis_block: Hash256,
    /// Easiest permitted proof-of-work target, little-endian.
    pub pow_limit: Hash256,
    /// Number of blocks between difficulty retargets.
    pub retarget_interval: u32,
    /// Expected seconds between blocks.
    pub pow_target_spacing: i64,
    /// Seconds a header timestamp may run ahead of wall-clock time.
    pub max_future_drift: i64,
    /// Minimum header version floors by activation height, ascending.
    pub version_upgrades: Vec<VersionUpgrade>,
    /// Maximum transaction output sum, in satoshis.
    pub max_money: u64,
}

impl ConsensusParams {
    /// Seconds a full retarget interval is expected to span.
    pub fn retarget_timespan(&self) -> i64 {
        self.retarget_interval as i64 * self.pow_target_spacing
    }

    /// Minimum header version required at the given height.
    pub fn minimum_version(&self, height: u32) -> i32 {
        self.version_upgrades
            .iter()
            .filter(|upgrade| upgrade.activation_height <= height)
            .map(|upgrade| upgrade.version)
            .max()
            .unwrap_or(crate::constants::MIN_HEADER_VERSION)
    }
}

#[derive(Clone, Debug)]
pub struct ChainParams {
    pub network: Network,
    pub consensus: ConsensusParams,
}

pub fn chain_params(network: Network) -> ChainParams {
    let consensus = match network {
        Network::Mainnet => ConsensusParams {
            hash_genesis_block: hash256_from_hex(
                "6fe28c0ab6f1b372c1a6a246ae63f74f931e8365e15a089c68d6190000000000",
            ),
            pow_limit: target_from_exponent(0x1d00ffff),
            retarget_interval: 2016,
            pow_target_spacing: 600,
            max_future_drift: 2 * 60 * 60,
            version_upgrades: vec![
                VersionUpgrade {
                    version: 2,
                    activation_height: 227_931,
                },
                VersionUpgrade {
                    version: 3,
                    activation_height: 363_725,
                },
                VersionUpgrade {
                    version: 4,
                    activation_height: 388_381,
                },
            ],
            max_money: MAX_MONEY as u64,
        },
        Network::Testnet => ConsensusParams {
            hash_genesis_block: hash256_from_hex(
                "43497fd7f826957108f4a30fd9cec3aeba79972084e90ead01ea330900000000",
            ),
            pow_limit: target_from_exponent(0x1d00ffff),
            retarget_interval: 2016,
            pow_target_spacing: 600,
            max_future_drift: 2 * 60 * 60,
            version_upgrades: vec![
                VersionUpgrade {
                    version: 2,
                    activation_height: 21_111,
                },
                VersionUpgrade {
                    version: 3,
                    activation_height: 581_885,
                },
                VersionUpgrade {
                    version: 4,
                    activation_height: 770_112,
                },
            ],
            max_money: MAX_MONEY as u64,
        },
        Network::Regtest => ConsensusParams {
            hash_genesis_block: [0u8; 32],
            pow_limit: target_from_exponent(0x207fffff),
            retarget_interval: 2016,
            pow_target_spacing: 600,
            max_future_drift: 2 * 60 * 60,
            version_upgrades: Vec::new(),
            max_money: MAX_MONEY as u64,
        },
    };

    ChainParams { network, consensus }
}

/// Expand a compact exponent form into a little-endian 256-bit target.
fn target_from_exponent(bits: u32) -> Hash256 {
    let size = (bits >> 24) as usize;
    let word = bits & 0x007f_ffff;
    let mut out = [0u8; 32];
    if size <= 3 {
        let word = word >> (8 * (3 - size));
        out[..4].copy_from_slice(&word.to_le_bytes());
    } else {
        let shift = size - 3;
        let bytes = word.to_le_bytes();
        for (offset, byte) in bytes.iter().take(3).enumerate() {
            if shift + offset < 32 {
                out[shift + offset] = *byte;
            }
        }
    }
    out
}

pub fn hash256_from_hex(hex: &str) -> Hash256 {
    let mut out = [0u8; 32];
    debug_assert_eq!(hex.len(), 64);
    for (index, chunk) in hex.as_bytes().chunks(2).enumerate().take(32) {
        let high = (chunk[0] as char).to_digit(16).unwrap_or(0) as u8;
        let low = (chunk[1] as char).to_digit(16).unwrap_or(0) as u8;
        out[index] = high << 4 | low;
    }
    out
}
