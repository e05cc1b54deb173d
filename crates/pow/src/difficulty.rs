//! Difficulty and compact target utilities.

use ember_consensus::{ConsensusParams, Hash256};
use primitive_types::U256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompactError {
    Negative,
    Overflow,
}

impl std::fmt::Display for CompactError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompactError::Negative => write!(f, "compact target has negative sign bit"),
            CompactError::Overflow => write!(f, "compact target overflows 256-bit range"),
        }
    }
}

impl std::error::Error for CompactError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DifficultyError {
    EmptyChain,
    NonContiguous,
    Compact(CompactError),
}

impl std::fmt::Display for DifficultyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DifficultyError::EmptyChain => write!(f, "no headers available"),
            DifficultyError::NonContiguous => write!(f, "header list must be contiguous by height"),
            DifficultyError::Compact(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for DifficultyError {}

impl From<CompactError> for DifficultyError {
    fn from(err: CompactError) -> Self {
        DifficultyError::Compact(err)
    }
}

/// Header metadata sufficient for retarget and median-time-past math.
#[derive(Clone, Copy, Debug)]
pub struct HeaderInfo {
    pub height: u32,
    pub time: i64,
    pub bits: u32,
}

pub fn compact_to_u256(bits: u32) -> Result<U256, CompactError> {
    let size = (bits >> 24) as u32;
    let mut word = bits & 0x007f_ffff;
    let negative = (bits & 0x0080_0000) != 0;

    if negative {
        return Err(CompactError::Negative);
    }

    let value = if size <= 3 {
        let shift = 8 * (3 - size);
        word >>= shift;
        U256::from(word)
    } else {
        let shift = 8 * (size - 3);
        U256::from(word) << shift
    };

    if word != 0 {
        let overflow = size > 34
            || (word > 0xff && size > 33)
            || (word > 0xffff && size > 32);
        if overflow {
            return Err(CompactError::Overflow);
        }
    }

    Ok(value)
}

pub fn u256_to_compact(value: U256) -> u32 {
    if value.is_zero() {
        return 0;
    }

    let mut size = ((value.bits() + 7) / 8) as u32;
    let mut compact: u32;

    if size <= 3 {
        compact = value.low_u32() << (8 * (3 - size));
    } else {
        let shift = 8 * (size - 3);
        compact = (value >> shift).low_u32();
    }

    if (compact & 0x0080_0000) != 0 {
        compact >>= 8;
        size += 1;
    }

    (size << 24) | (compact & 0x007f_ffff)
}

pub fn target_to_compact(target: &Hash256) -> u32 {
    let value = U256::from_little_endian(target);
    u256_to_compact(value)
}

pub fn hash_meets_target(hash: &Hash256, target: &U256) -> bool {
    let hash_value = U256::from_little_endian(hash);
    hash_value <= *target
}

/// Work implied by one compact target: floor(2^256 / (target + 1)).
pub fn header_work(bits: u32) -> Result<U256, CompactError> {
    let target = compact_to_u256(bits)?;
    if target.is_zero() {
        return Ok(U256::zero());
    }
    let one = U256::from(1u64);
    Ok((!target / (target + one)) + one)
}

/// Compact bits required of the block following `chain`, which must be the
/// contiguous suffix of the chain ending at the current top. Retargets on
/// interval boundaries, else carries the previous bits forward.
pub fn next_work_required(
    chain: &[HeaderInfo],
    params: &ConsensusParams,
) -> Result<u32, DifficultyError> {
    let pow_limit_bits = target_to_compact(&params.pow_limit);
    if chain.is_empty() {
        return Ok(pow_limit_bits);
    }

    ensure_contiguous(chain)?;

    let last = chain.last().expect("checked not empty");
    let next_height = last.height + 1;
    let interval = params.retarget_interval;

    if interval == 0 || next_height % interval != 0 {
        return Ok(last.bits);
    }

    // First block of the closing interval; the caller supplies at least a
    // full interval of headers when a boundary is possible.
    let span = (interval as usize).min(chain.len());
    let first = &chain[chain.len() - span];

    let target_timespan = params.retarget_timespan();
    let mut actual_timespan = last.time - first.time;
    if actual_timespan < target_timespan / 4 {
        actual_timespan = target_timespan / 4;
    }
    if actual_timespan > target_timespan * 4 {
        actual_timespan = target_timespan * 4;
    }

    let mut next = compact_to_u256(last.bits)?;
    next /= U256::from(target_timespan as u64);
    next = next.saturating_mul(U256::from(actual_timespan as u64));

    let pow_limit = U256::from_little_endian(&params.pow_limit);
    if next > pow_limit {
        next = pow_limit;
    }

    Ok(u256_to_compact(next))
}

fn ensure_contiguous(chain: &[HeaderInfo]) -> Result<(), DifficultyError> {
    let base = chain[0].height;
    for (idx, header) in chain.iter().enumerate() {
        if header.height != base + idx as u32 {
            return Err(DifficultyError::NonContiguous);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use ember_consensus::{chain_params, Network};

    #[test]
    fn compact_roundtrip() {
        for bits in [0x1d00ffffu32, 0x207fffff, 0x1b0404cb, 0x02123400] {
            let value = compact_to_u256(bits).expect("decode");
            assert_eq!(u256_to_compact(value), bits);
        }
    }

    #[test]
    fn negative_compact_rejected() {
        assert_eq!(compact_to_u256(0x01803456), Err(CompactError::Negative));
    }

    #[test]
    fn oversized_compact_rejected() {
        assert_eq!(compact_to_u256(0x23000001), Err(CompactError::Overflow));
    }

    #[test]
    fn work_grows_as_target_shrinks() {
        let easy = header_work(0x207fffff).expect("easy");
        let hard = header_work(0x1d00ffff).expect("hard");
        assert!(hard > easy);
        assert_eq!(easy, U256::from(2u64));
    }

    #[test]
    fn off_boundary_carries_bits_forward() {
        let params = chain_params(Network::Mainnet).consensus;
        let chain = [HeaderInfo {
            height: 10,
            time: 1_300_000_000,
            bits: 0x1b0404cb,
        }];
        assert_eq!(next_work_required(&chain, &params), Ok(0x1b0404cb));
    }

    #[test]
    fn boundary_retargets_by_timespan() {
        let mut params = chain_params(Network::Mainnet).consensus;
        params.retarget_interval = 4;
        let spacing = params.pow_target_spacing;

        // Blocks arriving at twice the target spacing ease the target.
        let chain: Vec<HeaderInfo> = (0..4)
            .map(|idx| HeaderInfo {
                height: 4 + idx,
                time: 1_300_000_000 + 2 * spacing * idx as i64,
                bits: 0x1c10_0000,
            })
            .collect();
        let next = next_work_required(&chain, &params).expect("retarget");
        let old = compact_to_u256(0x1c10_0000).expect("old");
        let new = compact_to_u256(next).expect("new");
        assert!(new > old);
    }

    #[test]
    fn retarget_never_exceeds_pow_limit() {
        let mut params = chain_params(Network::Regtest).consensus;
        params.retarget_interval = 2;
        let limit_bits = target_to_compact(&params.pow_limit);
        let chain = [
            HeaderInfo {
                height: 0,
                time: 0,
                bits: limit_bits,
            },
            HeaderInfo {
                height: 1,
                time: i64::from(u32::MAX),
                bits: limit_bits,
            },
        ];
        assert_eq!(next_work_required(&chain, &params), Ok(limit_bits));
    }

    #[test]
    fn gap_in_heights_rejected() {
        let params = chain_params(Network::Mainnet).consensus;
        let chain = [
            HeaderInfo {
                height: 1,
                time: 0,
                bits: 0x207fffff,
            },
            HeaderInfo {
                height: 3,
                time: 0,
                bits: 0x207fffff,
            },
        ];
        assert_eq!(
            next_work_required(&chain, &params),
            Err(DifficultyError::NonContiguous)
        );
    }
}
