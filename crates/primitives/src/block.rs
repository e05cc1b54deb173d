//! Block header type.

use ember_consensus::constants::HEADER_SIZE;
use ember_consensus::Hash256;

use crate::encoding::{DecodeError, Decoder, Encoder};
use crate::hash::sha256d;

/// An immutable block header. Identity is the double-SHA256 of the
/// 80-byte consensus encoding; the header is never mutated once shared.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(HEADER_SIZE);
        encoder.put_i32_le(self.version);
        encoder.put_hash(&self.prev_block);
        encoder.put_hash(&self.merkle_root);
        encoder.put_u32_le(self.time);
        encoder.put_u32_le(self.bits);
        encoder.put_u32_le(self.nonce);
        encoder.into_bytes()
    }

    pub fn consensus_decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(data);
        let header = Self::decode(&mut decoder)?;
        Ok(header)
    }

    pub fn decode(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            version: decoder.take_i32_le()?,
            prev_block: decoder.take_hash()?,
            merkle_root: decoder.take_hash()?,
            time: decoder.take_u32_le()?,
            bits: decoder.take_u32_le()?,
            nonce: decoder.take_u32_le()?,
        })
    }

    pub fn hash(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }
}
