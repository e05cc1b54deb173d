use ember_consensus::Hash256;

use crate::encoding::{DecodeError, Decoder, Encoder};

/// Reference to a transaction output.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct OutPoint {
    pub hash: Hash256,
    pub index: u32,
}

impl OutPoint {
    pub fn null() -> Self {
        Self {
            hash: [0u8; 32],
            index: u32::MAX,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == [0u8; 32] && self.index == u32::MAX
    }

    pub fn encode(&self, encoder: &mut Encoder) {
        encoder.put_hash(&self.hash);
        encoder.put_u32_le(self.index);
    }

    pub fn decode(decoder: &mut Decoder<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            hash: decoder.take_hash()?,
            index: decoder.take_u32_le()?,
        })
    }
}
