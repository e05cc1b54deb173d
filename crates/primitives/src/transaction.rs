//! Transaction type and consensus serialization.

use ember_consensus::Hash256;

use crate::encoding::{varint_size, DecodeError, Decoder, Encoder};
use crate::hash::sha256d;
use crate::outpoint::OutPoint;

// Sigop-counted opcodes (script evaluation itself lives elsewhere).
const OP_CHECKSIG: u8 = 0xac;
const OP_CHECKSIGVERIFY: u8 = 0xad;
const OP_CHECKMULTISIG: u8 = 0xae;
const OP_CHECKMULTISIGVERIFY: u8 = 0xaf;
const MULTISIG_SIGOPS: usize = 20;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Vec<u8>,
    pub sequence: u32,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Vec<u8>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Transaction {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    pub fn consensus_encode(&self) -> Vec<u8> {
        let mut encoder = Encoder::with_capacity(self.serialized_size());
        encoder.put_i32_le(self.version);
        encoder.put_varint(self.vin.len() as u64);
        for input in &self.vin {
            input.prevout.encode(&mut encoder);
            encoder.put_var_bytes(&input.script_sig);
            encoder.put_u32_le(input.sequence);
        }
        encoder.put_varint(self.vout.len() as u64);
        for output in &self.vout {
            encoder.put_i64_le(output.value);
            encoder.put_var_bytes(&output.script_pubkey);
        }
        encoder.put_u32_le(self.lock_time);
        encoder.into_bytes()
    }

    pub fn consensus_decode(data: &[u8]) -> Result<Self, DecodeError> {
        let mut decoder = Decoder::new(data);
        let version = decoder.take_i32_le()?;
        let input_count = decoder.take_varint()?;
        if input_count > decoder.remaining() as u64 {
            return Err(DecodeError::OversizedLength);
        }
        let mut vin = Vec::with_capacity(input_count as usize);
        for _ in 0..input_count {
            vin.push(TxIn {
                prevout: OutPoint::decode(&mut decoder)?,
                script_sig: decoder.take_var_bytes()?,
                sequence: decoder.take_u32_le()?,
            });
        }
        let output_count = decoder.take_varint()?;
        if output_count > decoder.remaining() as u64 {
            return Err(DecodeError::OversizedLength);
        }
        let mut vout = Vec::with_capacity(output_count as usize);
        for _ in 0..output_count {
            vout.push(TxOut {
                value: decoder.take_i64_le()?,
                script_pubkey: decoder.take_var_bytes()?,
            });
        }
        Ok(Self {
            version,
            vin,
            vout,
            lock_time: decoder.take_u32_le()?,
        })
    }

    pub fn txid(&self) -> Hash256 {
        sha256d(&self.consensus_encode())
    }

    pub fn serialized_size(&self) -> usize {
        let mut size = 4 + 4;
        size += varint_size(self.vin.len() as u64);
        for input in &self.vin {
            size += 36 + varint_size(input.script_sig.len() as u64) + input.script_sig.len() + 4;
        }
        size += varint_size(self.vout.len() as u64);
        for output in &self.vout {
            size += 8 + varint_size(output.script_pubkey.len() as u64) + output.script_pubkey.len();
        }
        size
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    /// Count of signature check operations across all scripts.
    pub fn signature_operations(&self) -> usize {
        self.vin
            .iter()
            .map(|input| script_sigops(&input.script_sig))
            .chain(self.vout.iter().map(|output| script_sigops(&output.script_pubkey)))
            .sum()
    }
}

fn script_sigops(script: &[u8]) -> usize {
    let mut count = 0;
    let mut index = 0;
    while index < script.len() {
        let opcode = script[index];
        match opcode {
            // Push data opcodes carry their payload inline; skip it.
            0x01..=0x4b => index += opcode as usize,
            0x4c => {
                index += 1 + script.get(index + 1).copied().unwrap_or(0) as usize;
            }
            0x4d => {
                let length = match (script.get(index + 1), script.get(index + 2)) {
                    (Some(low), Some(high)) => u16::from_le_bytes([*low, *high]) as usize,
                    _ => 0,
                };
                index += 2 + length;
            }
            0x4e => {
                let length = match script.get(index + 1..index + 5) {
                    Some(bytes) => {
                        u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
                    }
                    None => 0,
                };
                index += 4 + length;
            }
            OP_CHECKSIG | OP_CHECKSIGVERIFY => count += 1,
            OP_CHECKMULTISIG | OP_CHECKMULTISIGVERIFY => count += MULTISIG_SIGOPS,
            _ => {}
        }
        index += 1;
    }
    count
}
