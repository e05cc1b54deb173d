//! Proof-of-work hash selection.
//!
//! The header identity hash is always double-SHA256; chains configured with
//! the scrypt selector prove work over scrypt(1024, 1, 1) of the same
//! 80-byte encoding instead.

use ember_consensus::Hash256;
use scrypt::{scrypt, Params};
use sha2::{Digest, Sha256};

/// Hash the serialized header with the configured proof function.
pub fn proof_of_work_hash(encoded_header: &[u8], use_scrypt: bool) -> Hash256 {
    if use_scrypt {
        scrypt_hash(encoded_header)
    } else {
        sha256d_hash(encoded_header)
    }
}

fn sha256d_hash(data: &[u8]) -> Hash256 {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

fn scrypt_hash(data: &[u8]) -> Hash256 {
    let mut out = [0u8; 32];
    // N=1024, r=1, p=1 with the header as both password and salt.
    let params = Params::new(10, 1, 1, 32).expect("static scrypt parameters");
    scrypt(data, data, &params, &mut out).expect("output length is fixed");
    out
}
