// src/utils/crypto.rs
//! Hashing helpers.
//!
//! Every content identifier and verifier secret digest in the system is SHA-256, rendered as
//! lowercase hex when it leaves process memory.

use ethers_core::utils::hex;
use ring::digest::{digest, SHA256};

/// Length in bytes of a SHA-256 digest.
pub const DIGEST_LEN: usize = 32;

/// Computes the SHA-256 digest of `data`.
pub fn hash_data(data: &[u8]) -> [u8; DIGEST_LEN] {
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// SHA-256 of `data` as a 64 character lowercase hex string.
pub fn hash_hex(data: &[u8]) -> String {
    hex::encode(hash_data(data))
}

/// Returns true when `value` looks like a hex-encoded SHA-256 digest.
pub fn is_digest_hex(value: &str) -> bool {
    value.len() == DIGEST_LEN * 2 && value.bytes().all(|b| b.is_ascii_hexdigit())
}
