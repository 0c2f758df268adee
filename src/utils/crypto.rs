use sha2::{Digest, Sha256};

use crate::utils::types::HashPos;

/// Truncated SHA-256 of `input`, reduced into the 2^m identifier space.
/// Node ids hash the `host:port` string, key ids hash the normalized name.
pub fn hash(input: &[u8], m: u32) -> HashPos {
    let digest = Sha256::digest(input);
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix) % (1u64 << m)
}
