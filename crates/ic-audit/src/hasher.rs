// hasher.rs — SHA-256 hashing utilities.
//
// All hashes in IronCurtain are SHA-256, hex-encoded: the audit chain, the
// compiled policy's constitution hash, and the container image input hash
// all use the same 64-character lowercase form.

use sha2::{Digest, Sha256};

/// Hash arbitrary bytes, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Hash a UTF-8 string, returning a lowercase hex-encoded SHA-256 string.
pub fn hash_str(s: &str) -> String {
    hash_bytes(s.as_bytes())
}
