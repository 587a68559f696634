//! BLAKE3 hashing and constant-time comparison.

use subtle::ConstantTimeEq;

/// Compute a BLAKE3 hash of the input data.
pub fn blake3_hash(data: &[u8]) -> [u8; 32] {
    *blake3::hash(data).as_bytes()
}

/// Compute a domain-separated verification hash of a derived key.
///
/// The hash is stored in the vault so an answer can be checked without
/// decrypting anything: derive the candidate key, hash it under the same
/// domain, and compare in constant time. The hash is one-way; it reveals
/// nothing about the key beyond equality.
pub fn verification_hash(domain: &[u8], key: &[u8; 32]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(key);
    *hasher.finalize().as_bytes()
}

/// Compare two byte strings in constant time.
///
/// Returns `false` for length mismatches without leaking where the
/// difference is.
pub fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
