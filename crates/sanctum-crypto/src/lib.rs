//! # sanctum-crypto
//!
//! Cryptographic primitives for the Sanctum recovery and re-keying
//! subsystem: Argon2id key derivation from low-entropy answers and
//! passwords, XChaCha20-Poly1305 authenticated chunk encryption, BLAKE3
//! verification hashing with constant-time comparison, and the 24-word
//! mnemonic codec for the recovery secret.
//!
//! Higher-level flows (chunk planning, vault construction, reconstruction,
//! re-keying) live in `sanctum-recovery`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod constants;
pub mod derivation;
pub mod encryption;
pub mod errors;
pub mod hashing;
pub mod meta;
pub mod mnemonic;
pub mod utils;

pub use constants::*;
pub use derivation::{derive_answer_key, derive_record_key, normalize_answer, KdfParams};
pub use encryption::{decrypt_chunk, encrypt_chunk, EncryptedChunk};
pub use errors::CryptoError;
pub use hashing::{blake3_hash, constant_time_compare, verification_hash};
pub use meta::EncryptionMeta;
pub use mnemonic::RecoverySecret;
pub use utils::{current_timestamp, generate_random_bytes};
