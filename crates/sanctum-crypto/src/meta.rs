//! Password verification metadata.
//!
//! Lets a password be checked without ever storing it or the key derived
//! from it: only a random salt and a domain-separated hash of the derived
//! key are persisted. Rewritten whenever the password changes, which the
//! rekey transaction does as part of its `Syncing` stage.

use crate::{
    constants::{DOMAIN_PASSWORD_VERIFICATION, SALT_SIZE},
    derivation::{derive_answer_key, KdfParams},
    errors::Result,
    hashing::{constant_time_compare, verification_hash},
    utils::generate_random_bytes,
};
use serde::{Deserialize, Serialize};

/// Current metadata format version
pub const META_VERSION: u32 = 1;

/// Persisted password-check metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionMeta {
    /// Metadata format version
    pub version: u32,
    /// Argon2id costs the hash was produced with
    pub kdf: KdfParams,
    /// Random salt for the password derivation
    #[serde(with = "crate::encryption::hex_array")]
    pub salt: [u8; SALT_SIZE],
    /// Domain-separated hash of the derived key
    #[serde(with = "crate::encryption::hex_array")]
    pub verification_hash: [u8; 32],
}

impl EncryptionMeta {
    /// Enroll a password: draw a fresh salt and store the verification hash.
    pub fn enroll(password: &str, kdf: &KdfParams) -> Result<Self> {
        let salt: [u8; SALT_SIZE] = generate_random_bytes();
        let key = derive_answer_key(password, &salt, kdf)?;
        Ok(Self {
            version: META_VERSION,
            kdf: *kdf,
            salt,
            verification_hash: verification_hash(DOMAIN_PASSWORD_VERIFICATION, &key),
        })
    }

    /// Check a password candidate in constant time.
    ///
    /// The full derivation cost is paid whether or not the password is
    /// correct; only the final comparison differs, and that comparison is
    /// constant-time.
    pub fn verify(&self, password: &str) -> Result<bool> {
        let key = derive_answer_key(password, &self.salt, &self.kdf)?;
        let candidate = verification_hash(DOMAIN_PASSWORD_VERIFICATION, &key);
        Ok(constant_time_compare(&candidate, &self.verification_hash))
    }
}
