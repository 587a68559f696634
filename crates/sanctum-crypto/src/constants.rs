//! Cryptographic constants and domain separation strings.
//!
//! All constants are normative for vault compatibility and MUST NOT be
//! changed without bumping [`VAULT_VERSION`].

/// Size of XChaCha20-Poly1305 nonces in bytes (192 bits)
pub const NONCE_SIZE: usize = 24;

/// Size of XChaCha20-Poly1305 authentication tags in bytes (128 bits)
pub const TAG_SIZE: usize = 16;

/// Size of Argon2id salts in bytes
pub const SALT_SIZE: usize = 32;

/// Size of derived symmetric keys in bytes (256 bits)
pub const KEY_SIZE: usize = 32;

/// Size of the recovery secret's raw entropy in bytes
pub const SECRET_ENTROPY_SIZE: usize = 32;

/// Number of mnemonic words in a recovery secret
pub const SECRET_WORD_COUNT: usize = 24;

/// Number of security questions in a recovery vault
pub const QUESTION_COUNT: usize = 5;

/// Share weight carried by the keystone question
pub const KEYSTONE_WEIGHT: u32 = 3;

/// Share weight carried by each non-keystone question
pub const MEMBER_WEIGHT: u32 = 1;

/// Total share weight across all questions (keystone 3 + four at 1)
pub const TOTAL_SHARE_WEIGHT: u32 = 7;

/// Minimum accumulated share weight required to reconstruct the secret
pub const RECOVERY_THRESHOLD: u32 = 5;

/// Current recovery vault format version
pub const VAULT_VERSION: u32 = 2;

/// Algorithm identifier persisted in every vault
pub const VAULT_ALGORITHM: &str = "argon2id-xchacha20poly1305-v1";

/// Verification attempt window in seconds (1 hour sliding)
pub const ATTEMPT_WINDOW_SECONDS: u64 = 3600;

/// Maximum verification attempts per identity inside the window
pub const MAX_ATTEMPTS_PER_WINDOW: u32 = 10;

/// Lower bound of the randomized verification response delay, milliseconds
pub const VERIFY_DELAY_MIN_MS: u64 = 50;

/// Upper bound of the randomized verification response delay, milliseconds
pub const VERIFY_DELAY_MAX_MS: u64 = 150;

// =============================================================================
// Domain Separation Strings
//
// Every key derivation, AAD, and verification hash carries its own domain so
// material derived for one purpose can never authenticate for another.
// =============================================================================

/// Domain separation for chunk encryption AAD
pub const DOMAIN_CHUNK_ENCRYPTION: &[u8] = b"sanctum:recovery:chunk:v1";

/// Domain separation for answer verification hashes
pub const DOMAIN_ANSWER_VERIFICATION: &[u8] = b"sanctum:recovery:verify:v1";

/// Domain separation for decoy salt derivation
pub const DOMAIN_DECOY_DERIVATION: &[u8] = b"sanctum:recovery:decoy:v1";

/// Domain separation for record master key derivation from the secret
pub const DOMAIN_RECORD_KEY: &[u8] = b"sanctum:record-key:v1";

/// Domain separation for stored record encryption AAD
pub const DOMAIN_RECORD_ENCRYPTION: &[u8] = b"sanctum:record:v1";

/// Domain separation for password verification hashes
pub const DOMAIN_PASSWORD_VERIFICATION: &[u8] = b"sanctum:password-verify:v1";

/// Argon2id parameters for answer and password hashing
pub mod argon2_params {
    /// Memory cost: 64 MiB
    pub const MEMORY_COST: u32 = 64 * 1024;

    /// Time cost: 3 iterations
    pub const TIME_COST: u32 = 3;

    /// Parallelism: 1 lane
    pub const PARALLELISM: u32 = 1;

    /// Output length: 32 bytes
    pub const OUTPUT_LENGTH: usize = 32;

    /// Hard floor below which derivation is refused
    pub const MIN_MEMORY_COST: u32 = 1024;

    /// Hard floor below which derivation is refused
    pub const MIN_TIME_COST: u32 = 1;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_correct_sizes() {
        assert_eq!(NONCE_SIZE, 24);
        assert_eq!(TAG_SIZE, 16);
        assert_eq!(SALT_SIZE, 32);
        assert_eq!(KEY_SIZE, 32);
        assert_eq!(SECRET_ENTROPY_SIZE * 3 / 4, SECRET_WORD_COUNT);
    }

    #[test]
    fn test_share_arithmetic_matches_scheme() {
        // keystone + four members account for the full distribution
        assert_eq!(
            KEYSTONE_WEIGHT + (QUESTION_COUNT as u32 - 1) * MEMBER_WEIGHT,
            TOTAL_SHARE_WEIGHT
        );
        // all non-keystone questions together stay below the threshold
        assert!((QUESTION_COUNT as u32 - 1) * MEMBER_WEIGHT < RECOVERY_THRESHOLD);
        // keystone plus any two members meets it exactly
        assert_eq!(KEYSTONE_WEIGHT + 2 * MEMBER_WEIGHT, RECOVERY_THRESHOLD);
    }

    #[test]
    fn test_domain_strings_are_versioned() {
        let domains = [
            DOMAIN_CHUNK_ENCRYPTION,
            DOMAIN_ANSWER_VERIFICATION,
            DOMAIN_DECOY_DERIVATION,
            DOMAIN_RECORD_KEY,
            DOMAIN_RECORD_ENCRYPTION,
            DOMAIN_PASSWORD_VERIFICATION,
        ];
        for d in domains {
            assert!(d.starts_with(b"sanctum:"));
            assert!(d.ends_with(b":v1"));
        }
    }
}
