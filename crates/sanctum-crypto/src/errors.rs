//! Error types for cryptographic operations.

use thiserror::Error;

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, CryptoError>;

/// Errors produced by the cryptographic primitives.
///
/// `AuthenticationFailed` is deliberately opaque: a wrong key and tampered
/// storage both surface as the same variant, so callers cannot be turned
/// into a distinguishing oracle.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The system random source failed
    #[error("random generation failed: {0}")]
    RandomGenerationFailed(String),

    /// Argon2id rejected the configured cost parameters
    #[error("invalid key derivation parameters: {0}")]
    InvalidKdfParams(String),

    /// Key derivation failed for an operational reason (never wrong input)
    #[error("key derivation failed: {0}")]
    KeyDerivationFailed(String),

    /// Encryption failed
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Authenticated decryption failed: wrong key or tampered data
    #[error("authentication failed")]
    AuthenticationFailed,

    /// A byte string had an unexpected length
    #[error("invalid length: expected {expected} bytes, got {actual}")]
    InvalidLength {
        /// Expected number of bytes
        expected: usize,
        /// Actual number of bytes
        actual: usize,
    },

    /// The word sequence is not a valid mnemonic
    #[error("invalid mnemonic: {0}")]
    InvalidMnemonic(String),

    /// HKDF expansion failed
    #[error("HKDF expansion failed")]
    HkdfError,
}
