//! Error types for recovery and re-keying.
//!
//! Propagation policy: cryptographically ambiguous outcomes (wrong answer,
//! insufficient shares) are **not** errors: they are the `Ok(None)`
//! outcome of recovery, so control flow never leaks how close an attempt
//! came. Operational errors (rate limiting, usage mistakes, corruption)
//! are reported precisely.

use crate::rekey::RekeyState;
use sanctum_crypto::CryptoError;
use thiserror::Error;

/// Result alias for this crate
pub type Result<T> = std::result::Result<T, RecoveryError>;

/// Errors from the storage collaborators.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store failed
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A persisted record could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Errors produced by vault construction, recovery, and re-keying.
#[derive(Debug, Error)]
pub enum RecoveryError {
    /// The caller omitted the keystone question (usage error, checked
    /// before any cryptographic work)
    #[error("the keystone question must be among the supplied answers")]
    KeystoneMissing,

    /// Too few answers were supplied to ever reach the threshold
    #[error("at least {required} answers are required, got {provided}")]
    TooFewAnswers {
        /// Minimum number of answers
        required: usize,
        /// Number actually supplied
        provided: usize,
    },

    /// The same question was answered more than once
    #[error("duplicate answer for question '{0}'")]
    DuplicateQuestion(String),

    /// An answer referenced a question the vault does not contain
    #[error("question '{0}' is not part of this vault")]
    UnknownQuestion(String),

    /// Too many verification attempts for this identity in the window
    #[error("rate limit exceeded; retry in {retry_after_seconds}s")]
    RateLimitExceeded {
        /// Seconds until the oldest attempt leaves the window
        retry_after_seconds: u64,
    },

    /// A chunk failed authentication even though its answer verified;
    /// the stored vault is corrupted, not the caller's input
    #[error("recovery vault is corrupted: {0}")]
    StorageCorrupted(String),

    /// Two decrypted chunks disagree about a word they both cover
    #[error("tamper detected: overlapping chunks disagree at word {word_index}")]
    TamperDetected {
        /// Index of the disputed word
        word_index: usize,
    },

    /// A word index was left uncovered by every decrypted chunk
    #[error("incomplete reconstruction: no chunk covers word {word_index}")]
    IncompleteCoverage {
        /// Index of the uncovered word
        word_index: usize,
    },

    /// The vault failed structural validation
    #[error("invalid vault: {0}")]
    InvalidVault(String),

    /// The question set cannot produce a valid chunk plan
    #[error("invalid chunk plan: {0}")]
    InvalidPlan(String),

    /// Recovery ran but did not produce a secret; a full recovery cannot
    /// continue without one
    #[error("recovery did not produce a secret")]
    SecretUnavailable,

    /// Another re-key for the same identity holds the advisory lease
    #[error("a re-key for '{identity}' is already in progress")]
    LeaseHeld {
        /// The contended identity
        identity: String,
    },

    /// The re-key transaction failed
    #[error("re-key failed during {state}: {detail}")]
    RekeyFailed {
        /// The state in which the failure occurred
        state: RekeyState,
        /// What went wrong
        detail: String,
    },

    /// A storage collaborator failed
    #[error(transparent)]
    Storage(#[from] StoreError),

    /// A cryptographic primitive failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}
