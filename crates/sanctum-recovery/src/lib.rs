//! # sanctum-recovery
//!
//! Zero-knowledge recovery and re-keying: a high-entropy 24-word secret is
//! split across answers to five personal security questions using a
//! weighted-threshold scheme (keystone question weight 3, others weight 1,
//! threshold 5 of 7), each chunk authenticated-encrypted under a key
//! derived from its answer. Verification is side-channel hardened with
//! constant-time comparison, mandatory decoy derivation, randomized
//! response delay, and per-identity rate limiting. The re-key transaction
//! migrates every stored record and the vault from an old secret to a new
//! one through an explicit state machine with write-ahead staging.
//!
//! # Security Model
//!
//! - The secret is never persisted whole; only overlapping encrypted word
//!   ranges are stored, one per question
//! - No subset of answers without the keystone can reconstruct it; the
//!   keystone plus any two others can
//! - Wrong answers, insufficient shares, and tampered chunks are kept
//!   externally indistinguishable wherever the distinction would act as an
//!   oracle

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod errors;
pub mod guard;
pub mod plan;
pub mod reconstruct;
pub mod rekey;
pub mod store;
pub mod vault;

pub use errors::{RecoveryError, Result, StoreError};
pub use guard::{AttemptLimiter, GuardConfig, SideChannelGuard};
pub use plan::{Answer, ChunkPlan, ChunkSpan, PlanEntry, SecurityQuestion};
pub use reconstruct::{RecoveryReconstructor, MIN_ANSWERS};
pub use rekey::{
    open_record, seal_record, FullRecoveryOutcome, RekeyOrchestrator, RekeyOutcome, RekeyState,
    META_RECORD_KEY,
};
pub use store::{
    MemoryRecordStore, MemoryVaultStore, RecordStore, RekeyLease, VaultStore, LEASE_TTL_SECONDS,
};
pub use vault::{setup_recovery, Bytes32, RecoveryVault, VaultBuilder};

// Re-export the primitives callers need alongside the flows.
pub use sanctum_crypto::{
    EncryptedChunk, EncryptionMeta, KdfParams, RecoverySecret, SECRET_WORD_COUNT,
};

/// Generate a fresh recovery secret (24 mnemonic words).
pub fn generate_secret() -> Result<RecoverySecret> {
    Ok(RecoverySecret::generate()?)
}
