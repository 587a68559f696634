//! The re-keying transaction: migrate every locally stored encrypted
//! record and the recovery vault from an old secret to a new one.
//!
//! The flow is an explicit state machine with a pure transition function,
//! so every failure point can be matched exhaustively. Writes are staged
//! under shadow keys and only promoted over the live records after the new
//! vault and password metadata are durably persisted; any failure before
//! promotion rolls the staging back and leaves user data untouched.
//!
//! This is the only component permitted to hold the old and new record
//! keys simultaneously. Both are `Zeroizing` and dropped on every exit
//! path, success or failure.

use crate::{
    errors::{RecoveryError, Result, StoreError},
    plan::{Answer, SecurityQuestion},
    reconstruct::RecoveryReconstructor,
    store::{RecordStore, RekeyLease, VaultStore, LEASE_TTL_SECONDS},
    vault::{RecoveryVault, VaultBuilder},
};
use sanctum_crypto::{
    current_timestamp, decrypt_chunk, derive_record_key, encrypt_chunk, CryptoError,
    EncryptedChunk, EncryptionMeta, KdfParams, RecoverySecret, DOMAIN_RECORD_ENCRYPTION,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use zeroize::Zeroizing;

/// Reserved record key holding the password [`EncryptionMeta`].
pub const META_RECORD_KEY: &str = "sanctum.meta";

/// Prefix under which re-encrypted records are staged before promotion.
const SHADOW_PREFIX: &str = "rekey.shadow.";

/// Reserved record key for the commit marker written before promotion.
const COMMIT_MARKER_KEY: &str = "rekey.commit";

/// States of the re-key transaction, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RekeyState {
    /// Transaction accepted, lease not yet acquired
    Starting,
    /// Deriving the old record key from the old secret
    DerivingOldKey,
    /// Decrypting every stored record into memory
    DecryptingData,
    /// Generating the new secret and deriving the new key
    DerivingNewKey,
    /// Re-encrypting records under shadow keys
    EncryptingData,
    /// Building the new recovery vault
    GeneratingRecovery,
    /// Persisting metadata and vault, then promoting shadows
    Syncing,
    /// Transaction finished; the new secret must be surfaced exactly once
    Complete,
    /// Transaction failed; reachable from any state
    Failed,
}

impl RekeyState {
    /// The next state in the linear progression, or `None` from the
    /// terminal states.
    pub fn next(self) -> Option<Self> {
        match self {
            Self::Starting => Some(Self::DerivingOldKey),
            Self::DerivingOldKey => Some(Self::DecryptingData),
            Self::DecryptingData => Some(Self::DerivingNewKey),
            Self::DerivingNewKey => Some(Self::EncryptingData),
            Self::EncryptingData => Some(Self::GeneratingRecovery),
            Self::GeneratingRecovery => Some(Self::Syncing),
            Self::Syncing => Some(Self::Complete),
            Self::Complete | Self::Failed => None,
        }
    }

    /// Progress through the transaction as a percentage.
    pub fn progress_percent(self) -> u8 {
        match self {
            Self::Starting => 0,
            Self::DerivingOldKey => 10,
            Self::DecryptingData => 25,
            Self::DerivingNewKey => 40,
            Self::EncryptingData => 60,
            Self::GeneratingRecovery => 75,
            Self::Syncing => 90,
            Self::Complete | Self::Failed => 100,
        }
    }

    /// Stable snake_case name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::DerivingOldKey => "deriving_old_key",
            Self::DecryptingData => "decrypting_data",
            Self::DerivingNewKey => "deriving_new_key",
            Self::EncryptingData => "encrypting_data",
            Self::GeneratingRecovery => "generating_recovery",
            Self::Syncing => "syncing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for RekeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker written immediately before shadow promotion. If it is found on
/// disk outside a running transaction, a previous run crashed mid-promote
/// and the staged blobs are the repair material.
#[derive(Debug, Serialize, Deserialize)]
struct CommitMarker {
    record_keys: Vec<String>,
    created_at: u64,
}

/// Result of a completed re-key.
pub struct RekeyOutcome {
    /// The freshly generated secret; surface it to the user exactly once
    pub new_secret: RecoverySecret,
    /// The vault protecting the new secret
    pub new_vault: RecoveryVault,
    /// Wall-clock duration of the transaction in milliseconds
    pub duration_ms: u64,
}

/// Result of a completed recovery-then-rekey.
pub struct FullRecoveryOutcome {
    /// The old secret, reconstructed from security-question answers
    pub recovered_secret: RecoverySecret,
    /// The freshly generated secret
    pub new_secret: RecoverySecret,
    /// The vault protecting the new secret
    pub new_vault: RecoveryVault,
}

/// AAD binding a stored record to its key.
fn record_aad(record_key: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(DOMAIN_RECORD_ENCRYPTION.len() + record_key.len());
    aad.extend_from_slice(DOMAIN_RECORD_ENCRYPTION);
    aad.extend_from_slice(record_key.as_bytes());
    aad
}

/// Encrypt a record for storage under `record_key`.
///
/// This is the canonical record wire format (serialized
/// [`EncryptedChunk`] with the record key bound via AAD); everything the
/// re-key transaction migrates must have been written through it.
pub fn seal_record(key: &[u8; 32], record_key: &str, plaintext: &[u8]) -> Result<Vec<u8>> {
    let chunk = encrypt_chunk(key, plaintext, &record_aad(record_key))?;
    serde_json::to_vec(&chunk)
        .map_err(|e| StoreError::Serialization(e.to_string()).into())
}

/// Decrypt a stored record blob written by [`seal_record`].
pub fn open_record(
    key: &[u8; 32],
    record_key: &str,
    blob: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let chunk: EncryptedChunk = serde_json::from_slice(blob)
        .map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(decrypt_chunk(key, &chunk, &record_aad(record_key))?)
}

fn shadow_key(record_key: &str) -> String {
    format!("{SHADOW_PREFIX}{record_key}")
}

fn is_reserved_key(key: &str) -> bool {
    key == META_RECORD_KEY || key == COMMIT_MARKER_KEY || key.starts_with(SHADOW_PREFIX)
}

fn rekey_failed(state: RekeyState, detail: impl std::fmt::Display) -> RecoveryError {
    RecoveryError::RekeyFailed {
        state,
        detail: detail.to_string(),
    }
}

/// Advance to the next state and report it.
fn advance<F: FnMut(RekeyState, u8)>(state: &mut RekeyState, on_status: &mut F) {
    *state = state.next().expect("linear stage progression");
    on_status(*state, state.progress_percent());
}

/// Drives the re-key transaction for one identity.
pub struct RekeyOrchestrator<R: RecordStore, V: VaultStore> {
    records: Arc<R>,
    vaults: Arc<V>,
    identity: String,
    kdf: KdfParams,
}

impl<R: RecordStore, V: VaultStore> RekeyOrchestrator<R, V> {
    /// Create an orchestrator over the two stores.
    pub fn new(
        records: Arc<R>,
        vaults: Arc<V>,
        identity: impl Into<String>,
        kdf: KdfParams,
    ) -> Self {
        Self {
            records,
            vaults,
            identity: identity.into(),
            kdf,
        }
    }

    /// Run the full re-key transaction.
    ///
    /// `on_status` is invoked on every state transition with the state and
    /// its progress percentage. On success the returned secret must be
    /// surfaced to the user exactly once; on failure no live record has
    /// been modified (see the module docs for the promotion caveat, which
    /// is reported explicitly when it applies).
    pub async fn perform_rekey<F>(
        &self,
        old_secret: &RecoverySecret,
        new_password: &str,
        new_questions: &[SecurityQuestion],
        new_answers: &[Answer],
        mut on_status: F,
    ) -> Result<RekeyOutcome>
    where
        F: FnMut(RekeyState, u8),
    {
        let started = Instant::now();
        on_status(RekeyState::Starting, RekeyState::Starting.progress_percent());

        // Serialize concurrent attempts per identity before touching data.
        let lease = match self.acquire_lease().await {
            Ok(lease) => lease,
            Err(e) => {
                on_status(RekeyState::Failed, RekeyState::Failed.progress_percent());
                return Err(e);
            }
        };
        let result = self
            .run_stages(
                old_secret,
                new_password,
                new_questions,
                new_answers,
                &mut on_status,
            )
            .await;
        self.release_lease(&lease).await;

        match result {
            Ok((new_secret, new_vault)) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                on_status(RekeyState::Complete, RekeyState::Complete.progress_percent());
                tracing::info!(
                    identity = %self.identity,
                    duration_ms,
                    "Re-key transaction complete"
                );
                Ok(RekeyOutcome {
                    new_secret,
                    new_vault,
                    duration_ms,
                })
            }
            Err(e) => {
                on_status(RekeyState::Failed, RekeyState::Failed.progress_percent());
                tracing::warn!(identity = %self.identity, error = %e, "Re-key transaction failed");
                Err(e)
            }
        }
    }

    /// Recover the old secret from security-question answers, then re-key.
    pub async fn perform_full_recovery<F>(
        &self,
        reconstructor: &RecoveryReconstructor,
        answers: &[Answer],
        new_password: &str,
        new_questions: &[SecurityQuestion],
        new_answers: &[Answer],
        on_status: F,
    ) -> Result<FullRecoveryOutcome>
    where
        F: FnMut(RekeyState, u8),
    {
        let vault = self
            .vaults
            .load(&self.identity)
            .await?
            .ok_or_else(|| {
                RecoveryError::InvalidVault(format!("no vault stored for '{}'", self.identity))
            })?;

        let recovered = reconstructor
            .recover_secret(answers, &vault, &self.identity)
            .await?
            .ok_or(RecoveryError::SecretUnavailable)?;

        let outcome = self
            .perform_rekey(&recovered, new_password, new_questions, new_answers, on_status)
            .await?;

        Ok(FullRecoveryOutcome {
            recovered_secret: recovered,
            new_secret: outcome.new_secret,
            new_vault: outcome.new_vault,
        })
    }

    async fn acquire_lease(&self) -> Result<RekeyLease> {
        self.vaults
            .acquire_lease(&self.identity, LEASE_TTL_SECONDS)
            .await?
            .ok_or_else(|| RecoveryError::LeaseHeld {
                identity: self.identity.clone(),
            })
    }

    async fn release_lease(&self, lease: &RekeyLease) {
        if let Err(e) = self.vaults.release_lease(&self.identity, lease).await {
            tracing::warn!(
                identity = %self.identity,
                error = %e,
                "Failed to release re-key lease"
            );
        }
    }

    async fn run_stages<F>(
        &self,
        old_secret: &RecoverySecret,
        new_password: &str,
        new_questions: &[SecurityQuestion],
        new_answers: &[Answer],
        on_status: &mut F,
    ) -> Result<(RecoverySecret, RecoveryVault)>
    where
        F: FnMut(RekeyState, u8),
    {
        let mut state = RekeyState::Starting;

        // DerivingOldKey
        advance(&mut state, on_status);
        let old_key = derive_record_key(old_secret.entropy())?;

        // DecryptingData
        // Everything is read and decrypted before a single write happens,
        // so any failure here leaves the store untouched.
        advance(&mut state, on_status);
        let record_keys = self.enumerate_records(state).await?;
        let mut plaintexts: Vec<(String, Zeroizing<Vec<u8>>)> =
            Vec::with_capacity(record_keys.len());
        for key in &record_keys {
            let blob = self.records.get(key).await?.ok_or_else(|| {
                rekey_failed(state, format!("record '{key}' was enumerated but is missing"))
            })?;
            let plaintext = open_record(&old_key, key, &blob).map_err(|e| match e {
                RecoveryError::Crypto(CryptoError::AuthenticationFailed) => rekey_failed(
                    state,
                    format!("record '{key}' failed authentication under the old key"),
                ),
                RecoveryError::Storage(StoreError::Serialization(detail)) => {
                    rekey_failed(state, format!("record '{key}' is not parseable: {detail}"))
                }
                other => other,
            })?;
            plaintexts.push((key.clone(), plaintext));
        }
        tracing::info!(
            identity = %self.identity,
            records = plaintexts.len(),
            "Decrypted all records under the old key"
        );

        // DerivingNewKey
        advance(&mut state, on_status);
        let new_secret = RecoverySecret::generate()?;
        if new_secret == *old_secret {
            return Err(rekey_failed(state, "random source produced an unchanged secret"));
        }
        let new_key = derive_record_key(new_secret.entropy())?;
        let meta = EncryptionMeta::enroll(new_password, &self.kdf)?;

        // EncryptingData
        advance(&mut state, on_status);
        let mut staged: Vec<String> = Vec::with_capacity(plaintexts.len());
        if let Err(e) = self.stage_shadows(&plaintexts, &new_key, &mut staged).await {
            self.rollback_shadows(&staged).await;
            return Err(rekey_failed(state, e));
        }

        // GeneratingRecovery
        // The new secret and vault are unrelated to the old ones; they are
        // only ever persisted together.
        advance(&mut state, on_status);
        let new_vault = match VaultBuilder::new(new_questions, self.kdf)
            .and_then(|builder| builder.build(&new_secret, new_answers))
        {
            Ok(vault) => vault,
            Err(e) => {
                self.rollback_shadows(&staged).await;
                return Err(rekey_failed(state, e));
            }
        };

        // Syncing
        advance(&mut state, on_status);
        if let Err(e) = self.sync_precommit(&meta, &new_vault, &record_keys).await {
            self.rollback_shadows(&staged).await;
            if let Err(remove_err) = self.records.remove(COMMIT_MARKER_KEY).await {
                tracing::warn!(error = %remove_err, "Failed to remove commit marker during rollback");
            }
            return Err(rekey_failed(state, e));
        }
        if let Err(e) = self.promote_shadows(&record_keys).await {
            // Past the commit point: staged blobs and the marker stay on
            // disk as repair material. Promotion is idempotent and can be
            // resumed from them.
            tracing::error!(
                identity = %self.identity,
                error = %e,
                "Shadow promotion interrupted; staging and commit marker left for repair"
            );
            return Err(rekey_failed(
                state,
                format!("shadow promotion interrupted: {e}"),
            ));
        }

        Ok((new_secret, new_vault))
    }

    /// Enumerate user records, discarding stale staging left by a crashed
    /// earlier run.
    async fn enumerate_records(&self, state: RekeyState) -> Result<Vec<String>> {
        let all_keys = self.records.keys().await?;

        for key in all_keys.iter().filter(|k| {
            k.starts_with(SHADOW_PREFIX) || k.as_str() == COMMIT_MARKER_KEY
        }) {
            tracing::warn!(key = %key, "Removing stale re-key staging record");
            self.records
                .remove(key)
                .await
                .map_err(|e| rekey_failed(state, e))?;
        }

        Ok(all_keys
            .into_iter()
            .filter(|k| !is_reserved_key(k))
            .collect())
    }

    async fn stage_shadows(
        &self,
        plaintexts: &[(String, Zeroizing<Vec<u8>>)],
        new_key: &[u8; 32],
        staged: &mut Vec<String>,
    ) -> Result<()> {
        for (key, plaintext) in plaintexts {
            let blob = seal_record(new_key, key, plaintext)?;
            let shadow = shadow_key(key);
            self.records.set(&shadow, blob).await?;
            staged.push(shadow);
        }
        Ok(())
    }

    async fn rollback_shadows(&self, staged: &[String]) {
        for shadow in staged {
            if let Err(e) = self.records.remove(shadow).await {
                tracing::warn!(
                    key = %shadow,
                    error = %e,
                    "Failed to remove shadow record during rollback"
                );
            }
        }
    }

    /// Persist everything that must be durable before the pointer flip:
    /// password metadata, the new vault, and the commit marker.
    async fn sync_precommit(
        &self,
        meta: &EncryptionMeta,
        new_vault: &RecoveryVault,
        record_keys: &[String],
    ) -> Result<()> {
        let meta_blob =
            serde_json::to_vec(meta).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.records.set(META_RECORD_KEY, meta_blob).await?;

        self.vaults.store(&self.identity, new_vault).await?;

        let marker = CommitMarker {
            record_keys: record_keys.to_vec(),
            created_at: current_timestamp(),
        };
        let marker_blob =
            serde_json::to_vec(&marker).map_err(|e| StoreError::Serialization(e.to_string()))?;
        self.records.set(COMMIT_MARKER_KEY, marker_blob).await?;
        Ok(())
    }

    /// The pointer flip: move every staged blob over its live record.
    async fn promote_shadows(&self, record_keys: &[String]) -> Result<()> {
        for key in record_keys {
            let shadow = shadow_key(key);
            let blob = self.records.get(&shadow).await?.ok_or_else(|| {
                StoreError::Backend(format!("shadow record '{shadow}' vanished before promotion"))
            })?;
            self.records.set(key, blob).await?;
            self.records.remove(&shadow).await?;
        }
        self.records.remove(COMMIT_MARKER_KEY).await?;
        Ok(())
    }
}
