//! The persisted recovery vault and its builder.
//!
//! A vault holds, per question: an Argon2id salt, a verification hash of
//! the derived key, and an encrypted chunk of the secret's word sequence.
//! It is immutable once persisted; the only way to replace it is the
//! rekey transaction, which replaces the vault and its secret together.

use crate::{
    errors::{RecoveryError, Result},
    plan::{Answer, ChunkPlan, ChunkSpan, SecurityQuestion},
};
use sanctum_crypto::{
    derive_answer_key, encrypt_chunk, encryption::hex_array, generate_random_bytes,
    verification_hash, EncryptedChunk, KdfParams, RecoverySecret, DOMAIN_ANSWER_VERIFICATION,
    DOMAIN_CHUNK_ENCRYPTION, QUESTION_COUNT, RECOVERY_THRESHOLD, SALT_SIZE, TOTAL_SHARE_WEIGHT,
    VAULT_ALGORITHM, VAULT_VERSION,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A 32-byte value persisted as a hex string (salts, verification hashes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bytes32(#[serde(with = "hex_array")] pub [u8; 32]);

/// The persisted recovery vault.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryVault {
    /// Vault format version
    pub version: u32,
    /// Algorithm identifier (KDF + AEAD)
    pub algorithm: String,
    /// Argon2id costs every salt in this vault was used with
    pub kdf: KdfParams,
    /// Minimum accumulated share weight for reconstruction
    pub threshold: u32,
    /// Share weight per question id
    pub share_distribution: BTreeMap<String, u32>,
    /// Word span per question id
    pub spans: BTreeMap<String, ChunkSpan>,
    /// Encrypted word-range chunk per question id
    pub chunks: BTreeMap<String, EncryptedChunk>,
    /// Answer-derivation salt per question id
    pub salts: BTreeMap<String, Bytes32>,
    /// Verification hash of the derived key per question id
    pub verification_hashes: BTreeMap<String, Bytes32>,
    /// Unix timestamp of creation
    pub created_at: u64,
}

impl RecoveryVault {
    /// Id of the keystone question (the one carrying more than a single
    /// share weight).
    pub fn keystone_id(&self) -> Result<&str> {
        let mut keystones = self
            .share_distribution
            .iter()
            .filter(|(_, &w)| w > 1)
            .map(|(id, _)| id.as_str());

        match (keystones.next(), keystones.next()) {
            (Some(id), None) => Ok(id),
            _ => Err(RecoveryError::InvalidVault(
                "expected exactly one keystone weight".to_string(),
            )),
        }
    }

    /// All question ids in this vault.
    pub fn question_ids(&self) -> impl Iterator<Item = &str> {
        self.share_distribution.keys().map(String::as_str)
    }

    /// Structural validation: version, algorithm, and map consistency.
    pub fn validate(&self) -> Result<()> {
        if self.version != VAULT_VERSION {
            return Err(RecoveryError::InvalidVault(format!(
                "unsupported vault version {} (expected {})",
                self.version, VAULT_VERSION
            )));
        }
        if self.algorithm != VAULT_ALGORITHM {
            return Err(RecoveryError::InvalidVault(format!(
                "unsupported algorithm '{}'",
                self.algorithm
            )));
        }
        if self.threshold != RECOVERY_THRESHOLD {
            return Err(RecoveryError::InvalidVault(format!(
                "unexpected threshold {}",
                self.threshold
            )));
        }
        if self.share_distribution.len() != QUESTION_COUNT {
            return Err(RecoveryError::InvalidVault(format!(
                "expected {} questions, found {}",
                QUESTION_COUNT,
                self.share_distribution.len()
            )));
        }

        let total: u32 = self.share_distribution.values().sum();
        if total != TOTAL_SHARE_WEIGHT {
            return Err(RecoveryError::InvalidVault(format!(
                "share weights sum to {total}, expected {TOTAL_SHARE_WEIGHT}"
            )));
        }

        for id in self.share_distribution.keys() {
            let complete = self.spans.contains_key(id)
                && self.chunks.contains_key(id)
                && self.salts.contains_key(id)
                && self.verification_hashes.contains_key(id);
            if !complete {
                return Err(RecoveryError::InvalidVault(format!(
                    "question '{id}' is missing vault material"
                )));
            }
        }

        self.keystone_id()?;
        Ok(())
    }

    /// Serialize to the canonical JSON blob persisted remotely.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| RecoveryError::InvalidVault(format!("serialization failed: {e}")))
    }

    /// Parse and validate a persisted vault blob.
    pub fn from_json(json: &str) -> Result<Self> {
        let vault: Self = serde_json::from_str(json)
            .map_err(|e| RecoveryError::InvalidVault(format!("parse failed: {e}")))?;
        vault.validate()?;
        Ok(vault)
    }
}

/// AAD binding a chunk to its question id.
pub(crate) fn chunk_aad(question_id: &str) -> Vec<u8> {
    let mut aad = Vec::with_capacity(DOMAIN_CHUNK_ENCRYPTION.len() + question_id.len());
    aad.extend_from_slice(DOMAIN_CHUNK_ENCRYPTION);
    aad.extend_from_slice(question_id.as_bytes());
    aad
}

/// Builds a [`RecoveryVault`] from a secret and a full answer set.
pub struct VaultBuilder {
    plan: ChunkPlan,
    kdf: KdfParams,
}

impl VaultBuilder {
    /// Create a builder for a question set.
    pub fn new(questions: &[SecurityQuestion], kdf: KdfParams) -> Result<Self> {
        Ok(Self {
            plan: ChunkPlan::for_questions(questions)?,
            kdf,
        })
    }

    /// The plan the builder will encrypt against.
    pub fn plan(&self) -> &ChunkPlan {
        &self.plan
    }

    /// Build a vault.
    ///
    /// Fails unless every question, the keystone included, is answered
    /// exactly once. Per question: fresh 32-byte salt, Argon2id answer
    /// key, verification hash, and an encrypted chunk of the question's
    /// word span bound to its id via AAD.
    pub fn build(&self, secret: &RecoverySecret, answers: &[Answer]) -> Result<RecoveryVault> {
        if answers.len() != QUESTION_COUNT {
            return Err(RecoveryError::TooFewAnswers {
                required: QUESTION_COUNT,
                provided: answers.len(),
            });
        }

        let mut by_id: BTreeMap<&str, &Answer> = BTreeMap::new();
        for answer in answers {
            if self.plan.entry(&answer.question_id).is_none() {
                return Err(RecoveryError::UnknownQuestion(answer.question_id.clone()));
            }
            if by_id.insert(&answer.question_id, answer).is_some() {
                return Err(RecoveryError::DuplicateQuestion(answer.question_id.clone()));
            }
        }
        // 5 unique known ids over 5 questions: every entry is answered.

        let mut share_distribution = BTreeMap::new();
        let mut spans = BTreeMap::new();
        let mut chunks = BTreeMap::new();
        let mut salts = BTreeMap::new();
        let mut verification_hashes = BTreeMap::new();

        for entry in self.plan.entries() {
            let id = entry.question.id.clone();
            let answer = by_id
                .get(id.as_str())
                .expect("all questions answered after count and uniqueness checks");

            let salt: [u8; SALT_SIZE] = generate_random_bytes();
            let key = derive_answer_key(&answer.text, &salt, &self.kdf)?;

            let plaintext = secret.word_span(entry.span.start, entry.span.end).join(" ");
            let chunk = encrypt_chunk(&key, plaintext.as_bytes(), &chunk_aad(&id))?;

            share_distribution.insert(id.clone(), entry.weight);
            spans.insert(id.clone(), entry.span);
            salts.insert(id.clone(), Bytes32(salt));
            verification_hashes.insert(
                id.clone(),
                Bytes32(verification_hash(DOMAIN_ANSWER_VERIFICATION, &key)),
            );
            chunks.insert(id, chunk);
        }

        Ok(RecoveryVault {
            version: VAULT_VERSION,
            algorithm: VAULT_ALGORITHM.to_string(),
            kdf: self.kdf,
            threshold: RECOVERY_THRESHOLD,
            share_distribution,
            spans,
            chunks,
            salts,
            verification_hashes,
            created_at: chrono::Utc::now().timestamp() as u64,
        })
    }
}

/// Set up recovery for a secret: one call from questions and answers to a
/// persisted vault.
pub fn setup_recovery(
    secret: &RecoverySecret,
    questions: &[SecurityQuestion],
    answers: &[Answer],
    kdf: KdfParams,
) -> Result<RecoveryVault> {
    VaultBuilder::new(questions, kdf)?.build(secret, answers)
}
