//! Secret reconstruction from a subset of answered questions.
//!
//! Usage errors (keystone absent, too few answers, unknown ids) are
//! rejected before any cryptographic work, so they never become an
//! attacker-observable signal. Once past that gate, every supplied answer
//! pays the guard's fixed verification cost; whether the attempt was a
//! near-miss or nowhere close is not distinguishable from outside.

use crate::{
    errors::{RecoveryError, Result},
    guard::SideChannelGuard,
    vault::{chunk_aad, RecoveryVault},
    plan::Answer,
};
use sanctum_crypto::{decrypt_chunk, CryptoError, RecoverySecret, SECRET_WORD_COUNT};
use std::collections::HashSet;
use zeroize::Zeroize;

/// Minimum number of answers that can possibly reach the threshold
/// (the keystone plus two others).
pub const MIN_ANSWERS: usize = 3;

/// Reconstructs the recovery secret from verified answers.
pub struct RecoveryReconstructor {
    guard: SideChannelGuard,
}

impl RecoveryReconstructor {
    /// Create a reconstructor over a guard.
    pub fn new(guard: SideChannelGuard) -> Self {
        Self { guard }
    }

    /// Attempt to reconstruct the secret.
    ///
    /// Returns `Ok(None)`, never an error, when the keystone did not
    /// verify or the accumulated share weight stays below the threshold.
    /// Errors are reserved for usage mistakes, rate limiting, and vault
    /// corruption or tampering.
    pub async fn recover_secret(
        &self,
        answers: &[Answer],
        vault: &RecoveryVault,
        identity: &str,
    ) -> Result<Option<RecoverySecret>> {
        vault.validate()?;
        let keystone_id = vault.keystone_id()?.to_string();

        // Usage checks, before any cryptographic work.
        if answers.len() < MIN_ANSWERS {
            return Err(RecoveryError::TooFewAnswers {
                required: MIN_ANSWERS,
                provided: answers.len(),
            });
        }
        let mut seen = HashSet::new();
        for answer in answers {
            if !vault.share_distribution.contains_key(&answer.question_id) {
                return Err(RecoveryError::UnknownQuestion(answer.question_id.clone()));
            }
            if !seen.insert(answer.question_id.as_str()) {
                return Err(RecoveryError::DuplicateQuestion(answer.question_id.clone()));
            }
        }
        if !seen.contains(keystone_id.as_str()) {
            return Err(RecoveryError::KeystoneMissing);
        }

        // Verify every answer and decrypt the chunks of the ones that
        // held up. A chunk that fails authentication for a *verified*
        // answer is storage corruption, not a wrong guess, and is fatal.
        let mut accumulated_weight = 0u32;
        let mut keystone_verified = false;
        let mut decrypted: Vec<(String, Vec<String>)> = Vec::new();

        for answer in answers {
            let id = answer.question_id.as_str();
            let Some(key) = self
                .guard
                .verify_and_unlock(vault, id, &answer.text, identity)
                .await?
            else {
                tracing::debug!(question = id, "Answer did not verify");
                continue;
            };

            accumulated_weight += vault.share_distribution[id];
            if id == keystone_id {
                keystone_verified = true;
            }

            let chunk = &vault.chunks[id];
            let plaintext = decrypt_chunk(&key, chunk, &chunk_aad(id)).map_err(|e| match e {
                CryptoError::AuthenticationFailed => RecoveryError::StorageCorrupted(format!(
                    "chunk for '{id}' failed authentication under a verified answer"
                )),
                other => RecoveryError::Crypto(other),
            })?;

            let text = std::str::from_utf8(&plaintext).map_err(|_| {
                RecoveryError::StorageCorrupted(format!("chunk for '{id}' is not valid UTF-8"))
            })?;
            let words: Vec<String> = text.split(' ').map(str::to_string).collect();
            decrypted.push((id.to_string(), words));
        }

        if !keystone_verified || accumulated_weight < vault.threshold {
            tracing::debug!(
                weight = accumulated_weight,
                threshold = vault.threshold,
                "Reconstruction below threshold"
            );
            return Ok(None);
        }

        let secret = self.merge_chunks(vault, &mut decrypted)?;
        Ok(Some(secret))
    }

    /// Merge decrypted chunks word-by-word.
    ///
    /// Any index covered by two chunks with disagreeing words aborts as
    /// tamper-detected; any index left uncovered aborts as incomplete
    /// (structurally impossible given the plan's coverage invariant, but
    /// checked regardless).
    fn merge_chunks(
        &self,
        vault: &RecoveryVault,
        decrypted: &mut [(String, Vec<String>)],
    ) -> Result<RecoverySecret> {
        let mut merged: Vec<Option<String>> = vec![None; SECRET_WORD_COUNT];

        for (id, words) in decrypted.iter() {
            let span = vault.spans[id];
            if words.len() != span.len() {
                return Err(RecoveryError::StorageCorrupted(format!(
                    "chunk for '{id}' holds {} words, span expects {}",
                    words.len(),
                    span.len()
                )));
            }

            for (offset, word) in words.iter().enumerate() {
                let index = span.start + offset;
                match &merged[index] {
                    Some(existing) if existing != word => {
                        return Err(RecoveryError::TamperDetected { word_index: index });
                    }
                    Some(_) => {}
                    None => merged[index] = Some(word.clone()),
                }
            }
        }

        let mut words = Vec::with_capacity(SECRET_WORD_COUNT);
        for (index, slot) in merged.iter_mut().enumerate() {
            match slot.take() {
                Some(word) => words.push(word),
                None => return Err(RecoveryError::IncompleteCoverage { word_index: index }),
            }
        }

        let secret = RecoverySecret::from_words(&words).map_err(|e| {
            RecoveryError::StorageCorrupted(format!("merged words are not a valid secret: {e}"))
        });

        for word in words.iter_mut() {
            word.zeroize();
        }
        for (_, words) in decrypted.iter_mut() {
            for word in words.iter_mut() {
                word.zeroize();
            }
        }

        secret
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::{AttemptLimiter, GuardConfig};
    use crate::plan::five_questions;
    use crate::vault::setup_recovery;
    use sanctum_crypto::{constants::argon2_params, KdfParams};
    use std::sync::Arc;

    fn test_kdf() -> KdfParams {
        KdfParams {
            m_cost: argon2_params::MIN_MEMORY_COST,
            t_cost: 1,
            p_cost: 1,
        }
    }

    fn test_guard() -> SideChannelGuard {
        SideChannelGuard::new(
            Arc::new(AttemptLimiter::new()),
            GuardConfig {
                delay_min_ms: 0,
                delay_max_ms: 1,
                ..GuardConfig::default()
            },
        )
    }

    fn answer(id: &str) -> Answer {
        let text = match id {
            "q1" => "fluffy",
            "q2" => "elm street",
            "q3" => "lisbon",
            "q4" => "the cure",
            "q5" => "sam",
            _ => panic!("unknown test question"),
        };
        Answer::new(id, text)
    }

    fn build_vault() -> (RecoverySecret, RecoveryVault) {
        let secret = RecoverySecret::generate().unwrap();
        let answers: Vec<Answer> = ["q1", "q2", "q3", "q4", "q5"].map(answer).to_vec();
        let vault = setup_recovery(&secret, &five_questions(), &answers, test_kdf()).unwrap();
        (secret, vault)
    }

    #[tokio::test]
    async fn test_roundtrip_keystone_plus_two() {
        let (secret, vault) = build_vault();
        let reconstructor = RecoveryReconstructor::new(test_guard());

        let answers = vec![answer("q3"), answer("q1"), answer("q4")];
        let recovered = reconstructor
            .recover_secret(&answers, &vault, "user-1")
            .await
            .unwrap()
            .expect("keystone plus two must recover");
        assert_eq!(recovered, secret);
        assert_eq!(recovered.words(), secret.words());
    }

    #[tokio::test]
    async fn test_too_few_answers_is_usage_error() {
        let (_, vault) = build_vault();
        let reconstructor = RecoveryReconstructor::new(test_guard());

        let answers = vec![answer("q3"), answer("q1")];
        let result = reconstructor.recover_secret(&answers, &vault, "user-1").await;
        assert!(matches!(result, Err(RecoveryError::TooFewAnswers { .. })));
    }

    #[tokio::test]
    async fn test_keystone_absent_is_usage_error() {
        let (_, vault) = build_vault();
        let reconstructor = RecoveryReconstructor::new(test_guard());

        let answers = vec![answer("q1"), answer("q2"), answer("q4")];
        let result = reconstructor.recover_secret(&answers, &vault, "user-1").await;
        assert!(matches!(result, Err(RecoveryError::KeystoneMissing)));
    }

    #[tokio::test]
    async fn test_wrong_keystone_answer_yields_no_secret() {
        let (_, vault) = build_vault();
        let reconstructor = RecoveryReconstructor::new(test_guard());

        let answers = vec![
            Answer::new("q3", "wrong city"),
            answer("q1"),
            answer("q2"),
            answer("q4"),
            answer("q5"),
        ];
        let result = reconstructor
            .recover_secret(&answers, &vault, "user-1")
            .await
            .unwrap();
        assert!(result.is_none(), "Keystone wrong must yield no secret");
    }

    #[tokio::test]
    async fn test_keystone_plus_one_is_below_threshold() {
        let (_, vault) = build_vault();
        let reconstructor = RecoveryReconstructor::new(test_guard());

        // Three answers supplied, but only the keystone and one other are
        // correct: 4 shares, below the threshold of 5.
        let answers = vec![answer("q3"), answer("q1"), Answer::new("q5", "nope")];
        let result = reconstructor
            .recover_secret(&answers, &vault, "user-1")
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_answer_rejected() {
        let (_, vault) = build_vault();
        let reconstructor = RecoveryReconstructor::new(test_guard());

        let answers = vec![answer("q3"), answer("q1"), answer("q1")];
        let result = reconstructor.recover_secret(&answers, &vault, "user-1").await;
        assert!(matches!(result, Err(RecoveryError::DuplicateQuestion(_))));
    }

    #[tokio::test]
    async fn test_tampered_chunk_is_fatal_not_silent() {
        let (_, vault) = build_vault();
        let mut tampered = vault.clone();
        // Flip one ciphertext bit in a chunk whose answer will verify.
        tampered.chunks.get_mut("q1").unwrap().ciphertext[0] ^= 0x01;

        let reconstructor = RecoveryReconstructor::new(test_guard());
        let answers = vec![answer("q3"), answer("q1"), answer("q4")];
        let result = reconstructor
            .recover_secret(&answers, &tampered, "user-1")
            .await;
        assert!(matches!(result, Err(RecoveryError::StorageCorrupted(_))));
    }

    #[tokio::test]
    async fn test_tampered_tag_is_fatal() {
        let (_, vault) = build_vault();
        let mut tampered = vault.clone();
        tampered.chunks.get_mut("q3").unwrap().tag[0] ^= 0x01;

        let reconstructor = RecoveryReconstructor::new(test_guard());
        let answers = vec![answer("q3"), answer("q1"), answer("q4")];
        let result = reconstructor
            .recover_secret(&answers, &tampered, "user-1")
            .await;
        assert!(matches!(result, Err(RecoveryError::StorageCorrupted(_))));
    }

    #[tokio::test]
    async fn test_spliced_chunk_from_other_vault_is_tamper_detected() {
        // Two vaults built from different secrets but the same questions
        // and answers. Splicing q1's material from vault B into vault A
        // produces a chunk that verifies and decrypts cleanly, yet
        // disagrees with A's keystone chunk where their spans overlap.
        let (_, vault_a) = build_vault();
        let (_, vault_b) = build_vault();

        let mut spliced = vault_a.clone();
        spliced
            .chunks
            .insert("q1".to_string(), vault_b.chunks["q1"].clone());
        spliced
            .salts
            .insert("q1".to_string(), vault_b.salts["q1"]);
        spliced.verification_hashes.insert(
            "q1".to_string(),
            vault_b.verification_hashes["q1"],
        );

        let reconstructor = RecoveryReconstructor::new(test_guard());
        let answers = vec![answer("q3"), answer("q1"), answer("q4")];
        let result = reconstructor
            .recover_secret(&answers, &spliced, "user-1")
            .await;
        assert!(matches!(
            result,
            Err(RecoveryError::TamperDetected { .. })
        ));
    }

    #[tokio::test]
    async fn test_all_roundtrip_combinations() {
        let (secret, vault) = build_vault();
        let members = ["q1", "q2", "q4", "q5"];

        for (i, a) in members.iter().enumerate() {
            for b in members.iter().skip(i + 1) {
                let reconstructor = RecoveryReconstructor::new(test_guard());
                let answers = vec![answer("q3"), answer(a), answer(b)];
                let recovered = reconstructor
                    .recover_secret(&answers, &vault, "combo-user")
                    .await
                    .unwrap()
                    .unwrap_or_else(|| panic!("q3+{a}+{b} must recover"));
                assert_eq!(recovered, secret);
            }
        }
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_during_recovery() {
        let (_, vault) = build_vault();
        let limiter = Arc::new(AttemptLimiter::new());
        let guard = SideChannelGuard::new(
            limiter.clone(),
            GuardConfig {
                delay_min_ms: 0,
                delay_max_ms: 1,
                ..GuardConfig::default()
            },
        );
        let reconstructor = RecoveryReconstructor::new(guard);

        // Each recovery call burns three attempts; the fourth call's first
        // verification is the 10th, its second the 11th.
        let answers = vec![answer("q3"), answer("q1"), answer("q4")];
        for _ in 0..3 {
            reconstructor
                .recover_secret(&answers, &vault, "user-1")
                .await
                .unwrap();
        }
        let result = reconstructor.recover_secret(&answers, &vault, "user-1").await;
        assert!(matches!(
            result,
            Err(RecoveryError::RateLimitExceeded { .. })
        ));
    }
}
