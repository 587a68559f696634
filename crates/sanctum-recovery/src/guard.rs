//! Side-channel-hardened answer verification.
//!
//! Every verification pays the same externally observable cost whether the
//! answer is right or wrong: the real derivation-and-compare, an
//! unconditional decoy derivation-and-compare of identical cost, and a
//! randomized response delay inside a fixed window. The comparison itself
//! is constant-time, and the attempt limiter runs before any cryptographic
//! work so lockout is never a function of correctness.

use crate::{
    errors::{RecoveryError, Result},
    vault::RecoveryVault,
};
use rand::Rng;
use sanctum_crypto::{
    blake3_hash, constant_time_compare, current_timestamp, derive_answer_key, verification_hash,
    ATTEMPT_WINDOW_SECONDS, DOMAIN_ANSWER_VERIFICATION, DOMAIN_DECOY_DERIVATION,
    MAX_ATTEMPTS_PER_WINDOW, SALT_SIZE, VERIFY_DELAY_MAX_MS, VERIFY_DELAY_MIN_MS,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use zeroize::Zeroizing;

/// Upper bound on tracked identities before eviction kicks in
const MAX_TRACKED_IDENTITIES: usize = 10_000;

/// Attempt window, limit, and response-delay configuration.
#[derive(Debug, Clone, Copy)]
pub struct GuardConfig {
    /// Sliding window length in seconds
    pub window_seconds: u64,
    /// Maximum attempts per identity inside the window
    pub max_attempts: u32,
    /// Lower bound of the randomized response delay, milliseconds
    pub delay_min_ms: u64,
    /// Upper bound of the randomized response delay, milliseconds
    pub delay_max_ms: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            window_seconds: ATTEMPT_WINDOW_SECONDS,
            max_attempts: MAX_ATTEMPTS_PER_WINDOW,
            delay_min_ms: VERIFY_DELAY_MIN_MS,
            delay_max_ms: VERIFY_DELAY_MAX_MS,
        }
    }
}

/// Helper to handle mutex lock with poison recovery
fn lock_attempts(
    mutex: &Mutex<HashMap<String, Vec<u64>>>,
) -> MutexGuard<'_, HashMap<String, Vec<u64>>> {
    mutex.lock().unwrap_or_else(|poisoned| {
        tracing::warn!("Attempt limiter mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Per-identity sliding-window attempt limiter.
///
/// Each identity maps to the timestamps of its recent attempts; entries
/// older than the window are pruned on every touch. The attempt is
/// recorded *before* the limit is checked, so concurrent callers cannot
/// slip through between a check and its increment.
pub struct AttemptLimiter {
    attempts: Arc<Mutex<HashMap<String, Vec<u64>>>>,
}

impl AttemptLimiter {
    /// Create an empty limiter.
    pub fn new() -> Self {
        Self {
            attempts: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an attempt and check the limit.
    ///
    /// Returns `Err(retry_after_seconds)` when the identity has exceeded
    /// `max_attempts` inside the window ending at `now`.
    pub fn record_and_check(
        &self,
        identity: &str,
        window_seconds: u64,
        max_attempts: u32,
        now: u64,
    ) -> std::result::Result<(), u64> {
        let mut attempts = lock_attempts(&self.attempts);

        let outcome = {
            let timestamps = attempts.entry(identity.to_string()).or_default();
            timestamps.retain(|&ts| ts + window_seconds > now);
            timestamps.push(now);

            if timestamps.len() as u32 > max_attempts {
                let oldest = timestamps[0];
                Err((oldest + window_seconds).saturating_sub(now))
            } else {
                Ok(())
            }
        };

        if attempts.len() > MAX_TRACKED_IDENTITIES {
            cleanup_attempts(&mut attempts, window_seconds, now);
        }

        outcome
    }

    /// Forget all attempts for an identity.
    pub fn reset(&self, identity: &str) {
        lock_attempts(&self.attempts).remove(identity);
    }

    /// Clear all state (for testing)
    #[cfg(test)]
    pub fn clear(&self) {
        lock_attempts(&self.attempts).clear();
    }
}

impl Default for AttemptLimiter {
    fn default() -> Self {
        Self::new()
    }
}

fn cleanup_attempts(attempts: &mut HashMap<String, Vec<u64>>, window_seconds: u64, now: u64) {
    attempts.retain(|_, timestamps| {
        timestamps.retain(|&ts| ts + window_seconds > now);
        !timestamps.is_empty()
    });

    if attempts.len() > MAX_TRACKED_IDENTITIES {
        let mut entries: Vec<_> = attempts
            .iter()
            .map(|(id, ts)| (id.clone(), ts.last().copied().unwrap_or(0)))
            .collect();
        entries.sort_by_key(|(_, last)| *last);

        let remove_count = attempts.len().saturating_sub(MAX_TRACKED_IDENTITIES);
        for (id, _) in entries.into_iter().take(remove_count) {
            attempts.remove(&id);
        }
    }
}

/// Verifies answers with constant-time comparison, mandatory decoy work,
/// randomized delay, and rate limiting.
///
/// The limiter is passed in rather than owned globally, so its backing
/// store is the caller's decision.
pub struct SideChannelGuard {
    limiter: Arc<AttemptLimiter>,
    config: GuardConfig,
}

impl SideChannelGuard {
    /// Create a guard over a shared limiter.
    pub fn new(limiter: Arc<AttemptLimiter>, config: GuardConfig) -> Self {
        Self { limiter, config }
    }

    /// The guard's configuration.
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    /// Verify an answer against the vault's stored material.
    ///
    /// Side effects on every call, in order: rate-limit record-and-check,
    /// real key derivation and constant-time hash comparison, decoy
    /// derivation and comparison of identical cost, randomized delay.
    pub async fn verify_answer(
        &self,
        vault: &RecoveryVault,
        question_id: &str,
        answer: &str,
        identity: &str,
    ) -> Result<bool> {
        Ok(self
            .verify_and_unlock(vault, question_id, answer, identity)
            .await?
            .is_some())
    }

    /// Like [`verify_answer`](Self::verify_answer), but hands the derived
    /// chunk key back on success so reconstruction does not pay the
    /// derivation twice.
    pub(crate) async fn verify_and_unlock(
        &self,
        vault: &RecoveryVault,
        question_id: &str,
        answer: &str,
        identity: &str,
    ) -> Result<Option<Zeroizing<[u8; 32]>>> {
        self.limiter
            .record_and_check(
                identity,
                self.config.window_seconds,
                self.config.max_attempts,
                current_timestamp(),
            )
            .map_err(|retry_after_seconds| RecoveryError::RateLimitExceeded {
                retry_after_seconds,
            })?;

        let salt = vault
            .salts
            .get(question_id)
            .ok_or_else(|| RecoveryError::UnknownQuestion(question_id.to_string()))?;
        let expected = vault
            .verification_hashes
            .get(question_id)
            .ok_or_else(|| RecoveryError::UnknownQuestion(question_id.to_string()))?;

        let key = derive_answer_key(answer, &salt.0, &vault.kdf)?;
        let candidate = verification_hash(DOMAIN_ANSWER_VERIFICATION, &key);
        let matched = constant_time_compare(&candidate, &expected.0);

        // Decoy cycle: same derivation and comparison cost on every path,
        // keyed off a salt the real material can never collide with.
        let decoy_salt = decoy_salt(&salt.0);
        let decoy_key = derive_answer_key(answer, &decoy_salt, &vault.kdf)?;
        let decoy_candidate = verification_hash(DOMAIN_DECOY_DERIVATION, &decoy_key);
        let _ = constant_time_compare(&decoy_candidate, &expected.0);

        let delay_ms = {
            let mut rng = rand::thread_rng();
            rng.gen_range(self.config.delay_min_ms..=self.config.delay_max_ms)
        };
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;

        Ok(if matched { Some(key) } else { None })
    }
}

/// Derive the decoy salt for a question's real salt.
fn decoy_salt(salt: &[u8; SALT_SIZE]) -> [u8; SALT_SIZE] {
    let mut input = Vec::with_capacity(DOMAIN_DECOY_DERIVATION.len() + SALT_SIZE);
    input.extend_from_slice(DOMAIN_DECOY_DERIVATION);
    input.extend_from_slice(salt);
    blake3_hash(&input)
}
