//! Key derivation: Argon2id for low-entropy inputs, HKDF-SHA256 for the
//! record master key.
//!
//! Answers and passwords go through [`derive_answer_key`]: normalization
//! followed by Argon2id over a 32-byte salt. The recovery secret's entropy
//! is already uniform, so the record master key comes from a cheap
//! domain-separated HKDF expansion instead.

use crate::{
    constants::{argon2_params, DOMAIN_RECORD_KEY, KEY_SIZE, SALT_SIZE, SECRET_ENTROPY_SIZE},
    errors::{CryptoError, Result},
};
use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use unicode_normalization::UnicodeNormalization;
use zeroize::Zeroizing;

/// Argon2id cost parameters.
///
/// Persisted in every vault so decryption uses the costs the vault was
/// built with. [`KdfParams::default`] is the production profile; tests
/// construct cheaper profiles explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfParams {
    /// Memory cost in KiB
    pub m_cost: u32,
    /// Number of iterations
    pub t_cost: u32,
    /// Parallelism (lanes)
    pub p_cost: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            m_cost: argon2_params::MEMORY_COST,
            t_cost: argon2_params::TIME_COST,
            p_cost: argon2_params::PARALLELISM,
        }
    }
}

impl KdfParams {
    /// Validate the parameters against the hard floor.
    ///
    /// Logs a warning when below the recommended production costs so weak
    /// test profiles are visible in traces but not rejected.
    pub fn validate(&self) -> Result<()> {
        if self.m_cost < argon2_params::MIN_MEMORY_COST {
            return Err(CryptoError::InvalidKdfParams(format!(
                "memory cost {} KiB is below minimum {}",
                self.m_cost,
                argon2_params::MIN_MEMORY_COST
            )));
        }
        if self.t_cost < argon2_params::MIN_TIME_COST {
            return Err(CryptoError::InvalidKdfParams(format!(
                "time cost {} is below minimum {}",
                self.t_cost,
                argon2_params::MIN_TIME_COST
            )));
        }
        if self.p_cost == 0 {
            return Err(CryptoError::InvalidKdfParams(
                "parallelism must be at least 1".to_string(),
            ));
        }

        if self.m_cost < argon2_params::MEMORY_COST {
            tracing::warn!(
                m_cost = self.m_cost,
                recommended = argon2_params::MEMORY_COST,
                "Argon2id memory cost below recommended production value"
            );
        }
        if self.t_cost < argon2_params::TIME_COST {
            tracing::warn!(
                t_cost = self.t_cost,
                recommended = argon2_params::TIME_COST,
                "Argon2id time cost below recommended production value"
            );
        }

        Ok(())
    }
}

/// Normalize a security-question answer or password before derivation.
///
/// Case-folds, Unicode-normalizes (NFKC), trims, and collapses internal
/// whitespace runs to single spaces, so trivial formatting differences
/// never produce distinct keys.
pub fn normalize_answer(answer: &str) -> String {
    let folded: String = answer.nfkc().collect::<String>().to_lowercase();
    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Derive a 256-bit key from a low-entropy input and a 32-byte salt.
///
/// Deterministic for a fixed (normalized input, salt) pair and expensive
/// per guess. Content never fails: a wrong answer simply yields a key that
/// fails downstream authentication.
pub fn derive_answer_key(
    input: &str,
    salt: &[u8; SALT_SIZE],
    kdf: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    kdf.validate()?;

    let params = Params::new(
        kdf.m_cost,
        kdf.t_cost,
        kdf.p_cost,
        Some(argon2_params::OUTPUT_LENGTH),
    )
    .map_err(|e| CryptoError::InvalidKdfParams(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);

    let normalized = Zeroizing::new(normalize_answer(input));
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    argon2
        .hash_password_into(normalized.as_bytes(), salt, key.as_mut())
        .map_err(|e| CryptoError::KeyDerivationFailed(e.to_string()))?;

    Ok(key)
}

/// Derive the record master key from the recovery secret's entropy.
///
/// HKDF-SHA256 with the record-key domain string. The same secret always
/// maps to the same master key, which is what lets the rekey transaction
/// reopen every stored record from a reconstructed secret alone.
pub fn derive_record_key(
    entropy: &[u8; SECRET_ENTROPY_SIZE],
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let hkdf = Hkdf::<Sha256>::new(None, entropy);
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hkdf.expand(DOMAIN_RECORD_KEY, key.as_mut())
        .map_err(|_| CryptoError::HkdfError)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_kdf() -> KdfParams {
        KdfParams {
            m_cost: argon2_params::MIN_MEMORY_COST,
            t_cost: 1,
            p_cost: 1,
        }
    }

    #[test]
    fn test_normalize_answer_folds_formatting() {
        assert_eq!(normalize_answer("  Fluffy  "), "fluffy");
        assert_eq!(normalize_answer("New   York\tCity"), "new york city");
        assert_eq!(normalize_answer("CAFÉ"), normalize_answer("café"));
    }

    #[test]
    fn test_normalize_answer_nfkc() {
        // U+FB01 LATIN SMALL LIGATURE FI normalizes to "fi"
        assert_eq!(normalize_answer("\u{FB01}rst pet"), "first pet");
    }

    #[test]
    fn test_derive_answer_key_is_deterministic() {
        let salt = [3u8; SALT_SIZE];
        let k1 = derive_answer_key("fluffy", &salt, &test_kdf()).unwrap();
        let k2 = derive_answer_key("  FLUFFY ", &salt, &test_kdf()).unwrap();
        assert_eq!(*k1, *k2, "Normalized variants must derive the same key");
    }

    #[test]
    fn test_derive_answer_key_salt_separates() {
        let k1 = derive_answer_key("fluffy", &[1u8; SALT_SIZE], &test_kdf()).unwrap();
        let k2 = derive_answer_key("fluffy", &[2u8; SALT_SIZE], &test_kdf()).unwrap();
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn test_derive_answer_key_wrong_answer_differs() {
        let salt = [3u8; SALT_SIZE];
        let k1 = derive_answer_key("fluffy", &salt, &test_kdf()).unwrap();
        let k2 = derive_answer_key("rex", &salt, &test_kdf()).unwrap();
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn test_kdf_params_floor_enforced() {
        let weak = KdfParams {
            m_cost: 8,
            t_cost: 1,
            p_cost: 1,
        };
        assert!(weak.validate().is_err());
        assert!(derive_answer_key("x", &[0u8; SALT_SIZE], &weak).is_err());
    }

    #[test]
    fn test_kdf_params_default_is_valid() {
        assert!(KdfParams::default().validate().is_ok());
    }

    #[test]
    fn test_derive_record_key_deterministic_and_domain_bound() {
        let entropy = [9u8; SECRET_ENTROPY_SIZE];
        let k1 = derive_record_key(&entropy).unwrap();
        let k2 = derive_record_key(&entropy).unwrap();
        assert_eq!(*k1, *k2);

        let other = derive_record_key(&[10u8; SECRET_ENTROPY_SIZE]).unwrap();
        assert_ne!(*k1, *other);
    }
}
