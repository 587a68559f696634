//! The recovery secret: 32 bytes of CSPRNG entropy rendered as a 24-word
//! mnemonic.
//!
//! # Security Model
//!
//! - Generated client-side only, at setup and at every successful rekey
//! - Never transmitted or persisted whole; only encrypted chunks of the
//!   word sequence are stored
//! - Zeroized on drop, including every word string

use crate::{
    constants::{SECRET_ENTROPY_SIZE, SECRET_WORD_COUNT},
    errors::{CryptoError, Result},
    hashing::constant_time_compare,
};
use bip39::{Language, Mnemonic};
use zeroize::{Zeroize, ZeroizeOnDrop};

/// A high-entropy secret as an ordered sequence of 24 mnemonic words.
///
/// The word rendering is canonical for the entropy (BIP-39 English with
/// checksum), which gives reconstruction a free integrity check: a merged
/// word sequence that is not a valid encoding cannot have come from a
/// genuine secret.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct RecoverySecret {
    entropy: [u8; SECRET_ENTROPY_SIZE],
    words: Vec<String>,
}

impl RecoverySecret {
    /// Generate a new secret from the system CSPRNG.
    pub fn generate() -> Result<Self> {
        let mut entropy = [0u8; SECRET_ENTROPY_SIZE];
        getrandom::getrandom(&mut entropy)
            .map_err(|e| CryptoError::RandomGenerationFailed(e.to_string()))?;
        let secret = Self::from_entropy(entropy);
        entropy.zeroize();
        secret
    }

    /// Build a secret from existing entropy bytes.
    ///
    /// The canonical word rendering is recomputed; the input is not
    /// zeroized (callers own their copy).
    pub fn from_entropy(entropy: [u8; SECRET_ENTROPY_SIZE]) -> Result<Self> {
        let mnemonic = Mnemonic::from_entropy_in(Language::English, &entropy)
            .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))?;
        let words: Vec<String> = mnemonic.words().map(str::to_string).collect();
        Ok(Self { entropy, words })
    }

    /// Rebuild a secret from a full word sequence (e.g. after chunk merge).
    ///
    /// Validates the checksum, so a sequence assembled from tampered or
    /// mismatched chunks is rejected here even if every chunk decrypted.
    pub fn from_words(words: &[String]) -> Result<Self> {
        if words.len() != SECRET_WORD_COUNT {
            return Err(CryptoError::InvalidLength {
                expected: SECRET_WORD_COUNT,
                actual: words.len(),
            });
        }

        let phrase = words
            .iter()
            .map(|w| w.trim().to_lowercase())
            .collect::<Vec<_>>()
            .join(" ");
        let mnemonic = Mnemonic::parse_in_normalized(Language::English, &phrase)
            .map_err(|e| CryptoError::InvalidMnemonic(e.to_string()))?;

        let entropy_vec = mnemonic.to_entropy();
        let entropy: [u8; SECRET_ENTROPY_SIZE] =
            entropy_vec
                .as_slice()
                .try_into()
                .map_err(|_| CryptoError::InvalidLength {
                    expected: SECRET_ENTROPY_SIZE,
                    actual: entropy_vec.len(),
                })?;

        Self::from_entropy(entropy)
    }

    /// The full ordered word sequence.
    pub fn words(&self) -> &[String] {
        &self.words
    }

    /// The words inside a half-open index range.
    ///
    /// # Panics
    ///
    /// Panics if the range is out of bounds; chunk spans are validated
    /// against the word count before use.
    pub fn word_span(&self, start: usize, end: usize) -> &[String] {
        &self.words[start..end]
    }

    /// Raw entropy bytes.
    ///
    /// # Security
    ///
    /// Use with extreme caution. Never log or persist these bytes.
    pub fn entropy(&self) -> &[u8; SECRET_ENTROPY_SIZE] {
        &self.entropy
    }

    /// The space-joined phrase, for display to the user exactly once.
    pub fn to_phrase(&self) -> zeroize::Zeroizing<String> {
        zeroize::Zeroizing::new(self.words.join(" "))
    }
}

impl PartialEq for RecoverySecret {
    fn eq(&self, other: &Self) -> bool {
        constant_time_compare(&self.entropy, &other.entropy)
    }
}

impl Eq for RecoverySecret {}

impl std::fmt::Debug for RecoverySecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RecoverySecret(..)")
    }
}
