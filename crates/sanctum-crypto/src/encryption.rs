//! Authenticated chunk encryption using XChaCha20-Poly1305.
//!
//! Every chunk carries a fresh random 24-byte nonce and a detached 16-byte
//! Poly1305 tag. The tag binds key, nonce, ciphertext, and AAD; it is
//! verified inside the AEAD before any plaintext is released. All
//! decryption failures collapse to [`CryptoError::AuthenticationFailed`] so
//! a wrong key and tampered storage are indistinguishable to callers.

use crate::{
    constants::{NONCE_SIZE, TAG_SIZE},
    errors::{CryptoError, Result},
    utils::generate_random_bytes,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    Key, XChaCha20Poly1305, XNonce,
};
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Hex-string serde for fixed-size byte arrays.
pub mod hex_array {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize a byte array as a lowercase hex string.
    pub fn serialize<S, const N: usize>(bytes: &[u8; N], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize a byte array from a hex string, checking the length.
    pub fn deserialize<'de, D, const N: usize>(deserializer: D) -> Result<[u8; N], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| serde::de::Error::custom(format!("expected {N} bytes")))
    }
}

/// Hex-string serde for variable-length byte strings.
pub mod hex_vec {
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize bytes as a lowercase hex string.
    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    /// Deserialize bytes from a hex string.
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        hex::decode(&s).map_err(serde::de::Error::custom)
    }
}

/// An authenticated ciphertext: nonce, ciphertext, and detached tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedChunk {
    /// Fresh random nonce, generated per encryption
    #[serde(with = "hex_array")]
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext without the trailing tag
    #[serde(with = "hex_vec")]
    pub ciphertext: Vec<u8>,
    /// Poly1305 authentication tag
    #[serde(with = "hex_array")]
    pub tag: [u8; TAG_SIZE],
}

/// Encrypt a byte string under a derived key.
///
/// A fresh random nonce is drawn per call; reusing a key across chunks is
/// safe because of it. The AAD must be the domain string plus whatever
/// context the chunk is bound to (e.g. its question id).
pub fn encrypt_chunk(key: &[u8; 32], plaintext: &[u8], aad: &[u8]) -> Result<EncryptedChunk> {
    let nonce: [u8; NONCE_SIZE] = generate_random_bytes();
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut combined = cipher
        .encrypt(
            XNonce::from_slice(&nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    // The aead crate appends the tag; store it detached.
    let tag_offset = combined.len() - TAG_SIZE;
    let tag: [u8; TAG_SIZE] = combined[tag_offset..]
        .try_into()
        .map_err(|_| CryptoError::InvalidLength {
            expected: TAG_SIZE,
            actual: combined.len(),
        })?;
    combined.truncate(tag_offset);

    Ok(EncryptedChunk {
        nonce,
        ciphertext: combined,
        tag,
    })
}

/// Decrypt an [`EncryptedChunk`] under a derived key.
///
/// The tag is verified in constant time before any plaintext is produced.
/// A mismatch, wrong key or tampered storage alike, surfaces as the
/// same opaque [`CryptoError::AuthenticationFailed`].
pub fn decrypt_chunk(
    key: &[u8; 32],
    chunk: &EncryptedChunk,
    aad: &[u8],
) -> Result<Zeroizing<Vec<u8>>> {
    let cipher = XChaCha20Poly1305::new(Key::from_slice(key));

    let mut combined = Vec::with_capacity(chunk.ciphertext.len() + TAG_SIZE);
    combined.extend_from_slice(&chunk.ciphertext);
    combined.extend_from_slice(&chunk.tag);

    let plaintext = cipher
        .decrypt(
            XNonce::from_slice(&chunk.nonce),
            Payload {
                msg: &combined,
                aad,
            },
        )
        .map_err(|_| CryptoError::AuthenticationFailed)?;

    Ok(Zeroizing::new(plaintext))
}
