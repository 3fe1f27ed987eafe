// AES-GCM-256 AEAD.
//
// The teacher's `apps/vault/libraries/crypto/src/aes256.rs` caches the AES
// round-key schedule in an `EncryptionKey`/`DecryptionKey` pair built over
// the raw `aes` block cipher; `spec.md` requires a full AEAD (fixed 12-byte
// nonce, 16-byte tag) rather than bare ECB blocks, so we generalize that
// "cache the expanded key once" shape onto `aes_gcm::Aes256Gcm`, which is
// the RustCrypto sibling of the teacher's own `aes`/`aes-gcm-siv` choices
// (services/root-keys/Cargo.toml).

use aes_gcm::aead::{AeadInPlace, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce, Tag};

use crate::{CryptoError, CryptoResult};

pub const AES_GCM_KEY_LEN: usize = 32;
pub const AES_GCM_NONCE_LEN: usize = 12;
pub const AES_GCM_TAG_LEN: usize = 16;

pub type AeadNonce = [u8; AES_GCM_NONCE_LEN];
pub type AeadTag = [u8; AES_GCM_TAG_LEN];

/// Caches the AES-256 round-key schedule so repeated encrypt/decrypt calls
/// with the same key do not re-expand it, the same reason the teacher's
/// `EncryptionKey`/`DecryptionKey` types exist.
pub struct AeadKey {
    cipher: Aes256Gcm,
}

impl AeadKey {
    pub fn new(key: &[u8; AES_GCM_KEY_LEN]) -> Self {
        AeadKey {
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Encrypts `plaintext` in place, returning the authentication tag.
    /// `aad` is authenticated but not encrypted.
    pub fn seal_in_place(
        &self,
        nonce: &AeadNonce,
        aad: &[u8],
        plaintext: &mut [u8],
    ) -> CryptoResult<AeadTag> {
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(nonce), aad, plaintext)
            .map_err(|_| CryptoError::Internal)?;
        let mut out = [0u8; AES_GCM_TAG_LEN];
        out.copy_from_slice(tag.as_slice());
        Ok(out)
    }

    /// Decrypts `ciphertext` in place and verifies `tag`.
    ///
    /// On tag mismatch, `ciphertext` is left in its (unintelligible,
    /// still-encrypted-looking) post-decrypt state per the underlying
    /// cipher's contract, and the caller must treat the buffer as
    /// unusable — the distinguishing `AuthenticationFailed` case is
    /// reported as [`CryptoError::InvalidParam`], distinct from a
    /// malformed-parameter failure that occurs before any output is
    /// produced.
    pub fn open_in_place(
        &self,
        nonce: &AeadNonce,
        aad: &[u8],
        ciphertext: &mut [u8],
        tag: &AeadTag,
    ) -> CryptoResult<()> {
        self.cipher
            .decrypt_in_place_detached(Nonce::from_slice(nonce), aad, ciphertext, Tag::from_slice(tag))
            .map_err(|_| CryptoError::InvalidParam)
    }
}
