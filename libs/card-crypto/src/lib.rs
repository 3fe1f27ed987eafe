//! Cryptographic primitives consumed by the card applications and the
//! credential store: SHA-256/HMAC/HKDF, AES-GCM-256, ECDSA/ECDH on P-256,
//! a DRBG, and constant-time helpers.
//!
//! Every function here is a pure transform over byte slices — no flash,
//! no transport, no application state. Failures are reported as
//! [`CryptoError`], never as a panic, except where an invariant the
//! caller is responsible for upholding (buffer sizes fixed by the type
//! system) is violated.

mod ct;
mod drbg;
mod ecdh;
mod ecdsa;
mod gcm;
mod hash;

pub use ct::{constant_time_eq, secure_zero};
pub use drbg::Drbg;
pub use ecdh::{EcdhPrivateKey, EcdhPublicKey};
pub use ecdsa::{EcdsaPrivateKey, EcdsaPublicKey, EcdsaSignature};
pub use gcm::{AeadKey, AeadNonce, AeadTag, AES_GCM_KEY_LEN, AES_GCM_NONCE_LEN, AES_GCM_TAG_LEN};
pub use hash::{hkdf_sha256, hmac_sha256, sha256, Sha256Digest};

/// Uniform failure taxonomy for every crypto operation in this crate.
///
/// No operation mutates a caller-owned output buffer beyond what the
/// error variant permits to be observed: `InvalidParam` failures are
/// returned before any output is written, and `Internal` failures never
/// leak partial secret material.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CryptoError {
    /// A caller-supplied parameter (key bytes, point encoding, signature
    /// encoding, AEAD tag) was malformed or failed verification.
    InvalidParam,
    /// An internal failure occurred (entropy source exhausted, curve
    /// arithmetic produced an unexpected point at infinity, and so on).
    Internal,
}

pub type CryptoResult<T> = Result<T, CryptoError>;
