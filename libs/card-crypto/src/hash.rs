// SHA-256, HMAC-SHA-256, HKDF-SHA-256.
//
// Grounded on services/root-keys/Cargo.toml's own choice of `sha2`/`digest`
// for exactly this purpose.

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

use crate::{CryptoError, CryptoResult};

pub type Sha256Digest = [u8; 32];

/// SHA-256 of `data`.
pub fn sha256(data: &[u8]) -> Sha256Digest {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// HMAC-SHA-256 over `data` with `key`, producing a 32-byte MAC.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> CryptoResult<Sha256Digest> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).map_err(|_| CryptoError::InvalidParam)?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().into())
}

/// HKDF-SHA-256 Extract-then-Expand into `out`, which may be any length
/// HKDF permits (up to 255 * 32 bytes).
pub fn hkdf_sha256(salt: Option<&[u8]>, ikm: &[u8], info: &[u8], out: &mut [u8]) -> CryptoResult<()> {
    let hk = Hkdf::<Sha256>::new(salt, ikm);
    hk.expand(info, out).map_err(|_| CryptoError::InvalidParam)
}
