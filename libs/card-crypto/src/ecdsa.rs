// ECDSA on SECP256R1.
//
// Carried forward from apps/vault/libraries/crypto/src/ecdsa.rs: the
// `SecKey`/`PubKey` wrapper shape over `p256::ecdsa`, deterministic
// RFC 6979 signing, and uncompressed-point public key encoding. The
// teacher encodes signatures as ASN.1 DER; spec.md fixes a flat
// `r||s`, 64-byte, big-endian encoding instead, so that part is
// rewritten rather than carried over.

use p256::ecdsa::signature::{RandomizedSigner, Signer, Verifier};
use p256::ecdsa::{Signature as P256Signature, SigningKey, VerifyingKey};
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::{AffinePoint, EncodedPoint, FieldBytes};
use rand_core::{CryptoRng, RngCore};

use crate::{CryptoError, CryptoResult};

const SCALAR_LEN: usize = 32;
/// Uncompressed SEC1 point: `0x04 || X || Y`.
const UNCOMPRESSED_POINT_LEN: usize = 1 + 2 * SCALAR_LEN;

pub struct EcdsaPrivateKey {
    key: SigningKey,
}

impl EcdsaPrivateKey {
    /// Generates a fresh P-256 keypair from a cryptographically secure
    /// source (the DRBG, or the platform RNG during tests).
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        EcdsaPrivateKey {
            key: SigningKey::random(rng),
        }
    }

    pub fn public_key(&self) -> EcdsaPublicKey {
        EcdsaPublicKey {
            key: VerifyingKey::from(&self.key),
        }
    }

    /// Deterministic ECDSA signing per RFC 6979, the spec's preferred
    /// mode. `msg` is the 32-byte digest to sign, not the original
    /// message — callers hash with [`crate::sha256`] first.
    pub fn sign_deterministic(&self, msg_digest: &[u8; 32]) -> EcdsaSignature {
        let sig: P256Signature = self.key.sign(msg_digest);
        EcdsaSignature { sig }
    }

    /// Randomized ECDSA signing, for callers that supply their own
    /// per-signature randomization rather than relying on RFC 6979.
    pub fn sign_randomized<R: RngCore + CryptoRng>(
        &self,
        rng: &mut R,
        msg_digest: &[u8; 32],
    ) -> EcdsaSignature {
        let sig: P256Signature = self.key.sign_with_rng(rng, msg_digest);
        EcdsaSignature { sig }
    }

    pub fn to_bytes(&self) -> [u8; SCALAR_LEN] {
        let mut out = [0u8; SCALAR_LEN];
        out.copy_from_slice(self.key.to_bytes().as_slice());
        out
    }

    pub fn from_bytes(bytes: &[u8; SCALAR_LEN]) -> CryptoResult<Self> {
        SigningKey::from_bytes(bytes.into())
            .map(|key| EcdsaPrivateKey { key })
            .map_err(|_| CryptoError::InvalidParam)
    }
}

#[derive(Clone)]
pub struct EcdsaPublicKey {
    key: VerifyingKey,
}

impl EcdsaPublicKey {
    /// Parses an uncompressed SEC1 point (`04 || X || Y`, 65 bytes).
    pub fn from_uncompressed(bytes: &[u8]) -> CryptoResult<Self> {
        VerifyingKey::from_sec1_bytes(bytes)
            .map(|key| EcdsaPublicKey { key })
            .map_err(|_| CryptoError::InvalidParam)
    }

    pub fn from_coordinates(x: &[u8; SCALAR_LEN], y: &[u8; SCALAR_LEN]) -> CryptoResult<Self> {
        let encoded = EncodedPoint::from_affine_coordinates(x.into(), y.into(), false);
        let maybe_affine = AffinePoint::from_encoded_point(&encoded);
        if bool::from(maybe_affine.is_none()) {
            return Err(CryptoError::InvalidParam);
        }
        VerifyingKey::from_encoded_point(&encoded).map_err(|_| CryptoError::InvalidParam).map(|key| EcdsaPublicKey { key })
    }

    /// `spec.md` §4.1's public-key encoding: uncompressed affine `X||Y`,
    /// 64 bytes, no leading `0x04` marker.
    pub fn to_xy_bytes(&self) -> [u8; 2 * SCALAR_LEN] {
        let encoded = self.key.to_encoded_point(false);
        let mut out = [0u8; 2 * SCALAR_LEN];
        out[..SCALAR_LEN].copy_from_slice(encoded.x().expect("uncompressed point has x").as_slice());
        out[SCALAR_LEN..].copy_from_slice(encoded.y().expect("uncompressed point has y").as_slice());
        out
    }

    /// Uncompressed SEC1 encoding with the `0x04` marker, 65 bytes, used
    /// by callers that need the point in the wire form a relying party
    /// expects rather than the spec's bare `X||Y`.
    pub fn to_uncompressed(&self) -> [u8; UNCOMPRESSED_POINT_LEN] {
        let mut out = [0u8; UNCOMPRESSED_POINT_LEN];
        out.copy_from_slice(self.key.to_encoded_point(false).as_bytes());
        out
    }

    /// Verifies `sig` over the 32-byte message digest.
    pub fn verify(&self, msg_digest: &[u8; 32], sig: &EcdsaSignature) -> bool {
        self.key.verify(msg_digest, &sig.sig).is_ok()
    }
}

pub struct EcdsaSignature {
    sig: P256Signature,
}

impl EcdsaSignature {
    /// `spec.md` §4.1's signature encoding: `r||s`, 64 bytes, big-endian,
    /// zero-padded.
    pub fn to_bytes(&self) -> [u8; 2 * SCALAR_LEN] {
        let mut out = [0u8; 2 * SCALAR_LEN];
        out[..SCALAR_LEN].copy_from_slice(self.sig.r().to_bytes().as_slice());
        out[SCALAR_LEN..].copy_from_slice(self.sig.s().to_bytes().as_slice());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != 2 * SCALAR_LEN {
            return Err(CryptoError::InvalidParam);
        }
        let r = *FieldBytes::from_slice(&bytes[..SCALAR_LEN]);
        let s = *FieldBytes::from_slice(&bytes[SCALAR_LEN..]);
        let sig = P256Signature::from_scalars(r, s).map_err(|_| CryptoError::InvalidParam)?;
        Ok(EcdsaSignature { sig })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drbg::Drbg;

    fn rng() -> Drbg {
        Drbg::instantiate(b"ecdsa-test-entropy-pool-32bytes!", b"")
    }

    #[test]
    fn generated_keypair_signs_and_verifies() {
        let mut rng = rng();
        let sk = EcdsaPrivateKey::generate(&mut rng);
        let pk = sk.public_key();
        let digest = crate::sha256(b"message to sign");
        let sig = sk.sign_deterministic(&digest);
        assert!(pk.verify(&digest, &sig));
    }

    #[test]
    fn public_key_roundtrips_through_xy_bytes() {
        let mut rng = rng();
        let sk = EcdsaPrivateKey::generate(&mut rng);
        let pk = sk.public_key();
        let xy = pk.to_xy_bytes();
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(&xy[..32]);
        y.copy_from_slice(&xy[32..]);
        let rebuilt = EcdsaPublicKey::from_coordinates(&x, &y).unwrap();
        assert_eq!(rebuilt.to_xy_bytes(), xy);
    }

    #[test]
    fn private_key_roundtrips_through_bytes() {
        let mut rng = rng();
        let sk = EcdsaPrivateKey::generate(&mut rng);
        let bytes = sk.to_bytes();
        let sk2 = EcdsaPrivateKey::from_bytes(&bytes).unwrap();
        assert_eq!(sk2.to_bytes(), bytes);
    }

    #[test]
    fn zero_scalar_is_not_a_valid_private_key() {
        let bytes = [0u8; 32];
        assert!(EcdsaPrivateKey::from_bytes(&bytes).is_err());
    }

    #[test]
    fn tampered_signature_fails_verification() {
        let mut rng = rng();
        let sk = EcdsaPrivateKey::generate(&mut rng);
        let pk = sk.public_key();
        let digest = crate::sha256(b"message");
        let sig = sk.sign_deterministic(&digest);
        let mut bytes = sig.to_bytes();
        bytes[0] ^= 0x01;
        let tampered = EcdsaSignature::from_bytes(&bytes).unwrap();
        assert!(!pk.verify(&digest, &tampered));
    }

    #[test]
    fn deterministic_signing_is_repeatable() {
        let sk = EcdsaPrivateKey::from_bytes(&[0x11; 32]).unwrap();
        let digest = crate::sha256(b"fixed message");
        let sig1 = sk.sign_deterministic(&digest);
        let sig2 = sk.sign_deterministic(&digest);
        assert_eq!(sig1.to_bytes(), sig2.to_bytes());
    }
}
