// ECDH key agreement on SECP256R1.
//
// Grounded on apps/vault/libraries/crypto/src/ecdh.rs's `SecKey`/`PubKey`
// wrapper over `p256::ecdh::EphemeralSecret`/`PublicKey` and its
// `exchange_x_sha256` helper. The teacher only ever consumes an ephemeral
// secret once; PIV/OpenPGP's ECDH-based key unwrap (spec.md §4.3) needs a
// private key that survives across multiple GENERAL AUTHENTICATE/PSO
// exchanges, so the secret here is a durable `SecretKey` rather than an
// `EphemeralSecret`.

use p256::ecdh::diffie_hellman;
use p256::elliptic_curve::sec1::FromEncodedPoint;
use p256::{AffinePoint, EncodedPoint, PublicKey, SecretKey};
use rand_core::{CryptoRng, RngCore};

use crate::{sha256, CryptoError, CryptoResult, Sha256Digest};

const SCALAR_LEN: usize = 32;
const UNCOMPRESSED_POINT_LEN: usize = 1 + 2 * SCALAR_LEN;

pub struct EcdhPrivateKey {
    key: SecretKey,
}

impl EcdhPrivateKey {
    pub fn generate<R: RngCore + CryptoRng>(rng: &mut R) -> Self {
        EcdhPrivateKey {
            key: SecretKey::random(rng),
        }
    }

    pub fn public_key(&self) -> EcdhPublicKey {
        EcdhPublicKey {
            key: self.key.public_key(),
        }
    }

    /// Computes the shared secret with `their_public`, per `spec.md`
    /// §4.1: SHA-256 of the shared point's X coordinate, not the raw
    /// coordinate itself.
    pub fn exchange_x_sha256(&self, their_public: &EcdhPublicKey) -> Sha256Digest {
        let shared = diffie_hellman(self.key.to_nonzero_scalar(), their_public.key.as_affine());
        sha256(shared.raw_secret_bytes().as_slice())
    }

    pub fn to_bytes(&self) -> [u8; SCALAR_LEN] {
        let mut out = [0u8; SCALAR_LEN];
        out.copy_from_slice(self.key.to_bytes().as_slice());
        out
    }

    pub fn from_bytes(bytes: &[u8; SCALAR_LEN]) -> CryptoResult<Self> {
        SecretKey::from_bytes(bytes.into())
            .map(|key| EcdhPrivateKey { key })
            .map_err(|_| CryptoError::InvalidParam)
    }
}

#[derive(Clone)]
pub struct EcdhPublicKey {
    key: PublicKey,
}

impl EcdhPublicKey {
    pub fn from_uncompressed(bytes: &[u8]) -> CryptoResult<Self> {
        PublicKey::from_sec1_bytes(bytes)
            .map(|key| EcdhPublicKey { key })
            .map_err(|_| CryptoError::InvalidParam)
    }

    pub fn from_coordinates(x: &[u8; SCALAR_LEN], y: &[u8; SCALAR_LEN]) -> CryptoResult<Self> {
        let encoded = EncodedPoint::from_affine_coordinates(x.into(), y.into(), false);
        let maybe_affine = AffinePoint::from_encoded_point(&encoded);
        if bool::from(maybe_affine.is_none()) {
            return Err(CryptoError::InvalidParam);
        }
        Option::from(PublicKey::from_encoded_point(&encoded))
            .map(|key| EcdhPublicKey { key })
            .ok_or(CryptoError::InvalidParam)
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

    pub fn to_uncompressed(&self) -> [u8; UNCOMPRESSED_POINT_LEN] {
        let mut out = [0u8; UNCOMPRESSED_POINT_LEN];
        out.copy_from_slice(self.key.to_encoded_point(false).as_bytes());
        out
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::drbg::Drbg;

    fn rng() -> Drbg {
        Drbg::instantiate(b"ecdh-test-entropy-pool-32-bytes!", b"")
    }

    #[test]
    fn both_sides_derive_the_same_shared_secret() {
        let mut rng = rng();
        let alice = EcdhPrivateKey::generate(&mut rng);
        let bob = EcdhPrivateKey::generate(&mut rng);

        let from_alice = alice.exchange_x_sha256(&bob.public_key());
        let from_bob = bob.exchange_x_sha256(&alice.public_key());
        assert_eq!(from_alice, from_bob);
    }

    #[test]
    fn different_peers_derive_different_secrets() {
        let mut rng = rng();
        let alice = EcdhPrivateKey::generate(&mut rng);
        let bob = EcdhPrivateKey::generate(&mut rng);
        let carol = EcdhPrivateKey::generate(&mut rng);

        let with_bob = alice.exchange_x_sha256(&bob.public_key());
        let with_carol = alice.exchange_x_sha256(&carol.public_key());
        assert_ne!(with_bob, with_carol);
    }

    #[test]
    fn public_key_roundtrips_through_xy_bytes() {
        let mut rng = rng();
        let sk = EcdhPrivateKey::generate(&mut rng);
        let pk = sk.public_key();
        let xy = pk.to_xy_bytes();
        let mut x = [0u8; 32];
        let mut y = [0u8; 32];
        x.copy_from_slice(&xy[..32]);
        y.copy_from_slice(&xy[32..]);
        let rebuilt = EcdhPublicKey::from_coordinates(&x, &y).unwrap();
        assert_eq!(rebuilt.to_xy_bytes(), xy);
    }

    #[test]
    fn private_key_roundtrips_through_bytes() {
        let mut rng = rng();
        let sk = EcdhPrivateKey::generate(&mut rng);
        let bytes = sk.to_bytes();
        let sk2 = EcdhPrivateKey::from_bytes(&bytes).unwrap();
        assert_eq!(sk2.to_bytes(), bytes);
    }
}
