// Device attestation key (part of C4).
//
// A single P-256 private scalar persisted at a fixed offset, generated
// once at format time per `spec.md` §4.2 and Design Note §9's
// once-only discipline: `format` writes it, `load` only ever reads it
// back, there is no regenerate-on-mount path.

use card_crypto::EcdsaPrivateKey;
use rand_core::{CryptoRng, RngCore};

use crate::flash::Flash;
use crate::header::{StoreError, StoreResult};

pub const ATTESTATION_OFFSET: usize = 768;
pub const ATTESTATION_SIZE: usize = 256;
const KEY_LEN: usize = 32;

pub struct AttestationKey {
    private_key: EcdsaPrivateKey,
}

impl AttestationKey {
    pub fn load(flash: &dyn Flash) -> StoreResult<Self> {
        let mut buf = [0u8; KEY_LEN];
        flash.read(ATTESTATION_OFFSET, &mut buf).map_err(StoreError::Flash)?;
        let private_key = EcdsaPrivateKey::from_bytes(&buf)?;
        Ok(AttestationKey { private_key })
    }

    pub fn format<R: RngCore + CryptoRng>(flash: &mut dyn Flash, rng: &mut R) -> StoreResult<Self> {
        let private_key = EcdsaPrivateKey::generate(rng);
        let mut buf = [0u8; ATTESTATION_SIZE];
        buf[..KEY_LEN].copy_from_slice(&private_key.to_bytes());
        flash.write(ATTESTATION_OFFSET, &buf).map_err(StoreError::Flash)?;
        Ok(AttestationKey { private_key })
    }

    /// Borrowed, never exported off-device per `spec.md` §4.2.
    pub fn private_key(&self) -> &EcdsaPrivateKey {
        &self.private_key
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flash::MemoryFlash;
    use card_crypto::sha256;

    fn rng() -> card_crypto::Drbg {
        card_crypto::Drbg::instantiate(b"attest-test-entropy-pool-32byte!", b"")
    }

    #[test]
    fn format_then_load_uses_the_same_key() {
        let mut flash = MemoryFlash::new(4096);
        let formatted = AttestationKey::format(&mut flash, &mut rng()).unwrap();
        let digest = sha256(b"attestation challenge");
        let sig = formatted.private_key().sign_deterministic(&digest);

        let loaded = AttestationKey::load(&flash).unwrap();
        assert!(loaded.private_key().public_key().verify(&digest, &sig));
    }
}
