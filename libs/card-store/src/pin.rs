// PIN verification record (part of C4).
//
// Grounded in `apps/vault/src/ctap/storage.rs`'s
// `pin_retries`/`decr_pin_retries`/`reset_pin_retries`/`set_pin_hash`
// quartet: a monotone retry counter that resets to its maximum on
// success and only ever decrements (never below zero) on mismatch.
// `PinRecord` is deliberately generic over the retry maximum rather
// than hardcoding one, since PIV and OpenPGP each keep their own PIN
// records (and OpenPGP keeps two) on top of this same building block.

use card_crypto::{constant_time_eq, sha256, Sha256Digest};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinError {
    NotSet,
    Blocked,
    Mismatch,
    InvalidLength,
}

pub type PinResult<T> = Result<T, PinError>;

#[derive(Clone, Copy)]
pub struct PinRecord {
    hash: Sha256Digest,
    retries: u8,
    max_retries: u8,
    set: bool,
}

impl PinRecord {
    /// A freshly formatted record: unset, retries at their maximum.
    pub fn unset(max_retries: u8) -> Self {
        PinRecord {
            hash: [0u8; 32],
            retries: max_retries,
            max_retries,
            set: false,
        }
    }

    pub fn is_set(&self) -> bool {
        self.set
    }

    pub fn retries_remaining(&self) -> u8 {
        self.retries
    }

    /// `spec.md` §4.2: stores SHA-256(pin), resets retries to max,
    /// flips `set = true`. Bounds-checking the PIN's length is the
    /// caller's responsibility (PIV and OpenPGP each impose their own
    /// stricter minima, `spec.md` §4.4/§4.5).
    pub fn set(&mut self, pin: &[u8]) {
        self.hash = sha256(pin);
        self.retries = self.max_retries;
        self.set = true;
    }

    /// `spec.md` §4.2/invariant 1: a blocked record (`retries == 0`)
    /// rejects every attempt without mutating itself. A mismatch
    /// decrements retries by exactly one; a match restores retries to
    /// the maximum.
    pub fn verify(&mut self, pin: &[u8]) -> PinResult<()> {
        if !self.set {
            return Err(PinError::NotSet);
        }
        if self.retries == 0 {
            return Err(PinError::Blocked);
        }
        if constant_time_eq(&self.hash, &sha256(pin)) {
            self.retries = self.max_retries;
            Ok(())
        } else {
            self.retries -= 1;
            Err(PinError::Mismatch)
        }
    }

    /// Factory reset: clears the hash, restores retries to maximum,
    /// marks unset.
    pub fn reset(&mut self) {
        *self = PinRecord::unset(self.max_retries);
    }

    pub(crate) fn to_bytes(self) -> ([u8; 32], u8, bool) {
        (self.hash, self.retries, self.set)
    }

    pub(crate) fn from_parts(hash: [u8; 32], retries: u8, set: bool, max_retries: u8) -> Self {
        PinRecord {
            hash,
            retries,
            max_retries,
            set,
        }
    }
}
