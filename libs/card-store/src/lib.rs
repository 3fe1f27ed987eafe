//! Flash-backed credential store (C3 + C4): the persistent header,
//! PIN-verification record, encrypted credential slots, global
//! signature counter, and device attestation key that sit on top of a
//! block-erasable flash medium.
//!
//! `CredentialStore::mount` is the single entry point: it formats an
//! unformatted (or version-mismatched) flash region exactly once, and
//! thereafter only ever reads back what `format` wrote — see
//! `header.rs` for why that distinction matters.

pub mod attest;
pub mod counter;
pub mod credential;
pub mod flash;
pub mod header;
pub mod pin;

use rand_core::{CryptoRng, RngCore};

pub use attest::AttestationKey;
pub use counter::GlobalCounter;
pub use credential::Credential;
pub use flash::{Flash, FlashError};
pub use header::{MasterKey, StoreError, StoreResult};
pub use pin::{PinError, PinRecord, PinResult};

/// `spec.md` §4.4/§4.5: each application's own PIN keeps 3 retries
/// before lockout. `CredentialStore`'s generic PIN record (the one
/// `spec.md` §6 reserves flash space for) uses the same default.
pub const DEFAULT_PIN_MAX_RETRIES: u8 = 3;

pub struct CredentialStore {
    master_key: MasterKey,
    pin: PinRecord,
    counter: GlobalCounter,
    attestation: AttestationKey,
    slot_count: usize,
}

impl CredentialStore {
    /// Mounts the store backed by `flash`. If the header's magic or
    /// version does not match, the region is treated as unformatted
    /// and [`Self::format`] runs; otherwise the existing header, PIN
    /// record, counter, and attestation key are read back unchanged.
    /// `spec.md` §4.2: "Mount is idempotent on already-formatted
    /// stores; an unreadable header is a fatal initialization error."
    pub fn mount<R: RngCore + CryptoRng>(flash: &mut dyn Flash, rng: &mut R) -> StoreResult<Self> {
        match header::Header::read(flash) {
            Ok(header) => {
                log::info!("card-store: mounting existing store");
                let pin_bytes = Self::read_pin_record(flash)?;
                let pin = PinRecord::from_parts(pin_bytes.0, pin_bytes.1, pin_bytes.2, DEFAULT_PIN_MAX_RETRIES);
                let counter = GlobalCounter::load(flash)?;
                let attestation = AttestationKey::load(flash)?;
                let slot_count = credential::slot_count(flash.capacity());
                Ok(CredentialStore {
                    master_key: header.master_key,
                    pin,
                    counter,
                    attestation,
                    slot_count,
                })
            }
            Err(StoreError::Corrupted) => {
                log::warn!("card-store: header magic/version mismatch, formatting");
                Self::format(flash, rng)
            }
            Err(e) => Err(e),
        }
    }

    /// Zero-erases all configured sectors and writes a fresh header,
    /// PIN record, counter, and attestation key. Only ever called from
    /// [`Self::mount`] on an unformatted store — never on a store
    /// that already mounted successfully, per Design Note §9.
    pub fn format<R: RngCore + CryptoRng>(flash: &mut dyn Flash, rng: &mut R) -> StoreResult<Self> {
        let sectors = flash.capacity() / flash::SECTOR_SIZE;
        for sector in 0..sectors {
            flash.erase_sector(sector * flash::SECTOR_SIZE)?;
        }

        let mut master_key_bytes = [0u8; 32];
        rng.fill_bytes(&mut master_key_bytes);
        let header = header::Header::format(flash, master_key_bytes)?;

        let pin = PinRecord::unset(DEFAULT_PIN_MAX_RETRIES);
        Self::write_pin_record(flash, &pin)?;

        let counter = GlobalCounter::format(flash)?;
        let attestation = AttestationKey::format(flash, rng)?;
        let slot_count = credential::slot_count(flash.capacity());

        log::info!("card-store: formatted, {} credential slots available", slot_count);
        Ok(CredentialStore {
            master_key: header.master_key,
            pin,
            counter,
            attestation,
            slot_count,
        })
    }

    pub fn pin(&self) -> &PinRecord {
        &self.pin
    }

    pub fn set_pin(&mut self, flash: &mut dyn Flash, pin: &[u8]) -> StoreResult<()> {
        self.pin.set(pin);
        Self::write_pin_record(flash, &self.pin)
    }

    pub fn verify_pin(&mut self, flash: &mut dyn Flash, pin: &[u8]) -> PinResult<()> {
        let result = self.pin.verify(pin);
        // Persist regardless of outcome: a mismatch's retry decrement
        // must survive a power cycle exactly as a match's reset does.
        if Self::write_pin_record(flash, &self.pin).is_err() {
            log::error!("card-store: failed to persist PIN record after verify");
        }
        result
    }

    pub fn attestation_key(&self) -> &AttestationKey {
        &self.attestation
    }

    pub fn next_counter(&mut self, flash: &mut dyn Flash) -> StoreResult<u32> {
        self.counter.next(flash)
    }

    pub fn insert_credential<R: RngCore + CryptoRng>(
        &self,
        flash: &mut dyn Flash,
        rng: &mut R,
        credential: &Credential,
    ) -> StoreResult<()> {
        credential::insert(flash, self.slot_count, &self.master_key, rng, credential)
    }

    pub fn find_credential(
        &self,
        flash: &dyn Flash,
        credential_id: &[u8; 16],
        rp_id_hash: &[u8; 32],
    ) -> StoreResult<Credential> {
        credential::find(flash, self.slot_count, &self.master_key, credential_id, rp_id_hash)
    }

    pub fn delete_credential(&self, flash: &mut dyn Flash, credential_id: &[u8; 16]) -> StoreResult<()> {
        credential::delete(flash, self.slot_count, credential_id)
    }

    pub fn update_sign_count(&self, flash: &mut dyn Flash, credential_id: &[u8; 16], new_count: u32) -> StoreResult<()> {
        credential::update_sign_count(flash, self.slot_count, credential_id, new_count)
    }

    pub fn credential_count(&self, flash: &dyn Flash) -> StoreResult<usize> {
        credential::count(flash, self.slot_count)
    }

    fn read_pin_record(flash: &dyn Flash) -> StoreResult<([u8; 32], u8, bool)> {
        let mut buf = [0u8; pin_layout::SIZE];
        flash.read(pin_layout::OFFSET, &mut buf)?;
        let mut hash = [0u8; 32];
        hash.copy_from_slice(&buf[0..32]);
        let retries = buf[32];
        let set = buf[33] != 0;
        Ok((hash, retries, set))
    }

    fn write_pin_record(flash: &mut dyn Flash, pin: &PinRecord) -> StoreResult<()> {
        let (hash, retries, set) = pin.to_bytes();
        let mut buf = [0u8; pin_layout::SIZE];
        buf[0..32].copy_from_slice(&hash);
        buf[32] = retries;
        buf[33] = set as u8;
        flash.write(pin_layout::OFFSET, &buf)?;
        Ok(())
    }
}

mod pin_layout {
    pub const OFFSET: usize = 256;
    pub const SIZE: usize = 256;
}
