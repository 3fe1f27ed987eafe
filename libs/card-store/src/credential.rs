// Credential slots (part of C4): fixed-size records, AES-GCM-256
// sealed with the device master key, rp-id-hash bound as AAD.
//
// Grounded in `apps/vault/src/ctap/storage.rs`'s
// `store_credential`/`find_credential`/`filter_credential`/
// `count_credentials`, generalized from the teacher's dictionary-keyed
// PDDB records onto the fixed offset-addressed slot array `spec.md`
// §6 lays out bit-exact. `spec.md` gives no cleartext rp-id-hash field
// in the slot layout, only `id`/`ciphertext`/`iv`/`tag`/`sign_count`/
// `valid`; since rp-id-hash is the AEAD's associated data, reading the
// encrypted body requires the caller to already know it (callers
// always derive a lookup from a request bound to a specific relying
// party), while the by-id linear scan itself only ever inspects the
// cleartext `id` field.

use byteorder::{ByteOrder, LittleEndian};
use card_crypto::AeadKey;
use rand_core::{CryptoRng, RngCore};

use crate::flash::Flash;
use crate::header::{MasterKey, StoreError, StoreResult};

pub const CREDENTIALS_OFFSET: usize = 2048;
pub const SLOT_SIZE: usize = 512;

const ID_LEN: usize = 16;
const CIPHERTEXT_LEN: usize = 400;
const IV_LEN: usize = 12;
const TAG_LEN: usize = 16;

const ID_OFF: usize = 0;
const CIPHERTEXT_OFF: usize = ID_OFF + ID_LEN;
const IV_OFF: usize = CIPHERTEXT_OFF + CIPHERTEXT_LEN;
const TAG_OFF: usize = IV_OFF + IV_LEN;
const SIGN_COUNT_OFF: usize = TAG_OFF + TAG_LEN;
const VALID_OFF: usize = SIGN_COUNT_OFF + 4;

const MAX_NAME_LEN: usize = 64;

/// Number of slots the configured flash capacity leaves room for past
/// `CREDENTIALS_OFFSET`, per `spec.md` §6's layout table.
pub fn slot_count(flash_capacity: usize) -> usize {
    flash_capacity.saturating_sub(CREDENTIALS_OFFSET) / SLOT_SIZE
}

fn slot_offset(index: usize) -> usize {
    CREDENTIALS_OFFSET + index * SLOT_SIZE
}

/// A FIDO-style resident credential, per `spec.md` §3.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Credential {
    pub credential_id: [u8; ID_LEN],
    pub rp_id_hash: [u8; 32],
    pub user_id: Vec<u8>,
    pub private_key: [u8; 32],
    pub sign_count: u32,
    pub resident: bool,
    pub rp_id: Option<Vec<u8>>,
    pub user_name: Option<Vec<u8>>,
    pub display_name: Option<Vec<u8>>,
}

fn write_field(buf: &mut Vec<u8>, field: &[u8]) -> StoreResult<()> {
    if field.len() > MAX_NAME_LEN {
        return Err(StoreError::Corrupted);
    }
    buf.push(field.len() as u8);
    buf.extend_from_slice(field);
    Ok(())
}

fn write_optional(buf: &mut Vec<u8>, field: &Option<Vec<u8>>) -> StoreResult<()> {
    write_field(buf, field.as_deref().unwrap_or(&[]))
}

fn read_field(buf: &[u8], cursor: &mut usize) -> StoreResult<Vec<u8>> {
    let len = *buf.get(*cursor).ok_or(StoreError::Corrupted)? as usize;
    *cursor += 1;
    let end = cursor.checked_add(len).ok_or(StoreError::Corrupted)?;
    let field = buf.get(*cursor..end).ok_or(StoreError::Corrupted)?.to_vec();
    *cursor = end;
    Ok(field)
}

fn read_optional(buf: &[u8], cursor: &mut usize) -> StoreResult<Option<Vec<u8>>> {
    let field = read_field(buf, cursor)?;
    Ok(if field.is_empty() { None } else { Some(field) })
}

impl Credential {
    /// Plaintext wire form, `spec.md` §4.2: "serialize the credential
    /// to a plaintext of ≤400 bytes". Fixed-size, zero-padded so the
    /// AEAD ciphertext occupies exactly [`CIPHERTEXT_LEN`] bytes.
    fn serialize(&self) -> StoreResult<[u8; CIPHERTEXT_LEN]> {
        let mut buf = Vec::with_capacity(CIPHERTEXT_LEN);
        buf.extend_from_slice(&self.rp_id_hash);
        write_field(&mut buf, &self.user_id)?;
        buf.extend_from_slice(&self.private_key);
        buf.push(self.resident as u8);
        write_optional(&mut buf, &self.rp_id)?;
        write_optional(&mut buf, &self.user_name)?;
        write_optional(&mut buf, &self.display_name)?;

        if buf.len() > CIPHERTEXT_LEN {
            return Err(StoreError::Corrupted);
        }
        let mut out = [0u8; CIPHERTEXT_LEN];
        out[..buf.len()].copy_from_slice(&buf);
        Ok(out)
    }

    fn deserialize(credential_id: [u8; ID_LEN], sign_count: u32, buf: &[u8; CIPHERTEXT_LEN]) -> StoreResult<Self> {
        let mut cursor = 0usize;
        let mut rp_id_hash = [0u8; 32];
        rp_id_hash.copy_from_slice(buf.get(0..32).ok_or(StoreError::Corrupted)?);
        cursor += 32;

        let user_id = read_field(buf, &mut cursor)?;

        let mut private_key = [0u8; 32];
        private_key.copy_from_slice(buf.get(cursor..cursor + 32).ok_or(StoreError::Corrupted)?);
        cursor += 32;

        let resident = *buf.get(cursor).ok_or(StoreError::Corrupted)? != 0;
        cursor += 1;

        let rp_id = read_optional(buf, &mut cursor)?;
        let user_name = read_optional(buf, &mut cursor)?;
        let display_name = read_optional(buf, &mut cursor)?;

        Ok(Credential {
            credential_id,
            rp_id_hash,
            user_id,
            private_key,
            sign_count,
            resident,
            rp_id,
            user_name,
            display_name,
        })
    }
}

struct RawSlot {
    id: [u8; ID_LEN],
    ciphertext: [u8; CIPHERTEXT_LEN],
    iv: [u8; IV_LEN],
    tag: [u8; TAG_LEN],
    sign_count: u32,
    valid: bool,
}

fn read_slot(flash: &dyn Flash, index: usize) -> StoreResult<RawSlot> {
    let mut buf = [0u8; SLOT_SIZE];
    flash.read(slot_offset(index), &mut buf).map_err(StoreError::Flash)?;

    let mut id = [0u8; ID_LEN];
    id.copy_from_slice(&buf[ID_OFF..ID_OFF + ID_LEN]);
    let mut ciphertext = [0u8; CIPHERTEXT_LEN];
    ciphertext.copy_from_slice(&buf[CIPHERTEXT_OFF..CIPHERTEXT_OFF + CIPHERTEXT_LEN]);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&buf[IV_OFF..IV_OFF + IV_LEN]);
    let mut tag = [0u8; TAG_LEN];
    tag.copy_from_slice(&buf[TAG_OFF..TAG_OFF + TAG_LEN]);
    let sign_count = LittleEndian::read_u32(&buf[SIGN_COUNT_OFF..SIGN_COUNT_OFF + 4]);
    let valid = buf[VALID_OFF] != 0;

    Ok(RawSlot {
        id,
        ciphertext,
        iv,
        tag,
        sign_count,
        valid,
    })
}

fn write_slot(flash: &mut dyn Flash, index: usize, slot: &RawSlot) -> StoreResult<()> {
    let mut buf = [0u8; SLOT_SIZE];
    buf[ID_OFF..ID_OFF + ID_LEN].copy_from_slice(&slot.id);
    buf[CIPHERTEXT_OFF..CIPHERTEXT_OFF + CIPHERTEXT_LEN].copy_from_slice(&slot.ciphertext);
    buf[IV_OFF..IV_OFF + IV_LEN].copy_from_slice(&slot.iv);
    buf[TAG_OFF..TAG_OFF + TAG_LEN].copy_from_slice(&slot.tag);
    LittleEndian::write_u32(&mut buf[SIGN_COUNT_OFF..SIGN_COUNT_OFF + 4], slot.sign_count);
    buf[VALID_OFF] = slot.valid as u8;
    flash.write(slot_offset(index), &buf).map_err(StoreError::Flash)
}

/// `spec.md` §4.2: "Insertion searches linearly for the first `!valid`
/// slot and fails with `full` if none exists."
pub fn insert<R: RngCore + CryptoRng>(
    flash: &mut dyn Flash,
    slots: usize,
    master_key: &MasterKey,
    rng: &mut R,
    credential: &Credential,
) -> StoreResult<()> {
    let free = (0..slots)
        .find(|&i| !read_slot(flash, i).map(|s| s.valid).unwrap_or(false))
        .ok_or(StoreError::Full)?;

    let mut iv = [0u8; IV_LEN];
    rng.fill_bytes(&mut iv);

    let mut plaintext = credential.serialize()?;
    let key = AeadKey::new(&master_key.0);
    let tag = key
        .seal_in_place(&iv, &credential.rp_id_hash, &mut plaintext)
        .map_err(StoreError::Crypto)?;

    write_slot(
        flash,
        free,
        &RawSlot {
            id: credential.credential_id,
            ciphertext: plaintext,
            iv,
            tag,
            sign_count: credential.sign_count,
            valid: true,
        },
    )
}

/// `spec.md` §4.2: lookup by credential-id is a linear scan over the
/// cleartext `id` field; decrypting the match requires the caller's
/// `rp_id_hash` as AAD. A tag mismatch on a valid-flagged record
/// surfaces as [`StoreError::Corrupted`], distinct from
/// [`StoreError::NotFound`].
pub fn find(
    flash: &dyn Flash,
    slots: usize,
    master_key: &MasterKey,
    credential_id: &[u8; ID_LEN],
    rp_id_hash: &[u8; 32],
) -> StoreResult<Credential> {
    for index in 0..slots {
        let slot = read_slot(flash, index)?;
        if !slot.valid || &slot.id != credential_id {
            continue;
        }

        let key = AeadKey::new(&master_key.0);
        let mut plaintext = slot.ciphertext;
        key.open_in_place(&slot.iv, rp_id_hash, &mut plaintext, &slot.tag)
            .map_err(|_| StoreError::Corrupted)?;
        return Credential::deserialize(slot.id, slot.sign_count, &plaintext);
    }
    Err(StoreError::NotFound)
}

/// Clears the `valid` flag and zeroes the slot's own 512-byte span.
/// `spec.md` §4.2 only calls for erasing "the slot's page", and §6
/// places credential slots 2048 bytes into the same 4096-byte erase
/// sector as the header, PIN record, and global counter (offsets 0,
/// 256, 512). An `erase_sector` on a credential's sector would also
/// destroy that shared state; a plain `write` of zeros over just this
/// slot's span clears `valid` without touching its neighbors.
pub fn delete(flash: &mut dyn Flash, slots: usize, credential_id: &[u8; ID_LEN]) -> StoreResult<()> {
    for index in 0..slots {
        let slot = read_slot(flash, index)?;
        if !slot.valid || &slot.id != credential_id {
            continue;
        }

        flash.write(slot_offset(index), &[0u8; SLOT_SIZE]).map_err(StoreError::Flash)?;
        return Ok(());
    }
    Err(StoreError::NotFound)
}

/// `spec.md` §4.2: "Per-credential `sign_count` is separately
/// persisted on successful assertion". Rejects attempts to move the
/// counter backward.
pub fn update_sign_count(
    flash: &mut dyn Flash,
    slots: usize,
    credential_id: &[u8; ID_LEN],
    new_count: u32,
) -> StoreResult<()> {
    for index in 0..slots {
        let mut slot = read_slot(flash, index)?;
        if slot.valid && &slot.id == credential_id {
            if new_count < slot.sign_count {
                return Err(StoreError::Corrupted);
            }
            slot.sign_count = new_count;
            return write_slot(flash, index, &slot);
        }
    }
    Err(StoreError::NotFound)
}

pub fn count(flash: &dyn Flash, slots: usize) -> StoreResult<usize> {
    let mut total = 0;
    for index in 0..slots {
        if read_slot(flash, index)?.valid {
            total += 1;
        }
    }
    Ok(total)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flash::MemoryFlash;
    use card_crypto::Drbg;

    fn rng() -> Drbg {
        Drbg::instantiate(b"credential-test-entropy-pool-32!", b"")
    }

    fn sample(id: u8) -> Credential {
        Credential {
            credential_id: [id; ID_LEN],
            rp_id_hash: [0xAB; 32],
            user_id: vec![1, 2, 3, 4],
            private_key: [0x11; 32],
            sign_count: 0,
            resident: true,
            rp_id: Some(b"example.com".to_vec()),
            user_name: Some(b"alice".to_vec()),
            display_name: None,
        }
    }

    fn flash_with_slots() -> (MemoryFlash, usize) {
        let flash = MemoryFlash::new(8192);
        let slots = slot_count(flash.capacity());
        (flash, slots)
    }

    #[test]
    fn stored_credential_round_trips_through_find() {
        let (mut flash, slots) = flash_with_slots();
        let key = MasterKey([0x42; 32]);
        let mut rng = rng();
        let credential = sample(1);

        insert(&mut flash, slots, &key, &mut rng, &credential).unwrap();
        let found = find(&flash, slots, &key, &credential.credential_id, &credential.rp_id_hash).unwrap();
        assert_eq!(found, credential);
    }

    #[test]
    fn unknown_id_is_not_found() {
        let (flash, slots) = flash_with_slots();
        let key = MasterKey([0x42; 32]);
        let result = find(&flash, slots, &key, &[0xFF; ID_LEN], &[0; 32]);
        assert_eq!(result, Err(StoreError::NotFound));
    }

    #[test]
    fn tampering_with_ciphertext_surfaces_as_corrupted() {
        let (mut flash, slots) = flash_with_slots();
        let key = MasterKey([0x42; 32]);
        let mut rng = rng();
        let credential = sample(2);
        insert(&mut flash, slots, &key, &mut rng, &credential).unwrap();

        let mut byte = [0u8; 1];
        flash.read(CREDENTIALS_OFFSET + CIPHERTEXT_OFF, &mut byte).unwrap();
        byte[0] ^= 0x01;
        flash.write(CREDENTIALS_OFFSET + CIPHERTEXT_OFF, &byte).unwrap();

        let result = find(&flash, slots, &key, &credential.credential_id, &credential.rp_id_hash);
        assert_eq!(result, Err(StoreError::Corrupted));
    }

    #[test]
    fn store_fails_full_when_all_slots_occupied() {
        // One sector's worth of flash past CREDENTIALS_OFFSET: a small,
        // known slot count so exhausting it is cheap to drive.
        let mut flash = MemoryFlash::new(CREDENTIALS_OFFSET + crate::flash::SECTOR_SIZE);
        let slots = slot_count(flash.capacity());
        let key = MasterKey([0x42; 32]);
        let mut rng = rng();

        for i in 0..slots {
            insert(&mut flash, slots, &key, &mut rng, &sample(i as u8)).unwrap();
        }
        let result = insert(&mut flash, slots, &key, &mut rng, &sample(0xFF));
        assert_eq!(result, Err(StoreError::Full));
    }

    #[test]
    fn delete_clears_valid_flag() {
        let (mut flash, slots) = flash_with_slots();
        let key = MasterKey([0x42; 32]);
        let mut rng = rng();
        let credential = sample(3);
        insert(&mut flash, slots, &key, &mut rng, &credential).unwrap();

        delete(&mut flash, slots, &credential.credential_id).unwrap();
        let result = find(&flash, slots, &key, &credential.credential_id, &credential.rp_id_hash);
        assert_eq!(result, Err(StoreError::NotFound));
    }

    #[test]
    fn sign_count_cannot_move_backward() {
        let (mut flash, slots) = flash_with_slots();
        let key = MasterKey([0x42; 32]);
        let mut rng = rng();
        let credential = sample(4);
        insert(&mut flash, slots, &key, &mut rng, &credential).unwrap();

        update_sign_count(&mut flash, slots, &credential.credential_id, 5).unwrap();
        let result = update_sign_count(&mut flash, slots, &credential.credential_id, 3);
        assert_eq!(result, Err(StoreError::Corrupted));
    }
}
