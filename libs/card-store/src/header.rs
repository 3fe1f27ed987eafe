// Persistent header: magic, version, device master key (C4).
//
// Grounded in `apps/vault/src/ctap/storage.rs`'s `init()`, which
// generates the master encryption/HMAC keys and writes them into the
// PDDB the first time it runs and leaves them alone afterward. Design
// Note §9 flags that the teacher's own code regenerates its master key
// from the RNG on *every* mount rather than persisting it once at
// format time; `Header::mount` below is written to make that mistake
// structurally impossible: key generation only happens inside
// `format()`, never in `mount()`.

use byteorder::{BigEndian, ByteOrder};
use card_crypto::CryptoError;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::flash::{Flash, FlashError};

pub const HEADER_OFFSET: usize = 0;
pub const HEADER_SIZE: usize = 256;

/// `spec.md` §6: `uint32 magic=0x46494432 "FID2"`.
pub const MAGIC: u32 = 0x4649_4432;
pub const VERSION: u32 = 1;

const MASTER_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    Flash(FlashError),
    Corrupted,
    Crypto(CryptoError),
    NotFound,
    Full,
}

impl From<FlashError> for StoreError {
    fn from(e: FlashError) -> Self {
        StoreError::Flash(e)
    }
}

impl From<CryptoError> for StoreError {
    fn from(e: CryptoError) -> Self {
        StoreError::Crypto(e)
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// The device master key, used by [`crate::credential`] to AEAD-encrypt
/// credential records. Zeroed on drop; never serialized anywhere but
/// the header's fixed on-flash offset.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(pub [u8; MASTER_KEY_LEN]);

pub struct Header {
    pub master_key: MasterKey,
}

impl Header {
    /// Reads the header at its fixed offset and validates magic and
    /// version. A magic/version mismatch is reported as
    /// [`StoreError::Corrupted`]; callers that want the
    /// format-if-missing behavior of `spec.md` §4.2 should catch that
    /// and call [`Header::format`].
    pub fn read(flash: &dyn Flash) -> StoreResult<Header> {
        let mut buf = [0u8; HEADER_SIZE];
        flash.read(HEADER_OFFSET, &mut buf)?;

        let magic = BigEndian::read_u32(&buf[0..4]);
        let version = BigEndian::read_u32(&buf[4..8]);
        if magic != MAGIC || version != VERSION {
            return Err(StoreError::Corrupted);
        }

        let mut master_key = [0u8; MASTER_KEY_LEN];
        master_key.copy_from_slice(&buf[8..8 + MASTER_KEY_LEN]);
        Ok(Header {
            master_key: MasterKey(master_key),
        })
    }

    /// Writes a fresh header with a freshly generated master key. Only
    /// ever called from [`crate::CredentialStore::format`], never from
    /// a plain mount of an already-formatted store.
    pub fn format(flash: &mut dyn Flash, master_key: [u8; MASTER_KEY_LEN]) -> StoreResult<Header> {
        let mut buf = [0u8; HEADER_SIZE];
        BigEndian::write_u32(&mut buf[0..4], MAGIC);
        BigEndian::write_u32(&mut buf[4..8], VERSION);
        buf[8..8 + MASTER_KEY_LEN].copy_from_slice(&master_key);
        // Remaining bytes are reserved padding, left at zero.

        flash.write(HEADER_OFFSET, &buf)?;
        Ok(Header {
            master_key: MasterKey(master_key),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::flash::MemoryFlash;

    #[test]
    fn unformatted_flash_reads_as_corrupted() {
        let flash = MemoryFlash::new(4096);
        assert_eq!(Header::read(&flash), Err(StoreError::Corrupted));
    }

    #[test]
    fn format_then_read_round_trips_master_key() {
        let mut flash = MemoryFlash::new(4096);
        let key = [0x5A; MASTER_KEY_LEN];
        Header::format(&mut flash, key).unwrap();
        let header = Header::read(&flash).unwrap();
        assert_eq!(header.master_key.0, key);
    }

    #[test]
    fn wrong_version_is_corrupted() {
        let mut flash = MemoryFlash::new(4096);
        let mut buf = [0u8; HEADER_SIZE];
        BigEndian::write_u32(&mut buf[0..4], MAGIC);
        BigEndian::write_u32(&mut buf[4..8], VERSION + 1);
        flash.write(HEADER_OFFSET, &buf).unwrap();
        assert_eq!(Header::read(&flash), Err(StoreError::Corrupted));
    }
}
