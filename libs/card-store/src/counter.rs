// Global monotonic signature counter (part of C4).
//
// Grounded in `apps/vault/src/ctap/storage.rs`'s
// `global_signature_counter`/`incr_global_signature_counter`: read,
// wrapping-increment, persist, then return the new value to the
// caller — `spec.md` §4.2 requires the persist to land *before* the
// value is handed back, which the teacher's own code achieves by
// syncing the backing store before returning. Here there is no
// separate sync step; `flash.write` is the durable point.

use byteorder::{ByteOrder, LittleEndian};

use crate::flash::Flash;
use crate::header::{StoreError, StoreResult};

pub const COUNTER_OFFSET: usize = 512;
pub const COUNTER_SIZE: usize = 256;

pub struct GlobalCounter {
    value: u32,
}

impl GlobalCounter {
    pub fn load(flash: &dyn Flash) -> StoreResult<Self> {
        let mut buf = [0u8; 4];
        flash.read(COUNTER_OFFSET, &mut buf).map_err(StoreError::Flash)?;
        Ok(GlobalCounter {
            value: LittleEndian::read_u32(&buf),
        })
    }

    pub fn format(flash: &mut dyn Flash) -> StoreResult<Self> {
        let counter = GlobalCounter { value: 0 };
        counter.persist(flash)?;
        Ok(counter)
    }

    pub fn value(&self) -> u32 {
        self.value
    }

    /// `spec.md` invariant 5: strictly monotone, and durable before
    /// the new value is observed by the caller.
    pub fn next(&mut self, flash: &mut dyn Flash) -> StoreResult<u32> {
        self.value = self.value.wrapping_add(1);
        self.persist(flash)?;
        Ok(self.value)
    }

    fn persist(&self, flash: &mut dyn Flash) -> StoreResult<()> {
        let mut buf = [0u8; COUNTER_SIZE];
        LittleEndian::write_u32(&mut buf[0..4], self.value);
        flash.write(COUNTER_OFFSET, &buf).map_err(StoreError::Flash)
    }
}
