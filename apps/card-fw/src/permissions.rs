// Permissions (C9): a process-wide capability bitmap bound to an RP
// identity hash, consumed by an upstream CTAP-style authenticator
// (`spec.md` §4.7).
//
// Grounded in `apps/vault/src/ctap/timed_permission.rs`'s
// `U2fUserPresenceState`: a single piece of process-wide state,
// installed once, consulted on every guarded operation, and cleared
// wholesale rather than bit-by-bit. `spec.md` §4.7 fixes a static
// bitmap rather than the teacher's time-boxed grant, so the "expiry"
// half of that pattern doesn't carry over; `bitflags` (already a
// dependency across the teacher's own `services/*` crates) replaces
// the teacher's bespoke enum for the bitmap itself.

use bitflags::bitflags;

bitflags! {
    /// `spec.md` §3's `{MC, GA, CM, BE, LBW, ACFG}` permission bits.
    pub struct Permission: u8 {
        /// MakeCredential.
        const MC = 0b0000_0001;
        /// GetAssertion.
        const GA = 0b0000_0010;
        /// CredentialManagement.
        const CM = 0b0000_0100;
        /// BioEnrollment.
        const BE = 0b0000_1000;
        /// LargeBlobWrite.
        const LBW = 0b0001_0000;
        /// AuthenticatorConfig.
        const ACFG = 0b0010_0000;
    }
}

/// Bits whose grant is additionally scoped to a specific relying party
/// (`spec.md` §4.7: "for the MC and GA bits, the bound rp-id-hash (if
/// any) equals the supplied one").
fn rp_scoped() -> Permission {
    Permission::MC | Permission::GA
}

/// The installed capability, or none if no `set()` has run since the
/// last `clear()`/power-off/logout.
#[derive(Default)]
pub struct Permissions {
    granted: Option<Grant>,
}

struct Grant {
    bitmap: Permission,
    rp_id_hash: Option<[u8; 32]>,
}

impl Permissions {
    pub fn new() -> Self {
        Permissions { granted: None }
    }

    /// Installs a fresh capability, replacing any prior grant.
    pub fn set(&mut self, bitmap: Permission, rp_id_hash: Option<[u8; 32]>) {
        self.granted = Some(Grant { bitmap, rp_id_hash });
    }

    /// `spec.md` §4.7: true iff `permission` is granted, and for
    /// `MC`/`GA` only if the bound RP (if any) matches `rp_id_hash`.
    pub fn check(&self, permission: Permission, rp_id_hash: &[u8; 32]) -> bool {
        let grant = match &self.granted {
            Some(grant) => grant,
            None => return false,
        };
        if !grant.bitmap.contains(permission) {
            return false;
        }
        if !(permission & rp_scoped()).is_empty() {
            if let Some(bound) = grant.rp_id_hash {
                return bound == *rp_id_hash;
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.granted = None;
    }

    pub fn is_set(&self) -> bool {
        self.granted.is_some()
    }
}
