// Constant-time comparison and secure erase.
//
// Grounded on the teacher's use of `subtle` (apps/vault/Cargo.toml:
// `subtle = { version = "2.5.0", features = ["core_hint_black_box"] }`)
// and `zeroize` (services/root-keys/Cargo.toml) for exactly this purpose.

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// Compares two byte slices in constant time over their full declared
/// length, independent of where the first mismatching byte occurs.
///
/// Returns `false` whenever the lengths differ, without inspecting
/// contents beyond the lengths themselves (length is not a secret here:
/// every caller compares fixed-size buffers).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Overwrites a secret buffer with zeroes in a way the compiler cannot
/// optimize away, matching the teacher's reliance on `zeroize` rather
/// than a plain loop for this purpose.
pub fn secure_zero(buf: &mut [u8]) {
    buf.zeroize();
}
