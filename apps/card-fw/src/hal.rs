// Hardware abstraction surface consumed by the router and card applications
// (`spec.md` §6's HAL surface table).
//
// Grounded in `apps/vault/src/env/xous/mod.rs`'s `XousEnv` (the concrete
// environment `Ctap<E: Env>` is instantiated over) and
// `apps/vault/src/api/user_presence.rs`'s `UserPresence` trait: one
// environment object, borrowed generically the way `Ctap<E: Env>` borrows
// `env: E`, rather than a grab-bag of trait objects per capability.
// `rng()` returns a concrete associated type instead of `&mut dyn RngCore`
// because `card_crypto`'s key-generation APIs require `RngCore +
// CryptoRng`, and `CryptoRng` is a marker trait with no object-safe
// surface to forward through a trait object.

use card_store::Flash;
use rand_core::{CryptoRng, RngCore};

/// The HAL surface a firmware platform integration supplies to the core.
/// Implementations own the concrete flash driver, entropy source, and
/// button/LED/watchdog peripherals; everything in `card-fw` only ever
/// calls through this trait, never a concrete platform type directly.
pub trait Env {
    type Rng: RngCore + CryptoRng;

    /// The block-erasable credential store medium (`spec.md` §6:
    /// `flash_init`/`flash_read`/`flash_write`/`flash_erase`).
    fn flash(&mut self) -> &mut dyn Flash;

    /// The platform entropy source, already seeded into a DRBG
    /// (`spec.md` §6: `random_generate`) for scalar/IV generation.
    fn rng(&mut self) -> &mut Self::Rng;

    /// `spec.md` §6: `button_get_state()`.
    fn button_get_state(&self) -> bool;

    /// `spec.md` §6: `button_wait_press(timeout_ms)`.
    fn button_wait_press(&mut self, timeout_ms: u32) -> bool;

    /// `spec.md` §6: `led_set_state(state)`.
    fn led_set_state(&mut self, state: bool);

    /// `spec.md` §6: `get_time_ms()`, a wall-clock-monotone millisecond
    /// counter (`spec.md` §1: "the core consumes ... a wall-clock-monotone
    /// millisecond counter from its collaborators").
    fn get_time_ms(&self) -> u64;

    /// `spec.md` §6: `watchdog_feed()`.
    fn watchdog_feed(&mut self);
}
