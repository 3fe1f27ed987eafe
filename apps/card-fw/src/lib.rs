//! APDU application router and card applications: PIV (C6), OpenPGP
//! (C7), management (C8), and the permission capability bitmap (C9)
//! consumed by an upstream CTAP-style authenticator.
//!
//! [`Router`] dispatches parsed [`apdu::Command`]s to whichever
//! [`router::CardApplication`] is currently selected; [`Piv`],
//! [`OpenPgp`], and [`Management`] are the three applications shipped
//! here. Persistence is delegated to `card_store`, crypto to
//! `card_crypto`; this crate only holds application-level state
//! machines and the wire-level router.

pub mod apdu;
pub mod hal;
pub mod mgmt;
pub mod openpgp;
pub mod permissions;
pub mod piv;
pub mod router;

pub use hal::Env;
pub use mgmt::Management;
pub use openpgp::OpenPgp;
pub use permissions::{Permission, Permissions};
pub use piv::Piv;
pub use router::{CardApplication, RegisterError, Router};

/// Builds a [`Router`] with PIV, OpenPGP, and management already
/// registered under their standard AIDs, ready for the platform
/// integration to `power_on_reset` and start dispatching against.
pub fn standard_router<E: Env>() -> Router<E> {
    let mut router = Router::new();
    router.register(Box::new(Piv::new())).expect("built-in AIDs never collide");
    router.register(Box::new(OpenPgp::new())).expect("built-in AIDs never collide");
    router.register(Box::new(Management::new())).expect("built-in AIDs never collide");
    router
}
