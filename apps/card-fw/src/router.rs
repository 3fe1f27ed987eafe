// APDU application router (C5): SELECT-by-AID dispatch onto at most 8
// registered applications (`spec.md` §4.3).
//
// Grounded in `apps/vault/src/lib.rs`'s `Ctap<E: Env>::process_hid_packet`,
// which dispatches an incoming packet to one of a small fixed set of
// transport handlers (`MainHid`/`VendorHid`) parameterized over the same
// environment; `Router<E>` generalizes that "one dispatcher, pluggable
// handlers, handler fully owns its response" shape from transport-keyed
// to AID-keyed dispatch, and from a fixed enum of two transports to a
// runtime-registered table (still capacity-bounded, matching the
// teacher's preference for fixed-size tables over heap-growing ones,
// e.g. `MAX_SUPPORTED_RESIDENTIAL_KEYS`).

use crate::apdu::{ApduError, Command, Response, StatusWord};
use crate::hal::Env;

pub const MAX_APPLICATIONS: usize = 8;
pub const MIN_AID_LEN: usize = 5;
pub const MAX_AID_LEN: usize = 16;

/// A registered card application. One concrete type implements this per
/// application (PIV, OpenPGP, management); the router only ever holds
/// them as trait objects.
pub trait CardApplication<E: Env> {
    fn aid(&self) -> &[u8];

    /// Runs on successful SELECT. Returns the file-control-information
    /// template for the response body, opaque to the router per
    /// `spec.md` §4.3 rule 1.
    fn select(&mut self, env: &mut E) -> Vec<u8>;

    /// Handles a non-SELECT command already routed to this application.
    /// The handler is wholly responsible for the response's SW and body
    /// (`spec.md` §6's APDU handler contract).
    fn handle(&mut self, env: &mut E, command: &Command) -> Response;

    /// `spec.md` §3: "[current application is] reset by power-on or when
    /// the active application enters a terminated state." Applications
    /// without a terminated sub-state (PIV, management) use the default.
    fn is_terminated(&self) -> bool {
        false
    }

    /// Restores factory defaults. Invoked by the platform integration on
    /// an explicit device reset, not by the router itself.
    fn reset(&mut self, env: &mut E);
}

struct Slot<E: Env> {
    aid: Vec<u8>,
    app: Box<dyn CardApplication<E>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterError {
    Full,
    DuplicateAid,
    InvalidAidLength,
}

/// Dispatches ISO 7816-4 command/response traffic to the currently
/// selected application, per `spec.md` §4.3.
pub struct Router<E: Env> {
    apps: Vec<Slot<E>>,
    current: Option<usize>,
}

impl<E: Env> Default for Router<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Env> Router<E> {
    pub fn new() -> Self {
        Router { apps: Vec::new(), current: None }
    }

    /// Registration only happens at startup (`spec.md` §4.3); duplicate
    /// AIDs and a full table are both rejected.
    pub fn register(&mut self, app: Box<dyn CardApplication<E>>) -> Result<(), RegisterError> {
        let aid = app.aid().to_vec();
        if aid.len() < MIN_AID_LEN || aid.len() > MAX_AID_LEN {
            return Err(RegisterError::InvalidAidLength);
        }
        if self.apps.len() >= MAX_APPLICATIONS {
            return Err(RegisterError::Full);
        }
        if self.apps.iter().any(|slot| slot.aid == aid) {
            return Err(RegisterError::DuplicateAid);
        }
        self.apps.push(Slot { aid, app });
        Ok(())
    }

    /// `spec.md` §3: unset at boot / on power-cycle.
    pub fn power_on_reset(&mut self) {
        self.current = None;
    }

    pub fn current_aid(&self) -> Option<&[u8]> {
        self.current.map(|i| self.apps[i].aid.as_slice())
    }

    /// Parses `raw` and dispatches it per `spec.md` §4.3's three rules.
    pub fn dispatch(&mut self, env: &mut E, raw: &[u8]) -> Response {
        let command = match Command::parse(raw) {
            Ok(command) => command,
            Err(ApduError::WrongLength) => return Response::status(StatusWord::WrongLength),
        };

        if command.is_select() {
            return self.dispatch_select(env, &command);
        }

        let index = match self.current {
            Some(index) => index,
            // Rule 2: no current application.
            None => return Response::status(StatusWord::FileNotFound),
        };

        // Rule 3: the handler owns SW and body entirely.
        let response = self.apps[index].app.handle(env, &command);
        if self.apps[index].app.is_terminated() {
            self.current = None;
        }
        response
    }

    fn dispatch_select(&mut self, env: &mut E, command: &Command) -> Response {
        match self.apps.iter().position(|slot| slot.aid == command.body) {
            Some(index) => {
                self.current = Some(index);
                let fci = self.apps[index].app.select(env);
                Response::ok(fci)
            }
            // Invariant 6: an unknown AID never changes `current`.
            None => Response::status(StatusWord::FileNotFound),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use card_crypto::Drbg;
    use card_store::flash::MemoryFlash;

    struct TestEnv {
        flash: MemoryFlash,
        rng: Drbg,
    }

    impl Env for TestEnv {
        type Rng = Drbg;
        fn flash(&mut self) -> &mut dyn card_store::Flash {
            &mut self.flash
        }
        fn rng(&mut self) -> &mut Drbg {
            &mut self.rng
        }
        fn button_get_state(&self) -> bool {
            false
        }
        fn button_wait_press(&mut self, _timeout_ms: u32) -> bool {
            false
        }
        fn led_set_state(&mut self, _state: bool) {}
        fn get_time_ms(&self) -> u64 {
            0
        }
        fn watchdog_feed(&mut self) {}
    }

    fn env() -> TestEnv {
        TestEnv {
            flash: MemoryFlash::new(65536),
            rng: Drbg::instantiate(b"router-test-entropy-pool-32byte!", b""),
        }
    }

    struct EchoApp {
        aid: Vec<u8>,
        terminated: bool,
    }

    impl CardApplication<TestEnv> for EchoApp {
        fn aid(&self) -> &[u8] {
            &self.aid
        }
        fn select(&mut self, _env: &mut TestEnv) -> Vec<u8> {
            vec![0x6F, 0x00]
        }
        fn handle(&mut self, _env: &mut TestEnv, _command: &Command) -> Response {
            Response::ok(vec![0x42])
        }
        fn is_terminated(&self) -> bool {
            self.terminated
        }
        fn reset(&mut self, _env: &mut TestEnv) {
            self.terminated = false;
        }
    }

    #[test]
    fn no_selection_falls_back_to_file_not_found() {
        let mut router: Router<TestEnv> = Router::new();
        let mut env = env();
        let response = router.dispatch(&mut env, &[0x00, 0x20, 0x00, 0x80]);
        assert_eq!(response.sw(), StatusWord::FileNotFound.to_bytes());
    }

    #[test]
    fn select_then_dispatch_routes_to_the_selected_application() {
        let mut router: Router<TestEnv> = Router::new();
        let aid = vec![0xA0, 0x00, 0x00, 0x03, 0x08];
        router
            .register(Box::new(EchoApp { aid: aid.clone(), terminated: false }))
            .unwrap();
        let mut env = env();

        let mut select = vec![0x00, 0xA4, 0x04, 0x00, aid.len() as u8];
        select.extend_from_slice(&aid);
        let response = router.dispatch(&mut env, &select);
        assert!(response.is_success());
        assert_eq!(router.current_aid(), Some(aid.as_slice()));

        let response = router.dispatch(&mut env, &[0x00, 0x20, 0x00, 0x80]);
        assert_eq!(response.body(), &[0x42]);
    }

    #[test]
    fn unknown_aid_does_not_change_current_application() {
        let mut router: Router<TestEnv> = Router::new();
        let aid = vec![0xA0, 0x00, 0x00, 0x03, 0x08];
        router
            .register(Box::new(EchoApp { aid: aid.clone(), terminated: false }))
            .unwrap();
        let mut env = env();

        let mut select = vec![0x00, 0xA4, 0x04, 0x00, aid.len() as u8];
        select.extend_from_slice(&aid);
        router.dispatch(&mut env, &select);

        let unknown = [0x00, 0xA4, 0x04, 0x00, 0x02, 0xFF, 0xFF];
        let response = router.dispatch(&mut env, &unknown);
        assert_eq!(response.sw(), StatusWord::FileNotFound.to_bytes());
        assert_eq!(router.current_aid(), Some(aid.as_slice()));
    }

    #[test]
    fn duplicate_aid_registration_is_rejected() {
        let mut router: Router<TestEnv> = Router::new();
        let aid = vec![0xA0, 0x00, 0x00, 0x03, 0x08];
        router
            .register(Box::new(EchoApp { aid: aid.clone(), terminated: false }))
            .unwrap();
        let result = router.register(Box::new(EchoApp { aid, terminated: false }));
        assert_eq!(result, Err(RegisterError::DuplicateAid));
    }

    #[test]
    fn terminated_application_clears_current_selection() {
        let mut router: Router<TestEnv> = Router::new();
        let aid = vec![0xA0, 0x00, 0x00, 0x03, 0x08];
        router
            .register(Box::new(EchoApp { aid: aid.clone(), terminated: true }))
            .unwrap();
        let mut env = env();

        let mut select = vec![0x00, 0xA4, 0x04, 0x00, aid.len() as u8];
        select.extend_from_slice(&aid);
        router.dispatch(&mut env, &select);
        router.dispatch(&mut env, &[0x00, 0x20, 0x00, 0x80]);
        assert_eq!(router.current_aid(), None);
    }
}
