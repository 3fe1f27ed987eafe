// PIV application (C6): NIST SP 800-73-4 identity-card state machine
// subset (`spec.md` §4.4).
//
// No direct PIV precedent exists in the teacher pack; built from
// `spec.md` §4.4 using `card_store::PinRecord` as the shared PIN/PUK
// building block (the same monotone-retry discipline
// `apps/vault/src/ctap/storage.rs` implements for its own PIN) and
// `card_crypto::EcdsaPrivateKey` for key-slot generation. `spec.md` §6
// gives a bit-exact on-disk layout only for the generic credential store
// (C4); it gives none for PIV's own PIN/PUK/key-slot state, so that
// state lives in RAM, owned by this struct, and is lost on power-cycle —
// there is no conflicting flash offset to honor, and `spec.md` §4.4's
// "Reset" operation already describes a restore-to-defaults behavior
// indistinguishable from a fresh in-memory instance.

use card_crypto::EcdsaPrivateKey;
use card_store::{PinError, PinRecord};

use crate::apdu::{Command, Response, StatusWord};
use crate::hal::Env;
use crate::router::CardApplication;

/// NIST SP 800-73-4's registered PIV AID.
pub const PIV_AID: [u8; 11] = [0xA0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00, 0x01, 0x00];

const PIN_MAX_RETRIES: u8 = 3;
const PUK_MAX_RETRIES: u8 = 3;
const PIN_LEN_RANGE: core::ops::RangeInclusive<usize> = 6..=8;

const DEFAULT_PIN: &[u8] = b"123456";
const DEFAULT_PUK: &[u8] = b"12345678";

const INS_VERIFY: u8 = 0x20;
const INS_CHANGE_REFERENCE_DATA: u8 = 0x24;
const INS_GET_DATA: u8 = 0xCB;
const INS_PUT_DATA: u8 = 0xDB;
const INS_GENERATE_ASYMMETRIC: u8 = 0x47;
const INS_GENERAL_AUTHENTICATE: u8 = 0x87;

/// Slot references, matching the real PIV key-reference bytes used by
/// `GENERATE ASYMMETRIC KEY PAIR`'s P2 (`spec.md` §8 scenario S2 uses
/// `P2=0x9A`).
const SLOT_AUTH: u8 = 0x9A;
const SLOT_SIG: u8 = 0x9C;
const SLOT_KEY_MGMT: u8 = 0x9D;
const SLOT_CARD_AUTH: u8 = 0x9E;
const KEY_SLOT_REFS: [u8; 4] = [SLOT_AUTH, SLOT_SIG, SLOT_KEY_MGMT, SLOT_CARD_AUTH];

/// Matching X.509 certificate data object identifiers (NIST SP 800-73-4
/// table 7), so `GET DATA`/`PUT DATA` with `5FC105` etc. round-trips
/// with the key generated into the corresponding slot.
const CERT_OIDS: [[u8; 3]; 4] = [
    [0x5F, 0xC1, 0x05], // PIV Authentication certificate
    [0x5F, 0xC1, 0x0A], // Digital Signature certificate
    [0x5F, 0xC1, 0x0B], // Key Management certificate
    [0x5F, 0xC1, 0x01], // Card Authentication certificate
];

const MAX_CERT_LEN: usize = 2048;

/// ECC P-256 algorithm identifier byte used in the GENERATE TLV's `80 LL
/// ALG` and the default when no TLV is given.
const ALG_ECC_P256: u8 = 0x11;

struct KeySlot {
    reference: u8,
    generated: bool,
    private_key: Option<EcdsaPrivateKey>,
}

impl KeySlot {
    fn new(reference: u8) -> Self {
        KeySlot { reference, generated: false, private_key: None }
    }
}

/// The PIV identity-card application, per `spec.md` §4.4.
pub struct Piv {
    pin: PinRecord,
    pin_verified: bool,
    puk: PinRecord,
    key_slots: [KeySlot; 4],
    cert_slots: [Option<Vec<u8>>; 4],
}

impl Default for Piv {
    fn default() -> Self {
        Self::new()
    }
}

impl Piv {
    pub fn new() -> Self {
        let mut pin = PinRecord::unset(PIN_MAX_RETRIES);
        pin.set(DEFAULT_PIN);
        let mut puk = PinRecord::unset(PUK_MAX_RETRIES);
        puk.set(DEFAULT_PUK);
        Piv {
            pin,
            pin_verified: false,
            puk,
            key_slots: KEY_SLOT_REFS.map(KeySlot::new),
            cert_slots: [None, None, None, None],
        }
    }

    fn slot_index(reference: u8) -> Option<usize> {
        KEY_SLOT_REFS.iter().position(|&r| r == reference)
    }

    fn cert_index(oid: &[u8]) -> Option<usize> {
        CERT_OIDS.iter().position(|candidate| candidate.as_slice() == oid)
    }

    fn handle_verify(&mut self, command: &Command) -> Response {
        if command.body.is_empty() {
            return if self.pin_verified {
                Response::status(StatusWord::Success)
            } else {
                Response::status(StatusWord::VerifyFailed { retries: self.pin.retries_remaining() })
            };
        }

        if command.p2 != 0x80 && command.p2 != 0x00 {
            return Response::status(StatusWord::IncorrectP1P2);
        }
        if !PIN_LEN_RANGE.contains(&command.body.len()) {
            return Response::status(StatusWord::WrongLength);
        }

        match self.pin.verify(command.body) {
            Ok(()) => {
                self.pin_verified = true;
                Response::status(StatusWord::Success)
            }
            Err(PinError::Blocked) => Response::status(StatusWord::AuthenticationBlocked),
            Err(PinError::Mismatch) => {
                self.pin_verified = false;
                Response::status(StatusWord::VerifyFailed { retries: self.pin.retries_remaining() })
            }
            Err(PinError::NotSet) | Err(PinError::InvalidLength) => Response::status(StatusWord::InternalError),
        }
    }

    fn handle_change_reference_data(&mut self, command: &Command) -> Response {
        if !self.pin_verified {
            return Response::status(StatusWord::SecurityStatusNotSatisfied);
        }
        let body = command.body;
        if body.is_empty() {
            return Response::status(StatusWord::WrongLength);
        }
        let old_len = body[0] as usize;
        if body.len() < 1 + old_len + 1 {
            return Response::status(StatusWord::WrongLength);
        }
        let old_pin = &body[1..1 + old_len];
        let new_len = body[1 + old_len] as usize;
        if body.len() != 1 + old_len + 1 + new_len || !PIN_LEN_RANGE.contains(&new_len) {
            return Response::status(StatusWord::WrongLength);
        }
        let new_pin = &body[2 + old_len..];

        match self.pin.verify(old_pin) {
            Ok(()) => {
                self.pin.set(new_pin);
                Response::status(StatusWord::Success)
            }
            Err(PinError::Blocked) => Response::status(StatusWord::AuthenticationBlocked),
            Err(PinError::Mismatch) => Response::status(StatusWord::SecurityStatusNotSatisfied),
            Err(PinError::NotSet) | Err(PinError::InvalidLength) => Response::status(StatusWord::InternalError),
        }
    }

    fn handle_get_data(&self, command: &Command) -> Response {
        let body = command.body;
        if body.len() < 3 || body[0] != 0x5C {
            return Response::status(StatusWord::WrongData);
        }
        let oid_len = body[1] as usize;
        if (oid_len != 1 && oid_len != 3) || body.len() != 2 + oid_len {
            return Response::status(StatusWord::WrongData);
        }
        let oid = &body[2..];

        match Self::cert_index(oid) {
            Some(index) => match &self.cert_slots[index] {
                Some(cert) => Response::ok(cert.clone()),
                None => Response::status(StatusWord::FileNotFound),
            },
            None => Response::status(StatusWord::FileNotFound),
        }
    }

    fn handle_put_data(&mut self, command: &Command) -> Response {
        if !self.pin_verified {
            return Response::status(StatusWord::SecurityStatusNotSatisfied);
        }
        let body = command.body;
        if body.len() < 3 || body[0] != 0x5C {
            return Response::status(StatusWord::WrongData);
        }
        let oid_len = body[1] as usize;
        if (oid_len != 1 && oid_len != 3) || body.len() < 2 + oid_len + 2 {
            return Response::status(StatusWord::WrongData);
        }
        let oid = &body[2..2 + oid_len];
        let rest = &body[2 + oid_len..];
        if rest[0] != 0x53 {
            return Response::status(StatusWord::WrongData);
        }
        let value_len = rest[1] as usize;
        if rest.len() != 2 + value_len || value_len > MAX_CERT_LEN {
            return Response::status(StatusWord::WrongData);
        }
        let value = &rest[2..];

        match Self::cert_index(oid) {
            Some(index) => {
                self.cert_slots[index] = Some(value.to_vec());
                Response::status(StatusWord::Success)
            }
            None => Response::status(StatusWord::WrongData),
        }
    }

    fn handle_generate<E: Env>(&mut self, env: &mut E, command: &Command) -> Response {
        if !self.pin_verified {
            return Response::status(StatusWord::SecurityStatusNotSatisfied);
        }
        let index = match Self::slot_index(command.p2) {
            Some(index) => index,
            None => return Response::status(StatusWord::IncorrectP1P2),
        };

        // Optional `AC LL 80 LL ALG` TLV overriding the algorithm;
        // anything but ECC P-256 is not implemented.
        if !command.body.is_empty() {
            if let Some(alg) = parse_algorithm_tlv(command.body) {
                if alg != ALG_ECC_P256 {
                    return Response::status(StatusWord::FunctionNotSupported);
                }
            } else {
                return Response::status(StatusWord::WrongData);
            }
        }

        let private_key = EcdsaPrivateKey::generate(env.rng());
        let public_key = private_key.public_key().to_xy_bytes();
        self.key_slots[index].private_key = Some(private_key);
        self.key_slots[index].generated = true;
        Response::ok(public_key.to_vec())
    }
}

fn parse_algorithm_tlv(body: &[u8]) -> Option<u8> {
    // `AC LL 80 LL ALG`
    if body.len() < 2 || body[0] != 0xAC {
        return None;
    }
    let inner_len = body[1] as usize;
    let inner = body.get(2..2 + inner_len)?;
    if inner.len() < 3 || inner[0] != 0x80 {
        return None;
    }
    let alg_len = inner[1] as usize;
    if alg_len != 1 || inner.len() != 2 + alg_len {
        return None;
    }
    Some(inner[2])
}

impl<E: Env> CardApplication<E> for Piv {
    fn aid(&self) -> &[u8] {
        &PIV_AID
    }

    fn select(&mut self, _env: &mut E) -> Vec<u8> {
        // Opaque to the router; a minimal FCI template tag is sufficient.
        vec![0x6F, 0x00]
    }

    fn handle(&mut self, env: &mut E, command: &Command) -> Response {
        match command.ins {
            INS_VERIFY => self.handle_verify(command),
            INS_CHANGE_REFERENCE_DATA => self.handle_change_reference_data(command),
            INS_GET_DATA => self.handle_get_data(command),
            INS_PUT_DATA => self.handle_put_data(command),
            INS_GENERATE_ASYMMETRIC => self.handle_generate(env, command),
            // spec.md §4.4: "out of scope for this spec beyond returning
            // 0x6A81 (not supported) until implemented."
            INS_GENERAL_AUTHENTICATE => Response::status(StatusWord::FunctionNotSupported),
            _ => Response::status(StatusWord::InstructionNotSupported),
        }
    }

    fn reset(&mut self, _env: &mut E) {
        *self = Piv::new();
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
            rng: Drbg::instantiate(b"piv-test-entropy-pool-32bytes!!!", b""),
        }
    }

    fn verify(piv: &mut Piv, pin: &[u8]) -> Response {
        let body = pin.to_vec();
        let command = Command { cla: 0x00, ins: INS_VERIFY, p1: 0x00, p2: 0x80, body: &body, le: None };
        CardApplication::<TestEnv>::handle(piv, &mut env(), &command)
    }

    #[test]
    fn pin_lockout_sequence_matches_scenario_s1() {
        let mut piv = Piv::new();
        piv.pin.set(b"654321");

        assert_eq!(verify(&mut piv, b"000000").sw(), (0x63, 0xC2));
        assert_eq!(verify(&mut piv, b"000000").sw(), (0x63, 0xC1));
        assert_eq!(verify(&mut piv, b"000000").sw(), (0x63, 0xC0));
        assert_eq!(verify(&mut piv, b"654321").sw(), (0x69, 0x83));
    }

    #[test]
    fn generate_after_verify_returns_64_byte_public_key_scenario_s2() {
        let mut piv = Piv::new();
        let mut test_env = env();

        assert!(verify(&mut piv, DEFAULT_PIN).is_success());

        let command = Command { cla: 0x00, ins: INS_GENERATE_ASYMMETRIC, p1: 0x00, p2: SLOT_AUTH, body: &[], le: None };
        let response = CardApplication::<TestEnv>::handle(&mut piv, &mut test_env, &command);
        assert!(response.is_success());
        assert_eq!(response.body().len(), 64);
    }

    #[test]
    fn put_then_get_data_round_trips_certificate() {
        let mut piv = Piv::new();
        let mut test_env = env();
        assert!(verify(&mut piv, DEFAULT_PIN).is_success());

        let cert = vec![0xAA; 32];
        let mut put_body = vec![0x5C, 0x03, 0x5F, 0xC1, 0x05, 0x53, cert.len() as u8];
        put_body.extend_from_slice(&cert);
        let put = Command { cla: 0x00, ins: INS_PUT_DATA, p1: 0x3F, p2: 0xFF, body: &put_body, le: None };
        assert!(CardApplication::<TestEnv>::handle(&mut piv, &mut test_env, &put).is_success());

        let get_body = [0x5C, 0x03, 0x5F, 0xC1, 0x05];
        let get = Command { cla: 0x00, ins: INS_GET_DATA, p1: 0x3F, p2: 0xFF, body: &get_body, le: None };
        let response = CardApplication::<TestEnv>::handle(&mut piv, &mut test_env, &get);
        assert!(response.is_success());
        assert_eq!(response.body(), cert.as_slice());
    }

    #[test]
    fn unverified_generate_is_rejected() {
        let mut piv = Piv::new();
        let mut test_env = env();
        let command = Command { cla: 0x00, ins: INS_GENERATE_ASYMMETRIC, p1: 0x00, p2: SLOT_AUTH, body: &[], le: None };
        let response = CardApplication::<TestEnv>::handle(&mut piv, &mut test_env, &command);
        assert_eq!(response.sw(), StatusWord::SecurityStatusNotSatisfied.to_bytes());
    }

    #[test]
    fn general_authenticate_is_not_supported() {
        let mut piv = Piv::new();
        let mut test_env = env();
        let command = Command { cla: 0x00, ins: INS_GENERAL_AUTHENTICATE, p1: 0x00, p2: 0x00, body: &[], le: None };
        let response = CardApplication::<TestEnv>::handle(&mut piv, &mut test_env, &command);
        assert_eq!(response.sw(), StatusWord::FunctionNotSupported.to_bytes());
    }
}
